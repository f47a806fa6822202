//! GeoJSON feature collections
//!
//! A third ordinate on line coordinates is read as Z. The legacy `crs`
//! member (`{"type": "name", "properties": {"name": "EPSG:2193"}}`) is
//! honoured when present.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection, Geometry, LineStringZ};
use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<RawFeature>,
    #[serde(default)]
    crs: Option<RawCrs>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawCrs {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

/// Read a GeoJSON FeatureCollection from a file
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_geojson(&text)
}

/// Write a FeatureCollection to a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(fc: &FeatureCollection, path: P) -> Result<()> {
    let value = feature_collection_to_geojson(fc);
    fs::write(path.as_ref(), serde_json::to_string_pretty(&value)?)?;
    Ok(())
}

/// Parse a GeoJSON FeatureCollection
pub fn parse_geojson(text: &str) -> Result<FeatureCollection> {
    let raw: RawCollection = serde_json::from_str(text)?;
    if raw.kind != "FeatureCollection" {
        return Err(Error::Parse(format!(
            "expected GeoJSON FeatureCollection, found {:?}",
            raw.kind
        )));
    }

    let crs = match raw.crs.and_then(|c| c.properties) {
        Some(props) => match props.get("name").and_then(Value::as_str) {
            Some(name) => Some(parse_crs_name(name)?),
            None => None,
        },
        None => None,
    };

    let features = raw
        .features
        .into_iter()
        .map(|rf| {
            let geometry = match rf.geometry {
                Some(Value::Null) | None => None,
                Some(g) => Some(parse_geometry(&g)?),
            };
            let properties = rf
                .properties
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, attribute_from_json(v)))
                .collect::<HashMap<_, _>>();
            let id = rf.id.and_then(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            Ok(Feature { geometry, properties, id })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureCollection { features, crs })
}

/// OGC URNs look like `urn:ogc:def:crs:EPSG::2193`
fn parse_crs_name(name: &str) -> Result<CRS> {
    if let Some((_, code)) = name.rsplit_once("EPSG::") {
        return CRS::parse(code);
    }
    if name.ends_with("CRS84") {
        return Ok(CRS::wgs84());
    }
    CRS::parse(name)
}

fn attribute_from_json(v: Value) -> AttributeValue {
    match v {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

fn position(v: &Value) -> Result<(Coord<f64>, Option<f64>)> {
    let arr = v
        .as_array()
        .ok_or_else(|| Error::Parse("GeoJSON position must be an array".into()))?;
    let nums = arr
        .iter()
        .map(|n| n.as_f64().ok_or_else(|| Error::Parse("GeoJSON ordinate must be a number".into())))
        .collect::<Result<Vec<_>>>()?;
    if nums.len() < 2 {
        return Err(Error::Parse("GeoJSON position needs at least 2 ordinates".into()));
    }
    Ok((Coord { x: nums[0], y: nums[1] }, nums.get(2).copied()))
}

fn array<'a>(v: &'a Value, what: &str) -> Result<&'a Vec<Value>> {
    v.as_array()
        .ok_or_else(|| Error::Parse(format!("GeoJSON {} must be an array", what)))
}

fn line(v: &Value) -> Result<LineStringZ> {
    let positions = array(v, "line")?
        .iter()
        .map(position)
        .collect::<Result<Vec<_>>>()?;
    let has_z = positions.iter().all(|(_, z)| z.is_some());
    let z = has_z.then(|| positions.iter().filter_map(|(_, z)| *z).collect());
    let xy = LineString::new(positions.into_iter().map(|(c, _)| c).collect());
    LineStringZ::new(xy, z)
}

fn ring(v: &Value) -> Result<LineString<f64>> {
    let coords = array(v, "ring")?
        .iter()
        .map(|p| position(p).map(|(c, _)| c))
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

fn polygon(v: &Value) -> Result<Polygon<f64>> {
    let mut rings = array(v, "polygon")?
        .iter()
        .map(ring)
        .collect::<Result<Vec<_>>>()?;
    if rings.is_empty() {
        return Err(Error::InvalidGeometry("polygon has no rings".into()));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn parse_geometry(v: &Value) -> Result<Geometry> {
    let kind = v
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse("GeoJSON geometry has no type".into()))?;
    let coords = v
        .get("coordinates")
        .ok_or_else(|| Error::Parse(format!("GeoJSON {} has no coordinates", kind)))?;
    let geom = match kind {
        "Point" => Geometry::Point(Point::from(position(coords)?.0)),
        "LineString" => Geometry::LineString(line(coords)?),
        "MultiLineString" => Geometry::MultiLineString(
            array(coords, "multiline")?
                .iter()
                .map(line)
                .collect::<Result<Vec<_>>>()?,
        ),
        "Polygon" => Geometry::Polygon(polygon(coords)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon::new(
            array(coords, "multipolygon")?
                .iter()
                .map(polygon)
                .collect::<Result<Vec<_>>>()?,
        )),
        other => return Err(Error::Parse(format!("unsupported GeoJSON geometry type {}", other))),
    };
    Ok(geom)
}

fn line_to_json(line: &LineStringZ) -> Value {
    let positions = (0..line.num_coords())
        .map(|i| match line.coord3(i) {
            (x, y, Some(z)) => json!([x, y, z]),
            (x, y, None) => json!([x, y]),
        })
        .collect::<Vec<_>>();
    Value::Array(positions)
}

fn polygon_to_json(poly: &Polygon<f64>) -> Value {
    let ring = |r: &LineString<f64>| {
        Value::Array(r.0.iter().map(|c| json!([c.x, c.y])).collect())
    };
    let mut rings = vec![ring(poly.exterior())];
    rings.extend(poly.interiors().iter().map(ring));
    Value::Array(rings)
}

/// Convert a geometry to a GeoJSON geometry object
pub fn geometry_to_geojson(geom: &Geometry) -> Value {
    let coordinates = match geom {
        Geometry::Point(p) => json!([p.x(), p.y()]),
        Geometry::LineString(l) => line_to_json(l),
        Geometry::MultiLineString(ls) => Value::Array(ls.iter().map(line_to_json).collect()),
        Geometry::Polygon(p) => polygon_to_json(p),
        Geometry::MultiPolygon(mp) => Value::Array(mp.0.iter().map(polygon_to_json).collect()),
    };
    json!({ "type": geom.type_name(), "coordinates": coordinates })
}

/// Convert a feature collection to a GeoJSON value
pub fn feature_collection_to_geojson(fc: &FeatureCollection) -> Value {
    let features = fc
        .iter()
        .map(|f| {
            let mut props = f.properties.iter().collect::<Vec<_>>();
            props.sort_by(|a, b| a.0.cmp(b.0));
            let properties = props
                .into_iter()
                .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
                .collect::<Map<_, _>>();
            let mut obj = json!({
                "type": "Feature",
                "properties": properties,
                "geometry": f.geometry.as_ref().map(geometry_to_geojson),
            });
            if let Some(id) = &f.id {
                obj["id"] = match id.parse::<i64>() {
                    Ok(n) => json!(n),
                    Err(_) => json!(id),
                };
            }
            obj
        })
        .collect::<Vec<_>>();

    let mut out = json!({ "type": "FeatureCollection", "features": features });
    if let Some(crs) = &fc.crs {
        out["crs"] = json!({ "type": "name", "properties": { "name": crs.identifier() } });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::2193"}},
        "features": [
            {"type": "Feature", "id": 3, "properties": {"name": "upper", "width": 2.5},
             "geometry": {"type": "LineString", "coordinates": [[60, 100, 14], [60, 80, 12]]}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "LineString", "coordinates": [[40, 130], [60, 100]]}},
            {"type": "Feature", "properties": {"name": null}, "geometry": null}
        ]
    }"#;

    #[test]
    fn test_parse_collection() {
        let fc = parse_geojson(LINES).unwrap();
        assert_eq!(fc.len(), 3);
        assert_eq!(fc.crs.as_ref().and_then(CRS::epsg), Some(2193));

        let first = &fc.features[0];
        assert_eq!(first.id.as_deref(), Some("3"));
        assert_eq!(first.get_property("width"), Some(&AttributeValue::Float(2.5)));
        match &first.geometry {
            Some(Geometry::LineString(l)) => assert_eq!(l.end_z(), Some(12.0)),
            other => panic!("unexpected {:?}", other),
        }
        match &fc.features[1].geometry {
            Some(Geometry::LineString(l)) => assert!(!l.has_z()),
            other => panic!("unexpected {:?}", other),
        }
        assert!(fc.features[2].geometry.is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_geojson(r#"{"type": "Feature"}"#).is_err());
        assert!(parse_geojson("not json").is_err());
        let bad = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "Circle", "coordinates": []}}]}"#;
        assert!(parse_geojson(bad).is_err());
    }

    #[test]
    fn test_write_and_read_file() {
        let fc = parse_geojson(LINES).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.geojson");
        write_geojson(&fc, &path).unwrap();

        let back = read_geojson(&path).unwrap();
        assert_eq!(back.len(), fc.len());
        assert_eq!(back.features[0].geometry, fc.features[0].geometry);
        assert_eq!(back.features[0].id.as_deref(), Some("3"));
        assert_eq!(back.crs.as_ref().and_then(CRS::epsg), Some(2193));
    }
}
