//! Vector data structures
//!
//! Stream lines carry an optional elevation per vertex; `geo-types`
//! has no Z dimension, so it is stored alongside the 2D line string.

use crate::crs::CRS;
use crate::error::{Error, Result};
use geo::EuclideanLength;
use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A line string with an optional Z coordinate for each vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct LineStringZ {
    xy: LineString<f64>,
    z: Option<Vec<f64>>,
}

impl LineStringZ {
    /// Create from a 2D line string and optional elevations.
    ///
    /// At least two vertices are required, and `z` (if given) must have
    /// one value per vertex.
    pub fn new(xy: LineString<f64>, z: Option<Vec<f64>>) -> Result<Self> {
        if xy.0.len() < 2 {
            return Err(Error::InvalidGeometry(format!(
                "line string requires at least 2 coordinates, found {}",
                xy.0.len()
            )));
        }
        if let Some(z) = &z {
            if z.len() != xy.0.len() {
                return Err(Error::InvalidGeometry(format!(
                    "expected {} Z values, found {}",
                    xy.0.len(),
                    z.len()
                )));
            }
        }
        Ok(Self { xy, z })
    }

    /// Create a 2D line from (x, y) pairs
    pub fn from_xy(coords: Vec<(f64, f64)>) -> Result<Self> {
        Self::new(LineString::from(coords), None)
    }

    /// Create a 3D line from (x, y, z) triples
    pub fn from_xyz(coords: Vec<(f64, f64, f64)>) -> Result<Self> {
        let z = coords.iter().map(|c| c.2).collect();
        let xy = coords.iter().map(|c| (c.0, c.1)).collect::<Vec<_>>();
        Self::new(LineString::from(xy), Some(z))
    }

    /// 2D geometry
    pub fn xy(&self) -> &LineString<f64> {
        &self.xy
    }

    /// Elevations, if present
    pub fn z(&self) -> Option<&[f64]> {
        self.z.as_deref()
    }

    /// Replace the elevations
    pub fn set_z(&mut self, z: Option<Vec<f64>>) -> Result<()> {
        let updated = Self::new(self.xy.clone(), z)?;
        *self = updated;
        Ok(())
    }

    pub fn has_z(&self) -> bool {
        self.z.is_some()
    }

    /// Number of vertices
    pub fn num_coords(&self) -> usize {
        self.xy.0.len()
    }

    /// 2D coordinates
    pub fn coords(&self) -> &[Coord<f64>] {
        &self.xy.0
    }

    /// Planar length, ignoring Z
    pub fn length(&self) -> f64 {
        self.xy.euclidean_length()
    }

    /// First (upstream) coordinate
    pub fn start(&self) -> Coord<f64> {
        self.xy.0[0]
    }

    /// Last (downstream) coordinate
    pub fn end(&self) -> Coord<f64> {
        self.xy.0[self.xy.0.len() - 1]
    }

    pub fn start_z(&self) -> Option<f64> {
        self.z.as_ref().map(|z| z[0])
    }

    pub fn end_z(&self) -> Option<f64> {
        self.z.as_ref().map(|z| z[z.len() - 1])
    }

    /// Vertex `i` as (x, y, z)
    pub fn coord3(&self, i: usize) -> (f64, f64, Option<f64>) {
        let c = self.xy.0[i];
        (c.x, c.y, self.z.as_ref().map(|z| z[i]))
    }

    /// Same line with vertex order reversed
    pub fn reversed(&self) -> Self {
        let mut coords = self.xy.0.clone();
        coords.reverse();
        let z = self.z.as_ref().map(|z| z.iter().rev().copied().collect());
        Self { xy: LineString::new(coords), z }
    }

    /// Drop the Z dimension
    pub fn force_2d(&self) -> Self {
        Self { xy: self.xy.clone(), z: None }
    }

    /// Round all ordinates to `precision` decimal places
    pub fn round(&self, precision: i32) -> Self {
        let coords = self
            .xy
            .0
            .iter()
            .map(|c| Coord { x: round_to(c.x, precision), y: round_to(c.y, precision) })
            .collect();
        let z = self
            .z
            .as_ref()
            .map(|z| z.iter().map(|v| round_to(*v, precision)).collect());
        Self { xy: LineString::new(coords), z }
    }

    /// Concatenate lines that join end-to-start into one line.
    ///
    /// Lines are given from upstream to downstream; the shared vertex at
    /// each join is kept once. Z is kept only if every part has Z.
    pub fn concat(parts: &[&LineStringZ]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| Error::InvalidGeometry("no lines to concatenate".into()))?;
        let keep_z = parts.iter().all(|p| p.has_z());
        let mut coords = first.xy.0.clone();
        let mut z = if keep_z { first.z.clone() } else { None };
        for part in &parts[1..] {
            let skip = usize::from(coords.last() == Some(&part.start()));
            coords.extend(part.xy.0.iter().skip(skip));
            if let (Some(z), Some(pz)) = (z.as_mut(), part.z.as_ref()) {
                z.extend(pz.iter().skip(skip));
            }
        }
        Self::new(LineString::new(coords), z)
    }
}

/// Round `value` to `precision` decimal places
pub fn round_to(value: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (value * factor).round() / factor
}

/// Geometry types handled by swn
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    LineString(LineStringZ),
    MultiLineString(Vec<LineStringZ>),
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Geometry {
    /// Geometry type name, as used in WKT
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }
}

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Integer view, accepting integral floats and numeric strings
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    /// Coordinate reference system shared by all features
    pub crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new(), crs: None }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Index each feature by an integer key.
    ///
    /// The key comes from `field` when given, else from the feature id,
    /// else the position in the collection.
    pub fn keyed<'a>(&'a self, field: Option<&str>) -> Result<Vec<(i64, &'a Feature)>> {
        self.features
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let key = match field {
                    Some(name) => f
                        .get_property(name)
                        .and_then(AttributeValue::as_i64)
                        .ok_or_else(|| {
                            Error::Parse(format!("feature {} has no integer {:?} property", i, name))
                        })?,
                    None => match &f.id {
                        Some(id) => id.parse::<i64>().map_err(|_| {
                            Error::Parse(format!("feature id {:?} is not an integer", id))
                        })?,
                        None => i as i64,
                    },
                };
                Ok((key, f))
            })
            .collect()
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}
