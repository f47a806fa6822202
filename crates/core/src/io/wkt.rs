//! Well-known text reader and writer
//!
//! Supports `POINT`, `LINESTRING`, `POLYGON`, `MULTILINESTRING` and
//! `MULTIPOLYGON`, each optionally tagged `Z`. Untagged coordinates with
//! three ordinates are read as Z. `M` ordinates are accepted and dropped.

use crate::error::{Error, Result};
use crate::vector::{round_to, Geometry, LineStringZ};
use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(f64),
    LParen,
    RParen,
    Comma,
}

fn tokenize(s: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = s.char_indices().peekable();
    while let Some(&(start, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            ',' => {
                tokens.push(Token::Comma);
                chars.next();
            }
            c if c.is_ascii_alphabetic() => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !c.is_ascii_alphabetic() {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Word(s[start..end].to_ascii_uppercase()));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    let numeric = c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E');
                    if !numeric {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                let text = &s[start..end];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| Error::Parse(format!("invalid number {:?} in WKT", text)))?;
                tokens.push(Token::Number(value));
            }
            other => {
                return Err(Error::Parse(format!("unexpected character {:?} in WKT", other)));
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Dims {
    Unspecified,
    Z,
    M,
    ZM,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    dims: Dims,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| Error::Parse("unexpected end of WKT".into()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let token = self.next()?;
        if token != expected {
            return Err(Error::Parse(format!("expected {:?}, found {:?}", expected, token)));
        }
        Ok(())
    }

    fn geometry(&mut self) -> Result<Geometry> {
        let kind = match self.next()? {
            Token::Word(w) => w,
            other => return Err(Error::Parse(format!("expected geometry type, found {:?}", other))),
        };
        self.dims = match self.peek() {
            Some(Token::Word(w)) if w == "Z" => Dims::Z,
            Some(Token::Word(w)) if w == "M" => Dims::M,
            Some(Token::Word(w)) if w == "ZM" => Dims::ZM,
            _ => Dims::Unspecified,
        };
        if self.dims != Dims::Unspecified {
            self.pos += 1;
        }
        if let Some(Token::Word(w)) = self.peek() {
            if w == "EMPTY" {
                return Err(Error::InvalidGeometry(format!("{} EMPTY is not supported", kind)));
            }
        }
        let geom = match kind.as_str() {
            "POINT" => {
                let mut coords = self.coord_list()?;
                if coords.len() != 1 {
                    return Err(Error::Parse("POINT requires exactly one coordinate".into()));
                }
                let (c, _) = coords.remove(0);
                Geometry::Point(Point::from(c))
            }
            "LINESTRING" => Geometry::LineString(self.line()?),
            "MULTILINESTRING" => {
                let mut lines = Vec::new();
                self.expect(Token::LParen)?;
                loop {
                    lines.push(self.line()?);
                    if !self.comma_or_close()? {
                        break;
                    }
                }
                Geometry::MultiLineString(lines)
            }
            "POLYGON" => Geometry::Polygon(self.polygon()?),
            "MULTIPOLYGON" => {
                let mut polys = Vec::new();
                self.expect(Token::LParen)?;
                loop {
                    polys.push(self.polygon()?);
                    if !self.comma_or_close()? {
                        break;
                    }
                }
                Geometry::MultiPolygon(MultiPolygon::new(polys))
            }
            other => return Err(Error::Parse(format!("unsupported WKT geometry type {}", other))),
        };
        Ok(geom)
    }

    /// Returns true after a comma, false after a closing parenthesis
    fn comma_or_close(&mut self) -> Result<bool> {
        match self.next()? {
            Token::Comma => Ok(true),
            Token::RParen => Ok(false),
            other => Err(Error::Parse(format!("expected ',' or ')', found {:?}", other))),
        }
    }

    fn coord(&mut self) -> Result<(Coord<f64>, Option<f64>)> {
        let mut values = Vec::with_capacity(4);
        while let Some(Token::Number(v)) = self.peek() {
            values.push(*v);
            self.pos += 1;
        }
        let z = match (self.dims, values.len()) {
            (Dims::Unspecified, 2) | (Dims::M, 3) => None,
            (Dims::Unspecified, 3) | (Dims::Z, 3) | (Dims::ZM, 4) => Some(values[2]),
            (Dims::Unspecified, 4) => Some(values[2]),
            (_, n) => {
                return Err(Error::Parse(format!("unexpected number of ordinates: {}", n)));
            }
        };
        Ok((Coord { x: values[0], y: values[1] }, z))
    }

    fn coord_list(&mut self) -> Result<Vec<(Coord<f64>, Option<f64>)>> {
        self.expect(Token::LParen)?;
        let mut coords = Vec::new();
        loop {
            coords.push(self.coord()?);
            if !self.comma_or_close()? {
                break;
            }
        }
        Ok(coords)
    }

    fn line(&mut self) -> Result<LineStringZ> {
        let coords = self.coord_list()?;
        let has_z = coords.iter().all(|(_, z)| z.is_some());
        let z = has_z.then(|| coords.iter().filter_map(|(_, z)| *z).collect());
        let xy = LineString::new(coords.into_iter().map(|(c, _)| c).collect());
        LineStringZ::new(xy, z)
    }

    fn polygon(&mut self) -> Result<Polygon<f64>> {
        self.expect(Token::LParen)?;
        let mut rings = Vec::new();
        loop {
            let ring = self.coord_list()?;
            rings.push(LineString::new(ring.into_iter().map(|(c, _)| c).collect()));
            if !self.comma_or_close()? {
                break;
            }
        }
        let exterior = rings.remove(0);
        Ok(Polygon::new(exterior, rings))
    }
}

/// Parse a single WKT geometry
pub fn parse_wkt(s: &str) -> Result<Geometry> {
    let mut parser = Parser {
        tokens: tokenize(s)?,
        pos: 0,
        dims: Dims::Unspecified,
    };
    let geom = parser.geometry()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::Parse(format!("trailing tokens after geometry in {:?}", s)));
    }
    Ok(geom)
}

/// Parse a list of WKT geometries
pub fn parse_wkt_list<S: AsRef<str>>(items: &[S]) -> Result<Vec<Geometry>> {
    items.iter().map(|s| parse_wkt(s.as_ref())).collect()
}

fn fmt_num(out: &mut String, v: f64, precision: Option<i32>) {
    let v = match precision {
        Some(p) => round_to(v, p),
        None => v,
    };
    // Avoid "-0" after rounding
    let v = if v == 0.0 { 0.0 } else { v };
    out.push_str(&v.to_string());
}

fn fmt_ring(out: &mut String, coords: &[Coord<f64>], z: Option<&[f64]>, precision: Option<i32>) {
    out.push('(');
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_num(out, c.x, precision);
        out.push(' ');
        fmt_num(out, c.y, precision);
        if let Some(z) = z {
            out.push(' ');
            fmt_num(out, z[i], precision);
        }
    }
    out.push(')');
}

fn fmt_polygon(out: &mut String, poly: &Polygon<f64>, precision: Option<i32>) {
    out.push('(');
    fmt_ring(out, &poly.exterior().0, None, precision);
    for ring in poly.interiors() {
        out.push_str(", ");
        fmt_ring(out, &ring.0, None, precision);
    }
    out.push(')');
}

/// Write a geometry as WKT, optionally rounding to `precision` decimals
pub fn to_wkt(geom: &Geometry, precision: Option<i32>) -> String {
    let mut out = String::new();
    match geom {
        Geometry::Point(p) => {
            out.push_str("POINT ");
            fmt_ring(&mut out, &[p.0], None, precision);
        }
        Geometry::LineString(line) => {
            out.push_str(if line.has_z() { "LINESTRING Z " } else { "LINESTRING " });
            fmt_ring(&mut out, line.coords(), line.z(), precision);
        }
        Geometry::MultiLineString(lines) => {
            let has_z = lines.iter().all(LineStringZ::has_z);
            out.push_str(if has_z { "MULTILINESTRING Z (" } else { "MULTILINESTRING (" });
            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                fmt_ring(&mut out, line.coords(), if has_z { line.z() } else { None }, precision);
            }
            out.push(')');
        }
        Geometry::Polygon(poly) => {
            out.push_str("POLYGON ");
            fmt_polygon(&mut out, poly, precision);
        }
        Geometry::MultiPolygon(mp) => {
            out.push_str("MULTIPOLYGON (");
            for (i, poly) in mp.0.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                fmt_polygon(&mut out, poly, precision);
            }
            out.push(')');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_linestring_z() {
        let geom = parse_wkt("LINESTRING Z (60 100 14, 60  80 12)").unwrap();
        match geom {
            Geometry::LineString(line) => {
                assert_eq!(line.num_coords(), 2);
                assert_eq!(line.z(), Some(&[14.0, 12.0][..]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_2d_and_implicit_z() {
        let geom = parse_wkt("linestring (0 0, 1 1)").unwrap();
        assert!(matches!(geom, Geometry::LineString(ref l) if !l.has_z()));
        let geom = parse_wkt("LINESTRING (0 0 5, 1 1 4)").unwrap();
        assert!(matches!(geom, Geometry::LineString(ref l) if l.has_z()));
    }

    #[test]
    fn test_parse_multilinestring() {
        let geom = parse_wkt("MULTILINESTRING((380 490, 370 420), (300 460, 370 420))").unwrap();
        match geom {
            Geometry::MultiLineString(lines) => assert_eq!(lines.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_polygon_and_point() {
        let geom = parse_wkt("POLYGON ((35 100, 75 100, 75  80, 35  80, 35 100))").unwrap();
        assert_eq!(geom.type_name(), "Polygon");
        let geom = parse_wkt("POINT (58 97)").unwrap();
        assert_eq!(geom, Geometry::Point(Point::new(58.0, 97.0)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_wkt("LINESTRING EMPTY").is_err());
        assert!(parse_wkt("LINESTRING (0 0, 1)").is_err());
        assert!(parse_wkt("CIRCLE (0 0)").is_err());
        assert!(parse_wkt("POINT (0 0) extra").is_err());
        assert!(parse_wkt("LINESTRING (0 0, 1 1").is_err());
    }

    #[test]
    fn test_to_wkt() {
        let line = LineStringZ::from_xyz(vec![(0.0, 0.0, 8.0), (1.0, 0.0, 7.9994)]).unwrap();
        assert_eq!(
            to_wkt(&Geometry::LineString(line.clone()), Some(3)),
            "LINESTRING Z (0 0 8, 1 0 7.999)"
        );
        assert_eq!(
            to_wkt(&Geometry::LineString(line.force_2d()), None),
            "LINESTRING (0 0, 1 0)"
        );
        let parsed = parse_wkt(&to_wkt(&Geometry::LineString(line.clone()), None)).unwrap();
        assert_eq!(parsed, Geometry::LineString(line));
    }
}
