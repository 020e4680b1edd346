//! Coordinate checks over GML geometries in a metadata document.
//!
//! Points must carry at least two numeric values. Envelope corners must too, and each corner
//! must fall inside the RD (Dutch national grid) bounds. Polygons are delegated to the
//! context's [`PolygonValidator`]. Messages accumulate in document order.

use std::path::Path;

use crate::context::Context;
use crate::document::XmlElement;
use crate::package::to_bag_path;
use crate::rules::Outcome;
use crate::validators::polygon::{PolygonGeometry, PolygonValidator};

pub const GML_NAMESPACE: &str = "http://www.opengis.net/gml";

pub const RD_X_MIN: f64 = -7000.0;
pub const RD_X_MAX: f64 = 300000.0;
pub const RD_Y_MIN: f64 = 289000.0;
pub const RD_Y_MAX: f64 = 629000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    /// Bounds are inclusive
    pub fn is_within_rd_bounds(&self) -> bool {
        (RD_X_MIN..=RD_X_MAX).contains(&self.x) && (RD_Y_MIN..=RD_Y_MAX).contains(&self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CoordinateError {
    TooFew,
    NonNumeric,
}

/// First two values of a whitespace separated coordinate list; extra values are ignored
fn parse_coordinate(text: &str) -> Result<Coordinate, CoordinateError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(CoordinateError::TooFew);
    }

    let values: Vec<f64> = tokens
        .iter()
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| CoordinateError::NonNumeric)?;

    Ok(Coordinate {
        x: values[0],
        y: values[1],
    })
}

fn describe(label: &str, raw: &str, error: CoordinateError) -> String {
    match error {
        CoordinateError::TooFew => format!("{} has less than two coordinates: {}", label, raw),
        CoordinateError::NonNumeric => format!("{} has non numeric coordinates: {}", label, raw),
    }
}

fn check_pos(pos: &XmlElement, messages: &mut Vec<String>) {
    let raw = pos.text.trim();
    if let Err(error) = parse_coordinate(raw) {
        messages.push(describe("pos", raw, error));
    }
}

fn check_corner(corner: &XmlElement, messages: &mut Vec<String>) {
    let label = corner.name.as_str();
    let raw = corner.text.trim();
    match parse_coordinate(raw) {
        Ok(coordinate) if coordinate.is_within_rd_bounds() => {}
        Ok(_) => messages.push(format!("{} is outside RD bounds: {}", label, raw)),
        Err(error) => messages.push(describe(label, raw, error)),
    }
}

fn polygon_geometry(polygon: &XmlElement) -> PolygonGeometry {
    let ring_text = |boundary: &XmlElement| {
        boundary
            .child(GML_NAMESPACE, "LinearRing")
            .and_then(|ring| ring.child(GML_NAMESPACE, "posList"))
            .map(|list| list.text.clone())
    };

    PolygonGeometry {
        srs_name: polygon.attribute("srsName").map(str::to_string),
        exterior: polygon
            .child(GML_NAMESPACE, "exterior")
            .and_then(ring_text),
        interiors: polygon
            .children_named(GML_NAMESPACE, "interior")
            .filter_map(ring_text)
            .collect(),
    }
}

/// All geometry messages for a parsed document, in document order
pub fn check_geometries(root: &XmlElement, polygons: &dyn PolygonValidator) -> Vec<String> {
    let mut messages = Vec::new();

    for element in root.descendants() {
        if element.namespace.as_deref() != Some(GML_NAMESPACE) {
            continue;
        }
        match element.name.as_str() {
            "Point" => element
                .children_named(GML_NAMESPACE, "pos")
                .for_each(|pos| check_pos(pos, &mut messages)),
            "Envelope" => element
                .children
                .iter()
                .filter(|c| c.is(GML_NAMESPACE, "lowerCorner") || c.is(GML_NAMESPACE, "upperCorner"))
                .for_each(|corner| check_corner(corner, &mut messages)),
            "Polygon" => messages.extend(polygons.validate_polygon(&polygon_geometry(element))),
            _ => {}
        }
    }

    messages
}

/// Geometry rule over `path`. A document that does not parse is fatal here: there is no tree
/// to check.
pub async fn points_have_at_least_two_values(ctx: &Context, path: &Path) -> Outcome {
    let document = match ctx.documents().get(path).await {
        Ok(document) => document,
        Err(e) => {
            return Outcome::Fatal(format!("{} could not be read: {}", to_bag_path(path), e));
        }
    };

    match document.root() {
        Ok(root) => Outcome::from_messages(check_geometries(root, ctx.polygon_validator())),
        Err(diagnostic) => Outcome::Fatal(
            document
                .describe_diagnostic()
                .unwrap_or_else(|| diagnostic.to_string()),
        ),
    }
}
