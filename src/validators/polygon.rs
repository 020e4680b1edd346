//! Polygon geometry checks.
//!
//! The geospatial rule hands every polygon it finds to a [`PolygonValidator`] and folds the
//! returned messages into its own result. [`RingPolygonValidator`] checks ring structure only;
//! self-intersection is left to other implementations of the trait.

/// Rings of one `gml:Polygon`, as raw `posList` texts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolygonGeometry {
    pub srs_name: Option<String>,
    pub exterior: Option<String>,
    pub interiors: Vec<String>,
}

impl PolygonGeometry {
    pub fn rings(&self) -> impl Iterator<Item = &str> {
        self.exterior
            .iter()
            .chain(self.interiors.iter())
            .map(String::as_str)
    }
}

pub trait PolygonValidator: Send + Sync {
    /// Problems found in `polygon`; empty when it is valid
    fn validate_polygon(&self, polygon: &PolygonGeometry) -> Vec<String>;
}

/// Every ring is a closed list of at least four coordinate pairs
#[derive(Debug, Clone, Copy, Default)]
pub struct RingPolygonValidator;

impl PolygonValidator for RingPolygonValidator {
    fn validate_polygon(&self, polygon: &PolygonGeometry) -> Vec<String> {
        polygon.rings().filter_map(validate_ring).collect()
    }
}

fn validate_ring(pos_list: &str) -> Option<String> {
    let raw = pos_list.trim();
    let values: Vec<&str> = raw.split_whitespace().collect();

    let numbers: Option<Vec<f64>> = values.iter().map(|v| v.parse().ok()).collect();
    let Some(numbers) = numbers else {
        return Some(format!("posList has non numeric coordinates: {}", raw));
    };
    if numbers.len() % 2 != 0 {
        return Some(format!("Found posList with odd number of values: {}", raw));
    }
    if numbers.len() < 8 {
        return Some(format!(
            "Found posList with too few values (less than 4 pairs): {}",
            raw
        ));
    }

    let first = &numbers[..2];
    let last = &numbers[numbers.len() - 2..];
    if first != last {
        return Some(format!(
            "Found posList with unequal first and last pairs: {}",
            raw
        ));
    }
    None
}
