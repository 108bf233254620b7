use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::coordinates::LatLng;
use crate::error::CatalogError;
use crate::gpx_types::first_number;

/// A point-of-interest record as delivered by the catalog source.
///
/// Only `name`, `geom_type` and `geom_point` are interpreted; everything else
/// is carried through untouched in `metadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCatalogPoint {
    #[serde(
        default,
        deserialize_with = "lenient_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geom_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geom_point: Option<Vec<Option<f64>>>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl RawCatalogPoint {
    pub fn new(name: &str, x: f64, y: f64) -> Self {
        Self {
            name: Some(name.to_string()),
            geom_type: Some("Point".to_string()),
            geom_point: Some(vec![Some(x), Some(y)]),
            metadata: Map::new(),
        }
    }

    /// Point-geometry records are the only ones the catalog keeps.
    pub fn is_point_record(&self) -> bool {
        self.geom_type.as_deref() == Some("Point") || self.geom_point.is_some()
    }

    /// The raw `[x, y]` pair, if both members are present and non-zero.
    pub fn coordinate_pair(&self) -> Option<(f64, f64)> {
        match self.geom_point.as_deref()? {
            [Some(x), Some(y), ..] if *x != 0.0 && *y != 0.0 => Some((*x, *y)),
            _ => None,
        }
    }
}

/// Names are usually strings, but numeric labels show up too.
fn lenient_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A catalog point placed on the map, with its distance to the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedPoint {
    #[serde(flatten)]
    pub point: RawCatalogPoint,
    pub converted: LatLng,
    pub min_distance_to_track: f64,
}

impl ConvertedPoint {
    /// Marker label: the first number in the name, else `?`.
    pub fn label(&self) -> String {
        self.point
            .name
            .as_deref()
            .and_then(first_number)
            .unwrap_or("?")
            .to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Wrapped { result: Vec<RawCatalogPoint> },
    Bare(Vec<RawCatalogPoint>),
}

/// The session's point-of-interest catalog, restricted to point records.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    points: Vec<RawCatalogPoint>,
}

impl Catalog {
    pub fn new(points: Vec<RawCatalogPoint>) -> Self {
        Self {
            points: points.into_iter().filter(RawCatalogPoint::is_point_record).collect(),
        }
    }

    /// Load a catalog from `{ "result": [...] }` or a bare array.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let records = match serde_json::from_str::<CatalogDocument>(json)? {
            CatalogDocument::Wrapped { result } => result,
            CatalogDocument::Bare(records) => records,
        };
        let total = records.len();
        let catalog = Self::new(records);
        log::info!(
            "[Catalog] Loaded {} point records out of {}",
            catalog.len(),
            total
        );
        Ok(catalog)
    }

    pub fn points(&self) -> &[RawCatalogPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
