use serde::{Deserialize, Serialize};

/// Name given to a `<wpt>` without a `<name>` child.
pub const DEFAULT_WAYPOINT_NAME: &str = "Waypoint";

/// A single recorded trajectory sample (from `<trkpt>`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lng: f64,
}

impl TrackPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A named point embedded in the GPX file (from `<wpt>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

impl Waypoint {
    pub fn new(lat: f64, lng: f64, name: Option<String>) -> Self {
        Self {
            lat,
            lng,
            name: name.unwrap_or_else(|| DEFAULT_WAYPOINT_NAME.to_string()),
        }
    }

    /// Marker label: the first number in the name, else the 1-based position.
    pub fn label(&self, index: usize) -> String {
        first_number(&self.name)
            .map(str::to_string)
            .unwrap_or_else(|| (index + 1).to_string())
    }
}

/// First run of ASCII digits in `s`.
pub fn first_number(s: &str) -> Option<&str> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    Some(&rest[..len])
}

/// Points extracted from a GPX document. Track points keep document order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedGpx {
    pub track_points: Vec<TrackPoint>,
    pub waypoints: Vec<Waypoint>,
}

impl ParsedGpx {
    pub fn is_empty(&self) -> bool {
        self.track_points.is_empty() && self.waypoints.is_empty()
    }
}

/// Structural facts about a document, independent of whether its points parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentOutline {
    pub has_gpx_root: bool,
    pub track_segments: usize,
    pub routes: usize,
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    pub fn from_point(lat: f64, lng: f64) -> Self {
        Self {
            south: lat,
            west: lng,
            north: lat,
            east: lng,
        }
    }

    pub fn extend(&mut self, lat: f64, lng: f64) {
        self.south = self.south.min(lat);
        self.north = self.north.max(lat);
        self.west = self.west.min(lng);
        self.east = self.east.max(lng);
    }

    /// Bounds of a track, or `None` for an empty one.
    pub fn of_track(points: &[TrackPoint]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self::from_point(first.lat, first.lng);
        for p in rest {
            bounds.extend(p.lat, p.lng);
        }
        Some(bounds)
    }
}
