use serde::Deserialize;

/// Thresholds for proximity filtering.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityOptions {
    /// Maximum distance from the track in meters (default: 50)
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,

    /// Minimum distance between two reported points in meters (default: 25)
    #[serde(default = "default_min_separation")]
    pub min_separation: f64,
}

impl Default for ProximityOptions {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            min_separation: default_min_separation(),
        }
    }
}

fn default_max_distance() -> f64 {
    50.0
}

fn default_min_separation() -> f64 {
    25.0
}
