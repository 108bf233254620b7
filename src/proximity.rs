use log::{debug, info, warn};

use crate::catalog::{ConvertedPoint, RawCatalogPoint};
use crate::coordinates::{LatLng, classify_and_convert, distance_meters};
use crate::gpx_types::TrackPoint;
use crate::options::ProximityOptions;

/// Catalog points near the track, with near-duplicates removed.
///
/// Runs a distance pass followed by a greedy separation pass; see
/// [`near_track`] and [`deduplicate`].
pub fn filter_by_proximity(
    catalog: &[RawCatalogPoint],
    track: &[TrackPoint],
    opts: &ProximityOptions,
) -> Vec<ConvertedPoint> {
    let near = near_track(catalog, track, opts.max_distance);
    let kept = deduplicate(near, opts.min_separation);
    info!(
        "[ProximityFilter] {} of {} catalog points within {}m of the track",
        kept.len(),
        catalog.len(),
        opts.max_distance
    );
    kept
}

/// Convert each usable catalog point and keep those within `max_distance`
/// of some track point. Catalog order is preserved.
pub fn near_track(
    catalog: &[RawCatalogPoint],
    track: &[TrackPoint],
    max_distance: f64,
) -> Vec<ConvertedPoint> {
    if track.is_empty() {
        return Vec::new();
    }

    catalog
        .iter()
        .filter_map(|point| {
            let (x, y) = point.coordinate_pair()?;
            let converted = match classify_and_convert(x, y) {
                Ok(ll) => ll,
                Err(e) => {
                    warn!(
                        "[ProximityFilter] Skipping {:?} at ({x}, {y}): {e}",
                        point.name
                    );
                    return None;
                }
            };
            let min_distance_to_track = min_distance(&converted, track);
            (min_distance_to_track <= max_distance).then(|| ConvertedPoint {
                point: point.clone(),
                converted,
                min_distance_to_track,
            })
        })
        .collect()
}

fn min_distance(point: &LatLng, track: &[TrackPoint]) -> f64 {
    track
        .iter()
        .map(|tp| distance_meters(point.lat, point.lng, tp.lat, tp.lng))
        .fold(f64::INFINITY, f64::min)
}

/// Greedy single pass over `points` in their given order.
///
/// A candidate with no accepted point closer than `min_separation` is
/// accepted. Otherwise it replaces the first accepted point that is both
/// within `min_separation` and farther from the track, or is dropped when
/// there is none. The result depends on input order and is not a globally
/// optimal clustering.
pub fn deduplicate(points: Vec<ConvertedPoint>, min_separation: f64) -> Vec<ConvertedPoint> {
    let mut accepted: Vec<ConvertedPoint> = Vec::with_capacity(points.len());

    for candidate in points {
        let within = |existing: &ConvertedPoint| {
            candidate.converted.distance_to(&existing.converted) < min_separation
        };

        if !accepted.iter().any(within) {
            accepted.push(candidate);
            continue;
        }

        let replaceable = accepted.iter().position(|existing| {
            within(existing) && candidate.min_distance_to_track < existing.min_distance_to_track
        });
        match replaceable {
            Some(index) => {
                debug!(
                    "[ProximityFilter] {:?} replaces {:?} (closer to track)",
                    candidate.point.name, accepted[index].point.name
                );
                accepted[index] = candidate;
            }
            None => debug!(
                "[ProximityFilter] Dropping {:?}, too close to an accepted point",
                candidate.point.name
            ),
        }
    }

    accepted
}
