use std::cell::RefCell;

use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Value as JsonValue};

use crate::catalog::ConvertedPoint;
use crate::error::MapError;
use crate::gpx_types::{Bounds, TrackPoint, Waypoint};

/// What a marker stands for on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    End,
    Waypoint,
    CatalogPoint,
}

impl MarkerKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Waypoint => "waypoint",
            Self::CatalogPoint => "catalogPoint",
        }
    }
}

/// A labelled point placed on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub lat: f64,
    pub lng: f64,
    pub kind: MarkerKind,
    pub label: String,
    pub name: Option<String>,
    pub min_distance_to_track: Option<f64>,
}

impl Marker {
    /// Start and end markers, only for tracks with more than one point.
    pub fn track_ends(track: &[TrackPoint]) -> Vec<Marker> {
        match track {
            [first, .., last] => vec![
                Self::bare(first, MarkerKind::Start, "Start"),
                Self::bare(last, MarkerKind::End, "End"),
            ],
            _ => Vec::new(),
        }
    }

    pub fn for_waypoints(waypoints: &[Waypoint]) -> Vec<Marker> {
        waypoints
            .iter()
            .enumerate()
            .map(|(i, wpt)| Marker {
                lat: wpt.lat,
                lng: wpt.lng,
                kind: MarkerKind::Waypoint,
                label: wpt.label(i),
                name: Some(wpt.name.clone()),
                min_distance_to_track: None,
            })
            .collect()
    }

    pub fn for_catalog_points(points: &[ConvertedPoint]) -> Vec<Marker> {
        points
            .iter()
            .map(|p| Marker {
                lat: p.converted.lat,
                lng: p.converted.lng,
                kind: MarkerKind::CatalogPoint,
                label: p.label(),
                name: p.point.name.clone(),
                min_distance_to_track: Some(p.min_distance_to_track),
            })
            .collect()
    }

    fn bare(tp: &TrackPoint, kind: MarkerKind, label: &str) -> Self {
        Self {
            lat: tp.lat,
            lng: tp.lng,
            kind,
            label: label.to_string(),
            name: None,
            min_distance_to_track: None,
        }
    }

    /// Link that opens the marker location in an external maps app.
    pub fn maps_url(&self) -> String {
        format!("https://maps.google.com/?q={},{}", self.lat, self.lng)
    }

    pub fn to_feature(&self) -> Feature {
        let mut props = Map::new();
        props.insert(
            "markerType".to_string(),
            JsonValue::String(self.kind.as_str().to_string()),
        );
        props.insert("label".to_string(), JsonValue::String(self.label.clone()));
        if let Some(name) = &self.name {
            props.insert("name".to_string(), JsonValue::String(name.clone()));
        }
        if let Some(d) = self.min_distance_to_track {
            props.insert("minDistanceToTrack".to_string(), JsonValue::from(d));
        }
        props.insert("mapsUrl".to_string(), JsonValue::String(self.maps_url()));

        feature(Value::Point(vec![self.lng, self.lat]), props)
    }
}

/// Drawing primitives the fallback path needs from a map.
///
/// Methods take `&self`: a map is shared between the operations of one
/// session and implementations keep their own interior state.
pub trait MapSurface {
    /// Remove every marker and line added by earlier operations.
    fn clear(&self);
    fn draw_polyline(&self, track: &[TrackPoint]) -> Result<(), MapError>;
    fn add_marker(&self, marker: Marker) -> Result<(), MapError>;
    fn fit_bounds(&self, bounds: Bounds) -> Result<(), MapError>;
}

/// Draw a track and its waypoints directly, without the GPX rendering library.
///
/// A one-point track gets no line. The view is fitted to the track, or to
/// the waypoints when there is no track. Returns the fitted bounds.
pub fn draw_fallback<M: MapSurface + ?Sized>(
    map: &M,
    track: &[TrackPoint],
    waypoints: &[Waypoint],
) -> Result<Bounds, MapError> {
    if track.len() >= 2 {
        map.draw_polyline(track)?;
    }
    for marker in Marker::track_ends(track) {
        map.add_marker(marker)?;
    }
    draw_waypoints(map, waypoints)?;

    let bounds = Bounds::of_track(track)
        .or_else(|| waypoint_bounds(waypoints))
        .ok_or_else(|| MapError("no points to fit the view to".to_string()))?;
    map.fit_bounds(bounds)?;
    Ok(bounds)
}

/// Add a numbered marker per waypoint.
pub fn draw_waypoints<M: MapSurface + ?Sized>(
    map: &M,
    waypoints: &[Waypoint],
) -> Result<(), MapError> {
    Marker::for_waypoints(waypoints)
        .into_iter()
        .try_for_each(|marker| map.add_marker(marker))
}

fn waypoint_bounds(waypoints: &[Waypoint]) -> Option<Bounds> {
    let (first, rest) = waypoints.split_first()?;
    let mut bounds = Bounds::from_point(first.lat, first.lng);
    for w in rest {
        bounds.extend(w.lat, w.lng);
    }
    Some(bounds)
}

/// A [`MapSurface`] that records everything drawn as GeoJSON features.
#[derive(Debug, Default)]
pub struct GeoJsonSurface {
    features: RefCell<Vec<Feature>>,
    bounds: RefCell<Option<Bounds>>,
}

impl GeoJsonSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.borrow().is_empty()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        *self.bounds.borrow()
    }

    /// Snapshot of the current drawing. The bbox is the last fitted view.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: self
                .bounds()
                .map(|b| vec![b.west, b.south, b.east, b.north]),
            features: self.features.borrow().clone(),
            foreign_members: None,
        }
    }
}

impl MapSurface for GeoJsonSurface {
    fn clear(&self) {
        self.features.borrow_mut().clear();
        self.bounds.replace(None);
    }

    fn draw_polyline(&self, track: &[TrackPoint]) -> Result<(), MapError> {
        if track.len() < 2 {
            return Err(MapError(format!(
                "a line needs at least 2 points, got {}",
                track.len()
            )));
        }
        let coords = track.iter().map(|tp| vec![tp.lng, tp.lat]).collect();
        let mut props = Map::new();
        props.insert(
            "markerType".to_string(),
            JsonValue::String("track".to_string()),
        );
        self.features
            .borrow_mut()
            .push(feature(Value::LineString(coords), props));
        Ok(())
    }

    fn add_marker(&self, marker: Marker) -> Result<(), MapError> {
        self.features.borrow_mut().push(marker.to_feature());
        Ok(())
    }

    fn fit_bounds(&self, bounds: Bounds) -> Result<(), MapError> {
        self.bounds.replace(Some(bounds));
        Ok(())
    }
}

/// GeoJSON for the fallback rendering of a track and its waypoints.
pub fn fallback_layer(
    track: &[TrackPoint],
    waypoints: &[Waypoint],
) -> Result<FeatureCollection, MapError> {
    let surface = GeoJsonSurface::new();
    draw_fallback(&surface, track, waypoints)?;
    Ok(surface.to_feature_collection())
}

/// GeoJSON markers for catalog points found near a track.
pub fn proximity_layer(points: &[ConvertedPoint]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: Marker::for_catalog_points(points)
            .iter()
            .map(Marker::to_feature)
            .collect(),
        foreign_members: None,
    }
}

fn feature(value: Value, props: Map<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}
