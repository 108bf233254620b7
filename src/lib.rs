pub mod catalog;
pub mod coordinates;
pub mod error;
pub mod gpx_types;
pub mod layer;
pub mod options;
pub mod orchestrator;
pub mod parser;
pub mod proximity;
pub mod store;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::catalog::{Catalog, ConvertedPoint, RawCatalogPoint};
use crate::gpx_types::TrackPoint;
use crate::options::ProximityOptions;
use crate::parser::ParseReport;

/// Parse GPX text into `{ trackPoints, waypoints, valid, error? }`.
///
/// `error` is `"invalidFormat"` for malformed XML and `"noData"` when no
/// points could be extracted.
#[wasm_bindgen(js_name = parseGpx)]
pub fn parse_gpx(gpx_string: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let report = ParseReport::from(parser::parse_gpx(gpx_string));
    to_js(&report)
}

/// Whether the document should skip the GPX rendering library.
#[wasm_bindgen(js_name = requiresFallback)]
pub fn requires_fallback(gpx_string: &str) -> bool {
    console_error_panic_hook::set_once();

    parser::needs_fallback(gpx_string)
}

/// Rewrite GPX 1.0 header tokens to 1.1.
#[wasm_bindgen(js_name = upgradeGpxVersion)]
pub fn upgrade_gpx_version(gpx_string: &str) -> String {
    console_error_panic_hook::set_once();

    parser::upgrade_gpx10(gpx_string).into_owned()
}

/// Convert a raw catalog coordinate pair to `{ lat, lng }`.
#[wasm_bindgen(js_name = classifyAndConvert)]
pub fn classify_and_convert(x: f64, y: f64) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let converted = coordinates::classify_and_convert(x, y)?;
    to_js(&converted)
}

#[wasm_bindgen(js_name = distanceMeters)]
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    coordinates::distance_meters(lat1, lon1, lat2, lon2)
}

/// Catalog points near a track, deduplicated.
///
/// `catalog` is an array of catalog records, `track` an array of
/// `{ lat, lng }`, `options` an optional `{ maxDistance, minSeparation }`.
#[wasm_bindgen(js_name = filterByProximity)]
pub fn filter_by_proximity(
    catalog: JsValue,
    track: JsValue,
    options: JsValue,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let records: Vec<RawCatalogPoint> = from_js(catalog)?;
    let track: Vec<TrackPoint> = from_js(track)?;
    let opts = parse_options(options)?;

    let catalog = Catalog::new(records);
    let nearby = proximity::filter_by_proximity(catalog.points(), &track, &opts);
    to_js(&nearby)
}

/// GeoJSON of the fallback rendering of a GPX document.
#[wasm_bindgen(js_name = fallbackGeoJson)]
pub fn fallback_geojson(gpx_string: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let data = parser::parse_gpx(gpx_string)?;
    let fc = layer::fallback_layer(&data.track_points, &data.waypoints)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    to_js(&fc)
}

/// GeoJSON markers for the result of `filterByProximity`.
#[wasm_bindgen(js_name = proximityGeoJson)]
pub fn proximity_geojson(points: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let points: Vec<ConvertedPoint> = from_js(points)?;
    to_js(&layer::proximity_layer(&points))
}

#[wasm_bindgen(js_name = displayName)]
pub fn display_name(filename: &str) -> String {
    store::display_name(filename)
}

fn parse_options(options: JsValue) -> Result<ProximityOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(ProximityOptions::default())
    } else {
        from_js(options)
    }
}

fn from_js<T: for<'de> serde::Deserialize<'de>>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Plain JS objects rather than `Map`s, so flattened records stay readable.
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
