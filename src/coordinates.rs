//! Reference-system classification and reprojection to WGS84.
//!
//! Catalog coordinates arrive as bare `[x, y]` pairs in one of three systems.
//! [`classify`] walks an ordered rule table on the numeric range of the pair
//! and [`classify_and_convert`] reprojects it to longitude/latitude using
//! projection definitions parsed from their standard parameter strings.
//!
//! Supported projections are exactly the ones those strings need:
//! `longlat`, `sterea` (oblique stereographic on a Gauss conformal sphere,
//! with a 7-parameter Helmert shift to WGS84) and spherical `merc`.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::str::FromStr;

use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

type Result<T> = std::result::Result<T, ConversionError>;

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Dutch national grid (Amersfoort / RD New).
pub const EPSG_28992: &str = "+proj=sterea +lat_0=52.15616055555555 +lon_0=5.38763888888889 +k=0.9999079 +x_0=155000 +y_0=463000 +ellps=bessel +towgs84=565.417,50.3319,465.552,-0.398957,0.343988,-1.8774,4.0725 +units=m +no_defs";
/// Geographic WGS84.
pub const EPSG_4326: &str = "+proj=longlat +datum=WGS84 +no_defs";
/// Spherical Web Mercator.
pub const EPSG_3857: &str = "+proj=merc +a=6378137 +b=6378137 +lat_ts=0.0 +lon_0=0.0 +x_0=0.0 +y_0=0 +k=1.0 +units=m +nadgrids=@null +wktext +no_defs";

/// Arc-seconds to radians.
const SEC_TO_RAD: f64 = 4.848_136_811_095_36e-6;
const GAUSS_MAX_ITER: usize = 20;
const GAUSS_TOLERANCE: f64 = 1e-14;
const GEODETIC_MAX_ITER: usize = 10;
const GEODETIC_TOLERANCE: f64 = 1e-12;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn distance_to(&self, other: &LatLng) -> f64 {
        distance_meters(self.lat, self.lng, other.lat, other.lng)
    }
}

/// The coordinate systems a catalog pair can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSystem {
    Geographic,
    RdNew,
    WebMercator,
}

impl ReferenceSystem {
    pub fn definition(self) -> &'static str {
        match self {
            Self::Geographic => EPSG_4326,
            Self::RdNew => EPSG_28992,
            Self::WebMercator => EPSG_3857,
        }
    }
}

/// Outcome of the range heuristic, including which rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    Geographic,
    RdNew,
    WebMercator,
    /// No rule matched; the pair is treated as RD New anyway.
    RdNewLastResort,
}

impl Classification {
    pub fn system(self) -> ReferenceSystem {
        match self {
            Self::Geographic => ReferenceSystem::Geographic,
            Self::RdNew | Self::RdNewLastResort => ReferenceSystem::RdNew,
            Self::WebMercator => ReferenceSystem::WebMercator,
        }
    }
}

struct ClassificationRule {
    classification: Classification,
    matches: fn(f64, f64) -> bool,
}

/// Ordered; the first matching rule wins.
const RULES: &[ClassificationRule] = &[
    ClassificationRule {
        classification: Classification::Geographic,
        matches: in_geographic_range,
    },
    ClassificationRule {
        classification: Classification::RdNew,
        matches: in_rd_range,
    },
    ClassificationRule {
        classification: Classification::WebMercator,
        matches: in_mercator_range,
    },
];

const LAST_RESORT: Classification = Classification::RdNewLastResort;

fn in_geographic_range(x: f64, y: f64) -> bool {
    (-180.0..=180.0).contains(&x) && (-90.0..=90.0).contains(&y)
}

fn in_rd_range(x: f64, y: f64) -> bool {
    (0.0..=300_000.0).contains(&x) && (300_000.0..=700_000.0).contains(&y)
}

fn in_mercator_range(x: f64, y: f64) -> bool {
    x.abs() > 180.0 && y.abs() > 90.0
}

/// Pick the reference system for a raw pair from its numeric range.
pub fn classify(x: f64, y: f64) -> Classification {
    RULES
        .iter()
        .find(|rule| (rule.matches)(x, y))
        .map_or(LAST_RESORT, |rule| rule.classification)
}

/// Classify a raw pair and reproject it to WGS84.
///
/// Pairs already in geographic range are returned unchanged.
pub fn classify_and_convert(x: f64, y: f64) -> Result<LatLng> {
    if !x.is_finite() || !y.is_finite() {
        return Err(ConversionError::NonFinite);
    }

    let classification = classify(x, y);
    debug!("[CoordinateConverter] ({x}, {y}) classified as {classification:?}");

    if classification == Classification::Geographic {
        return Ok(LatLng::new(y, x));
    }

    let crs = register_reference_systems()?.get(classification.system());
    let (lng, lat) = crs.to_wgs84(x, y)?;

    if !lng.is_finite() || !lat.is_finite() {
        return Err(ConversionError::NonFinite);
    }
    if !in_geographic_range(lng, lat) {
        return Err(ConversionError::OutOfRange { lng, lat });
    }
    Ok(LatLng::new(lat, lng))
}

/// Great-circle distance in meters (Haversine, spherical Earth).
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = ((lat2 - lat1) * PI) / 180.0;
    let d_lon = ((lon2 - lon1) * PI) / 180.0;
    let a = (d_lat / 2.0).sin() * (d_lat / 2.0).sin()
        + ((lat1 * PI) / 180.0).cos()
            * ((lat2 * PI) / 180.0).cos()
            * (d_lon / 2.0).sin()
            * (d_lon / 2.0).sin();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

// =============================================================================
// Registry
// =============================================================================

/// The parsed reference systems, built once per process.
#[derive(Debug)]
pub struct Registry {
    geographic: Crs,
    rd_new: Crs,
    web_mercator: Crs,
}

impl Registry {
    fn build() -> Result<Self> {
        Ok(Self {
            geographic: Crs::from_str(ReferenceSystem::Geographic.definition())?,
            rd_new: Crs::from_str(ReferenceSystem::RdNew.definition())?,
            web_mercator: Crs::from_str(ReferenceSystem::WebMercator.definition())?,
        })
    }

    pub fn get(&self, system: ReferenceSystem) -> &Crs {
        match system {
            ReferenceSystem::Geographic => &self.geographic,
            ReferenceSystem::RdNew => &self.rd_new,
            ReferenceSystem::WebMercator => &self.web_mercator,
        }
    }
}

static REGISTRY: Lazy<Result<Registry>> = Lazy::new(|| {
    let registry = Registry::build();
    if let Err(e) = &registry {
        warn!("[CoordinateConverter] Failed to register reference systems: {e}");
    }
    registry
});

/// Register the fixed reference systems. Safe to call repeatedly.
pub fn register_reference_systems() -> Result<&'static Registry> {
    Lazy::force(&REGISTRY).as_ref().map_err(Clone::clone)
}

// =============================================================================
// Projection definitions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis in meters.
    pub a: f64,
    /// First eccentricity squared.
    pub es: f64,
}

impl Ellipsoid {
    pub const WGS84: Self = Self::from_inverse_flattening(6_378_137.0, 298.257_223_563);
    pub const BESSEL: Self = Self::from_inverse_flattening(6_377_397.155, 299.152_812_8);
    pub const GRS80: Self = Self::from_inverse_flattening(6_378_137.0, 298.257_222_101);

    pub const fn from_inverse_flattening(a: f64, rf: f64) -> Self {
        let f = 1.0 / rf;
        Self { a, es: 2.0 * f - f * f }
    }

    pub fn from_axes(a: f64, b: f64) -> Self {
        Self {
            a,
            es: (a * a - b * b) / (a * a),
        }
    }

    fn by_name(name: &str) -> Option<Self> {
        match name {
            "WGS84" => Some(Self::WGS84),
            "bessel" => Some(Self::BESSEL),
            "GRS80" => Some(Self::GRS80),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    LongLat,
    ObliqueStereographic,
    Mercator,
}

/// A projection-parameter string (`+proj=... +lat_0=...`) in typed form.
/// Angles are stored in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjDefinition {
    pub kind: ProjectionKind,
    pub lat_0: f64,
    pub lon_0: f64,
    pub lat_ts: Option<f64>,
    pub k0: f64,
    pub x_0: f64,
    pub y_0: f64,
    pub ellipsoid: Ellipsoid,
    pub towgs84: Option<[f64; 7]>,
}

impl FromStr for ProjDefinition {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self> {
        let mut kind = None;
        let mut lat_0 = 0.0;
        let mut lon_0 = 0.0;
        let mut lat_ts = None;
        let mut k0 = 1.0;
        let mut x_0 = 0.0;
        let mut y_0 = 0.0;
        let mut ellipsoid = None;
        let mut a = None;
        let mut b = None;
        let mut towgs84 = None;

        for token in s.split_whitespace() {
            let token = token.strip_prefix('+').ok_or_else(|| {
                ConversionError::InvalidDefinition(format!("token '{token}' lacks '+'"))
            })?;
            let (key, value) = token.split_once('=').unwrap_or((token, ""));

            match key {
                "proj" => {
                    kind = Some(match value {
                        "longlat" | "latlong" => ProjectionKind::LongLat,
                        "sterea" => ProjectionKind::ObliqueStereographic,
                        "merc" => ProjectionKind::Mercator,
                        other => {
                            return Err(ConversionError::InvalidDefinition(format!(
                                "unsupported projection '{other}'"
                            )));
                        }
                    })
                }
                "lat_0" => lat_0 = parse_number(key, value)?.to_radians(),
                "lon_0" => lon_0 = parse_number(key, value)?.to_radians(),
                "lat_ts" => lat_ts = Some(parse_number(key, value)?.to_radians()),
                "k" | "k_0" => k0 = parse_number(key, value)?,
                "x_0" => x_0 = parse_number(key, value)?,
                "y_0" => y_0 = parse_number(key, value)?,
                "a" => a = Some(parse_number(key, value)?),
                "b" => b = Some(parse_number(key, value)?),
                "ellps" | "datum" => {
                    ellipsoid = Some(Ellipsoid::by_name(value).ok_or_else(|| {
                        ConversionError::InvalidDefinition(format!("unknown {key} '{value}'"))
                    })?)
                }
                "towgs84" => towgs84 = Some(parse_towgs84(value)?),
                "units" if value != "m" => {
                    return Err(ConversionError::InvalidDefinition(format!(
                        "unsupported units '{value}'"
                    )));
                }
                _ => {}
            }
        }

        let ellipsoid = match (a, b, ellipsoid) {
            (Some(a), Some(b), _) => Ellipsoid::from_axes(a, b),
            (Some(a), None, _) => Ellipsoid::from_axes(a, a),
            (None, _, Some(ellipsoid)) => ellipsoid,
            (None, _, None) => Ellipsoid::WGS84,
        };

        Ok(Self {
            kind: kind.ok_or_else(|| {
                ConversionError::InvalidDefinition("missing +proj".to_string())
            })?,
            lat_0,
            lon_0,
            lat_ts,
            k0,
            x_0,
            y_0,
            ellipsoid,
            towgs84,
        })
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| ConversionError::InvalidDefinition(format!("+{key}='{value}' is not a number")))
}

/// Three translation-only or seven full Helmert parameters.
fn parse_towgs84(value: &str) -> Result<[f64; 7]> {
    let values = value
        .split(',')
        .map(|v| parse_number("towgs84", v))
        .collect::<Result<Vec<f64>>>()?;

    let mut params = [0.0; 7];
    match values.len() {
        3 | 7 => params[..values.len()].copy_from_slice(&values),
        n => {
            return Err(ConversionError::InvalidDefinition(format!(
                "+towgs84 needs 3 or 7 values, got {n}"
            )));
        }
    }
    Ok(params)
}

// =============================================================================
// Coordinate reference systems
// =============================================================================

#[derive(Debug, Clone)]
enum Projection {
    LongLat,
    ObliqueStereographic(ObliqueStereographic),
    Mercator { k0: f64 },
}

/// A ready-to-use reference system with precomputed projection constants.
#[derive(Debug, Clone)]
pub struct Crs {
    definition: ProjDefinition,
    projection: Projection,
}

impl FromStr for Crs {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_definition(s.parse()?)
    }
}

impl Crs {
    pub fn from_definition(definition: ProjDefinition) -> Result<Self> {
        let projection = match definition.kind {
            ProjectionKind::LongLat => Projection::LongLat,
            ProjectionKind::ObliqueStereographic => {
                Projection::ObliqueStereographic(ObliqueStereographic::new(&definition))
            }
            ProjectionKind::Mercator => {
                if definition.ellipsoid.es != 0.0 {
                    return Err(ConversionError::InvalidDefinition(
                        "only spherical Mercator is supported".to_string(),
                    ));
                }
                let k0 = definition.lat_ts.map_or(definition.k0, f64::cos);
                Projection::Mercator { k0 }
            }
        };
        Ok(Self {
            definition,
            projection,
        })
    }

    pub fn definition(&self) -> &ProjDefinition {
        &self.definition
    }

    /// Projected `(x, y)` to WGS84 `(lng, lat)` in degrees.
    pub fn to_wgs84(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let (lon, lat) = self.inverse(x, y)?;
        let (lon, lat) = match &self.definition.towgs84 {
            Some(params) => helmert_to_wgs84(lon, lat, &self.definition.ellipsoid, params)?,
            None => (lon, lat),
        };
        Ok((lon.to_degrees(), lat.to_degrees()))
    }

    /// Projected `(x, y)` to geodetic `(lon, lat)` in radians on this system's own datum.
    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let def = &self.definition;
        match &self.projection {
            Projection::LongLat => Ok((x.to_radians(), y.to_radians())),
            Projection::ObliqueStereographic(sterea) => sterea.inverse(x, y),
            Projection::Mercator { k0 } => {
                let a = def.ellipsoid.a * k0;
                let lon = (x - def.x_0) / a + def.lon_0;
                let lat = 2.0 * ((y - def.y_0) / a).exp().atan() - FRAC_PI_2;
                Ok((adjust_lon(lon), lat))
            }
        }
    }
}

/// Oblique stereographic projection of a Gauss conformal sphere.
#[derive(Debug, Clone)]
struct ObliqueStereographic {
    lon_0: f64,
    k0: f64,
    x_0: f64,
    y_0: f64,
    a: f64,
    e: f64,
    c: f64,
    k: f64,
    phic0: f64,
    sinc0: f64,
    cosc0: f64,
    r2: f64,
}

impl ObliqueStereographic {
    fn new(def: &ProjDefinition) -> Self {
        let es = def.ellipsoid.es;
        let e = es.sqrt();
        let sphi = def.lat_0.sin();
        let cphi = def.lat_0.cos().powi(2);

        let rc = (1.0 - es).sqrt() / (1.0 - es * sphi * sphi);
        let c = (1.0 + es * cphi * cphi / (1.0 - es)).sqrt();
        let phic0 = (sphi / c).asin();
        let ratexp = 0.5 * c * e;
        let k = (0.5 * phic0 + FRAC_PI_4).tan()
            / ((0.5 * def.lat_0 + FRAC_PI_4).tan().powf(c) * srat(e * sphi, ratexp));

        Self {
            lon_0: def.lon_0,
            k0: def.k0,
            x_0: def.x_0,
            y_0: def.y_0,
            a: def.ellipsoid.a,
            e,
            c,
            k,
            phic0,
            sinc0: phic0.sin(),
            cosc0: phic0.cos(),
            r2: 2.0 * rc,
        }
    }

    fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let x = (x - self.x_0) / self.a / self.k0;
        let y = (y - self.y_0) / self.a / self.k0;

        // Plane to conformal sphere.
        let rho = x.hypot(y);
        let (sphere_lon, sphere_lat) = if rho != 0.0 {
            let (sinc, cosc) = (2.0 * rho.atan2(self.r2)).sin_cos();
            let lat = (cosc * self.sinc0 + y * sinc * self.cosc0 / rho).asin();
            let lon = (x * sinc).atan2(rho * self.cosc0 * cosc - y * self.sinc0 * sinc);
            (lon, lat)
        } else {
            (0.0, self.phic0)
        };

        // Conformal sphere back to the ellipsoid.
        let lon = sphere_lon / self.c;
        let num = ((0.5 * sphere_lat + FRAC_PI_4).tan() / self.k).powf(1.0 / self.c);
        let mut lat = sphere_lat;
        for _ in 0..GAUSS_MAX_ITER {
            let next = 2.0 * (num * srat(self.e * lat.sin(), -0.5 * self.e)).atan() - FRAC_PI_2;
            if (next - lat).abs() < GAUSS_TOLERANCE {
                return Ok((adjust_lon(lon + self.lon_0), next));
            }
            lat = next;
        }
        Err(ConversionError::NoConvergence)
    }
}

fn srat(esinp: f64, exp: f64) -> f64 {
    ((1.0 - esinp) / (1.0 + esinp)).powf(exp)
}

/// Wrap a longitude in radians into [-pi, pi].
fn adjust_lon(lon: f64) -> f64 {
    if lon.abs() <= PI {
        lon
    } else {
        lon - lon.signum() * 2.0 * PI
    }
}

/// Shift geodetic `(lon, lat)` radians from a local datum to WGS84 through
/// geocentric coordinates (position-vector Helmert transform).
fn helmert_to_wgs84(lon: f64, lat: f64, source: &Ellipsoid, params: &[f64; 7]) -> Result<(f64, f64)> {
    let (x, y, z) = geodetic_to_geocentric(lon, lat, source);

    let [dx, dy, dz, rx, ry, rz, ppm] = *params;
    let (rx, ry, rz) = (rx * SEC_TO_RAD, ry * SEC_TO_RAD, rz * SEC_TO_RAD);
    let m = 1.0 + ppm / 1e6;

    let x_out = m * (x - rz * y + ry * z) + dx;
    let y_out = m * (rz * x + y - rx * z) + dy;
    let z_out = m * (-ry * x + rx * y + z) + dz;

    geocentric_to_geodetic(x_out, y_out, z_out, &Ellipsoid::WGS84)
}

fn geodetic_to_geocentric(lon: f64, lat: f64, ellipsoid: &Ellipsoid) -> (f64, f64, f64) {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let rn = ellipsoid.a / (1.0 - ellipsoid.es * sin_lat * sin_lat).sqrt();
    (
        rn * cos_lat * lon.cos(),
        rn * cos_lat * lon.sin(),
        rn * (1.0 - ellipsoid.es) * sin_lat,
    )
}

fn geocentric_to_geodetic(x: f64, y: f64, z: f64, ellipsoid: &Ellipsoid) -> Result<(f64, f64)> {
    let p = x.hypot(y);
    let lon = y.atan2(x);
    let mut lat = z.atan2(p * (1.0 - ellipsoid.es));

    for _ in 0..GEODETIC_MAX_ITER {
        let sin_lat = lat.sin();
        let n = ellipsoid.a / (1.0 - ellipsoid.es * sin_lat * sin_lat).sqrt();
        let next = (z + ellipsoid.es * n * sin_lat).atan2(p);
        if (next - lat).abs() < GEODETIC_TOLERANCE {
            return Ok((lon, next));
        }
        lat = next;
    }
    Err(ConversionError::NoConvergence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geographic_pairs_are_identity() {
        for &(x, y) in &[(4.9, 52.0), (-180.0, -90.0), (180.0, 90.0), (0.5, -0.25)] {
            assert_eq!(classify(x, y), Classification::Geographic);
            let ll = classify_and_convert(x, y).unwrap();
            assert_eq!(ll.lng, x);
            assert_eq!(ll.lat, y);
        }
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(classify(155_000.0, 463_000.0), Classification::RdNew);
        assert_eq!(classify(545_465.0, 6_800_000.0), Classification::WebMercator);
        assert_eq!(classify(-545_465.0, -6_800_000.0), Classification::WebMercator);
        // Latitude-like y with a large x matches nothing.
        assert_eq!(classify(400_000.0, 50.0), Classification::RdNewLastResort);
        assert_eq!(classify(100.0, 200.0), Classification::RdNewLastResort);
    }

    #[test]
    fn test_rd_origin() {
        let ll = classify_and_convert(155_000.0, 463_000.0).unwrap();
        assert!((ll.lng - 5.3872).abs() < 1e-3, "lng was {}", ll.lng);
        assert!((ll.lat - 52.1552).abs() < 1e-3, "lat was {}", ll.lat);
    }

    #[test]
    fn test_rd_grid_distances_are_preserved() {
        let origin = classify_and_convert(155_000.0, 463_000.0).unwrap();
        let east = classify_and_convert(156_000.0, 463_000.0).unwrap();
        let north = classify_and_convert(155_000.0, 464_000.0).unwrap();
        assert!((origin.distance_to(&east) - 1000.0).abs() < 5.0);
        assert!((origin.distance_to(&north) - 1000.0).abs() < 5.0);
        assert!(east.lng > origin.lng);
        assert!(north.lat > origin.lat);
    }

    #[test]
    fn test_rd_inverse_without_datum_shift_hits_origin() {
        let crs = register_reference_systems().unwrap().get(ReferenceSystem::RdNew);
        let (lon, lat) = crs.inverse(155_000.0, 463_000.0).unwrap();
        assert!((lon.to_degrees() - 5.387_638_888_888_89).abs() < 1e-9);
        assert!((lat.to_degrees() - 52.156_160_555_555_55).abs() < 1e-9);
    }

    #[test]
    fn test_web_mercator_inverse() {
        let (lat, lng) = (52.0_f64, 4.9_f64);
        let r = 6_378_137.0;
        let x = r * lng.to_radians();
        let y = r * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
        let ll = classify_and_convert(x, y).unwrap();
        assert!((ll.lat - lat).abs() < 1e-9);
        assert!((ll.lng - lng).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_input_fails() {
        assert_eq!(
            classify_and_convert(f64::NAN, 1.0),
            Err(ConversionError::NonFinite)
        );
        assert_eq!(
            classify_and_convert(1.0, f64::INFINITY),
            Err(ConversionError::NonFinite)
        );
    }

    #[test]
    fn test_last_resort_still_converts() {
        let ll = classify_and_convert(400_000.0, 50.0).unwrap();
        assert!(ll.lat.is_finite() && ll.lng.is_finite());
        assert!((-90.0..=90.0).contains(&ll.lat));
    }

    #[test]
    fn test_registration_is_idempotent() {
        let first = register_reference_systems().unwrap() as *const Registry;
        let second = register_reference_systems().unwrap() as *const Registry;
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_definitions() {
        let rd: ProjDefinition = EPSG_28992.parse().unwrap();
        assert_eq!(rd.kind, ProjectionKind::ObliqueStereographic);
        assert_eq!(rd.ellipsoid, Ellipsoid::BESSEL);
        assert_eq!(rd.x_0, 155_000.0);
        assert_eq!(rd.towgs84.unwrap()[6], 4.0725);

        let merc: ProjDefinition = EPSG_3857.parse().unwrap();
        assert_eq!(merc.kind, ProjectionKind::Mercator);
        assert_eq!(merc.ellipsoid.es, 0.0);

        let wgs: ProjDefinition = EPSG_4326.parse().unwrap();
        assert_eq!(wgs.kind, ProjectionKind::LongLat);
        assert!(wgs.towgs84.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_definitions() {
        assert!("+proj=tmerc +lat_0=0".parse::<ProjDefinition>().is_err());
        assert!("+lat_0=0".parse::<ProjDefinition>().is_err());
        assert!("+proj=merc +lat_0=north".parse::<ProjDefinition>().is_err());
        assert!("+proj=sterea +towgs84=1,2".parse::<ProjDefinition>().is_err());
        assert!("+proj=merc +units=ft".parse::<ProjDefinition>().is_err());
    }

    #[test]
    fn test_distance_zero_and_symmetry() {
        assert_eq!(distance_meters(52.0, 4.9, 52.0, 4.9), 0.0);
        let ab = distance_meters(52.0, 4.9, 48.8566, 2.3522);
        let ba = distance_meters(48.8566, 2.3522, 52.0, 4.9);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let d = distance_meters(0.0, 0.0, 1.0, 0.0);
        let expected = EARTH_RADIUS_M * PI / 180.0;
        assert!((d - expected).abs() < 1e-6);
    }
}
