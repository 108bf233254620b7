use std::borrow::Cow;

use log::debug;
use quick_xml::Reader;
use serde::Serialize;
use quick_xml::events::{BytesStart, Event};

use crate::error::GpxError;
use crate::gpx_types::*;

type Result<T> = std::result::Result<T, GpxError>;

const GPX10_VERSION: &str = r#"version="1.0""#;
const GPX11_VERSION: &str = r#"version="1.1""#;
const GPX10_NAMESPACE: &str = r#"xmlns="http://www.topografix.com/GPX/1/0""#;
const GPX11_NAMESPACE: &str = r#"xmlns="http://www.topografix.com/GPX/1/1""#;
const GPX10_SCHEMA_LOCATION: &str = r#"xsi:schemaLocation="http://www.topografix.com/GPX/1/0 http://www.topografix.com/GPX/1/0/gpx.xsd""#;
const GPX11_SCHEMA_LOCATION: &str = r#"xsi:schemaLocation="http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd""#;

/// Creator attribute of a generator whose 1.0 output the rendering library mishandles.
const BROKEN_CREATOR: &str = r#"creator="routemaker.nl""#;

/// Rewrite GPX 1.0 version/namespace tokens to their 1.1 equivalents.
///
/// Only applies when the document carries both `version="1.0"` and the 1.0
/// namespace. Each token is replaced once, textually; the `<?xml ...?>`
/// declaration is left alone so its own `version="1.0"` is not mistaken for
/// the GPX version. A naive first-match replace would hit the declaration
/// instead, so output differs from that for documents that carry one.
pub fn upgrade_gpx10(xml: &str) -> Cow<'_, str> {
    if !(xml.contains(GPX10_VERSION) && xml.contains(GPX10_NAMESPACE)) {
        return Cow::Borrowed(xml);
    }

    let (declaration, body) = xml.split_at(declaration_end(xml));
    let body = body
        .replacen(GPX10_VERSION, GPX11_VERSION, 1)
        .replacen(GPX10_NAMESPACE, GPX11_NAMESPACE, 1)
        .replacen(GPX10_SCHEMA_LOCATION, GPX11_SCHEMA_LOCATION, 1);
    debug!("[GpxParser] Rewrote GPX 1.0 header tokens to 1.1");
    Cow::Owned(format!("{declaration}{body}"))
}

/// Byte offset just past a leading `<?xml ...?>` declaration, or 0.
fn declaration_end(xml: &str) -> usize {
    let trimmed = xml.trim_start();
    let offset = xml.len() - trimmed.len();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return offset + end + 2;
        }
    }
    0
}

/// Parse GPX text into track points and waypoints.
///
/// Fails with a syntax error for documents that are not well-formed XML and
/// with [`GpxError::NoUsableData`] when nothing could be extracted.
pub fn parse_gpx(xml: &str) -> Result<ParsedGpx> {
    let xml = upgrade_gpx10(xml);
    let data = scan(&xml)?;

    debug!(
        "[GpxParser] Extracted {} track points and {} waypoints",
        data.track_points.len(),
        data.waypoints.len()
    );

    if data.is_empty() {
        return Err(GpxError::NoUsableData);
    }
    Ok(data)
}

/// Parse outcome flattened to `{ trackPoints, waypoints, valid, error }`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseReport {
    pub track_points: Vec<TrackPoint>,
    pub waypoints: Vec<Waypoint>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl From<Result<ParsedGpx>> for ParseReport {
    fn from(result: Result<ParsedGpx>) -> Self {
        match result {
            Ok(data) => Self {
                track_points: data.track_points,
                waypoints: data.waypoints,
                valid: true,
                error: None,
            },
            Err(e) => Self {
                track_points: Vec::new(),
                waypoints: Vec::new(),
                valid: false,
                error: Some(e.code()),
            },
        }
    }
}

/// [`requires_fallback`] for raw text: parses it first and also checks the
/// producer signature before any version rewrite.
pub fn needs_fallback(xml: &str) -> bool {
    let data = parse_gpx(xml).unwrap_or_default();
    is_known_bad_producer(xml)
        || requires_fallback(&upgrade_gpx10(xml), &data.track_points, &data.waypoints)
}

/// Decide whether the document must bypass the full-featured rendering library.
pub fn requires_fallback(xml: &str, track_points: &[TrackPoint], waypoints: &[Waypoint]) -> bool {
    let doc = outline(xml);
    let has_segments = doc.track_segments > 0;

    if !doc.has_gpx_root
        || (!has_segments && doc.routes == 0 && waypoints.is_empty())
        || (has_segments && track_points.is_empty())
    {
        debug!("[GpxParser] Structure issues detected ({doc:?}), fallback required");
        return true;
    }

    if is_known_bad_producer(xml) {
        debug!("[GpxParser] Known broken creator, fallback required");
        return true;
    }

    false
}

/// Hard-coded escape hatch for one generator's GPX 1.0 output.
pub fn is_known_bad_producer(xml: &str) -> bool {
    xml.contains(BROKEN_CREATOR) && xml.contains(GPX10_VERSION)
}

/// Count structural elements, tolerating syntax errors by stopping at the first one.
pub fn outline(xml: &str) -> DocumentOutline {
    let mut reader = Reader::from_str(xml);
    let mut outline = DocumentOutline::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => note_element(&mut outline, &e),
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    outline
}

fn note_element(outline: &mut DocumentOutline, e: &BytesStart<'_>) {
    match e.local_name().as_ref() {
        b"gpx" => outline.has_gpx_root = true,
        b"trkseg" => outline.track_segments += 1,
        b"rte" => outline.routes += 1,
        _ => {}
    }
}

/// A `<wpt>` whose end tag has not been seen yet.
struct OpenWaypoint {
    coords: Option<(f64, f64)>,
    depth: usize,
    name: Option<String>,
}

/// Text of the first `<name>` inside an open waypoint, collected across child events.
struct NameCapture {
    depth: usize,
    text: String,
}

/// Walk the whole document once, extracting points and checking well-formedness.
fn scan(xml: &str) -> Result<ParsedGpx> {
    let mut reader = Reader::from_str(xml);
    let mut data = ParsedGpx::default();

    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut seen_root = false;
    let mut waypoint: Option<OpenWaypoint> = None;
    let mut name: Option<NameCapture> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                check_root(&open, &mut seen_root)?;
                open.push(e.local_name().as_ref().to_vec());

                match e.local_name().as_ref() {
                    b"trkpt" => push_track_point(&mut data, &e)?,
                    b"wpt" if waypoint.is_none() => {
                        waypoint = Some(OpenWaypoint {
                            coords: parse_lat_lon(&e)?,
                            depth: open.len(),
                            name: None,
                        });
                    }
                    b"name" => {
                        if let Some(wpt) = &waypoint {
                            if wpt.name.is_none() && name.is_none() {
                                name = Some(NameCapture {
                                    depth: open.len(),
                                    text: String::new(),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                check_root(&open, &mut seen_root)?;

                match e.local_name().as_ref() {
                    b"trkpt" => push_track_point(&mut data, &e)?,
                    b"wpt" if waypoint.is_none() => {
                        if let Some((lat, lng)) = parse_lat_lon(&e)? {
                            data.waypoints.push(Waypoint::new(lat, lng, None));
                        }
                    }
                    b"name" => {
                        if let Some(wpt) = &mut waypoint {
                            if wpt.name.is_none() && name.is_none() {
                                wpt.name = Some(String::new());
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                let depth = open.len();
                open.pop();

                if name.as_ref().is_some_and(|n| n.depth == depth) {
                    if let (Some(capture), Some(wpt)) = (name.take(), waypoint.as_mut()) {
                        wpt.name = Some(capture.text);
                    }
                }
                if waypoint.as_ref().is_some_and(|w| w.depth == depth) {
                    if let Some(OpenWaypoint {
                        coords: Some((lat, lng)),
                        name: wpt_name,
                        ..
                    }) = waypoint.take()
                    {
                        data.waypoints.push(Waypoint::new(lat, lng, wpt_name));
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if open.is_empty() {
                    if !e.as_ref().iter().all(u8::is_ascii_whitespace) {
                        return Err(GpxError::Structure(
                            "text content outside the root element".to_string(),
                        ));
                    }
                } else if let Some(capture) = &mut name {
                    capture
                        .text
                        .push_str(std::str::from_utf8(e.as_ref()).unwrap_or_default());
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(capture) = &mut name {
                    capture
                        .text
                        .push_str(std::str::from_utf8(e.as_ref()).unwrap_or_default());
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(capture) = &mut name {
                    push_entity(&mut capture.text, &e);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(GpxError::Malformed(e)),
            _ => {}
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(GpxError::Structure(format!(
            "element <{}> is never closed",
            String::from_utf8_lossy(unclosed)
        )));
    }
    if !seen_root {
        return Err(GpxError::Structure("document has no root element".to_string()));
    }

    Ok(data)
}

/// Reject a second top-level element.
fn check_root(open: &[Vec<u8>], seen_root: &mut bool) -> Result<()> {
    if open.is_empty() {
        if *seen_root {
            return Err(GpxError::Structure(
                "content after the root element".to_string(),
            ));
        }
        *seen_root = true;
    }
    Ok(())
}

fn push_track_point(data: &mut ParsedGpx, e: &BytesStart<'_>) -> Result<()> {
    if let Some((lat, lng)) = parse_lat_lon(e)? {
        data.track_points.push(TrackPoint::new(lat, lng));
    }
    Ok(())
}

/// Read `lat`/`lon` attributes. Missing, non-numeric or out-of-range values
/// yield `None`; only attribute syntax errors are reported.
fn parse_lat_lon(e: &BytesStart<'_>) -> Result<Option<(f64, f64)>> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr_result in e.attributes() {
        let attr = attr_result?;
        let val = std::str::from_utf8(&attr.value).unwrap_or_default();
        match attr.key.local_name().as_ref() {
            b"lat" => lat = parse_coordinate(val, 90.0),
            b"lon" => lon = parse_coordinate(val, 180.0),
            _ => {}
        }
    }

    Ok(lat.zip(lon))
}

fn parse_coordinate(value: &str, limit: f64) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
}

/// Append a character or predefined entity reference to `text`.
fn push_entity(text: &mut String, e: &quick_xml::events::BytesRef<'_>) {
    if let Ok(Some(ch)) = e.resolve_char_ref() {
        text.push(ch);
        return;
    }
    match std::str::from_utf8(e.as_ref()).unwrap_or_default() {
        "amp" => text.push('&'),
        "lt" => text.push('<'),
        "gt" => text.push('>'),
        "quot" => text.push('"'),
        "apos" => text.push('\''),
        _ => {}
    }
}
