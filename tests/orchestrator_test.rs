use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::executor::block_on;
use gpx_poi_wasm::catalog::{Catalog, ConvertedPoint};
use gpx_poi_wasm::error::{LoadError, MapError};
use gpx_poi_wasm::gpx_types::{Bounds, TrackPoint};
use gpx_poi_wasm::layer::{GeoJsonSurface, MapSurface, Marker};
use gpx_poi_wasm::orchestrator::{
    GpxRenderer, LIBRARY_FAILED_STATUS, LoadOutcome, LoadState, LoadSummary, Orchestrator,
    PRIMARY_FAILED_STATUS, RenderOutcome, RenderPath, StatusSink,
};
use gpx_poi_wasm::store::{MemoryStore, ProximityStore, proximity_key};

fn load_fixture(path: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{path}")).unwrap()
}

fn catalog() -> Catalog {
    Catalog::from_json(&load_fixture("catalog/utrecht.json")).unwrap()
}

const VIEW: Bounds = Bounds {
    south: 52.09,
    west: 5.12,
    north: 52.09,
    east: 5.122,
};

/// Pending once, then ready.
#[derive(Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

enum Script {
    Load(Bounds),
    Fail(&'static str),
    Throw(&'static str),
}

struct FakeRenderer {
    script: Script,
    suspend: bool,
    calls: Cell<usize>,
    /// Layers currently on the map, by render call number.
    layers: RefCell<Vec<usize>>,
}

impl FakeRenderer {
    fn new(script: Script) -> Self {
        Self {
            script,
            suspend: false,
            calls: Cell::new(0),
            layers: RefCell::new(Vec::new()),
        }
    }

    fn suspending(script: Script) -> Self {
        Self {
            suspend: true,
            ..Self::new(script)
        }
    }
}

impl GpxRenderer for FakeRenderer {
    type Layer = usize;

    fn render(
        &self,
        gpx_text: &str,
    ) -> Result<(usize, impl Future<Output = RenderOutcome>), String> {
        assert!(!gpx_text.contains(r#"xmlns="http://www.topografix.com/GPX/1/0""#));
        self.calls.set(self.calls.get() + 1);
        let outcome = match self.script {
            Script::Load(bounds) => RenderOutcome::Loaded(bounds),
            Script::Fail(cause) => RenderOutcome::Errored(cause.to_string()),
            Script::Throw(cause) => return Err(cause.to_string()),
        };
        let layer = self.calls.get();
        self.layers.borrow_mut().push(layer);
        let suspend = self.suspend;
        Ok((layer, async move {
            if suspend {
                YieldNow::default().await;
            }
            outcome
        }))
    }

    fn remove(&self, layer: usize) {
        self.layers.borrow_mut().retain(|&l| l != layer);
    }
}

#[derive(Default)]
struct RecordingUi {
    statuses: RefCell<Vec<String>>,
    errors: RefCell<Vec<LoadError>>,
    loaded: Cell<Option<bool>>,
}

impl StatusSink for RecordingUi {
    fn show_status(&self, message: &str) {
        self.statuses.borrow_mut().push(message.to_string());
    }

    fn show_error(&self, error: &LoadError) {
        self.errors.borrow_mut().push(error.clone());
    }

    fn set_loaded(&self, loaded: bool) {
        self.loaded.set(Some(loaded));
    }
}

/// A map whose line drawing always fails.
#[derive(Default)]
struct BrokenMap {
    cleared: Cell<usize>,
}

impl MapSurface for BrokenMap {
    fn clear(&self) {
        self.cleared.set(self.cleared.get() + 1);
    }

    fn draw_polyline(&self, _track: &[TrackPoint]) -> Result<(), MapError> {
        Err(MapError("canvas unavailable".to_string()))
    }

    fn add_marker(&self, _marker: Marker) -> Result<(), MapError> {
        Ok(())
    }

    fn fit_bounds(&self, _bounds: Bounds) -> Result<(), MapError> {
        Ok(())
    }
}

/// A store whose lookups suspend once.
#[derive(Default)]
struct SlowStore(MemoryStore);

impl ProximityStore for SlowStore {
    async fn load_cached_proximity_result(&self, filename: &str) -> Option<Vec<ConvertedPoint>> {
        YieldNow::default().await;
        self.0.load_cached_proximity_result(filename).await
    }

    async fn save_proximity_result(&self, filename: &str, points: &[ConvertedPoint]) {
        self.0.save_proximity_result(filename, points).await
    }
}

type TestOrchestrator = Orchestrator<FakeRenderer, GeoJsonSurface, MemoryStore, RecordingUi>;

fn orchestrator(script: Script) -> TestOrchestrator {
    Orchestrator::new(
        FakeRenderer::new(script),
        GeoJsonSurface::new(),
        MemoryStore::new(),
        RecordingUi::default(),
    )
}

fn summary(outcome: LoadOutcome) -> LoadSummary {
    match outcome {
        LoadOutcome::Done(summary) => summary,
        other => panic!("Expected Done, got {other:?}"),
    }
}

fn names(points: &[ConvertedPoint]) -> Vec<&str> {
    points
        .iter()
        .map(|p| p.point.name.as_deref().unwrap())
        .collect()
}

// ---- render paths ----

#[test]
fn test_library_path() {
    let orch = orchestrator(Script::Load(VIEW));
    let gpx = load_fixture("gpx/01_track_gpx10.gpx");

    let done = summary(block_on(orch.load(&gpx, Some("utrecht.gpx"))));
    assert_eq!(done.render_path, RenderPath::Library);
    assert_eq!(done.track_points, 3);
    assert!(done.nearby.is_empty());

    assert_eq!(orch.state(), LoadState::Done);
    assert_eq!(orch.renderer().calls.get(), 1);
    assert_eq!(*orch.renderer().layers.borrow(), vec![1]);
    assert_eq!(orch.map().bounds(), Some(VIEW));
    assert!(orch.map().is_empty());
    assert_eq!(
        *orch.ui().statuses.borrow(),
        vec!["GPX loaded: utrecht.gpx (3 track points, 0 waypoints)"]
    );
    assert_eq!(orch.ui().loaded.get(), Some(true));
}

#[test]
fn test_structural_fallback_skips_renderer() {
    let orch = orchestrator(Script::Load(VIEW));
    let gpx = load_fixture("gpx/02_routemaker.gpx");

    let done = summary(block_on(orch.load(&gpx, None)));
    assert_eq!(done.render_path, RenderPath::Fallback);
    assert_eq!(orch.renderer().calls.get(), 0);
    // Line plus start and end markers.
    assert_eq!(orch.map().len(), 3);
    assert_eq!(
        *orch.ui().statuses.borrow(),
        vec!["GPX loaded (fallback) with 3 track points, 0 waypoints"]
    );
}

#[test]
fn test_renderer_error_recovers_with_fallback() {
    let orch = orchestrator(Script::Fail("bad trkseg"));
    let gpx = load_fixture("gpx/07_track_and_waypoints.gpx");

    let done = summary(block_on(orch.load(&gpx, Some("walk.gpx"))));
    assert_eq!(done.render_path, RenderPath::Fallback);
    assert_eq!(
        *orch.ui().statuses.borrow(),
        vec![
            LIBRARY_FAILED_STATUS.to_string(),
            "GPX loaded (fallback): walk.gpx (3 track points, 2 waypoints - showing waypoints)"
                .to_string(),
        ]
    );
    assert!(orch.ui().errors.borrow().is_empty());
    assert!(orch.renderer().layers.borrow().is_empty());
    // Line, start, end and two waypoints.
    assert_eq!(orch.map().len(), 5);
}

#[test]
fn test_renderer_throw_recovers_with_fallback() {
    let orch = orchestrator(Script::Throw("constructor failed"));
    let gpx = load_fixture("gpx/01_track_gpx10.gpx");

    let done = summary(block_on(orch.load(&gpx, None)));
    assert_eq!(done.render_path, RenderPath::Fallback);
    assert_eq!(orch.ui().statuses.borrow()[0], PRIMARY_FAILED_STATUS);
}

#[test]
fn test_library_path_shows_waypoints() {
    let orch = orchestrator(Script::Load(VIEW)).with_catalog(catalog());
    let gpx = load_fixture("gpx/03_waypoints_only.gpx");

    let done = summary(block_on(orch.load(&gpx, Some("punten.gpx"))));
    assert_eq!(done.render_path, RenderPath::Library);
    assert_eq!(done.waypoints, 2);
    assert!(done.nearby.is_empty());
    assert_eq!(orch.map().len(), 2);
}

#[test]
fn test_next_load_removes_library_layer() {
    let orch = orchestrator(Script::Load(VIEW));
    let clean = load_fixture("gpx/01_track_gpx10.gpx");
    let routemaker = load_fixture("gpx/02_routemaker.gpx");

    summary(block_on(orch.load(&clean, Some("a.gpx"))));
    assert_eq!(*orch.renderer().layers.borrow(), vec![1]);

    let done = summary(block_on(orch.load(&routemaker, Some("b.gpx"))));
    assert_eq!(done.render_path, RenderPath::Fallback);
    assert!(orch.renderer().layers.borrow().is_empty());
    assert_eq!(orch.map().len(), 3);
}

#[test]
fn test_failed_load_removes_library_layer() {
    let orch = orchestrator(Script::Load(VIEW));
    summary(block_on(orch.load(&load_fixture("gpx/01_track_gpx10.gpx"), None)));
    let outcome = block_on(orch.load(&load_fixture("gpx/06_truncated.gpx"), None));
    assert_eq!(outcome, LoadOutcome::Failed(LoadError::InvalidFormat));
    assert!(orch.renderer().layers.borrow().is_empty());
}

// ---- failures ----

#[test]
fn test_malformed_input_fails_and_clears_map() {
    let orch = orchestrator(Script::Load(VIEW));
    block_on(orch.load(&load_fixture("gpx/07_track_and_waypoints.gpx"), None));
    assert!(!orch.map().is_empty());

    let outcome = block_on(orch.load(&load_fixture("gpx/06_truncated.gpx"), None));
    assert_eq!(outcome, LoadOutcome::Failed(LoadError::InvalidFormat));
    assert_eq!(orch.state(), LoadState::Failed);
    assert!(orch.map().is_empty());
    assert_eq!(
        orch.ui().errors.borrow()[0].user_message(),
        "Error: Invalid GPX file format"
    );
}

#[test]
fn test_empty_document_fails_with_no_data() {
    let orch = orchestrator(Script::Load(VIEW));
    let outcome = block_on(orch.load(&load_fixture("gpx/05_no_points.gpx"), None));
    assert_eq!(outcome, LoadOutcome::Failed(LoadError::NoData));
    assert_eq!(orch.renderer().calls.get(), 0);
    assert_eq!(orch.ui().loaded.get(), None);
}

#[test]
fn test_fallback_failure_is_fatal() {
    let orch = Orchestrator::new(
        FakeRenderer::new(Script::Fail("nope")),
        BrokenMap::default(),
        MemoryStore::new(),
        RecordingUi::default(),
    );
    let outcome = block_on(orch.load(&load_fixture("gpx/01_track_gpx10.gpx"), None));

    let error = match outcome {
        LoadOutcome::Failed(error) => error,
        other => panic!("Expected Failed, got {other:?}"),
    };
    assert!(matches!(error, LoadError::AllMethodsFailed(_)));
    assert_eq!(
        error.user_message(),
        "Error: Could not load GPX file with any method"
    );
    assert_eq!(orch.ui().loaded.get(), Some(false));
    assert_eq!(orch.map().cleared.get(), 1);
}

// ---- proximity ----

#[test]
fn test_proximity_is_cached_per_file() {
    let orch = orchestrator(Script::Load(VIEW)).with_catalog(catalog());
    let gpx = load_fixture("gpx/01_track_gpx10.gpx");

    let first = summary(block_on(orch.load(&gpx, Some("utrecht.gpx"))));
    assert!(!first.from_cache);
    assert_eq!(names(&first.nearby), vec!["Bank 1", "Bank 4", "Parkeerplaats 9"]);
    assert!(orch.store().contains_key(&proximity_key("utrecht.gpx")));
    assert_eq!(orch.map().len(), 3);

    let second = summary(block_on(orch.load(&gpx, Some("utrecht.gpx"))));
    assert!(second.from_cache);
    assert_eq!(names(&second.nearby), names(&first.nearby));
    assert_eq!(orch.map().len(), 3);
}

#[test]
fn test_proximity_without_filename_is_not_cached() {
    let orch = orchestrator(Script::Load(VIEW)).with_catalog(catalog());
    let gpx = load_fixture("gpx/01_track_gpx10.gpx");

    for _ in 0..2 {
        let done = summary(block_on(orch.load(&gpx, None)));
        assert!(!done.from_cache);
        assert_eq!(done.nearby.len(), 3);
    }
    assert!(!orch.store().contains_key(&proximity_key("unknown")));
}

#[test]
fn test_empty_proximity_result_is_done_and_not_saved() {
    let far_away =
        Catalog::from_json(r#"[{"name": "Dam", "geom_point": [121000, 487000]}]"#).unwrap();
    let orch = orchestrator(Script::Load(VIEW)).with_catalog(far_away);
    let gpx = load_fixture("gpx/01_track_gpx10.gpx");

    let done = summary(block_on(orch.load(&gpx, Some("a.gpx"))));
    assert!(done.nearby.is_empty());
    assert_eq!(orch.state(), LoadState::Done);
    assert!(!orch.store().contains_key(&proximity_key("a.gpx")));
}

#[test]
fn test_fallback_render_then_proximity() {
    let orch = orchestrator(Script::Load(VIEW)).with_catalog(catalog());
    let gpx = load_fixture("gpx/02_routemaker.gpx");

    let done = summary(block_on(orch.load(&gpx, Some("routemaker.gpx"))));
    assert_eq!(done.render_path, RenderPath::Fallback);
    assert!(!done.from_cache);
    assert_eq!(names(&done.nearby), vec!["Bank 1", "Bank 4", "Parkeerplaats 9"]);
    assert!(orch.store().contains_key(&proximity_key("routemaker.gpx")));
    assert_eq!(orch.renderer().calls.get(), 0);
    // Line, start, end and three catalog points.
    assert_eq!(orch.map().len(), 6);
    assert_eq!(orch.state(), LoadState::Done);
}

#[test]
fn test_recovered_fallback_then_proximity() {
    let orch = orchestrator(Script::Fail("bad trkseg")).with_catalog(catalog());
    let gpx = load_fixture("gpx/01_track_gpx10.gpx");

    let done = summary(block_on(orch.load(&gpx, Some("utrecht.gpx"))));
    assert_eq!(done.render_path, RenderPath::Fallback);
    assert_eq!(done.nearby.len(), 3);
    assert!(orch.store().contains_key(&proximity_key("utrecht.gpx")));
    assert_eq!(orch.map().len(), 6);
    assert_eq!(orch.ui().statuses.borrow()[0], LIBRARY_FAILED_STATUS);
}

// ---- overlapping loads ----

#[test]
fn test_stale_render_completion_is_discarded() {
    let orch = Orchestrator::new(
        FakeRenderer::suspending(Script::Load(VIEW)),
        GeoJsonSurface::new(),
        MemoryStore::new(),
        RecordingUi::default(),
    );
    let first = load_fixture("gpx/01_track_gpx10.gpx");
    let second = load_fixture("gpx/07_track_and_waypoints.gpx");

    let (a, b) = block_on(async {
        futures::join!(
            orch.load(&first, Some("first.gpx")),
            orch.load(&second, Some("second.gpx"))
        )
    });

    assert_eq!(a, LoadOutcome::Superseded);
    assert_eq!(summary(b).waypoints, 2);
    assert_eq!(*orch.renderer().layers.borrow(), vec![2]);
    assert_eq!(
        *orch.ui().statuses.borrow(),
        vec!["GPX loaded: second.gpx (3 track points, 2 waypoints - showing waypoints)"]
    );
    assert_eq!(orch.state(), LoadState::Done);
}

#[test]
fn test_stale_cache_lookup_is_discarded() {
    let orch = Orchestrator::new(
        FakeRenderer::new(Script::Load(VIEW)),
        GeoJsonSurface::new(),
        SlowStore::default(),
        RecordingUi::default(),
    )
    .with_catalog(catalog());
    let gpx = load_fixture("gpx/01_track_gpx10.gpx");

    let (a, b) = block_on(async {
        futures::join!(
            orch.load(&gpx, Some("first.gpx")),
            orch.load(&gpx, Some("second.gpx"))
        )
    });

    assert_eq!(a, LoadOutcome::Superseded);
    assert_eq!(summary(b).nearby.len(), 3);
    assert!(!orch.store().0.contains_key(&proximity_key("first.gpx")));
    assert!(orch.store().0.contains_key(&proximity_key("second.gpx")));
    assert_eq!(orch.map().len(), 3);
}
