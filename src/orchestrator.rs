//! Drives one GPX load from raw text to a rendered map.
//!
//! ```text
//! Idle -> Parsing -> { FallbackRender | LibraryRender } -> ProximityCheck -> Done
//!            |                LibraryRender --error--> FallbackRender
//!            +--> Failed      FallbackRender --error--> Failed
//! ```
//!
//! Loads are not serialized against each other. Every load takes a ticket
//! from a monotonic sequence, and after each suspension point a load whose
//! ticket is no longer the newest stops without touching the store or the
//! status channel. The only thing it still does is take its own library
//! layer back off the map. Clearing the previous drawing and adding the new
//! one are separate calls, so a superseded load may still have drawn before
//! its first suspension point.

use std::cell::Cell;
use std::future::Future;

use log::{debug, info, warn};

use crate::catalog::{Catalog, ConvertedPoint};
use crate::error::LoadError;
use crate::gpx_types::{Bounds, ParsedGpx, TrackPoint, Waypoint};
use crate::layer::{self, MapSurface, Marker};
use crate::options::ProximityOptions;
use crate::parser;
use crate::proximity::filter_by_proximity;
use crate::store::{ProximityStore, UNKNOWN_FILENAME};

pub const PRIMARY_FAILED_STATUS: &str = "Primary GPX parsing failed, using fallback method...";
pub const LIBRARY_FAILED_STATUS: &str = "GPX library failed, using fallback method...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Parsing,
    FallbackRender,
    LibraryRender,
    ProximityCheck,
    Done,
    Failed,
}

/// Completion of the external GPX rendering library.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Loaded(Bounds),
    Errored(String),
}

/// The full-featured GPX rendering library of the host.
pub trait GpxRenderer {
    /// Handle to a layer the library put on the map.
    type Layer;

    /// Start rendering `gpx_text`. `Err` means the library threw before it
    /// could add a layer; otherwise the layer is on the map and the returned
    /// future settles once it has loaded or failed.
    fn render(
        &self,
        gpx_text: &str,
    ) -> Result<(Self::Layer, impl Future<Output = RenderOutcome>), String>;

    /// Take a layer returned by [`render`](Self::render) off the map.
    fn remove(&self, layer: Self::Layer);
}

/// User-facing status channel.
pub trait StatusSink {
    fn show_status(&self, message: &str);
    fn show_error(&self, error: &LoadError);
    /// Whether a GPX file is currently shown (drives e.g. button states).
    fn set_loaded(&self, loaded: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    Library,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub render_path: RenderPath,
    pub track_points: usize,
    pub waypoints: usize,
    /// Catalog points shown near the track.
    pub nearby: Vec<ConvertedPoint>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Done(LoadSummary),
    Failed(LoadError),
    /// A newer load started while this one was suspended.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket(u64);

pub struct Orchestrator<R: GpxRenderer, M, S, U> {
    renderer: R,
    map: M,
    store: S,
    ui: U,
    catalog: Option<Catalog>,
    options: ProximityOptions,
    sequence: Cell<u64>,
    state: Cell<LoadState>,
    /// Library layer of the load that last reached a loaded render.
    library_layer: Cell<Option<R::Layer>>,
}

impl<R, M, S, U> Orchestrator<R, M, S, U>
where
    R: GpxRenderer,
    M: MapSurface,
    S: ProximityStore,
    U: StatusSink,
{
    pub fn new(renderer: R, map: M, store: S, ui: U) -> Self {
        Self {
            renderer,
            map,
            store,
            ui,
            catalog: None,
            options: ProximityOptions::default(),
            sequence: Cell::new(0),
            state: Cell::new(LoadState::Idle),
            library_layer: Cell::new(None),
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_options(mut self, options: ProximityOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the session catalog. Loads already in flight keep theirs.
    pub fn set_catalog(&mut self, catalog: Option<Catalog>) {
        self.catalog = catalog;
    }

    /// State of the most recently started load.
    pub fn state(&self) -> LoadState {
        self.state.get()
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Parse, render and check one GPX document.
    pub async fn load(&self, gpx_text: &str, filename: Option<&str>) -> LoadOutcome {
        let ticket = self.begin();
        if let Some(previous) = self.library_layer.take() {
            self.renderer.remove(previous);
        }
        self.map.clear();

        let parsed = match parser::parse_gpx(gpx_text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("[Orchestrator] #{} parse failed: {e}", ticket.0);
                return self.fail(ticket, LoadError::from(&e), false);
            }
        };
        let ParsedGpx {
            track_points,
            waypoints,
        } = &parsed;
        debug!(
            "[Orchestrator] #{} parsed {} track points, {} waypoints",
            ticket.0,
            track_points.len(),
            waypoints.len()
        );

        let upgraded = parser::upgrade_gpx10(gpx_text);
        let use_fallback = parser::is_known_bad_producer(gpx_text)
            || parser::requires_fallback(&upgraded, track_points, waypoints);

        let render_path = if use_fallback {
            info!(
                "[Orchestrator] #{} GPX structure issues detected, using fallback",
                ticket.0
            );
            RenderPath::Fallback
        } else {
            self.enter(ticket, LoadState::LibraryRender);
            match self.renderer.render(&upgraded) {
                Err(cause) => {
                    warn!("[Orchestrator] #{} renderer threw: {cause}", ticket.0);
                    self.ui.show_status(PRIMARY_FAILED_STATUS);
                    RenderPath::Fallback
                }
                Ok((rendered, pending)) => {
                    let outcome = pending.await;
                    if !self.is_current(ticket) {
                        self.renderer.remove(rendered);
                        return self.superseded(ticket);
                    }
                    match outcome {
                        RenderOutcome::Loaded(bounds) => {
                            self.library_layer.set(Some(rendered));
                            if let Err(e) = self.map.fit_bounds(bounds) {
                                warn!("[Orchestrator] #{} {e}", ticket.0);
                            }
                            RenderPath::Library
                        }
                        RenderOutcome::Errored(cause) => {
                            self.renderer.remove(rendered);
                            warn!("[Orchestrator] #{} renderer failed: {cause}", ticket.0);
                            self.ui.show_status(LIBRARY_FAILED_STATUS);
                            RenderPath::Fallback
                        }
                    }
                }
            }
        };

        if render_path == RenderPath::Fallback {
            self.enter(ticket, LoadState::FallbackRender);
            if let Err(e) = layer::draw_fallback(&self.map, track_points, waypoints) {
                warn!("[Orchestrator] #{} fallback failed: {e}", ticket.0);
                return self.fail(ticket, LoadError::from(e), true);
            }
        }

        self.ui.show_status(&status_message(
            track_points,
            waypoints,
            filename,
            render_path == RenderPath::Fallback,
        ));
        self.ui.set_loaded(true);

        if render_path == RenderPath::Library && !waypoints.is_empty() {
            if let Err(e) = layer::draw_waypoints(&self.map, waypoints) {
                warn!("[Orchestrator] #{} {e}", ticket.0);
            }
        }

        let mut nearby = Vec::new();
        let mut from_cache = false;
        if let Some(catalog) = &self.catalog {
            if waypoints.is_empty() && !track_points.is_empty() {
                self.enter(ticket, LoadState::ProximityCheck);
                match self
                    .proximity_check(ticket, catalog, track_points, filename)
                    .await
                {
                    Some(found) => (nearby, from_cache) = found,
                    None => return self.superseded(ticket),
                }
            }
        }

        self.enter(ticket, LoadState::Done);
        LoadOutcome::Done(LoadSummary {
            render_path,
            track_points: track_points.len(),
            waypoints: waypoints.len(),
            nearby,
            from_cache,
        })
    }

    /// Show catalog points near the track, from cache when possible.
    /// `None` when the load was superseded meanwhile.
    async fn proximity_check(
        &self,
        ticket: Ticket,
        catalog: &Catalog,
        track: &[TrackPoint],
        filename: Option<&str>,
    ) -> Option<(Vec<ConvertedPoint>, bool)> {
        let cache_name = filename.unwrap_or(UNKNOWN_FILENAME);
        let cached = self.store.load_cached_proximity_result(cache_name).await;
        if !self.is_current(ticket) {
            return None;
        }

        let (points, from_cache) = match cached {
            Some(points) if !points.is_empty() => {
                info!(
                    "[Orchestrator] #{} using {} cached points for {cache_name}",
                    ticket.0,
                    points.len()
                );
                (points, true)
            }
            _ => {
                let points = filter_by_proximity(catalog.points(), track, &self.options);
                if let Some(name) = filename.filter(|_| !points.is_empty()) {
                    self.store.save_proximity_result(name, &points).await;
                    if !self.is_current(ticket) {
                        return None;
                    }
                }
                (points, false)
            }
        };

        for marker in Marker::for_catalog_points(&points) {
            if let Err(e) = self.map.add_marker(marker) {
                warn!("[Orchestrator] #{} {e}", ticket.0);
            }
        }
        Some((points, from_cache))
    }

    fn begin(&self) -> Ticket {
        let ticket = Ticket(self.sequence.get() + 1);
        self.sequence.set(ticket.0);
        info!("[Orchestrator] #{} started", ticket.0);
        self.state.set(LoadState::Parsing);
        ticket
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        self.sequence.get() == ticket.0
    }

    fn enter(&self, ticket: Ticket, next: LoadState) {
        if self.is_current(ticket) {
            info!(
                "[Orchestrator] #{} {:?} -> {:?}",
                ticket.0,
                self.state.get(),
                next
            );
            self.state.set(next);
        }
    }

    fn fail(&self, ticket: Ticket, error: LoadError, revert_loaded: bool) -> LoadOutcome {
        self.enter(ticket, LoadState::Failed);
        self.ui.show_error(&error);
        if revert_loaded {
            self.ui.set_loaded(false);
        }
        LoadOutcome::Failed(error)
    }

    fn superseded(&self, ticket: Ticket) -> LoadOutcome {
        warn!(
            "[Orchestrator] #{} discarded, load #{} is newer",
            ticket.0,
            self.sequence.get()
        );
        LoadOutcome::Superseded
    }
}

/// Status line shown once a GPX file is on the map.
pub fn status_message(
    track_points: &[TrackPoint],
    waypoints: &[Waypoint],
    filename: Option<&str>,
    fallback: bool,
) -> String {
    let fallback_text = if fallback { " (fallback)" } else { "" };
    let waypoints_text = if waypoints.is_empty() {
        ""
    } else {
        " - showing waypoints"
    };
    match filename {
        Some(name) if !name.is_empty() => format!(
            "GPX loaded{fallback_text}: {name} ({} track points, {} waypoints{waypoints_text})",
            track_points.len(),
            waypoints.len()
        ),
        _ => format!(
            "GPX loaded{fallback_text} with {} track points, {} waypoints{waypoints_text}",
            track_points.len(),
            waypoints.len()
        ),
    }
}
