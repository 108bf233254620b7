use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::ConvertedPoint;

pub const GPX_PREFIX: &str = "gpx_";
pub const PROXIMITY_SUFFIX: &str = "_wp";
pub const LAST_GPX_KEY: &str = "last_gpx";
/// Cache lookup name for GPX text that arrived without a filename.
pub const UNKNOWN_FILENAME: &str = "unknown";

/// Storage key of a stored GPX file.
pub fn gpx_key(filename: &str) -> String {
    format!("{GPX_PREFIX}{filename}")
}

/// Storage key of the cached proximity result for a GPX file.
pub fn proximity_key(filename: &str) -> String {
    format!("{GPX_PREFIX}{filename}{PROXIMITY_SUFFIX}")
}

/// Persistence of proximity results, keyed by GPX filename.
///
/// A lookup miss and an unreadable entry both yield `None`; saving is
/// best-effort and never fails the caller.
#[allow(async_fn_in_trait)]
pub trait ProximityStore {
    async fn load_cached_proximity_result(&self, filename: &str) -> Option<Vec<ConvertedPoint>>;
    async fn save_proximity_result(&self, filename: &str, points: &[ConvertedPoint]);
}

/// A GPX document as kept in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredGpx {
    pub content: String,
    pub filename: String,
    pub timestamp: u64,
}

/// Listing entry for a stored GPX file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub filename: String,
    pub timestamp: u64,
    pub display_name: String,
}

#[derive(Serialize, Deserialize)]
struct StoredProximity {
    waypoints: Vec<ConvertedPoint>,
    filename: String,
    timestamp: u64,
}

/// Key-value store holding JSON strings, the way a browser store would.
///
/// Timestamps are a per-store revision counter, so "newest" means "most
/// recently written".
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
    revision: Cell<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> u64 {
        let next = self.revision.get() + 1;
        self.revision.set(next);
        next
    }

    fn put<T: Serialize>(&self, key: String, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => {
                self.entries.borrow_mut().insert(key, json);
            }
            Err(e) => warn!("[Store] Could not serialize {key}: {e}"),
        }
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let json = self.entries.borrow().get(key).cloned()?;
        serde_json::from_str(&json)
            .inspect_err(|e| warn!("[Store] Ignoring unreadable entry {key}: {e}"))
            .ok()
    }

    /// Store a GPX file and make it the last opened one.
    pub fn save_gpx(&self, filename: &str, content: &str) {
        let stored = StoredGpx {
            content: content.to_string(),
            filename: filename.to_string(),
            timestamp: self.tick(),
        };
        self.put(gpx_key(filename), &stored);
        self.put(LAST_GPX_KEY.to_string(), &filename);
        info!("[Store] Saved GPX {}", gpx_key(filename));
    }

    pub fn load_gpx(&self, filename: &str) -> Option<StoredGpx> {
        self.get(&gpx_key(filename))
    }

    pub fn last_gpx_filename(&self) -> Option<String> {
        self.get(LAST_GPX_KEY)
    }

    /// The most recently saved GPX file, if it is still stored.
    pub fn load_last_gpx(&self) -> Option<StoredGpx> {
        self.load_gpx(&self.last_gpx_filename()?)
    }

    /// Stored `.gpx` files, newest first.
    pub fn stored_files(&self) -> Vec<StoredFile> {
        let keys: Vec<String> = self
            .entries
            .borrow()
            .keys()
            .filter(|k| k.starts_with(GPX_PREFIX) && k.ends_with(".gpx"))
            .cloned()
            .collect();

        let mut files: Vec<StoredFile> = keys
            .iter()
            .filter_map(|key| {
                let stored: StoredGpx = self.get(key)?;
                let filename = key[GPX_PREFIX.len()..].to_string();
                Some(StoredFile {
                    display_name: display_name(&filename),
                    filename,
                    timestamp: stored.timestamp,
                })
            })
            .collect();
        files.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        files
    }

    /// Remove a GPX file with its cached proximity result.
    pub fn delete_gpx(&self, filename: &str) {
        self.entries.borrow_mut().remove(&gpx_key(filename));
        self.clear(filename);
        if self.last_gpx_filename().as_deref() == Some(filename) {
            self.entries.borrow_mut().remove(LAST_GPX_KEY);
        }
        info!("[Store] Deleted GPX file {filename}");
    }

    /// Drop the cached proximity result for `filename`.
    pub fn clear(&self, filename: &str) {
        self.entries.borrow_mut().remove(&proximity_key(filename));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Write a raw entry, bypassing serialization.
    pub fn insert_raw(&self, key: &str, json: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), json.to_string());
    }
}

impl ProximityStore for MemoryStore {
    async fn load_cached_proximity_result(&self, filename: &str) -> Option<Vec<ConvertedPoint>> {
        let stored: StoredProximity = self.get(&proximity_key(filename))?;
        Some(stored.waypoints)
    }

    async fn save_proximity_result(&self, filename: &str, points: &[ConvertedPoint]) {
        let stored = StoredProximity {
            waypoints: points.to_vec(),
            filename: filename.to_string(),
            timestamp: self.tick(),
        };
        self.put(proximity_key(filename), &stored);
        info!(
            "[Store] Cached {} points under {}",
            points.len(),
            proximity_key(filename)
        );
    }
}

/// Human-readable name for a stored GPX file.
///
/// Keeps only ASCII letters, whitespace and hyphens of the name without
/// its `.gpx` extension, collapses separator runs to a single space and
/// capitalises the result.
pub fn display_name(filename: &str) -> String {
    let stem = filename.replacen(".gpx", "", 1);
    let kept: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace() || *c == '-')
        .collect();
    let words: Vec<&str> = kept
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty())
        .collect();
    let joined = words.join(" ");

    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => "GPX File".to_string(),
    }
}
