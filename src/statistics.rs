//! Persistent capture counters, globally and per set.

use crate::{
    config::{read_json, write_json},
    error::PersistError,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Counters of one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureCount {
    /// Number of activations.
    pub total_take: u64,
    /// Number of capture frames.
    pub total_frame: u64,
}

/// Counters keyed by set name, with `""` holding the global totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, CaptureCount>", into = "BTreeMap<String, CaptureCount>")]
pub struct Statistics {
    counts: BTreeMap<String, CaptureCount>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::from(BTreeMap::new())
    }
}

impl From<BTreeMap<String, CaptureCount>> for Statistics {
    fn from(mut counts: BTreeMap<String, CaptureCount>) -> Self {
        counts.entry(Self::GLOBAL.to_owned()).or_default();
        Self { counts }
    }
}

impl From<Statistics> for BTreeMap<String, CaptureCount> {
    fn from(statistics: Statistics) -> Self {
        statistics.counts
    }
}

impl Statistics {
    /// Key of the global counters.
    pub const GLOBAL: &'static str = "";

    /// Counters across every set.
    pub fn global(&self) -> CaptureCount {
        self.scoped(Self::GLOBAL)
    }

    /// Counters of one set, zero if it never captured.
    pub fn scoped(&self, name: &str) -> CaptureCount {
        self.counts.get(name).copied().unwrap_or_default()
    }

    /// Counts an activation of `name`.
    pub fn record_take(&mut self, name: &str) {
        self.bump(name, |count| count.total_take += 1);
    }

    /// Counts a capture frame of `name`.
    pub fn record_frame(&mut self, name: &str) {
        self.bump(name, |count| count.total_frame += 1);
    }

    /// Every scope and its counters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, CaptureCount)> + '_ {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    fn bump(&mut self, name: &str, f: impl Fn(&mut CaptureCount)) {
        f(self.counts.entry(Self::GLOBAL.to_owned()).or_default());
        if name != Self::GLOBAL {
            f(self.counts.entry(name.to_owned()).or_default());
        }
    }
}

/// [`Statistics`] behind a mutex, written back to disk after every change.
///
/// Safe to share between the render thread and workers.
#[derive(Debug, Default)]
pub struct StatisticsStore {
    path: Option<PathBuf>,
    data: Mutex<Statistics>,
}

impl StatisticsStore {
    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the store at `path`. A missing file starts from zero.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        let data = read_json::<Statistics>(&path)?.unwrap_or_default();
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// The file backing the store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A copy of the current counters.
    pub fn snapshot(&self) -> Statistics {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Counts an activation of `name` and persists.
    pub fn record_take(&self, name: &str) -> Result<(), PersistError> {
        self.update(|data| data.record_take(name))
    }

    /// Counts a capture frame of `name` and persists.
    pub fn record_frame(&self, name: &str) -> Result<(), PersistError> {
        self.update(|data| data.record_frame(name))
    }

    /// Writes the counters to disk.
    pub fn save(&self) -> Result<(), PersistError> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        self.persist(&data)
    }

    fn update(&self, f: impl FnOnce(&mut Statistics)) -> Result<(), PersistError> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut data);
        self.persist(&data)
    }

    fn persist(&self, data: &Statistics) -> Result<(), PersistError> {
        match &self.path {
            Some(path) => write_json(path, data),
            None => Ok(()),
        }
    }
}
