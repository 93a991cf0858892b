//! Sessions keyed by the host's rendering contexts.

use crate::{config::CaptureConfig, host::Host, session::CaptureSession, StatisticsStore};
use std::{
    collections::{hash_map::Entry, HashMap},
    hash::Hash,
    sync::Arc,
};

/// Every live [`CaptureSession`], keyed by a host chosen context id.
pub struct Sessions<K> {
    sessions: HashMap<K, CaptureSession>,
}

impl<K> Default for Sessions<K> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> Sessions<K> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the session of a context the host just attached.
    ///
    /// A session already registered under `key` is replaced and dropped, which writes
    /// out everything it still had queued.
    pub fn attach<H: Host + ?Sized>(
        &mut self,
        key: K,
        host: &mut H,
        config: CaptureConfig,
        statistics: Arc<StatisticsStore>,
    ) -> &mut CaptureSession {
        let session = CaptureSession::attach(host, config, statistics);
        match self.sessions.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(session);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(session),
        }
    }

    /// Removes the session of a context the host is about to destroy.
    ///
    /// Dropping the returned session blocks until its queued frames are written.
    pub fn detach(&mut self, key: &K) -> Option<CaptureSession> {
        self.sessions.remove(key)
    }

    /// The session of `key`.
    pub fn get(&self, key: &K) -> Option<&CaptureSession> {
        self.sessions.get(key)
    }

    /// The session of `key` for driving.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut CaptureSession> {
        self.sessions.get_mut(key)
    }

    /// Number of attached contexts.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no context is attached.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
