//! The swappable telemetry source seen by every evaluator.
//!
//! Readers always go through [`TelemetryFeed::read`]. The active source is a
//! single `Arc` behind a lock: a scenario overlay is installed or removed by
//! replacing that pointer, so a read observes either the base source or the
//! overlay in full, never a half-applied override.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{TelemetryFrame, TelemetrySource, TelemetryStore};

pub struct TelemetryFeed {
    base: Arc<TelemetryStore>,
    active: RwLock<Arc<dyn TelemetrySource>>,
}

impl TelemetryFeed {
    pub fn new(base: Arc<TelemetryStore>) -> Self {
        let active: Arc<dyn TelemetrySource> = base.clone();
        Self {
            base,
            active: RwLock::new(active),
        }
    }

    /// The collaborator-fed store underneath any overlay.
    pub fn base(&self) -> &Arc<TelemetryStore> {
        &self.base
    }

    pub fn read(&self, at: DateTime<Utc>) -> TelemetryFrame {
        let source = self.active.read().clone();
        source.read(at)
    }

    /// Put `source` in front of the base store.
    pub(crate) fn install(&self, source: Arc<dyn TelemetrySource>) {
        *self.active.write() = source;
    }

    /// Route reads straight to the base store again.
    pub(crate) fn reset(&self) {
        let base: Arc<dyn TelemetrySource> = self.base.clone();
        *self.active.write() = base;
    }

    pub fn is_overridden(&self) -> bool {
        let active = self.active.read();
        let base: Arc<dyn TelemetrySource> = self.base.clone();
        !Arc::ptr_eq(&*active, &base)
    }
}
