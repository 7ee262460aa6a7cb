use crate::engine::Engine;
use tracing::debug;

/// Single-slot, in-memory store for an engine snapshot. The last capture wins.
#[derive(Debug)]
#[must_use]
pub struct SnapshotStore<S> {
    snapshot: Option<S>,
}

impl<S> Default for SnapshotStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SnapshotStore<S> {
    pub const fn new() -> Self {
        Self { snapshot: None }
    }

    /// Capture the engine's current state, replacing any previous snapshot.
    pub fn capture<E>(&mut self, engine: &E) -> &S
    where
        E: Engine<Snapshot = S> + ?Sized,
    {
        if self.snapshot.is_some() {
            debug!("replacing stored snapshot");
        }
        self.snapshot.insert(engine.capture_snapshot())
    }

    /// Restore the stored snapshot into the engine. Returns whether a snapshot was restored.
    pub fn restore<E>(&self, engine: &mut E) -> bool
    where
        E: Engine<Snapshot = S> + ?Sized,
    {
        match &self.snapshot {
            Some(snapshot) => {
                engine.restore_snapshot(snapshot);
                true
            }
            None => {
                debug!("no snapshot to restore");
                false
            }
        }
    }

    /// Drop the stored snapshot, e.g. because the engine's memory layout may have changed.
    pub fn clear(&mut self) {
        self.snapshot = None;
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.snapshot.is_none()
    }

    #[must_use]
    pub const fn get(&self) -> Option<&S> {
        self.snapshot.as_ref()
    }
}
