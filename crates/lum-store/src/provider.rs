use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use lum_core::{CelestialBody, Position, PositionProvider, ProviderError, ReferenceFrame};

use crate::store::PositionStore;

/// Computed positions buffered before one batched write.
pub const WRITE_BATCH: usize = 512;

/// Read-through, write-back provider over a [`PositionStore`].
///
/// Misses are buffered and written in one transaction per [`WRITE_BATCH`]
/// rows, on [`PositionProvider::flush`], and on drop. Provider failures are
/// passed through and never stored. Store failures are logged and the inner
/// provider answers instead.
pub struct PersistentProvider<P: PositionProvider> {
    inner: P,
    store: Mutex<PositionStore>,
    pending: Mutex<Vec<Position>>,
    label: String,
}

impl<P: PositionProvider> PersistentProvider<P> {
    pub fn new(inner: P, store: PositionStore) -> Self {
        let label = format!("persistent({})", inner.name());
        Self {
            inner,
            store: Mutex::new(store),
            pending: Mutex::new(Vec::new()),
            label,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Exclusive access to the underlying store. Buffered rows are written
    /// first so the store reflects every computed position.
    pub fn store(&self) -> MutexGuard<'_, PositionStore> {
        self.write_pending();
        self.lock_store()
    }

    /// Positions computed but not yet written.
    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_store(&self) -> MutexGuard<'_, PositionStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<Position>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_pending(&self) {
        let batch = std::mem::take(&mut *self.lock_pending());
        self.write(&batch);
    }

    fn write(&self, batch: &[Position]) {
        if batch.is_empty() {
            return;
        }
        match self.lock_store().put_batch(batch, self.inner.name()) {
            Ok(()) => tracing::debug!(rows = batch.len(), "position cache batch written"),
            Err(e) => tracing::warn!(rows = batch.len(), "position cache write failed: {e}"),
        }
    }

    /// Buffered lookup of a position computed earlier in this batch.
    fn pending_hit(&self, body: CelestialBody, frame: ReferenceFrame, instant: DateTime<Utc>) -> Option<Position> {
        let ms = instant.timestamp_millis();
        self.lock_pending()
            .iter()
            .find(|p| p.body == body && p.frame == frame && p.instant.timestamp_millis() == ms)
            .map(|p| Position { instant, ..*p })
    }
}

impl<P: PositionProvider> PositionProvider for PersistentProvider<P> {
    fn get_position(
        &self,
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    ) -> Result<Position, ProviderError> {
        match self.lock_store().get(body, frame, instant) {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => tracing::warn!(%body, %frame, "position cache read failed: {e}"),
        }
        if let Some(hit) = self.pending_hit(body, frame, instant) {
            return Ok(hit);
        }

        // computed outside both locks so workers don't serialize on the provider
        let position = self.inner.get_position(body, frame, instant)?;
        let full = {
            let mut pending = self.lock_pending();
            pending.push(position);
            (pending.len() >= WRITE_BATCH).then(|| std::mem::take(&mut *pending))
        };
        if let Some(batch) = full {
            self.write(&batch);
        }
        Ok(position)
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn flush(&self) {
        self.write_pending();
        self.inner.flush();
    }
}

impl<P: PositionProvider> Drop for PersistentProvider<P> {
    fn drop(&mut self) {
        self.write_pending();
    }
}
