//! The sync watermark.
//!
//! Last successfully synced record update time. Persisted in the document
//! store's sync state so a restarted process resumes where it left off.
//! Several processes may share one index, so the stored value is the source
//! of truth: it is reloaded before each run and only ever raised by the store.

use crate::error::Result;
use crate::storage::DocumentStore;
use std::sync::Arc;

const STATE_NAME: &str = "issues.watermark";

pub struct Watermark {
    store: Arc<dyn DocumentStore>,
    current: Option<i64>,
}

impl Watermark {
    /// Load the persisted watermark.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the state cannot be read.
    pub fn load(store: Arc<dyn DocumentStore>) -> Result<Self> {
        let current = store.load_state(STATE_NAME)?;
        Ok(Self { store, current })
    }

    /// Re-read the persisted value, picking up advances made elsewhere.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the state cannot be read.
    pub fn reload(&mut self) -> Result<()> {
        self.current = self.store.load_state(STATE_NAME)?;
        Ok(())
    }

    /// Current value; `None` before the first completed run.
    #[must_use]
    pub fn get(&self) -> Option<i64> {
        self.current
    }

    /// Lower bound for the next incremental fetch. Unbounded when unset.
    #[must_use]
    pub fn since(&self) -> i64 {
        self.current.unwrap_or(i64::MIN)
    }

    /// Raise the stored watermark to `candidate` unless it is already
    /// higher, and return the value now in effect.
    ///
    /// # Errors
    ///
    /// Returns a backend error if persisting fails; the in-memory value is
    /// then left unchanged.
    pub fn advance(&mut self, candidate: i64) -> Result<i64> {
        let next = self.store.advance_state(STATE_NAME, candidate)?;
        self.current = Some(next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteDocumentStore;

    #[test]
    fn test_never_decreases() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::open_memory().unwrap());
        let mut watermark = Watermark::load(store.clone()).unwrap();
        assert_eq!(watermark.get(), None);
        assert_eq!(watermark.since(), i64::MIN);

        assert_eq!(watermark.advance(100).unwrap(), 100);
        assert_eq!(watermark.advance(40).unwrap(), 100);
        assert_eq!(watermark.advance(150).unwrap(), 150);

        let reloaded = Watermark::load(store).unwrap();
        assert_eq!(reloaded.get(), Some(150));
    }

    #[test]
    fn test_reload_sees_advance_from_another_handle() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::open_memory().unwrap());
        let mut stale = Watermark::load(store.clone()).unwrap();
        let mut other = Watermark::load(store).unwrap();

        assert_eq!(other.advance(5_000).unwrap(), 5_000);
        assert_eq!(stale.get(), None);

        // Even without a reload the store refuses to go backwards
        assert_eq!(stale.advance(3_000).unwrap(), 5_000);

        other.advance(6_000).unwrap();
        stale.reload().unwrap();
        assert_eq!(stale.since(), 6_000);
    }
}
