//! Persistence contract for search history.
//!
//! The engine only ever talks to a [`ResultStore`]; [`Database`](crate::data::Database)
//! is the SQLite implementation. Implementations must tolerate concurrent
//! calls for the same handle: creating a search record twice or recording
//! the same correlation twice is a no-op, never a duplicate row.

use chrono::{DateTime, Utc};
use handlehunt_scanner::SiteDefinition;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("No search record for '{0}'")]
    MissingSearchRecord(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Storage error: {0}")]
    Other(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A persisted positive match between a handle and a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub handle: String,
    pub site: SiteDefinition,
    pub found_at: DateTime<Utc>,
    pub searched_at: DateTime<Utc>,
}

impl Correlation {
    /// The concrete profile URL for this match.
    pub fn profile_url(&self) -> String {
        self.site.render(&self.handle)
    }
}

pub trait ResultStore: Send + Sync {
    fn has_search_record(&self, handle: &str) -> StoreResult<bool>;

    /// Idempotent: an existing record for `handle` is left untouched.
    fn create_search_record(&self, handle: &str) -> StoreResult<()>;

    /// Removes the search record and, by cascade, every correlation for it.
    fn delete_search_history(&self, handle: &str) -> StoreResult<()>;

    /// Idempotent on `(handle, site.name, site.uri_template)`.
    fn record_correlation(&self, handle: &str, site: &SiteDefinition) -> StoreResult<()>;

    /// Correlations in the order they were confirmed.
    fn get_correlations(&self, handle: &str) -> StoreResult<Vec<Correlation>>;
}
