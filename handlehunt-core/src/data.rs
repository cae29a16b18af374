use crate::store::{Correlation, ResultStore, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use handlehunt_scanner::SiteDefinition;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// SQLite-backed [`ResultStore`], plus the last-known site catalog.
pub struct Database {
    conn: Mutex<Connection>,
}

fn current_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn get_connection(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.lock()
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.lock()?.execute_batch(
            "
            -- One row per handle that has been searched
            CREATE TABLE IF NOT EXISTS searches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    handle TEXT NOT NULL UNIQUE,
    searched_at INTEGER NOT NULL
);

-- Confirmed matches; the site is keyed by (site_name, uri_template)
CREATE TABLE IF NOT EXISTS correlations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    search_id INTEGER NOT NULL,
    site_name TEXT NOT NULL,
    uri_template TEXT NOT NULL,
    category TEXT NOT NULL,
    found_at INTEGER NOT NULL,

    FOREIGN KEY(search_id) REFERENCES searches(id) ON DELETE CASCADE,
    UNIQUE(search_id, site_name, uri_template)
);

CREATE INDEX IF NOT EXISTS idx_correlations_search ON correlations(search_id);

-- Last catalog that was fetched successfully
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    uri_check TEXT NOT NULL,
    cat TEXT NOT NULL,
    valid BOOLEAN,
    created_at INTEGER NOT NULL,
    UNIQUE(name, uri_check)
);
            ",
        )?;
        Ok(())
    }

    fn search_id(conn: &Connection, handle: &str) -> StoreResult<Option<i64>> {
        let id = conn
            .query_row(
                "SELECT id FROM searches WHERE handle = ?1",
                params![handle],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // Catalog snapshot
    pub fn replace_catalog(&self, sites: &[SiteDefinition]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let timestamp = current_timestamp();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM sites", [])?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO sites (name, uri_check, cat, valid, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for site in sites {
                inserted += stmt.execute(params![
                    &site.name,
                    &site.uri_template,
                    &site.category,
                    site.validity,
                    timestamp,
                ])?;
            }
        }
        tx.commit()?;

        info!("Stored {} sites in the catalog snapshot", inserted);
        Ok(inserted)
    }

    pub fn load_catalog(&self) -> StoreResult<Vec<SiteDefinition>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name, uri_check, cat, valid FROM sites ORDER BY id")?;

        let sites = stmt
            .query_map([], |row| {
                Ok(SiteDefinition {
                    name: row.get(0)?,
                    uri_template: row.get(1)?,
                    category: row.get(2)?,
                    validity: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sites)
    }

    /// Every searched handle with its search time, newest first.
    pub fn list_searches(&self) -> StoreResult<Vec<(String, DateTime<Utc>)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT handle, searched_at FROM searches ORDER BY searched_at DESC, id DESC")?;

        let searches = stmt
            .query_map([], |row| {
                let handle: String = row.get(0)?;
                let searched_at: i64 = row.get(1)?;
                Ok((handle, from_millis(searched_at)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(searches)
    }
}

impl ResultStore for Database {
    fn has_search_record(&self, handle: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let searched = Self::search_id(&conn, handle)?.is_some();
        debug!("Handle '{}' searched before: {}", handle, searched);
        Ok(searched)
    }

    fn create_search_record(&self, handle: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO searches (handle, searched_at) VALUES (?1, ?2)",
            params![handle, current_timestamp()],
        )?;
        if inserted == 0 {
            warn!("Search record for '{}' already exists", handle);
        }
        Ok(())
    }

    fn delete_search_history(&self, handle: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        // correlations go with it through ON DELETE CASCADE
        let deleted = conn.execute("DELETE FROM searches WHERE handle = ?1", params![handle])?;
        debug!("Deleted {} search record(s) for '{}'", deleted, handle);
        Ok(())
    }

    fn record_correlation(&self, handle: &str, site: &SiteDefinition) -> StoreResult<()> {
        let conn = self.lock()?;
        let search_id = Self::search_id(&conn, handle)?
            .ok_or_else(|| StoreError::MissingSearchRecord(handle.to_string()))?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO correlations (search_id, site_name, uri_template, category, found_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                search_id,
                &site.name,
                &site.uri_template,
                &site.category,
                current_timestamp(),
            ],
        )?;
        if inserted == 0 {
            debug!("Correlation '{}' <-> '{}' already recorded", handle, site.name);
        }
        Ok(())
    }

    fn get_correlations(&self, handle: &str) -> StoreResult<Vec<Correlation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT c.site_name, c.uri_template, c.category, c.found_at, s.searched_at
             FROM correlations c
             JOIN searches s ON s.id = c.search_id
             WHERE s.handle = ?1
             ORDER BY c.id",
        )?;

        let correlations = stmt
            .query_map(params![handle], |row| {
                let found_at: i64 = row.get(3)?;
                let searched_at: i64 = row.get(4)?;
                Ok(Correlation {
                    handle: handle.to_string(),
                    site: SiteDefinition {
                        name: row.get(0)?,
                        uri_template: row.get(1)?,
                        category: row.get(2)?,
                        validity: None,
                    },
                    found_at: from_millis(found_at),
                    searched_at: from_millis(searched_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(correlations)
    }
}
