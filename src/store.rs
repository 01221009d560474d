use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::trace;

use crate::db::now_timestamp;
use crate::errors::{AppError, AppResult};
use crate::places::{NewPlace, PlaceKey, PlaceRecord};

/// Persistence seam used by the aggregator and the region query service.
pub trait PlaceStore: Send + Sync {
    fn exists_by_key(&self, key: PlaceKey<'_>) -> AppResult<bool>;

    /// Inserts the batch in one atomic write, skipping keys that are already
    /// stored. Returns the number of rows written.
    fn bulk_insert(&self, records: &[NewPlace]) -> AppResult<usize>;

    fn find_by_region(&self, region: &str) -> AppResult<Vec<PlaceRecord>>;

    fn find_all(&self) -> AppResult<Vec<PlaceRecord>>;

    fn count(&self) -> AppResult<usize>;
}

#[derive(Clone)]
pub struct SqlitePlaceStore {
    db: Arc<Mutex<Connection>>,
}

const SELECT_COLUMNS: &str = "SELECT id, name, category, address, phone, longitude, latitude, region, place_url, image_url FROM restaurants";

impl SqlitePlaceStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> AppResult<Vec<PlaceRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| parse_record(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl PlaceStore for SqlitePlaceStore {
    fn exists_by_key(&self, key: PlaceKey<'_>) -> AppResult<bool> {
        let conn = self.db.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM restaurants WHERE name = ?1 AND address = ?2)",
            (key.name, key.address),
            |row| row.get(0),
        )
        .map_err(AppError::from)
    }

    fn bulk_insert(&self, records: &[NewPlace]) -> AppResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let created_at = now_timestamp();
        let mut inserted = 0;
        {
            // Rows whose key landed since the caller's check are skipped, not duplicated.
            let mut stmt = tx.prepare(
                "INSERT INTO restaurants
                    (name, category, address, phone, longitude, latitude, region, place_url, image_url, created_at)
                SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
                WHERE NOT EXISTS (SELECT 1 FROM restaurants WHERE name = ?1 AND address = ?3)",
            )?;
            for record in records {
                inserted += stmt.execute(params![
                    record.name,
                    record.category,
                    record.address,
                    record.phone,
                    record.longitude,
                    record.latitude,
                    record.region,
                    record.source_url,
                    record.image_url,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;

        trace!(inserted, skipped = records.len() - inserted, "restaurant batch committed");
        Ok(inserted)
    }

    fn find_by_region(&self, region: &str) -> AppResult<Vec<PlaceRecord>> {
        self.query_records(
            &format!("{SELECT_COLUMNS} WHERE region = ?1 ORDER BY id ASC"),
            [region],
        )
    }

    fn find_all(&self) -> AppResult<Vec<PlaceRecord>> {
        self.query_records(&format!("{SELECT_COLUMNS} ORDER BY id ASC"), [])
    }

    fn count(&self) -> AppResult<usize> {
        let conn = self.db.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM restaurants", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlaceRecord> {
    Ok(PlaceRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        address: row.get(3)?,
        phone: row.get(4)?,
        longitude: row.get(5)?,
        latitude: row.get(6)?,
        region: row.get(7)?,
        source_url: row.get(8)?,
        image_url: row.get(9)?,
    })
}
