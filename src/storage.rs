use anyhow::{anyhow, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::record::{count_from_f64, parse_car_count, CameraRecord};

/// Database file name under the data directory.
pub const RECORD_DB_FILE: &str = "out.db";

/// Persistent table of cameras and their latest vehicle counts.
///
/// `list` returns records in feed order. Stored counts that cannot be read
/// as a whole number come back as `car_count: None`.
pub trait RecordStore {
    fn list(&mut self) -> Result<Vec<CameraRecord>>;

    fn get(&mut self, id: &str) -> Result<Option<CameraRecord>>;

    fn update(&mut self, id: &str, car_count: u32) -> Result<()>;

    fn persist(&mut self) -> Result<()>;

    /// Replace the whole table with a fresh camera list. Counts carried by
    /// `records` are kept as given.
    fn replace_all(&mut self, records: &[CameraRecord]) -> Result<()>;
}

pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open record store {}", db_path.display()))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        // car_count has no declared type so foreign values survive a
        // round-trip untouched and are coerced on read.
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS cameras (
              seq INTEGER PRIMARY KEY AUTOINCREMENT,
              id TEXT NOT NULL UNIQUE,
              name TEXT NOT NULL,
              latitude REAL NOT NULL,
              longitude REAL NOT NULL,
              imageUrl TEXT NOT NULL,
              car_count
            );
            "#,
        )?;
        Ok(())
    }

    fn query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<CameraRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let raw: Value = row.get(5)?;
            let car_count = coerce_count(&id, &raw);
            out.push(CameraRecord {
                id,
                name: row.get(1)?,
                latitude: row.get(2)?,
                longitude: row.get(3)?,
                image_url: row.get(4)?,
                car_count,
            });
        }
        Ok(out)
    }
}

impl RecordStore for SqliteRecordStore {
    fn list(&mut self) -> Result<Vec<CameraRecord>> {
        self.query(
            "SELECT id, name, latitude, longitude, imageUrl, car_count FROM cameras ORDER BY seq ASC",
            &[],
        )
    }

    fn get(&mut self, id: &str) -> Result<Option<CameraRecord>> {
        let mut found = self.query(
            "SELECT id, name, latitude, longitude, imageUrl, car_count FROM cameras WHERE id = ?1",
            &[&id],
        )?;
        Ok(found.pop())
    }

    fn update(&mut self, id: &str, car_count: u32) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE cameras SET car_count = ?1 WHERE id = ?2",
            params![car_count as i64, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("no camera with id {}", id));
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        // Every update is already committed; fold the WAL back into the
        // main file so the database can be copied on its own.
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .context("checkpoint record store")?;
        Ok(())
    }

    fn replace_all(&mut self, records: &[CameraRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM cameras", [])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO cameras(id, name, latitude, longitude, imageUrl, car_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for record in records {
                stmt.execute(params![
                    record.id,
                    record.name,
                    record.latitude,
                    record.longitude,
                    record.image_url,
                    record.car_count.map(i64::from)
                ])
                .with_context(|| format!("insert camera {}", record.id))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn coerce_count(id: &str, raw: &Value) -> Option<u32> {
    let parsed = match raw {
        Value::Null => return None,
        Value::Integer(v) => u32::try_from(*v).ok(),
        Value::Real(v) => count_from_f64(*v),
        Value::Text(s) => parse_car_count(s),
        Value::Blob(_) => None,
    };
    if parsed.is_none() {
        log::warn!("camera {}: unreadable car_count {:?}, treating as unset", id, raw);
    }
    parsed
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryRecordStore {
    records: Vec<CameraRecord>,
    persisted: usize,
}

impl InMemoryRecordStore {
    pub fn new(records: Vec<CameraRecord>) -> Self {
        Self {
            records,
            persisted: 0,
        }
    }

    /// How many times `persist` has been called.
    pub fn persist_count(&self) -> usize {
        self.persisted
    }
}

impl RecordStore for InMemoryRecordStore {
    fn list(&mut self) -> Result<Vec<CameraRecord>> {
        Ok(self.records.clone())
    }

    fn get(&mut self, id: &str) -> Result<Option<CameraRecord>> {
        Ok(self.records.iter().find(|r| r.id == id).cloned())
    }

    fn update(&mut self, id: &str, car_count: u32) -> Result<()> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("no camera with id {}", id))?;
        record.car_count = Some(car_count);
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        self.persisted += 1;
        Ok(())
    }

    fn replace_all(&mut self, records: &[CameraRecord]) -> Result<()> {
        self.records = records.to_vec();
        Ok(())
    }
}
