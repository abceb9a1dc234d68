use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::models::{EventRecord, Mode, TemplateDataMap};

/// Durable home of the log, the mode and the template data
pub trait LogStore: Send + Sync {
    fn load_records(&self) -> Result<Vec<EventRecord>>;

    /// Replace the stored log with `records`
    fn save_records(&self, records: &[EventRecord]) -> Result<()>;

    fn load_mode(&self) -> Result<Option<Mode>>;

    fn save_mode(&self, mode: Mode) -> Result<()>;

    fn load_templates(&self) -> Result<TemplateDataMap>;

    fn save_templates(&self, templates: &TemplateDataMap) -> Result<()>;
}

/// Columns of one `records` row
struct StoredRecord {
    uid: String,
    kind: String,
    target_id: String,
    url: String,
    tab_id: i64,
    window_id: i64,
    input_value: Option<String>,
    replayed: String,
    created_at: String,
}

/// SQLite-backed store
pub struct SqliteLogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLogStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            r#"
            -- Event log, ordered by position
            CREATE TABLE IF NOT EXISTS records (
                uid TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                kind TEXT NOT NULL,
                target_id TEXT NOT NULL,
                url TEXT NOT NULL,
                tab_id INTEGER NOT NULL,
                window_id INTEGER NOT NULL,
                input_value TEXT,
                replayed TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_position ON records(position);

            -- Key/value settings (mode)
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Placeholder substitutions
            CREATE TABLE IF NOT EXISTS templates (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }
}

impl LogStore for SqliteLogStore {
    fn load_records(&self) -> Result<Vec<EventRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT uid, kind, target_id, url, tab_id, window_id, input_value, replayed, created_at
            FROM records ORDER BY position ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(StoredRecord {
                uid: row.get(0)?,
                kind: row.get(1)?,
                target_id: row.get(2)?,
                url: row.get(3)?,
                tab_id: row.get(4)?,
                window_id: row.get(5)?,
                input_value: row.get(6)?,
                replayed: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            let row = row?;
            let kind = match row.kind.parse() {
                Ok(kind) => kind,
                Err(()) => {
                    tracing::warn!("Skipping stored record {} with unknown kind '{}'", row.uid, row.kind);
                    continue;
                }
            };
            records.push(EventRecord {
                uid: row.uid,
                kind,
                target_id: row.target_id,
                url: row.url,
                tab_id: row.tab_id,
                window_id: row.window_id,
                input_value: row.input_value,
                replayed: row.replayed.parse().unwrap_or_default(),
                created_at: chrono::DateTime::parse_from_rfc3339(&row.created_at)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now()),
            });
        }
        Ok(records)
    }

    fn save_records(&self, records: &[EventRecord]) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM records", [])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO records (uid, position, kind, target_id, url, tab_id, window_id,
                                     input_value, replayed, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;
            for (position, record) in records.iter().enumerate() {
                stmt.execute(params![
                    record.uid,
                    position as i64,
                    record.kind.as_str(),
                    record.target_id,
                    record.url,
                    record.tab_id,
                    record.window_id,
                    record.input_value,
                    record.replayed.as_str(),
                    record.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_mode(&self) -> Result<Option<Mode>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let value: Option<String> = conn
            .query_row("SELECT value FROM settings WHERE key = 'mode'", [], |row| row.get(0))
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    fn save_mode(&self, mode: Mode) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES ('mode', ?1) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![mode.as_str()],
        )?;
        Ok(())
    }

    fn load_templates(&self) -> Result<TemplateDataMap> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let mut stmt = conn.prepare("SELECT key, value FROM templates")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut templates = TemplateDataMap::new();
        for row in rows {
            let (key, value) = row?;
            templates.insert(key, value);
        }
        Ok(templates)
    }

    fn save_templates(&self, templates: &TemplateDataMap) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM templates", [])?;
        for (key, value) in templates {
            tx.execute(
                "INSERT INTO templates (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Store that keeps everything in process memory
#[derive(Default)]
pub struct MemoryLogStore {
    records: Mutex<Vec<EventRecord>>,
    mode: Mutex<Option<Mode>>,
    templates: Mutex<TemplateDataMap>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn load_records(&self) -> Result<Vec<EventRecord>> {
        Ok(self.records.lock().map_err(|e| anyhow!("Lock error: {}", e))?.clone())
    }

    fn save_records(&self, records: &[EventRecord]) -> Result<()> {
        *self.records.lock().map_err(|e| anyhow!("Lock error: {}", e))? = records.to_vec();
        Ok(())
    }

    fn load_mode(&self) -> Result<Option<Mode>> {
        Ok(*self.mode.lock().map_err(|e| anyhow!("Lock error: {}", e))?)
    }

    fn save_mode(&self, mode: Mode) -> Result<()> {
        *self.mode.lock().map_err(|e| anyhow!("Lock error: {}", e))? = Some(mode);
        Ok(())
    }

    fn load_templates(&self) -> Result<TemplateDataMap> {
        Ok(self.templates.lock().map_err(|e| anyhow!("Lock error: {}", e))?.clone())
    }

    fn save_templates(&self, templates: &TemplateDataMap) -> Result<()> {
        *self.templates.lock().map_err(|e| anyhow!("Lock error: {}", e))? = templates.clone();
        Ok(())
    }
}
