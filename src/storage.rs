use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::log::{hash_entry, verify_links, ChainLink, GENESIS_HASH};
use crate::now_s;
use crate::report::VerificationResponse;

/// One verification run as written to the evidence log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub created_at: u64,
    /// Video path or `stub://` scene that was verified.
    pub source: String,
    pub response: VerificationResponse,
}

impl EvidenceRecord {
    pub fn new(source: impl Into<String>, response: VerificationResponse) -> Result<Self> {
        Ok(Self {
            created_at: now_s()?,
            source: source.into(),
            response,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    pub created_at: i64,
    pub payload_json: String,
    pub prev_hash: [u8; 32],
    pub entry_hash: [u8; 32],
}

impl LogEntry {
    pub fn record(&self) -> Result<EvidenceRecord> {
        Ok(serde_json::from_str(&self.payload_json)?)
    }

    fn link(&self) -> ChainLink<'_> {
        ChainLink {
            id: self.id,
            payload: self.payload_json.as_bytes(),
            prev_hash: self.prev_hash,
            entry_hash: self.entry_hash,
        }
    }
}

/// Append-only, hash-chained evidence log.
pub trait EvidenceLog {
    /// Append a record; returns the new chain head.
    fn append(&mut self, record: &EvidenceRecord) -> Result<[u8; 32]>;

    /// All entries in append order.
    fn entries(&self) -> Result<Vec<LogEntry>>;

    /// Recompute the chain; returns the number of entries verified.
    fn verify_chain(&self) -> Result<u64> {
        verify_entries(&self.entries()?)
    }
}

pub fn verify_entries(entries: &[LogEntry]) -> Result<u64> {
    verify_links(entries.iter().map(LogEntry::link))
}

pub struct SqliteEvidenceLog {
    conn: Connection,
}

impl SqliteEvidenceLog {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut log = Self { conn };
        log.ensure_schema()?;
        Ok(log)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut log = Self { conn };
        log.ensure_schema()?;
        Ok(log)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS evidence_log (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              payload_json TEXT NOT NULL,
              prev_hash BLOB NOT NULL,
              entry_hash BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_evidence_created ON evidence_log(created_at);
            "#,
        )?;
        Ok(())
    }

    fn last_entry_hash(&self) -> Result<[u8; 32]> {
        let mut stmt = self
            .conn
            .prepare("SELECT entry_hash FROM evidence_log ORDER BY id DESC LIMIT 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => blob32(row, 0),
            None => Ok(GENESIS_HASH),
        }
    }
}

impl EvidenceLog for SqliteEvidenceLog {
    fn append(&mut self, record: &EvidenceRecord) -> Result<[u8; 32]> {
        let created_at = i64::try_from(record.created_at)
            .map_err(|_| anyhow!("record timestamp exceeds i64 range"))?;
        let prev_hash = self.last_entry_hash()?;
        let payload_json = serde_json::to_string(record)?;
        let entry_hash = hash_entry(&prev_hash, payload_json.as_bytes());

        self.conn.execute(
            r#"
            INSERT INTO evidence_log(created_at, payload_json, prev_hash, entry_hash)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![created_at, payload_json, prev_hash.to_vec(), entry_hash.to_vec()],
        )?;
        Ok(entry_hash)
    }

    fn entries(&self) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, payload_json, prev_hash, entry_hash FROM evidence_log ORDER BY id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(LogEntry {
                id: row.get(0)?,
                created_at: row.get(1)?,
                payload_json: row.get(2)?,
                prev_hash: blob32(row, 3)?,
                entry_hash: blob32(row, 4)?,
            });
        }
        Ok(out)
    }
}

fn blob32(row: &rusqlite::Row<'_>, idx: usize) -> Result<[u8; 32]> {
    let bytes: Vec<u8> = row.get(idx)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("corrupt evidence log: expected 32-byte hash, got {}", bytes.len()))
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryEvidenceLog {
    entries: Vec<LogEntry>,
}

impl EvidenceLog for InMemoryEvidenceLog {
    fn append(&mut self, record: &EvidenceRecord) -> Result<[u8; 32]> {
        let created_at = i64::try_from(record.created_at)
            .map_err(|_| anyhow!("record timestamp exceeds i64 range"))?;
        let prev_hash = self
            .entries
            .last()
            .map(|entry| entry.entry_hash)
            .unwrap_or(GENESIS_HASH);
        let payload_json = serde_json::to_string(record)?;
        let entry_hash = hash_entry(&prev_hash, payload_json.as_bytes());
        self.entries.push(LogEntry {
            id: self.entries.len() as i64 + 1,
            created_at,
            payload_json,
            prev_hash,
            entry_hash,
        });
        Ok(entry_hash)
    }

    fn entries(&self) -> Result<Vec<LogEntry>> {
        Ok(self.entries.clone())
    }
}
