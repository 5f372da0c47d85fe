//! Buffered message persistence.
//!
//! Every dispatched message is appended to an in-memory [`MessageStack`].
//! A background loop ([`MessageStack::run`]) drains the buffer into a
//! [`RecordSink`] on a fixed interval and once more on shutdown.
//!
//! Draining takes the whole buffer under the lock and writes it afterwards,
//! so inserts made while a write is in flight land in the next batch and no
//! record is written twice. A failed write is logged and its batch dropped.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use amber_core::Message;

/// Errors raised by record sinks.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The blocking write task did not complete.
    #[error("Record write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Any other sink failure.
    #[error("Record sink error: {0}")]
    Sink(String),
}

/// Result type for recorder operations.
pub type RecorderResult<T> = Result<T, RecorderError>;

/// `classify` value of a message some handler acted on.
pub const CLASSIFY_CALL: &str = "call";

/// One persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub msg_type: String,
    pub user_id: i64,
    pub group_id: Option<i64>,
    /// Raw text.
    pub text: String,
    /// Faces as `[face:<id>]` tokens.
    pub face: String,
    /// Image urls joined by commas.
    pub image: String,
    /// Rich payload as JSON, empty when absent.
    pub message: String,
    /// [`CLASSIFY_CALL`] when a handler ran, otherwise empty.
    pub classify: String,
    pub create_time: i64,
}

impl MessageRecord {
    /// Builds the record for `message`.
    pub fn from_message(message: &Message, effective: bool) -> Self {
        Self {
            msg_type: message.kind.as_str().to_string(),
            user_id: message.user_id,
            group_id: message.group_id,
            text: message.text_origin.clone(),
            face: message.face.iter().map(|id| format!("[face:{id}]")).collect(),
            image: message.image.join(","),
            message: message
                .payload
                .as_ref()
                .map(|payload| payload.to_string())
                .unwrap_or_default(),
            classify: if effective { CLASSIFY_CALL.to_string() } else { String::new() },
            create_time: message.time,
        }
    }
}

/// Destination of flushed records.
#[async_trait]
pub trait RecordSink: Send + Sync + 'static {
    /// Persists a batch, returning how many records were written.
    async fn write(&self, records: Vec<MessageRecord>) -> RecorderResult<usize>;
}

// =============================================================================
// SqliteSink
// =============================================================================

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS message_record (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        msg_type TEXT NOT NULL,
        user_id INTEGER NOT NULL,
        group_id INTEGER,
        text TEXT,
        face TEXT,
        image TEXT,
        message TEXT,
        classify TEXT,
        create_time INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_message_record_user_id ON message_record(user_id);
    CREATE INDEX IF NOT EXISTS idx_message_record_create_time ON message_record(create_time);
"#;

const INSERT_RECORD: &str = "INSERT INTO message_record \
    (msg_type, user_id, group_id, text, face, image, message, classify, create_time) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

/// Writes records into the `message_record` table of a SQLite database.
#[derive(Clone)]
pub struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSink {
    /// Opens (or creates) the database file and its table.
    pub fn open(path: impl AsRef<Path>) -> RecorderResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened message database");
        Self::with_connection(conn)
    }

    /// Creates a private in-memory database.
    pub fn in_memory() -> RecorderResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> RecorderResult<Self> {
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Returns the number of stored records.
    pub fn count(&self) -> RecorderResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM message_record", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Returns every stored record in insertion order.
    pub fn records(&self) -> RecorderResult<Vec<MessageRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT msg_type, user_id, group_id, text, face, image, message, classify, create_time \
             FROM message_record ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MessageRecord {
                msg_type: row.get(0)?,
                user_id: row.get(1)?,
                group_id: row.get(2)?,
                text: row.get(3)?,
                face: row.get(4)?,
                image: row.get(5)?,
                message: row.get(6)?,
                classify: row.get(7)?,
                create_time: row.get(8)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn write(&self, records: Vec<MessageRecord>) -> RecorderResult<usize> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> RecorderResult<usize> {
            let mut guard = conn.lock();
            let tx = guard.transaction()?;
            {
                let mut stmt = tx.prepare_cached(INSERT_RECORD)?;
                for r in &records {
                    stmt.execute(params![
                        r.msg_type,
                        r.user_id,
                        r.group_id,
                        r.text,
                        r.face,
                        r.image,
                        r.message,
                        r.classify,
                        r.create_time
                    ])?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
        .await?
    }
}

// =============================================================================
// MemorySink
// =============================================================================

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<MessageRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything written so far.
    pub fn records(&self) -> Vec<MessageRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write(&self, records: Vec<MessageRecord>) -> RecorderResult<usize> {
        let n = records.len();
        self.records.lock().extend(records);
        Ok(n)
    }
}

// =============================================================================
// MessageStack
// =============================================================================

/// The in-memory buffer in front of a [`RecordSink`].
pub struct MessageStack {
    buffer: Mutex<Vec<MessageRecord>>,
    sink: Arc<dyn RecordSink>,
}

impl MessageStack {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            sink,
        }
    }

    /// Buffers a record of `message`. `effective` marks that a handler ran.
    pub fn insert(&self, message: &Message, effective: bool) {
        self.buffer
            .lock()
            .push(MessageRecord::from_message(message, effective));
    }

    /// Returns the number of buffered records.
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Writes out everything buffered so far.
    ///
    /// Returns the number of records written; `0` when the buffer was empty
    /// or the write failed.
    pub async fn flush(&self) -> usize {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return 0;
        }

        let size = batch.len();
        match self.sink.write(batch).await {
            Ok(written) => {
                debug!(written, "Flushed message records");
                written
            }
            Err(e) => {
                warn!(error = %e, dropped = size, "Failed to write message records");
                0
            }
        }
    }

    /// Flushes every `period` until `cancel` fires, then flushes once more.
    ///
    /// A zero `period` disables the periodic flush; only the final one runs.
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        if period.is_zero() {
            warn!("Recorder interval is zero, flushing only on shutdown");
            cancel.cancelled().await;
        } else {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.flush().await;
                    }
                }
            }
        }

        let written = self.flush().await;
        debug!(written, "Message recorder stopped");
    }
}

impl std::fmt::Debug for MessageStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStack")
            .field("buffered", &self.len())
            .finish()
    }
}
