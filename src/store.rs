//! Record Store
//!
//! SQLite persistence for users, the append-only message log, and
//! usage action records. All access goes through a single mutex-guarded
//! connection; the quota path additionally uses a guarded INSERT so the
//! window cap holds even against another process on the same database.

use crate::clones::CloneKind;
use crate::plans::PlanTier;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// A registered user, owned by the subscription backend.
/// Read-only here except for the credit balance.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub phone: String,
    pub email: Option<String>,
    pub plan: PlanTier,
    pub credits: i64,
}

/// Message direction relative to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// One row of the append-only message log
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub sid: String,
    pub from_number: String,
    pub to_number: String,
    pub body: String,
    pub direction: Direction,
    pub status: String,
    pub clone: Option<CloneKind>,
    pub created_at: i64,
}

/// Record store with SQLite backend
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Open or create the gateway database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        info!("Record store opened: {}", path.display());
        Ok(store)
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone TEXT NOT NULL UNIQUE,
                email TEXT,
                plan TEXT NOT NULL DEFAULT 'free',
                credits INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL DEFAULT (unixepoch())
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sid TEXT NOT NULL,
                from_number TEXT NOT NULL,
                to_number TEXT NOT NULL,
                body TEXT NOT NULL,
                direction TEXT NOT NULL CHECK(direction IN ('inbound', 'outbound')),
                status TEXT NOT NULL,
                clone TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS usage_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                clone TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_from_time
                ON messages(from_number, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_usage_user_action_time
                ON usage_actions(user_id, action, created_at);
            "#,
        )?;
        Ok(())
    }

    /// Look up a user by phone number (the unique inbound lookup key)
    pub fn find_user_by_phone(&self, phone: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, phone, email, plan, credits FROM users WHERE phone = ?1",
                params![phone],
                Self::map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Look up a user by email (billing entry points resolve users this way)
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, phone, email, plan, credits FROM users WHERE email = ?1",
                params![email],
                Self::map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Register a user. User provisioning belongs to the subscription
    /// backend; this exists for bootstrapping and tests.
    pub fn insert_user(
        &self,
        phone: &str,
        email: Option<&str>,
        plan: PlanTier,
        credits: i64,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (phone, email, plan, credits, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                phone,
                email,
                plan.as_str(),
                credits,
                chrono::Utc::now().timestamp()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Append a message to the log. Rows are immutable after creation.
    pub fn log_message(&self, msg: &MessageRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (sid, from_number, to_number, body, direction, status, clone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                msg.sid,
                msg.from_number,
                msg.to_number,
                msg.body,
                msg.direction.as_str(),
                msg.status,
                msg.clone.map(|c| c.as_str()),
                msg.created_at,
            ],
        )?;
        debug!("Logged {} message {}", msg.direction.as_str(), msg.sid);
        Ok(())
    }

    /// Message history involving a phone number, newest first
    pub fn message_history(&self, number: &str, limit: usize) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT sid, from_number, to_number, body, direction, status, clone, created_at
             FROM messages
             WHERE from_number = ?1 OR to_number = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![number, limit], |row| {
                let direction: String = row.get(4)?;
                let clone: Option<String> = row.get(6)?;
                Ok(MessageRecord {
                    sid: row.get(0)?,
                    from_number: row.get(1)?,
                    to_number: row.get(2)?,
                    body: row.get(3)?,
                    direction: if direction == "outbound" {
                        Direction::Outbound
                    } else {
                        Direction::Inbound
                    },
                    status: row.get(5)?,
                    clone: clone.as_deref().map(CloneKind::parse),
                    created_at: row.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// Count a user's actions of a given type since `since` (unix seconds)
    pub fn count_actions_since(&self, user_id: i64, action: &str, since: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM usage_actions
             WHERE user_id = ?1 AND action = ?2 AND created_at >= ?3",
            params![user_id, action, since],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Append an action record unconditionally (unlimited tiers)
    pub fn record_action(
        &self,
        user_id: i64,
        action: &str,
        clone: Option<CloneKind>,
        at: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO usage_actions (user_id, action, clone, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, action, clone.map(|c| c.as_str()), at],
        )?;
        Ok(())
    }

    /// Append an action record only while the windowed count is below
    /// `limit`. The count and insert run as one statement, so two
    /// concurrent requests cannot both slip under the cap. Returns
    /// whether the row was inserted.
    pub fn try_record_action(
        &self,
        user_id: i64,
        action: &str,
        clone: Option<CloneKind>,
        at: i64,
        since: i64,
        limit: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT INTO usage_actions (user_id, action, clone, created_at)
             SELECT ?1, ?2, ?3, ?4
             WHERE (SELECT COUNT(*) FROM usage_actions
                    WHERE user_id = ?1 AND action = ?2 AND created_at >= ?5) < ?6",
            params![user_id, action, clone.map(|c| c.as_str()), at, since, limit],
        )?;
        Ok(inserted == 1)
    }

    /// Decrement a user's credit balance. Returns the new balance, or
    /// `None` if the balance was insufficient (balance never goes
    /// negative).
    pub fn consume_credits(&self, user_id: i64, amount: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET credits = credits - ?2
             WHERE id = ?1 AND credits >= ?2",
            params![user_id, amount],
        )?;

        if updated == 0 {
            return Ok(None);
        }

        let balance = conn.query_row(
            "SELECT credits FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(Some(balance))
    }

    fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
        let plan: String = row.get(3)?;
        Ok(UserRecord {
            id: row.get(0)?,
            phone: row.get(1)?,
            email: row.get(2)?,
            plan: PlanTier::parse(&plan),
            credits: row.get(4)?,
        })
    }
}
