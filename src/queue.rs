use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::error::Result;

/// Work messages, one per submitted job.
pub const WORK_QUEUE: &str = "translation_queue";

/// Best-effort progress notifications.
pub const STATUS_QUEUE: &str = "translation_status";

/// Highest priority a message can carry; anything above is capped.
pub const MAX_PRIORITY: u8 = 10;

/// Durable named message queues over a dedicated SQLite file.
///
/// Contract: `publish` enqueues, `receive` claims the highest-priority ready
/// message (FIFO within a priority), `ack` removes it, `nack` returns it for
/// redelivery. Claimed messages survive a crash as `unacked` rows; a consumer
/// calls `recover_unacked` at startup to make them deliverable again.
/// Delivery is therefore at-least-once. Consumers are expected to hold at
/// most one unacked message at a time.
#[derive(Clone)]
pub struct Queue {
    conn: Arc<Mutex<Connection>>,
}

/// A claimed message. Hand it back to `ack` or `nack` exactly once.
#[derive(Debug)]
pub struct Delivery {
    pub id: i64,
    pub body: String,
}

impl Queue {
    pub fn open(queue_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(queue_path)
            .context(format!("Failed to open queue at {}", queue_path))?;

        // Producers and the consumer open this file from separate processes
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                queue TEXT NOT NULL,
                body TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'ready',
                enqueued_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create messages table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_receive
             ON messages (queue, state, priority, id)",
            [],
        )
        .context("Failed to create messages index")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn publish<T: Serialize>(&self, queue: &str, message: &T, priority: u8) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (queue, body, priority, state, enqueued_at)
             VALUES (?1, ?2, ?3, 'ready', ?4)",
            params![queue, body, priority.min(MAX_PRIORITY) as i64, Utc::now()],
        )?;
        Ok(())
    }

    /// Claim the next ready message, if any. The claim is a conditional
    /// update, so two consumers can never hold the same delivery.
    pub fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let conn = self.conn.lock().unwrap();
        let next = conn
            .query_row(
                "SELECT id, body FROM messages
                 WHERE queue = ?1 AND state = 'ready'
                 ORDER BY priority DESC, id ASC LIMIT 1",
                params![queue],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((id, body)) = next else {
            return Ok(None);
        };

        let claimed = conn.execute(
            "UPDATE messages SET state = 'unacked' WHERE id = ?1 AND state = 'ready'",
            params![id],
        )?;
        if claimed == 0 {
            return Ok(None);
        }

        Ok(Some(Delivery { id, body }))
    }

    /// Positive acknowledgement: the message is done and removed.
    pub fn ack(&self, delivery: &Delivery) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM messages WHERE id = ?1", params![delivery.id])?;
        Ok(())
    }

    /// Negative acknowledgement: the message becomes ready again and will be
    /// redelivered.
    pub fn nack(&self, delivery: &Delivery) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET state = 'ready' WHERE id = ?1",
            params![delivery.id],
        )?;
        Ok(())
    }

    /// Make messages left unacked by a dead consumer deliverable again.
    /// Called once at consumer startup.
    pub fn recover_unacked(&self, queue: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE messages SET state = 'ready' WHERE queue = ?1 AND state = 'unacked'",
            params![queue],
        )?;
        Ok(rows)
    }

    /// Messages still in the queue, ready or claimed.
    pub fn depth(&self, queue: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE queue = ?1",
            params![queue],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    // ==================== Helper Functions ====================

    fn create_test_queue() -> (Queue, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let queue_path = temp_dir.path().join("test_queue.db");
        let queue = Queue::open(queue_path.to_str().unwrap()).expect("Failed to open queue");
        (queue, temp_dir)
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        text: String,
    }

    fn note(text: &str) -> Note {
        Note {
            text: text.to_string(),
        }
    }

    // ==================== Publish / Receive Tests ====================

    #[test]
    fn test_publish_and_receive_roundtrip() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("q", &note("hello"), 0).expect("publish");

        let delivery = queue.receive("q").expect("receive").expect("has message");
        let parsed: Note = serde_json::from_str(&delivery.body).expect("parse");
        assert_eq!(parsed, note("hello"));
    }

    #[test]
    fn test_receive_empty_queue() {
        let (queue, _temp_dir) = create_test_queue();
        assert!(queue.receive("q").expect("receive").is_none());
    }

    #[test]
    fn test_receive_claims_message() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("q", &note("only"), 0).expect("publish");

        let first = queue.receive("q").expect("receive");
        assert!(first.is_some());

        // Claimed but unacked: not deliverable again
        let second = queue.receive("q").expect("receive");
        assert!(second.is_none());
    }

    #[test]
    fn test_queues_are_isolated() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("a", &note("for-a"), 0).expect("publish");

        assert!(queue.receive("b").expect("receive").is_none());
        assert!(queue.receive("a").expect("receive").is_some());
    }

    // ==================== Ack / Nack Tests ====================

    #[test]
    fn test_ack_removes_message() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("q", &note("done"), 0).expect("publish");
        let delivery = queue.receive("q").expect("receive").expect("has message");

        queue.ack(&delivery).expect("ack");

        assert_eq!(queue.depth("q").expect("depth"), 0);
        assert!(queue.receive("q").expect("receive").is_none());
    }

    #[test]
    fn test_nack_redelivers_message() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("q", &note("retry-me"), 0).expect("publish");
        let delivery = queue.receive("q").expect("receive").expect("has message");

        queue.nack(&delivery).expect("nack");

        let redelivered = queue.receive("q").expect("receive").expect("redelivered");
        assert_eq!(redelivered.id, delivery.id);
        assert_eq!(redelivered.body, delivery.body);
    }

    // ==================== Ordering Tests ====================

    #[test]
    fn test_priority_order() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("q", &note("low"), 0).expect("publish");
        queue.publish("q", &note("high"), 10).expect("publish");
        queue.publish("q", &note("mid"), 5).expect("publish");

        let order: Vec<String> = (0..3)
            .map(|_| {
                let d = queue.receive("q").expect("receive").expect("message");
                let parsed: Note = serde_json::from_str(&d.body).expect("parse");
                queue.ack(&d).expect("ack");
                parsed.text
            })
            .collect();

        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_fifo_within_priority() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("q", &note("first"), 3).expect("publish");
        queue.publish("q", &note("second"), 3).expect("publish");

        let d1 = queue.receive("q").expect("receive").expect("message");
        let parsed: Note = serde_json::from_str(&d1.body).expect("parse");
        assert_eq!(parsed.text, "first");
    }

    #[test]
    fn test_priority_is_capped() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("q", &note("first-max"), 10).expect("publish");
        queue.publish("q", &note("over-max"), 200).expect("publish");

        // 200 caps to 10; FIFO applies at equal priority
        let d = queue.receive("q").expect("receive").expect("message");
        let parsed: Note = serde_json::from_str(&d.body).expect("parse");
        assert_eq!(parsed.text, "first-max");
    }

    // ==================== Durability Tests ====================

    #[test]
    fn test_messages_survive_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let queue_path = temp_dir.path().join("durable.db");
        let path_str = queue_path.to_str().unwrap();

        {
            let queue = Queue::open(path_str).expect("open");
            queue.publish("q", &note("persistent"), 0).expect("publish");
        }

        {
            let queue = Queue::open(path_str).expect("reopen");
            let delivery = queue.receive("q").expect("receive").expect("survived");
            let parsed: Note = serde_json::from_str(&delivery.body).expect("parse");
            assert_eq!(parsed.text, "persistent");
        }
    }

    #[test]
    fn test_recover_unacked_after_consumer_crash() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let queue_path = temp_dir.path().join("crash.db");
        let path_str = queue_path.to_str().unwrap();

        {
            let queue = Queue::open(path_str).expect("open");
            queue.publish("q", &note("in-flight"), 0).expect("publish");
            // Claimed but never acked: the consumer died here
            queue.receive("q").expect("receive").expect("claimed");
        }

        {
            let queue = Queue::open(path_str).expect("reopen");
            assert!(
                queue.receive("q").expect("receive").is_none(),
                "Unacked message stays claimed until recovery"
            );

            let recovered = queue.recover_unacked("q").expect("recover");
            assert_eq!(recovered, 1);

            let delivery = queue.receive("q").expect("receive").expect("redelivered");
            let parsed: Note = serde_json::from_str(&delivery.body).expect("parse");
            assert_eq!(parsed.text, "in-flight");
        }
    }

    #[test]
    fn test_recover_unacked_only_touches_named_queue() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("a", &note("a1"), 0).expect("publish");
        queue.publish("b", &note("b1"), 0).expect("publish");
        queue.receive("a").expect("receive").expect("claim a");
        queue.receive("b").expect("receive").expect("claim b");

        let recovered = queue.recover_unacked("a").expect("recover");
        assert_eq!(recovered, 1);

        assert!(queue.receive("a").expect("receive").is_some());
        assert!(queue.receive("b").expect("receive").is_none());
    }

    // ==================== Depth Tests ====================

    #[test]
    fn test_depth_counts_ready_and_claimed() {
        let (queue, _temp_dir) = create_test_queue();

        queue.publish("q", &note("one"), 0).expect("publish");
        queue.publish("q", &note("two"), 0).expect("publish");
        assert_eq!(queue.depth("q").expect("depth"), 2);

        let delivery = queue.receive("q").expect("receive").expect("message");
        assert_eq!(queue.depth("q").expect("depth"), 2, "Claimed still counted");

        queue.ack(&delivery).expect("ack");
        assert_eq!(queue.depth("q").expect("depth"), 1);
    }

    #[test]
    fn test_queue_clone_shares_storage() {
        let (queue, _temp_dir) = create_test_queue();
        let clone = queue.clone();

        queue.publish("q", &note("shared"), 0).expect("publish");
        assert!(clone.receive("q").expect("receive").is_some());
    }
}
