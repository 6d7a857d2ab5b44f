//! Call history.

use super::Store;
use crate::sessions::CallLogEntry;
use async_trait::async_trait;
use belt_core::{
    action::{CallStatus, CallTranscript},
    error::BeltError,
    session::CallRecord,
    traits::CallLog,
};

type CallLogRow = (
    String,
    String,
    String,
    String,
    i64,
    String,
    Option<String>,
    Option<i64>,
    Option<String>,
);

impl Store {
    /// Most recent calls for a user, newest first.
    pub async fn recent_calls(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<CallLogEntry>, BeltError> {
        let rows: Vec<CallLogRow> = sqlx::query_as(
            "SELECT call_id, user_id, phone, purpose, attempts, status, ended_reason, \
             duration_secs, summary FROM call_log \
             WHERE user_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BeltError::Memory(format!("query failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(
                |(call_id, user_id, phone, purpose, attempts, status, ended_reason, duration, summary)| {
                    CallLogEntry {
                        call_id,
                        user_id,
                        phone,
                        purpose,
                        attempts: attempts.max(0) as u32,
                        status: CallStatus::parse(&status),
                        ended_reason,
                        duration_secs: duration.map(|d| d.max(0) as u64),
                        summary,
                    }
                },
            )
            .collect())
    }
}

#[async_trait]
impl CallLog for Store {
    async fn log_call_started(&self, record: &CallRecord) -> Result<(), BeltError> {
        sqlx::query(
            "INSERT OR REPLACE INTO call_log \
             (call_id, user_id, phone, purpose, attempts, status, started_at) \
             VALUES (?, ?, ?, ?, ?, 'queued', ?)",
        )
        .bind(&record.call_id)
        .bind(&record.user_id)
        .bind(&record.phone)
        .bind(&record.purpose)
        .bind(i64::from(record.attempt_count))
        .bind(record.started_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| BeltError::Memory(format!("log call failed: {e}")))?;

        Ok(())
    }

    async fn log_call_finished(
        &self,
        call_id: &str,
        status: CallStatus,
        ended_reason: Option<&str>,
        transcript: &CallTranscript,
    ) -> Result<(), BeltError> {
        let summary = Some(transcript.summary.as_str()).filter(|s| !s.is_empty());
        let result = sqlx::query(
            "UPDATE call_log SET status = ?, ended_reason = ?, duration_secs = ?, summary = ?, \
             finished_at = datetime('now') WHERE call_id = ?",
        )
        .bind(status.as_str())
        .bind(ended_reason)
        .bind(transcript.duration_secs.map(|d| d as i64))
        .bind(summary)
        .bind(call_id)
        .execute(&self.pool)
        .await
        .map_err(|e| BeltError::Memory(format!("update call failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(BeltError::Memory(format!("unknown call {call_id}")));
        }
        Ok(())
    }
}
