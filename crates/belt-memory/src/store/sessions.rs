//! Pending confirmations, wizards and in-flight calls.

use super::Store;
use async_trait::async_trait;
use belt_core::{
    error::BeltError,
    message::ChatContext,
    session::{CallRecord, PendingConfirmation, WizardState},
    traits::SessionStore,
};
use chrono::{DateTime, Utc};

type ConfirmationRow = (String, String, String, String, String, String);

fn confirmation_from_row(row: ConfirmationRow) -> Result<PendingConfirmation, BeltError> {
    let (token, user_id, channel, reply_target, pending_message, created_at) = row;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| BeltError::Memory(format!("bad created_at on {token}: {e}")))?
        .with_timezone(&Utc);
    Ok(PendingConfirmation {
        token,
        user_id,
        chat_context: ChatContext {
            channel,
            reply_target,
        },
        pending_message,
        created_at,
    })
}

#[async_trait]
impl SessionStore for Store {
    async fn put_confirmation(&self, pending: PendingConfirmation) -> Result<(), BeltError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| BeltError::Memory(format!("begin failed: {e}")))?;

        sqlx::query("DELETE FROM pending_confirmations WHERE user_id = ?")
            .bind(&pending.user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| BeltError::Memory(format!("clear confirmation failed: {e}")))?;

        sqlx::query(
            "INSERT INTO pending_confirmations \
             (token, user_id, channel, reply_target, pending_message, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&pending.token)
        .bind(&pending.user_id)
        .bind(&pending.chat_context.channel)
        .bind(&pending.chat_context.reply_target)
        .bind(&pending.pending_message)
        .bind(pending.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| BeltError::Memory(format!("insert confirmation failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| BeltError::Memory(format!("commit failed: {e}")))?;
        Ok(())
    }

    async fn take_confirmation(
        &self,
        user_id: &str,
    ) -> Result<Option<PendingConfirmation>, BeltError> {
        let row: Option<ConfirmationRow> = sqlx::query_as(
            "DELETE FROM pending_confirmations WHERE user_id = ? \
             RETURNING token, user_id, channel, reply_target, pending_message, created_at",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BeltError::Memory(format!("take confirmation failed: {e}")))?;

        row.map(confirmation_from_row).transpose()
    }

    async fn peek_confirmation(
        &self,
        user_id: &str,
    ) -> Result<Option<PendingConfirmation>, BeltError> {
        let row: Option<ConfirmationRow> = sqlx::query_as(
            "SELECT token, user_id, channel, reply_target, pending_message, created_at \
             FROM pending_confirmations WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BeltError::Memory(format!("query failed: {e}")))?;

        row.map(confirmation_from_row).transpose()
    }

    async fn put_wizard(&self, state: WizardState) -> Result<(), BeltError> {
        let json = serde_json::to_string(&state)?;
        sqlx::query(
            "INSERT INTO wizards (user_id, state) VALUES (?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET state = excluded.state, updated_at = datetime('now')",
        )
        .bind(&state.user_id)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| BeltError::Memory(format!("upsert wizard failed: {e}")))?;
        Ok(())
    }

    async fn get_wizard(&self, user_id: &str) -> Result<Option<WizardState>, BeltError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT state FROM wizards WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BeltError::Memory(format!("query failed: {e}")))?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove_wizard(&self, user_id: &str) -> Result<Option<WizardState>, BeltError> {
        let row: Option<(String,)> =
            sqlx::query_as("DELETE FROM wizards WHERE user_id = ? RETURNING state")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| BeltError::Memory(format!("delete wizard failed: {e}")))?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_call(&self, record: CallRecord) -> Result<(), BeltError> {
        let json = serde_json::to_string(&record)?;
        sqlx::query(
            "INSERT INTO active_calls (call_id, record) VALUES (?, ?) \
             ON CONFLICT(call_id) DO UPDATE SET record = excluded.record",
        )
        .bind(&record.call_id)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| BeltError::Memory(format!("upsert call failed: {e}")))?;
        Ok(())
    }

    async fn remove_call(&self, call_id: &str) -> Result<Option<CallRecord>, BeltError> {
        let row: Option<(String,)> =
            sqlx::query_as("DELETE FROM active_calls WHERE call_id = ? RETURNING record")
                .bind(call_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| BeltError::Memory(format!("delete call failed: {e}")))?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn active_calls(&self) -> Result<Vec<CallRecord>, BeltError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT record FROM active_calls")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BeltError::Memory(format!("query failed: {e}")))?;

        let mut calls = rows
            .into_iter()
            .map(|(json,)| serde_json::from_str::<CallRecord>(&json))
            .collect::<Result<Vec<_>, _>>()?;
        calls.sort_by_key(|c| c.started_at);
        Ok(calls)
    }
}
