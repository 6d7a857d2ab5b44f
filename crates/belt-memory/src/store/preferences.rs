use super::Store;
use async_trait::async_trait;
use belt_core::{error::BeltError, traits::PreferenceStore};

#[async_trait]
impl PreferenceStore for Store {
    async fn store_preferences(
        &self,
        user_id: &str,
        preferences: &[(String, String)],
    ) -> Result<(), BeltError> {
        for (key, value) in preferences {
            sqlx::query(
                "INSERT INTO preferences (user_id, key, value) VALUES (?, ?, ?) \
                 ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            )
            .bind(user_id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| BeltError::Memory(format!("upsert preference failed: {e}")))?;
        }
        Ok(())
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Vec<(String, String)>, BeltError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM preferences WHERE user_id = ? ORDER BY key")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| BeltError::Memory(format!("query failed: {e}")))?;

        Ok(rows)
    }
}
