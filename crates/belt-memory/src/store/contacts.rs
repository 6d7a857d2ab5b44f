//! Per-user contact directory.

use super::Store;
use async_trait::async_trait;
use belt_core::{action::Contact, error::BeltError, traits::ContactDirectory};
use uuid::Uuid;

type ContactRow = (String, Option<String>, Option<String>);

/// `LIKE` pattern matching names that start with `needle` literally.
fn prefix_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 1);
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Store {
    /// Add or update a contact (upsert by user + name).
    pub async fn add_contact(&self, user_id: &str, contact: &Contact) -> Result<(), BeltError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO contacts (id, user_id, name, phone, email) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(user_id, name) DO UPDATE SET phone = excluded.phone, email = excluded.email",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(&contact.email)
        .execute(&self.pool)
        .await
        .map_err(|e| BeltError::Memory(format!("upsert contact failed: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for Store {
    /// Exact case-insensitive match first, then the first name starting with `name`.
    async fn find_by_name(&self, user_id: &str, name: &str) -> Result<Option<Contact>, BeltError> {
        let needle = name.trim();
        if needle.is_empty() {
            return Ok(None);
        }

        let exact: Option<ContactRow> = sqlx::query_as(
            "SELECT name, phone, email FROM contacts \
             WHERE user_id = ? AND lower(name) = lower(?) LIMIT 1",
        )
        .bind(user_id)
        .bind(needle)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BeltError::Memory(format!("contact lookup failed: {e}")))?;

        let row = match exact {
            Some(row) => Some(row),
            None => sqlx::query_as(
                "SELECT name, phone, email FROM contacts \
                 WHERE user_id = ? AND lower(name) LIKE lower(?) ESCAPE '\\' \
                 ORDER BY name LIMIT 1",
            )
            .bind(user_id)
            .bind(prefix_pattern(needle))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BeltError::Memory(format!("contact lookup failed: {e}")))?,
        };

        Ok(row.map(|(name, phone, email)| Contact { name, phone, email }))
    }
}
