use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use scout_common::{CredentialRecord, CredentialStatus};

/// Fetch a user's search/scrape credential, if one is on file.
pub async fn get_credential(pool: &PgPool, user_id: Uuid) -> Result<Option<CredentialRecord>> {
    let row: Option<(Uuid, Option<String>, String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT user_id, search_api_key, search_key_status, search_key_invalid_reason
        FROM user_preferences
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|(user_id, key, status, invalid_reason)| {
        let search_api_key = key.filter(|k| !k.is_empty())?;
        let status = match status.as_str() {
            "invalid" => CredentialStatus::Invalid,
            _ => CredentialStatus::Active,
        };
        Some(CredentialRecord {
            user_id,
            search_api_key,
            status,
            invalid_reason,
        })
    }))
}

/// Where success notifications for this user go, if anywhere.
pub async fn get_notification_email(pool: &PgPool, user_id: Uuid) -> Result<Option<String>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT notification_email FROM user_preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.and_then(|r| r.0).filter(|e| !e.is_empty()))
}

/// Mark a user's key invalid with the provider's raw error as the reason.
pub async fn mark_credential_invalid(pool: &PgPool, user_id: Uuid, reason: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE user_preferences
        SET search_key_status = 'invalid', search_key_invalid_reason = $2, updated_at = now()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}
