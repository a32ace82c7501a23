//! Per-user search/scrape credential resolution and the 401/402 side
//! effects applied mid-run.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use scout_common::{CredentialStatus, ScoutError};

use crate::traits::CredentialEvents;

/// Resolve the key the run will use. A missing or already-invalid key
/// aborts with a user-actionable error; there is no shared fallback.
pub async fn resolve(pool: &PgPool, user_id: Uuid) -> Result<String, ScoutError> {
    let record = scout_store::get_credential(pool, user_id)
        .await?
        .ok_or(ScoutError::MissingCredential)?;

    match record.status {
        CredentialStatus::Active => Ok(record.search_api_key),
        CredentialStatus::Invalid => {
            info!(
                user_id = %user_id,
                reason = record.invalid_reason.as_deref().unwrap_or("unknown"),
                "Credential on file is marked invalid"
            );
            Err(ScoutError::MissingCredential)
        }
    }
}

/// Store-backed side effects for provider auth/billing rejections.
pub struct PgCredentialEvents {
    pool: PgPool,
    user_id: Uuid,
}

impl PgCredentialEvents {
    pub fn new(pool: PgPool, user_id: Uuid) -> Self {
        Self { pool, user_id }
    }
}

#[async_trait]
impl CredentialEvents for PgCredentialEvents {
    async fn on_unauthorized(&self, raw_error: &str) {
        warn!(user_id = %self.user_id, "Provider rejected key (401), marking invalid");
        if let Err(e) =
            scout_store::mark_credential_invalid(&self.pool, self.user_id, raw_error).await
        {
            error!(user_id = %self.user_id, error = %e, "Failed to mark credential invalid");
        }
    }

    async fn on_payment_required(&self, raw_error: &str) {
        warn!(
            user_id = %self.user_id,
            "Provider reported exhausted credits (402), disabling user's scouts"
        );
        if let Err(e) =
            scout_store::mark_credential_invalid(&self.pool, self.user_id, raw_error).await
        {
            error!(user_id = %self.user_id, error = %e, "Failed to mark credential invalid");
        }
        match scout_store::disable_all_user_scouts(&self.pool, self.user_id).await {
            Ok(disabled) => {
                info!(user_id = %self.user_id, disabled, "Disabled scouts after credit exhaustion");
            }
            Err(e) => {
                error!(user_id = %self.user_id, error = %e, "Failed to disable user's scouts");
            }
        }
    }
}
