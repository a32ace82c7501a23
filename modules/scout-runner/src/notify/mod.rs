//! Success notifications. Only non-duplicate completed runs notify;
//! notification failures are logged and reported to analytics but never
//! affect run status.

pub mod email;

use async_trait::async_trait;

use scout_common::Scout;

pub use email::EmailNotifier;

#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Deliver a success notification for a completed, non-duplicate run.
    /// `response_markdown` is the model's markdown result.
    async fn send_success(
        &self,
        to: &str,
        scout: &Scout,
        response_markdown: &str,
    ) -> anyhow::Result<()>;
}

/// Backend that drops everything. Used in tests and when email is not
/// configured.
pub struct NoopNotifier;

#[async_trait]
impl NotifyBackend for NoopNotifier {
    async fn send_success(
        &self,
        _to: &str,
        _scout: &Scout,
        _response_markdown: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
