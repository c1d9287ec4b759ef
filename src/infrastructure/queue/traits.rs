use crate::domain::envelope::{ErrorMessage, SuccessMessage};
use async_trait::async_trait;

/// The broker seam: the dispatcher pops envelopes and pushes results
/// through this trait and never talks to the broker directly.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Wait for the next raw envelope payload. Returns `None` when the
    /// wait timed out with an empty queue; callers loop.
    async fn pop_task(&self) -> anyhow::Result<Option<Vec<u8>>>;

    async fn push_success(&self, message: &SuccessMessage) -> anyhow::Result<()>;

    async fn push_error(&self, message: &ErrorMessage) -> anyhow::Result<()>;
}
