use super::traits::TaskQueue;
use crate::domain::envelope::{ErrorMessage, SuccessMessage};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::time::Duration;

/// Ingress list the worker consumes.
pub const TASK_QUEUE: &str = "img:translate:tasks";
/// List receiving one success message per completed request.
pub const SUCCESS_QUEUE: &str = "img:translate:success";
/// List receiving one error message per failed request.
pub const ERROR_QUEUE: &str = "img:translate:error";

/// Seconds a single blocking pop waits before reporting an empty queue.
const POP_TIMEOUT_SECONDS: f64 = 1.0;

/// Backoff cap for broker reconnects.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Attempts for a result push before the failure is surfaced.
const PUSH_ATTEMPTS: u32 = 5;

pub struct RedisQueue {
    client: Client,
}

impl RedisQueue {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Open a connection, retrying with exponential backoff capped at 5s.
    ///
    /// A broker outage therefore pauses the caller instead of failing it;
    /// no popped envelope is ever dropped on a connect error because the
    /// pop itself only happens on an established connection.
    async fn connect(&self) -> MultiplexedConnection {
        let mut backoff = Duration::from_millis(100);
        loop {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => return conn,
                Err(e) => {
                    tracing::error!("Redis connection failed: {}. Retrying in {:?}", e, backoff);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn push_with_retry(&self, queue: &str, payload: String) -> anyhow::Result<()> {
        let mut backoff = Duration::from_millis(100);
        for attempt in 1..=PUSH_ATTEMPTS {
            let mut conn = self.connect().await;
            match conn.rpush::<_, _, usize>(queue, &payload).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < PUSH_ATTEMPTS => {
                    tracing::warn!(
                        "Push to {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        queue,
                        attempt,
                        PUSH_ATTEMPTS,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("push loop returns from its final attempt")
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn pop_task(&self) -> anyhow::Result<Option<Vec<u8>>> {
        let mut conn = self.connect().await;
        let popped: Option<(String, Vec<u8>)> =
            conn.blpop(TASK_QUEUE, POP_TIMEOUT_SECONDS).await?;
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn push_success(&self, message: &SuccessMessage) -> anyhow::Result<()> {
        self.push_with_retry(SUCCESS_QUEUE, serde_json::to_string(message)?)
            .await
    }

    async fn push_error(&self, message: &ErrorMessage) -> anyhow::Result<()> {
        self.push_with_retry(ERROR_QUEUE, serde_json::to_string(message)?)
            .await
    }
}
