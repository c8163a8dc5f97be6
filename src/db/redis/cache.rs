use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Up to `count` image URLs found for a recipe name
    Images { name: String, count: usize },
}

impl CacheKey {
    pub fn images(name: &str, count: usize) -> Self {
        CacheKey::Images {
            name: name.to_string(),
            count,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Images { name, count } => {
                write!(f, "images:{}:{}", count, name.trim().to_lowercase())
            }
        }
    }
}

/// Creates a Redis client for the image cache
///
/// The client connects lazily, so an unreachable server only surfaces on
/// the first cache access.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Cache handler for storing and retrieving data from Redis
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CacheWriterHandle {
    /// Initiates a graceful shutdown of the cache writer
    ///
    /// Sends a shutdown signal to the writer task and waits for it to flush
    /// the writes queued so far.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task panicked");
        }
    }
}

impl Cache {
    /// Creates the cache and spawns its background writer
    pub async fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        // Spawn background task to process cache writes
        let client = redis_client.clone();
        let task = tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        let handle = CacheWriterHandle { shutdown_tx, task };

        (cache, handle)
    }

    /// Drains queued writes into Redis until shutdown, then flushes what is
    /// already queued and exits
    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut failed_writes = 0u64;

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        failed_writes += 1;
                        tracing::error!(error = %e, failed = failed_writes, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!(failed = failed_writes, "Cache writer shutting down, flushing queued writes");

                    // senders live on in Cache clones, so only drain what is queued
                    while let Ok(msg) = write_rx.try_recv() {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    /// Retrieves and deserializes the value under `key`, `None` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(format!("{}", key)).await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Queues a write for the background writer and returns immediately.
    /// Write failures are only logged.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: format!("{}", key),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}
