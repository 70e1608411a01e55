//! Typed async client over the shared coordinator store.
//!
//! The store is addressed through five well-known keys (queue, script,
//! pub/sub channel, running-set, results-map). All payloads are JSON so any
//! node running this protocol, regardless of implementation language,
//! interoperates with any other.

use redis::aio::{ConnectionManager, PubSub};
use redis::AsyncCommands;
use thiserror::Error;

use crate::model::{CallGroup, CallerConfig, Results};

const CALLS_KEY: &str = "chunli:calls";
const SCRIPT_KEY: &str = "chunli:script";
const DISTRIBUTED_KEY: &str = "chunli:distributed";
const RUNNING_KEY: &str = "chunli:running";
const RESULTS_KEY: &str = "chunli:results";

/// The literal stop signal published to shed idle dispatcher subscriptions.
pub const STOP_SIGNAL: &[u8] = b"stop";

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A connection to the shared coordinator store, cloneable and safe to share
/// across tasks: `ConnectionManager` multiplexes commands over one
/// connection and reconnects transparently on failure.
#[derive(Clone)]
pub struct Coordinator {
    client: redis::Client,
    conn: ConnectionManager,
}

impl Coordinator {
    pub async fn connect(target: &str) -> Result<Self, CoordinatorError> {
        let client = redis::Client::open(target)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Coordinator { client, conn })
    }

    /// Clears the call queue and any inline generator script.
    pub async fn clear_calls(&self) -> Result<(), CoordinatorError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(CALLS_KEY).await?;
        let _: () = conn.del(SCRIPT_KEY).await?;
        Ok(())
    }

    /// Appends one normalized CallGroup to the tail of the queue.
    pub async fn push_call_group(&self, group: &CallGroup) -> Result<(), CoordinatorError> {
        let encoded = serde_json::to_string(group)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(CALLS_KEY, encoded).await?;
        Ok(())
    }

    /// Pops the head CallGroup, if any, without re-queuing it. Callers that
    /// want ring semantics (consume-then-requeue, per §4.4) must call
    /// `push_call_group` themselves after a successful pop.
    pub async fn pop_call_group(&self) -> Result<Option<CallGroup>, CoordinatorError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.lpop(CALLS_KEY, None).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn queue_len(&self) -> Result<usize, CoordinatorError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(CALLS_KEY).await?)
    }

    pub async fn set_script(&self, script_content: &str) -> Result<(), CoordinatorError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(SCRIPT_KEY, script_content).await?;
        Ok(())
    }

    pub async fn get_script(&self) -> Result<Option<String>, CoordinatorError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(SCRIPT_KEY).await?)
    }

    pub async fn clear_script(&self) -> Result<(), CoordinatorError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(SCRIPT_KEY).await?;
        Ok(())
    }

    /// Clears running-set and results-map, then publishes the run
    /// configuration once. Subscribers not already listening miss the run.
    pub async fn start_distributed_calls(
        &self,
        configuration: CallerConfig,
    ) -> Result<(), CoordinatorError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(RUNNING_KEY).await?;
        let _: () = conn.del(RESULTS_KEY).await?;
        let encoded = serde_json::to_string(&configuration)?;
        let _: () = conn.publish(DISTRIBUTED_KEY, encoded).await?;
        Ok(())
    }

    /// Publishes the literal `stop` signal so idle subscribers exit cleanly.
    pub async fn publish_stop(&self) -> Result<(), CoordinatorError> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(DISTRIBUTED_KEY, STOP_SIGNAL).await?;
        Ok(())
    }

    /// Opens a dedicated subscriber connection. A connection in subscriber
    /// mode cannot issue ordinary commands, so this is distinct from the
    /// multiplexed connection used for KV operations.
    pub async fn subscribe(&self) -> Result<PubSub, CoordinatorError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(DISTRIBUTED_KEY).await?;
        Ok(pubsub)
    }

    pub async fn join_running(&self, running_id: &str) -> Result<(), CoordinatorError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(RUNNING_KEY, running_id).await?;
        Ok(())
    }

    pub async fn leave_running(&self, running_id: &str) -> Result<(), CoordinatorError> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(RUNNING_KEY, running_id).await?;
        Ok(())
    }

    pub async fn running_count(&self) -> Result<u64, CoordinatorError> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(RUNNING_KEY).await?)
    }

    pub async fn store_result(
        &self,
        running_id: &str,
        results: &Results,
    ) -> Result<(), CoordinatorError> {
        let encoded = serde_json::to_string(results)?;
        let mut conn = self.conn.clone();
        let _: () = conn.hset(RESULTS_KEY, running_id, encoded).await?;
        Ok(())
    }

    pub async fn results_len(&self) -> Result<u64, CoordinatorError> {
        let mut conn = self.conn.clone();
        Ok(conn.hlen(RESULTS_KEY).await?)
    }

    pub async fn all_results(&self) -> Result<Vec<Results>, CoordinatorError> {
        let mut conn = self.conn.clone();
        let raw: std::collections::HashMap<String, String> = conn.hgetall(RESULTS_KEY).await?;
        raw.values()
            .map(|v| serde_json::from_str(v).map_err(CoordinatorError::from))
            .collect()
    }
}
