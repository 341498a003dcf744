//! Redis presence store implementation.

use async_trait::async_trait;
use tracing::debug;

use presence_core::error::{AppError, ErrorKind};
use presence_core::result::AppResult;
use presence_core::traits::store::PresenceStore;
use presence_core::types::event::StoredPresence;
use presence_core::types::id::UserId;
use presence_core::types::time::EpochMillis;

use super::client::RedisClient;
use crate::keys;

/// Writes the row only when `last_seen` is newer than the stored one, or
/// equal with an offline flag. Returns 1 when written.
///
/// KEYS[1] row key; ARGV online flag, last_seen, online field, last_seen field.
const CONDITIONAL_WRITE: &str = r#"
local stored = tonumber(redis.call('HGET', KEYS[1], ARGV[4]))
local incoming = tonumber(ARGV[2])
if stored and (incoming < stored or (incoming == stored and ARGV[1] == '1')) then
  return 0
end
redis.call('HSET', KEYS[1], ARGV[3], ARGV[1], ARGV[4], ARGV[2])
return 1
"#;

/// Redis-backed presence store: one hash per user with `online` and
/// `last_seen` fields.
#[derive(Debug, Clone)]
pub struct RedisPresenceStore {
    /// Redis client.
    client: RedisClient,
    /// Compare-and-set on `last_seen`.
    write_script: redis::Script,
}

impl RedisPresenceStore {
    /// Create a new Redis presence store.
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            write_script: redis::Script::new(CONDITIONAL_WRITE),
        }
    }

    /// Map a Redis error to an AppError.
    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Store, format!("Redis error: {e}"), e)
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn set_presence(
        &self,
        user_id: &UserId,
        is_online: bool,
        last_seen: EpochMillis,
    ) -> AppResult<()> {
        let key = self.client.prefixed_key(&keys::user_presence(user_id));
        let mut conn = self.client.conn_mut();

        let written: i64 = self
            .write_script
            .key(&key)
            .arg(i64::from(is_online))
            .arg(last_seen)
            .arg(keys::FIELD_ONLINE)
            .arg(keys::FIELD_LAST_SEEN)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        if written == 0 {
            debug!(user_id = %user_id, last_seen, "Ignored stale presence write");
        }
        Ok(())
    }

    async fn get_presence(&self, user_ids: &[UserId]) -> AppResult<Vec<StoredPresence>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for user_id in user_ids {
            pipe.cmd("HMGET")
                .arg(self.client.prefixed_key(&keys::user_presence(user_id)))
                .arg(keys::FIELD_ONLINE)
                .arg(keys::FIELD_LAST_SEEN);
        }

        let mut conn = self.client.conn_mut();
        let rows: Vec<(Option<i64>, Option<i64>)> =
            pipe.query_async(&mut conn).await.map_err(Self::map_err)?;

        let found: Vec<StoredPresence> = user_ids
            .iter()
            .zip(rows)
            .filter_map(|(user_id, row)| match row {
                (Some(online), Some(last_seen)) => Some(StoredPresence {
                    user_id: user_id.clone(),
                    is_online: online != 0,
                    last_seen,
                }),
                _ => None,
            })
            .collect();

        debug!(
            requested = user_ids.len(),
            found = found.len(),
            "Batched presence read"
        );
        Ok(found)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}
