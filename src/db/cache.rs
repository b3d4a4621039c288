// db/cache.rs
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use super::db::DBClient;

pub fn blacklist_key(jti: &str) -> String {
    format!("token_blacklist:{}", jti)
}

/// What a blacklist lookup means when Redis cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnLookupError {
    /// Short-lived access credentials keep working through a Redis outage.
    Allow,
    /// Refresh credentials mint new ones, so an unanswered lookup revokes.
    Deny,
}

fn resolve_lookup(
    jti: &str,
    result: Result<bool, redis::RedisError>,
    on_error: OnLookupError,
) -> bool {
    result.unwrap_or_else(|e| {
        tracing::warn!("Blacklist lookup failed for {}: {}", jti, e);
        on_error == OnLookupError::Deny
    })
}

#[async_trait]
pub trait TokenBlacklistExt {
    /// Marks a credential id as revoked until it would have expired anyway.
    async fn blacklist_token(&self, jti: &str, ttl_seconds: usize) -> Result<(), redis::RedisError>;

    async fn is_token_blacklisted(&self, jti: &str, on_error: OnLookupError) -> bool;
}

#[async_trait]
impl TokenBlacklistExt for DBClient {
    async fn blacklist_token(
        &self,
        jti: &str,
        ttl_seconds: usize,
    ) -> Result<(), redis::RedisError> {
        let Some(redis) = &self.redis_client else {
            tracing::debug!("Redis unavailable, skipping revocation of {}", jti);
            return Ok(());
        };

        let mut conn = ConnectionManager::clone(redis);
        let _: () = conn.set_ex(blacklist_key(jti), 1, ttl_seconds.max(1)).await?;
        tracing::debug!("Token {} blacklisted for {}s", jti, ttl_seconds);
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str, on_error: OnLookupError) -> bool {
        let Some(redis) = &self.redis_client else {
            return false;
        };

        let mut conn = ConnectionManager::clone(redis);
        let result = conn.exists::<_, bool>(blacklist_key(jti)).await;
        resolve_lookup(jti, result, on_error)
    }
}
