use std::sync::Arc;

use courier_errors::{CourierError, CourierResult};
use redis::Script;

use super::connection_manager::RedisConnectionManager;

/// Token-bucket decision. Deny is advisory: retry after a short delay,
/// not a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Deny,
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }
}

// Executes atomically on the server; the clock is Redis TIME (seconds),
// bucket state lives in a hash {tokens, last_request}, and the TTL is set
// on first touch.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local max_tokens = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local key_expiry = tonumber(ARGV[3])

local now = tonumber(redis.call('TIME')[1])
local bucket = redis.call('HMGET', key, 'tokens', 'last_request')

if not bucket[1] then
    redis.call('HSET', key, 'tokens', max_tokens - 1, 'last_request', now)
    redis.call('EXPIRE', key, key_expiry)
    return 1
end

local tokens = tonumber(bucket[1])
local last_request = tonumber(bucket[2])
local elapsed = now - last_request
local new_tokens = math.min(max_tokens, tokens + elapsed * refill_rate)

if new_tokens > 0 then
    redis.call('HSET', key, 'tokens', new_tokens - 1, 'last_request', now)
    return 1
end
return 0
"#;

/// Token bucket on the shared KV store.
///
/// Capacity, refill rate and expiry are parameters of the invocation, not
/// of the bucket; concurrent callers serialize at Redis's single-threaded
/// script execution.
pub struct RateLimiter {
    manager: Arc<RedisConnectionManager>,
    script: Script,
    key: String,
    max_tokens: i64,
    refill_rate: f64,
    key_expiry_secs: u64,
}

impl RateLimiter {
    pub fn new(
        manager: Arc<RedisConnectionManager>,
        key: impl Into<String>,
        max_tokens: i64,
        refill_rate: f64,
        key_expiry_secs: u64,
    ) -> Self {
        Self {
            manager,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
            key: key.into(),
            max_tokens,
            refill_rate,
            key_expiry_secs,
        }
    }

    /// Atomically try to take one token.
    pub async fn check(&self) -> CourierResult<RateDecision> {
        let mut conn = self.manager.connection();
        let allowed: i64 = self
            .script
            .key(&self.key)
            .arg(self.max_tokens)
            .arg(self.refill_rate)
            .arg(self.key_expiry_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CourierError::queue(format!("rate limiter script failed: {e}")))?;

        Ok(if allowed == 1 {
            RateDecision::Allow
        } else {
            RateDecision::Deny
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Refill arithmetic, kept in step with the Lua script.
    fn refill_tokens(tokens: f64, elapsed_secs: f64, max_tokens: i64, refill_rate: f64) -> f64 {
        (tokens + elapsed_secs * refill_rate).min(max_tokens as f64)
    }

    /// Pure-logic bucket mirroring the script's state transitions.
    struct Bucket {
        tokens: Option<f64>,
        last_request: f64,
    }

    impl Bucket {
        fn new() -> Self {
            Self {
                tokens: None,
                last_request: 0.0,
            }
        }

        fn check(&mut self, now: f64, max_tokens: i64, refill_rate: f64) -> RateDecision {
            match self.tokens {
                None => {
                    self.tokens = Some(max_tokens as f64 - 1.0);
                    self.last_request = now;
                    RateDecision::Allow
                }
                Some(tokens) => {
                    let elapsed = now - self.last_request;
                    let new_tokens = refill_tokens(tokens, elapsed, max_tokens, refill_rate);
                    if new_tokens > 0.0 {
                        self.tokens = Some(new_tokens - 1.0);
                        self.last_request = now;
                        RateDecision::Allow
                    } else {
                        RateDecision::Deny
                    }
                }
            }
        }
    }

    #[test]
    fn refill_caps_at_max() {
        assert_eq!(refill_tokens(2.0, 100.0, 10, 5.0), 10.0);
        assert_eq!(refill_tokens(2.0, 1.0, 10, 5.0), 7.0);
        assert_eq!(refill_tokens(0.0, 0.0, 10, 5.0), 0.0);
    }

    #[test]
    fn burst_of_fifteen_allows_first_ten() {
        // maxTokens=10, refillRate=5: 15 requests within 100ms, the
        // first 10 pass.
        let mut bucket = Bucket::new();
        let mut allowed = 0;
        for _ in 0..15 {
            if bucket.check(1000.0, 10, 5.0).is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[test]
    fn one_second_refills_five() {
        let mut bucket = Bucket::new();
        for _ in 0..10 {
            assert!(bucket.check(1000.0, 10, 5.0).is_allowed());
        }
        assert!(!bucket.check(1000.0, 10, 5.0).is_allowed());

        // Wait one second: five tokens refill, exactly five more pass.
        let mut allowed = 0;
        for _ in 0..8 {
            if bucket.check(1001.0, 10, 5.0).is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn allow_rate_is_bounded_over_any_window() {
        // Over any window T >= 1s the allow count stays within
        // maxTokens + T * refillRate.
        let (max_tokens, refill_rate) = (10, 5.0);
        let mut bucket = Bucket::new();
        let mut allowed = 0;
        for tick in 0..30 {
            let now = 1000.0 + tick as f64 * 0.1;
            for _ in 0..7 {
                if bucket.check(now, max_tokens, refill_rate).is_allowed() {
                    allowed += 1;
                }
            }
        }
        let window_secs = 3.0;
        assert!(allowed as f64 <= max_tokens as f64 + window_secs * refill_rate);
    }
}
