use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::errors::SnowflakeResult;
use crate::jwt::JwtMinter;

#[derive(Debug)]
struct TokenState {
    token: String,
    expires_at: i64,
}

/// Caches the most recent JWT and rotates it once it has expired.
///
/// The mutex is the whole synchronization story: checking, minting, and
/// publishing all happen under it, so concurrent callers that observe an
/// expired token line up and only the first one mints; the rest wake up to
/// the fresh token.
#[derive(Debug)]
pub(crate) struct TokenCache {
    minter: JwtMinter,
    ttl_secs: u64,
    state: Mutex<Option<TokenState>>,
    mints: AtomicU64,
}

impl TokenCache {
    pub fn new(minter: JwtMinter, ttl_secs: u64) -> TokenCache {
        TokenCache {
            minter,
            ttl_secs,
            state: Mutex::new(None),
            mints: AtomicU64::new(0),
        }
    }

    /// Returns the cached token, minting a fresh one if it has expired.
    ///
    /// A token counts as expired only once `now` is strictly past its
    /// expiry. A clock stepping backwards makes stale tokens look valid
    /// again; that is accepted, Snowflake is authoritative about expiry.
    pub async fn current_token(&self) -> SnowflakeResult<String> {
        let mut state = self.state.lock().await;
        let now = chrono::Utc::now().timestamp();
        if let Some(cached) = state.as_ref() {
            if now <= cached.expires_at {
                return Ok(cached.token.clone());
            }
        }
        let token = self.minter.mint(self.ttl_secs)?;
        let minted = self.mints.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("Minted JWT #{minted}, valid for {}s", self.ttl_secs);
        *state = Some(TokenState {
            token: token.clone(),
            expires_at: now + self.ttl_secs as i64,
        });
        Ok(token)
    }

    #[cfg(test)]
    pub fn mint_count(&self) -> u64 {
        self.mints.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jwt_simple::algorithms::RS256KeyPair;

    use super::*;

    fn cache(ttl_secs: u64) -> TokenCache {
        let pem = RS256KeyPair::generate(2048).unwrap().to_pem().unwrap();
        let minter = JwtMinter::new(&pem, "org", "acct", "user").unwrap();
        TokenCache::new(minter, ttl_secs)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_a_single_mint() {
        let cache = Arc::new(cache(600));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(
                async move { cache.current_token().await.unwrap() },
            ));
        }
        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap());
        }
        assert!(tokens.iter().all(|t| t == &tokens[0]));
        assert_eq!(cache.mint_count(), 1);
    }

    #[tokio::test]
    async fn valid_token_is_reused() {
        let cache = cache(600);
        let first = cache.current_token().await.unwrap();
        let second = cache.current_token().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.mint_count(), 1);
    }

    #[tokio::test]
    async fn expired_token_is_rotated() {
        let cache = cache(0);
        cache.current_token().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        cache.current_token().await.unwrap();
        assert_eq!(cache.mint_count(), 2);
    }
}
