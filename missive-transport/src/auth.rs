//! Token-authenticated transports.
//!
//! [`TokenCache`] holds at most one access token per transport and moves
//! between three states: no token, one shared in-flight fetch, and a valid
//! token. Callers arriving while a fetch is pending wait on that fetch
//! instead of starting another one. A failed fetch is never cached.
//!
//! [`AuthenticatedTransport`] adds the retry rule on top: when the endpoint
//! rejects a token (status 401) the call is retried exactly once with a
//! fresh token, and whatever the retry returns is final.

use crate::{Connector, Transport};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use missive_core::{Call, Error, Operation, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Response of an OAuth-style token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds; zero means the endpoint did not say.
    #[serde(default)]
    pub expires_in: u64,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_in,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Where access tokens come from.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<AccessToken, Error>;
}

/// Sends one envelope using a given token.
#[async_trait]
pub trait AuthorizedSend: Send + Sync + 'static {
    async fn send(
        &self,
        call: &Call,
        operation: &Operation,
        token: &AccessToken,
    ) -> Result<Value, Error>;

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// A token handed out by the cache, tagged with the fetch that produced it.
#[derive(Debug, Clone)]
pub struct TokenLease {
    token: Arc<AccessToken>,
    generation: u64,
}

impl TokenLease {
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<TokenLease, Error>>>;

enum TokenState {
    Empty,
    Fetching {
        generation: u64,
        fetch: SharedFetch,
    },
    Valid {
        lease: TokenLease,
        expires_at: Option<Instant>,
    },
}

struct CacheState {
    token: TokenState,
    next_generation: u64,
}

/// Single-flight cache in front of a [`TokenSource`].
pub struct TokenCache<S> {
    source: Arc<S>,
    state: Arc<Mutex<CacheState>>,
    skew: Duration,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            state: Arc::new(Mutex::new(CacheState {
                token: TokenState::Empty,
                next_generation: 1,
            })),
            skew: Duration::from_secs(30),
        }
    }

    /// Tokens this close to expiry count as absent.
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Returns the cached token, joining or starting a fetch if there is none.
    pub async fn token(&self) -> Result<TokenLease, Error> {
        let fetch = {
            let mut state = lock(&self.state);
            let pending = match &state.token {
                TokenState::Valid { lease, expires_at } if !self.is_expired(*expires_at) => {
                    return Ok(lease.clone());
                }
                TokenState::Fetching { fetch, .. } => Some(fetch.clone()),
                _ => None,
            };
            match pending {
                Some(fetch) => fetch,
                None => self.start_fetch(&mut state),
            }
        };
        fetch.await
    }

    /// Replaces a token the endpoint rejected.
    ///
    /// If the cache already holds a newer token than `rejected`, or a fetch
    /// is in flight, that one is used instead of fetching again.
    pub async fn refresh(&self, rejected: u64) -> Result<TokenLease, Error> {
        let fetch = {
            let mut state = lock(&self.state);
            let pending = match &state.token {
                TokenState::Valid { lease, expires_at }
                    if lease.generation != rejected && !self.is_expired(*expires_at) =>
                {
                    return Ok(lease.clone());
                }
                TokenState::Fetching { fetch, .. } => Some(fetch.clone()),
                _ => None,
            };
            match pending {
                Some(fetch) => fetch,
                None => self.start_fetch(&mut state),
            }
        };
        fetch.await
    }

    /// Drops whatever token is cached. An in-flight fetch keeps running but
    /// will not be stored.
    pub fn invalidate(&self) {
        lock(&self.state).token = TokenState::Empty;
    }

    fn is_expired(&self, expires_at: Option<Instant>) -> bool {
        match expires_at {
            Some(at) => Instant::now() + self.skew >= at,
            None => false,
        }
    }

    // Caller holds the state lock, so the spawned task cannot settle the
    // state before it has been set to `Fetching`.
    fn start_fetch(&self, state: &mut CacheState) -> SharedFetch {
        let generation = state.next_generation;
        state.next_generation += 1;

        let source = Arc::clone(&self.source);
        let shared_state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            debug!(generation, "fetching access token");
            let result = source.fetch().await;

            let mut state = lock(&shared_state);
            let current = matches!(
                &state.token,
                TokenState::Fetching { generation: g, .. } if *g == generation
            );

            match result {
                Ok(token) => {
                    let expires_at = (token.expires_in > 0)
                        .then(|| Instant::now() + Duration::from_secs(token.expires_in));
                    let lease = TokenLease {
                        token: Arc::new(token),
                        generation,
                    };
                    if current {
                        state.token = TokenState::Valid {
                            lease: lease.clone(),
                            expires_at,
                        };
                    }
                    debug!(generation, "access token ready");
                    Ok(lease)
                }
                Err(err) => {
                    warn!(generation, error = %err, "access token fetch failed");
                    if current {
                        state.token = TokenState::Empty;
                    }
                    Err(err)
                }
            }
        });

        let fetch = async move {
            task.await.unwrap_or_else(|e| {
                Err(Error::Unreachable(format!("token fetch task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        state.token = TokenState::Fetching {
            generation,
            fetch: fetch.clone(),
        };
        fetch
    }
}

impl<S> fmt::Debug for TokenCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &lock(&self.state).token {
            TokenState::Empty => "empty",
            TokenState::Fetching { .. } => "fetching",
            TokenState::Valid { .. } => "valid",
        };
        f.debug_struct("TokenCache").field("state", &state).finish()
    }
}

/// Transport that authenticates every call with a cached access token.
#[derive(Debug)]
pub struct AuthenticatedTransport<S, T> {
    cache: TokenCache<S>,
    inner: T,
}

impl<S: TokenSource, T: AuthorizedSend> AuthenticatedTransport<S, T> {
    pub fn new(source: S, inner: T) -> Self {
        Self {
            cache: TokenCache::new(source),
            inner,
        }
    }

    pub fn cache(&self) -> &TokenCache<S> {
        &self.cache
    }
}

#[async_trait]
impl<S: TokenSource, T: AuthorizedSend> Transport for AuthenticatedTransport<S, T> {
    async fn send(&self, call: &Call, operation: &Operation) -> Result<Value, Error> {
        let lease = self.cache.token().await?;
        match self.inner.send(call, operation, lease.token()).await {
            Err(err) if err.is_auth_rejected() => {
                debug!(
                    operation = call.name(),
                    generation = lease.generation(),
                    "access token rejected, refreshing"
                );
                let fresh = self.cache.refresh(lease.generation()).await?;
                self.inner.send(call, operation, fresh.token()).await
            }
            other => other,
        }
    }

    async fn close(&self) -> Result<(), Error> {
        self.inner.close().await
    }
}

/// Opens an [`AuthenticatedTransport`] around a token source and a sender.
#[derive(Debug)]
pub struct AuthenticatedConnector<S, T> {
    source: S,
    sender: T,
}

impl<S: TokenSource, T: AuthorizedSend> AuthenticatedConnector<S, T> {
    pub fn new(source: S, sender: T) -> Self {
        Self { source, sender }
    }
}

#[async_trait]
impl<S: TokenSource, T: AuthorizedSend> Connector for AuthenticatedConnector<S, T> {
    type Transport = AuthenticatedTransport<S, T>;

    async fn connect(self) -> Result<Self::Transport, Error> {
        Ok(AuthenticatedTransport::new(self.source, self.sender))
    }
}
