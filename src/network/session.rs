use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use crate::error::ChatError;

use super::credentials::CredentialProvider;
use super::transport::{CacheClient, ClientFactory, Subscription, TopicClient, TransportConfig};

/// The live pair of transport clients built from one credential.
#[derive(Clone)]
pub struct Session {
    generation: u64,
    topic_client: Arc<dyn TopicClient>,
    cache_client: Arc<dyn CacheClient>,
}

impl Session {
    /// Increases by one for every construction this manager starts.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn topic_client(&self) -> &Arc<dyn TopicClient> {
        &self.topic_client
    }

    pub fn cache_client(&self) -> &Arc<dyn CacheClient> {
        &self.cache_client
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

type PendingSession = Shared<BoxFuture<'static, Result<Session, ChatError>>>;

enum SessionState {
    NoSession,
    Constructing {
        generation: u64,
        pending: PendingSession,
    },
    Ready(Session),
}

/// Owns at most one session and the subscription currently riding on it.
///
/// Concurrent `get_clients` calls during construction await one shared
/// future, so a single credential fetch serves all of them.
pub struct SessionManager {
    credentials: Arc<dyn CredentialProvider>,
    factory: Arc<dyn ClientFactory>,
    transport: TransportConfig,
    state: Mutex<SessionState>,
    subscription: Mutex<Option<Subscription>>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        factory: Arc<dyn ClientFactory>,
        transport: TransportConfig,
    ) -> Self {
        Self {
            credentials,
            factory,
            transport,
            state: Mutex::new(SessionState::NoSession),
            subscription: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn get_clients(&self) -> Result<Session, ChatError> {
        let (generation, pending) = {
            let mut state = self.state.lock().await;
            match &*state {
                SessionState::Ready(session) => return Ok(session.clone()),
                SessionState::Constructing {
                    generation,
                    pending,
                } => (*generation, pending.clone()),
                SessionState::NoSession => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let pending = self.construct(generation).boxed().shared();
                    *state = SessionState::Constructing {
                        generation,
                        pending: pending.clone(),
                    };
                    (generation, pending)
                }
            }
        };

        let result = pending.await;

        // An invalidate during construction moves the state on; the result
        // is still handed to this caller but never stored as current.
        let mut state = self.state.lock().await;
        let still_current = matches!(
            &*state,
            SessionState::Constructing { generation: current, .. } if *current == generation
        );
        if still_current {
            *state = match &result {
                Ok(session) => SessionState::Ready(session.clone()),
                Err(err) => {
                    log::error!("Session construction failed: {err}");
                    SessionState::NoSession
                }
            };
        }

        result
    }

    fn construct(
        &self,
        generation: u64,
    ) -> impl Future<Output = Result<Session, ChatError>> + Send + 'static {
        let credentials = self.credentials.clone();
        let factory = self.factory.clone();
        let transport = self.transport.clone();

        async move {
            log::info!("Building session #{generation} from a fresh credential");
            let credential = credentials.fetch_token().await?;

            let topic_client = factory
                .topic_client(&credential, &transport)
                .map_err(ChatError::ClientConstruction)?;
            let cache_client = factory
                .cache_client(&credential, &transport)
                .map_err(ChatError::ClientConstruction)?;

            Ok(Session {
                generation,
                topic_client,
                cache_client,
            })
        }
    }

    /// Releases the current subscription and drops the session. Calling it
    /// with no session is a no-op.
    pub async fn invalidate(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe();
        }

        let mut state = self.state.lock().await;
        if !matches!(*state, SessionState::NoSession) {
            log::info!("Invalidating current session");
            *state = SessionState::NoSession;
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Ready(_))
    }

    /// Stores `subscription` as current and returns the one it replaces.
    pub async fn replace_subscription(&self, subscription: Subscription) -> Option<Subscription> {
        self.subscription.lock().await.replace(subscription)
    }

    pub async fn current_subscription(&self) -> Option<Subscription> {
        self.subscription.lock().await.clone()
    }
}
