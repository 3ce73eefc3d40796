//! In-process loopback implementation of the hosted pub/sub and cache
//! service, plus the master-credential client the token endpoint uses.

mod auth;
mod clients;
mod service;

pub use auth::LoopbackAuthClient;
pub use clients::{LoopbackCacheClient, LoopbackClientFactory, LoopbackTopicClient};
pub use service::LoopbackService;
