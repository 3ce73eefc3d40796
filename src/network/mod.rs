pub mod credentials;
pub mod publisher;
pub mod room;
pub mod session;
pub mod subscription;
pub mod transport;

pub use credentials::{Credential, CredentialProvider, HttpTokenEndpoint};
pub use publisher::Publisher;
pub use room::ChatRoom;
pub use session::{Session, SessionManager};
pub use subscription::{RetryPolicy, SubscriptionController};
pub use transport::{
    CacheClient, ClientFactory, Subscription, SubscriptionCallbacks, TopicClient, TopicItem,
    TransportConfig, TransportProfile,
};
