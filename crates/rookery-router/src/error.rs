//! Routing error taxonomy.

use thiserror::Error;

use rookery_cluster::ClusterError;
use rookery_storage::StorageError;

/// Errors surfaced to callers of the dispatcher.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The destination account does not exist.
    #[error("account does not exist")]
    NotExistingAccount,

    /// The sender has blocked the destination address.
    #[error("destination jid is blocked")]
    BlockedJid,

    /// The destination user has no presence registered anywhere.
    #[error("user is not authenticated")]
    NotAuthenticated,

    /// No session matches the destination resource.
    #[error("resource not found")]
    ResourceNotFound,

    /// The stanza carries no destination address.
    #[error("stanza has no destination")]
    NoDestination,

    /// A local session's outbound queue refused the stanza.
    #[error("local delivery failed: {0}")]
    Delivery(String),

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Cluster membership or transport failure.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}
