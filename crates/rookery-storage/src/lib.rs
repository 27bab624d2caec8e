//! # rookery-storage
//!
//! Storage contracts consumed by the stanza router, plus an in-memory backend.
//!
//! Implementations can be backed by SQL for clustered deployments; the
//! [`MemoryStorage`] backend keeps everything in-process and is what tests and
//! single-node setups use.

pub mod memory;

use async_trait::async_trait;
use jid::{BareJid, FullJid, Jid};
use thiserror::Error;
use xmpp_parsers::presence::Presence;

use rookery_core::{BlockListItem, Capabilities, ExtPresence};

pub use memory::MemoryStorage;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or the operation timed out.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A stored record could not be decoded.
    #[error("corrupted record: {0}")]
    Corrupted(String),
}

/// Queryable directory of online resources, shared by every node.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Atomically replace the presence registered for `jid`.
    ///
    /// Returns `true` only when no previous record existed.
    async fn upsert_presence(
        &self,
        presence: &Presence,
        jid: &FullJid,
        allocation_id: &str,
    ) -> Result<bool, StorageError>;

    /// Exact single-record lookup.
    async fn fetch_presence(&self, jid: &FullJid) -> Result<Option<ExtPresence>, StorageError>;

    /// Fan-out lookup; the match mode follows `jid`'s shape: full-with-user is
    /// exact, bare selects every resource of the user, full-with-server selects
    /// that resource across the domain, and a lone domain selects everyone on
    /// it.
    async fn fetch_presences_matching_jid(
        &self,
        jid: &Jid,
    ) -> Result<Vec<ExtPresence>, StorageError>;

    /// Highest-priority presence for the bare JID. `None` when there is no
    /// record or the highest priority is not positive. Ties break on the
    /// lexicographically smallest full JID.
    async fn fetch_prioritary_presence(
        &self,
        jid: &BareJid,
    ) -> Result<Option<ExtPresence>, StorageError>;

    /// Owning allocation of the record for `jid`, if any.
    async fn fetch_presence_allocation_id(
        &self,
        jid: &FullJid,
    ) -> Result<Option<String>, StorageError>;

    /// Distinct set of allocations with at least one registered presence.
    async fn fetch_allocation_ids(&self) -> Result<Vec<String>, StorageError>;

    /// Remove the record for `jid`.
    async fn delete_presence(&self, jid: &FullJid) -> Result<(), StorageError>;

    /// Remove every record owned by `allocation_id`.
    async fn delete_allocation_presences(&self, allocation_id: &str) -> Result<(), StorageError>;

    /// Store a capabilities record; content-addressed, so re-upserting the
    /// same `(node, ver)` is stable.
    async fn upsert_capabilities(&self, caps: &Capabilities) -> Result<(), StorageError>;

    /// Look up a capabilities record.
    async fn fetch_capabilities(
        &self,
        node: &str,
        ver: &str,
    ) -> Result<Option<Capabilities>, StorageError>;
}

/// Account lookups used by routing validations.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn user_exists(&self, username: &str) -> Result<bool, StorageError>;
}

/// Block lists consulted read-only during dispatch.
#[async_trait]
pub trait BlockListStore: Send + Sync {
    async fn fetch_block_list_items(
        &self,
        username: &str,
    ) -> Result<Vec<BlockListItem>, StorageError>;
}
