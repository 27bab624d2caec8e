//! In-memory storage backend.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use jid::{BareJid, FullJid, Jid};
use xmpp_parsers::presence::Presence;

use rookery_core::addressing::{self, MatchMode};
use rookery_core::{BlockListItem, Capabilities, CapsRef, ExtPresence};

use crate::{BlockListStore, PresenceStore, StorageError, UserStore};

/// In-process storage, suitable for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    presences: DashMap<FullJid, ExtPresence>,
    capabilities: DashMap<(String, String), Capabilities>,
    users: DashMap<String, ()>,
    block_lists: DashMap<String, Vec<BlockListItem>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account so `user_exists` reports it.
    pub fn add_user(&self, username: impl Into<String>) {
        self.users.insert(username.into(), ());
    }

    /// Append an entry to a user's block list.
    pub fn add_block_list_item(&self, username: impl Into<String>, jid: Jid) {
        let username = username.into();
        self.block_lists
            .entry(username.clone())
            .or_default()
            .push(BlockListItem { username, jid });
    }

    /// Attach the capabilities the record's caps ref points at, when known.
    fn resolve_caps(&self, mut ext: ExtPresence) -> ExtPresence {
        if let Some(caps_ref) = CapsRef::from_presence(&ext.presence) {
            ext.caps = self
                .capabilities
                .get(&(caps_ref.node, caps_ref.ver))
                .map(|c| c.value().clone());
        }
        ext
    }

    fn match_mode(jid: &Jid) -> MatchMode {
        if addressing::is_bare_with_user(jid) {
            MatchMode::Bare
        } else if addressing::is_full_with_server(jid) {
            MatchMode::DomainAndResource
        } else {
            MatchMode::Domain
        }
    }
}

#[async_trait]
impl PresenceStore for MemoryStorage {
    async fn upsert_presence(
        &self,
        presence: &Presence,
        jid: &FullJid,
        allocation_id: &str,
    ) -> Result<bool, StorageError> {
        let previous = self
            .presences
            .insert(jid.clone(), ExtPresence::new(allocation_id, presence.clone()));
        Ok(previous.is_none())
    }

    async fn fetch_presence(&self, jid: &FullJid) -> Result<Option<ExtPresence>, StorageError> {
        Ok(self
            .presences
            .get(jid)
            .map(|e| self.resolve_caps(e.value().clone())))
    }

    async fn fetch_presences_matching_jid(
        &self,
        jid: &Jid,
    ) -> Result<Vec<ExtPresence>, StorageError> {
        if addressing::is_full_with_user(jid) {
            let full = jid
                .clone()
                .try_into_full()
                .map_err(|_| StorageError::Corrupted("full JID expected".into()))?;
            return Ok(self.fetch_presence(&full).await?.into_iter().collect());
        }
        let mode = Self::match_mode(jid);
        let mut matched: Vec<ExtPresence> = self
            .presences
            .iter()
            .filter(|entry| addressing::matches(jid, &Jid::from(entry.key().clone()), mode))
            .map(|entry| self.resolve_caps(entry.value().clone()))
            .collect();
        // deterministic order keeps fan-out and tests stable
        matched.sort_by_key(|e| e.full_jid().map(|j| j.to_string()).unwrap_or_default());
        Ok(matched)
    }

    async fn fetch_prioritary_presence(
        &self,
        jid: &BareJid,
    ) -> Result<Option<ExtPresence>, StorageError> {
        let mut matched = self
            .fetch_presences_matching_jid(&Jid::from(jid.clone()))
            .await?;
        matched.sort_by(|a, b| {
            b.priority().cmp(&a.priority()).then_with(|| {
                let a_jid = a.full_jid().map(|j| j.to_string()).unwrap_or_default();
                let b_jid = b.full_jid().map(|j| j.to_string()).unwrap_or_default();
                a_jid.cmp(&b_jid)
            })
        });
        Ok(matched.into_iter().next().filter(|e| e.priority() > 0))
    }

    async fn fetch_presence_allocation_id(
        &self,
        jid: &FullJid,
    ) -> Result<Option<String>, StorageError> {
        Ok(self.presences.get(jid).map(|e| e.allocation_id.clone()))
    }

    async fn fetch_allocation_ids(&self) -> Result<Vec<String>, StorageError> {
        let distinct: HashSet<String> = self
            .presences
            .iter()
            .map(|e| e.allocation_id.clone())
            .collect();
        Ok(distinct.into_iter().collect())
    }

    async fn delete_presence(&self, jid: &FullJid) -> Result<(), StorageError> {
        self.presences.remove(jid);
        Ok(())
    }

    async fn delete_allocation_presences(&self, allocation_id: &str) -> Result<(), StorageError> {
        self.presences
            .retain(|_, ext| ext.allocation_id != allocation_id);
        Ok(())
    }

    async fn upsert_capabilities(&self, caps: &Capabilities) -> Result<(), StorageError> {
        self.capabilities
            .insert((caps.node.clone(), caps.ver.clone()), caps.clone());
        Ok(())
    }

    async fn fetch_capabilities(
        &self,
        node: &str,
        ver: &str,
    ) -> Result<Option<Capabilities>, StorageError> {
        Ok(self
            .capabilities
            .get(&(node.to_string(), ver.to_string()))
            .map(|c| c.value().clone()))
    }
}

#[async_trait]
impl UserStore for MemoryStorage {
    async fn user_exists(&self, username: &str) -> Result<bool, StorageError> {
        Ok(self.users.contains_key(username))
    }
}

#[async_trait]
impl BlockListStore for MemoryStorage {
    async fn fetch_block_list_items(
        &self,
        username: &str,
    ) -> Result<Vec<BlockListItem>, StorageError> {
        Ok(self
            .block_lists
            .get(username)
            .map(|items| items.value().clone())
            .unwrap_or_default())
    }
}
