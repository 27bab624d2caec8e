//! TTL-refreshed member directory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::ClusterError;
use crate::kv::KV;
use crate::member::{Member, Members};

/// Key namespace used for member advertisements.
pub const MEMBER_LIST_PREFIX: &str = "memberlist/";

/// Deadline applied to each coordination-store round trip.
const MEMBER_LIST_OP_TIMEOUT: Duration = Duration::from_secs(3);

/// The cluster member directory for this node.
///
/// While joined, a background task re-advertises the local member every half
/// TTL and refreshes the snapshot returned by [`MemberList::members`]. Refresh
/// failures keep the previous snapshot; the lease expires on its own if the
/// store stays unreachable.
pub struct MemberList {
    kv: Arc<dyn KV>,
    local: Member,
    alive_ttl: Duration,
    joined: AtomicBool,
    left: AtomicBool,
    members: RwLock<Members>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl MemberList {
    pub fn new(kv: Arc<dyn KV>, local: Member, alive_ttl: Duration) -> Self {
        Self {
            kv,
            local,
            alive_ttl,
            joined: AtomicBool::new(false),
            left: AtomicBool::new(false),
            members: RwLock::new(Members::default()),
            refresh_task: Mutex::new(None),
        }
    }

    /// The member record advertised for this node.
    pub fn local_member(&self) -> &Member {
        &self.local
    }

    /// Join the cluster: advertise the local member, take a first snapshot and
    /// start the refresh ticker. Idempotent.
    pub async fn join(self: &Arc<Self>) -> Result<(), ClusterError> {
        if self
            .joined
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        if let Err(e) = self.refresh_with_timeout().await {
            self.joined.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let list = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut tick = interval(list.alive_ttl / 2);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await; // the join already refreshed once
            loop {
                tick.tick().await;
                debug!("refreshing member list");
                if let Err(e) = list.refresh_with_timeout().await {
                    warn!(error = %e, "failed to refresh member list");
                }
            }
        });
        *self.refresh_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Leave the cluster: stop the ticker, delete the advertisement and clear
    /// the snapshot. Idempotent, safe after a partial join.
    pub async fn leave(&self) -> Result<(), ClusterError> {
        if !self.joined.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self
            .left
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        if let Some(handle) = self.refresh_task.lock().unwrap().take() {
            handle.abort();
        }
        let key = format!("{MEMBER_LIST_PREFIX}{}", self.local.allocation_id);
        timeout(MEMBER_LIST_OP_TIMEOUT, self.kv.del(&key))
            .await
            .map_err(|_| ClusterError::KvTimeout)??;
        *self.members.write().unwrap() = Members::default();
        Ok(())
    }

    /// Last refreshed member snapshot.
    pub fn members(&self) -> Members {
        self.members.read().unwrap().clone()
    }

    async fn refresh_with_timeout(&self) -> Result<(), ClusterError> {
        timeout(MEMBER_LIST_OP_TIMEOUT, self.refresh())
            .await
            .map_err(|_| ClusterError::KvTimeout)?
    }

    async fn refresh(&self) -> Result<(), ClusterError> {
        let key = format!("{MEMBER_LIST_PREFIX}{}", self.local.allocation_id);
        self.kv
            .put(&key, &self.local.advertised_addr(), self.alive_ttl)
            .await?;

        let entries = self.kv.get_prefix(MEMBER_LIST_PREFIX).await?;
        let mut members = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            members.push(Member::from_kv(key, value, MEMBER_LIST_PREFIX)?);
        }
        members.sort_by(|a, b| a.allocation_id.cmp(&b.allocation_id));

        *self.members.write().unwrap() = Members::new(members);
        Ok(())
    }
}

impl Drop for MemberList {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn member_list(ttl_ms: u64) -> (Arc<MemberList>, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        let local = Member {
            allocation_id: "a1".to_string(),
            host: "10.1.0.2".to_string(),
            port: 2786,
        };
        let list = Arc::new(MemberList::new(
            kv.clone(),
            local,
            Duration::from_millis(ttl_ms),
        ));
        (list, kv)
    }

    #[tokio::test]
    async fn test_join_advertises_and_snapshots() {
        let (list, kv) = member_list(60_000);

        list.join().await.unwrap();

        let members = list.members();
        assert_eq!(members.len(), 1);
        let m = members.member("a1").unwrap();
        assert_eq!(m.host, "10.1.0.2");
        assert_eq!(m.port, 2786);

        let stored = kv.get_prefix(MEMBER_LIST_PREFIX).await.unwrap();
        assert_eq!(stored["memberlist/a1"], "10.1.0.2:2786");

        // idempotent
        list.join().await.unwrap();
        assert_eq!(list.members().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_members() {
        let (list, kv) = member_list(100);

        list.join().await.unwrap();
        kv.put("memberlist/a2", "10.1.0.3:2786", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        let members = list.members();
        assert_eq!(members.len(), 2);
        assert!(members.member("a2").is_some());
    }

    #[tokio::test]
    async fn test_leave_clears_advertisement_and_snapshot() {
        let (list, kv) = member_list(60_000);

        list.join().await.unwrap();
        list.leave().await.unwrap();

        assert!(list.members().is_empty());
        assert!(kv.get_prefix(MEMBER_LIST_PREFIX).await.unwrap().is_empty());

        // idempotent
        list.leave().await.unwrap();
    }

    #[tokio::test]
    async fn test_leave_before_join_is_noop() {
        let (list, _kv) = member_list(60_000);
        list.leave().await.unwrap();
        assert!(list.members().is_empty());
    }
}
