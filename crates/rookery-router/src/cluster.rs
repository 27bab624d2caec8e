//! Cross-node routing and leader-only housekeeping.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, instrument, warn};

use rookery_cluster::{Cluster, ClusterError};
use rookery_core::Stanza;
use rookery_storage::PresenceStore;

use crate::error::RouteError;

/// Forwards stanzas to the allocation owning the destination presence, and
/// garbage-collects presences left behind by dead allocations.
///
/// Every node runs the housekeeping ticker; only the elected leader acts on a
/// tick. A node temporarily late on its keepalive may see its presences purged
/// and re-upserted when its clients reconnect, so the period should stay at or
/// above 1.5x the membership TTL.
pub struct ClusterRouter {
    cluster: Arc<Cluster>,
    presences: Arc<dyn PresenceStore>,
    housekeeper: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterRouter {
    /// Campaign for leadership, join the member directory and start the
    /// housekeeping ticker.
    pub async fn new(
        cluster: Arc<Cluster>,
        presences: Arc<dyn PresenceStore>,
        housekeeping_interval: Duration,
    ) -> Result<Arc<Self>, RouteError> {
        cluster.elect().await?;
        cluster.join().await?;

        let router = Arc::new(Self {
            cluster,
            presences,
            housekeeper: Mutex::new(None),
        });

        let ticker = Arc::clone(&router);
        let handle = tokio::spawn(async move {
            let mut tick = interval(housekeeping_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await;
            loop {
                tick.tick().await;
                if let Err(e) = ticker.house_keeping(housekeeping_interval / 2).await {
                    warn!(error = %e, "housekeeping pass failed");
                }
            }
        });
        *router.housekeeper.lock().unwrap() = Some(handle);

        Ok(router)
    }

    /// Deliver a stanza to the member owning `allocation_id`.
    ///
    /// An allocation missing from the member snapshot is not an error: its
    /// presences are about to be reaped, so the stanza is dropped and
    /// membership catches up.
    #[instrument(skip(self, stanza), fields(allocation_id = %allocation_id, stanza = stanza.name()))]
    pub async fn route(&self, stanza: &Stanza, allocation_id: &str) -> Result<(), RouteError> {
        let members = self.cluster.members();
        let Some(member) = members.member(allocation_id) else {
            warn!("allocation not found in member list, dropping stanza");
            return Ok(());
        };
        self.cluster.route(stanza, member).await?;
        Ok(())
    }

    /// One reconciliation pass: remove presences owned by allocations that are
    /// no longer cluster members. Only acts on the leader.
    pub async fn house_keeping(&self, deadline: Duration) -> Result<(), RouteError> {
        if !self.cluster.is_leader() {
            return Ok(());
        }
        timeout(deadline, self.reap_dead_allocations())
            .await
            .map_err(|_| RouteError::Cluster(ClusterError::KvTimeout))?
    }

    async fn reap_dead_allocations(&self) -> Result<(), RouteError> {
        let allocation_ids = self.presences.fetch_allocation_ids().await?;
        let members = self.cluster.members();

        for allocation_id in allocation_ids {
            if members.member(&allocation_id).is_some() {
                continue;
            }
            debug!(allocation_id = %allocation_id, "clearing presences of dead allocation");
            if let Err(e) = self
                .presences
                .delete_allocation_presences(&allocation_id)
                .await
            {
                warn!(allocation_id = %allocation_id, error = %e, "failed to clear dead allocation presences");
            }
        }
        Ok(())
    }

    /// Stop the housekeeping ticker and withdraw from the cluster.
    pub async fn shutdown(&self) -> Result<(), RouteError> {
        if let Some(handle) = self.housekeeper.lock().unwrap().take() {
            handle.abort();
        }
        self.cluster.shutdown().await?;
        Ok(())
    }
}

impl Drop for ClusterRouter {
    fn drop(&mut self) {
        if let Some(handle) = self.housekeeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}
