//! The dispatch orchestrator.

use std::collections::BTreeSet;
use std::sync::Arc;

use bitflags::bitflags;
use futures::stream::{FuturesUnordered, StreamExt};
use jid::Jid;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use rookery_cluster::{Cluster, HandlerError};
use rookery_core::addressing;
use rookery_core::{ExtPresence, Stanza};
use rookery_storage::{BlockListStore, PresenceStore, UserStore};

use crate::cluster::ClusterRouter;
use crate::config::RouterConfig;
use crate::error::RouteError;
use crate::local::LocalRouter;
use crate::session::ClientSession;

bitflags! {
    /// Validations applied before routing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RoutingValidations: u8 {
        /// Verify the destination account exists.
        const USER_EXISTENCE = 1 << 0;
        /// Verify the sender has not blocked the destination address.
        const BLOCKED_DESTINATION_JID = 1 << 1;
    }
}

/// Routes every outbound client stanza to a local session, a peer node, or an
/// error.
///
/// Holds the local session registry and, when clustered, a [`ClusterRouter`]
/// whose transport carries stanzas to the allocation owning the destination
/// presence. The cluster's inbound stanza handler is wired to the local
/// registry at construction.
pub struct C2sRouter {
    users: Arc<dyn UserStore>,
    block_lists: Arc<dyn BlockListStore>,
    presences: Arc<dyn PresenceStore>,
    local: Arc<LocalRouter>,
    cluster: Option<Arc<Cluster>>,
    cluster_router: Option<Arc<ClusterRouter>>,
}

impl C2sRouter {
    pub async fn new(
        users: Arc<dyn UserStore>,
        block_lists: Arc<dyn BlockListStore>,
        presences: Arc<dyn PresenceStore>,
        cluster: Option<Arc<Cluster>>,
        config: RouterConfig,
    ) -> Result<Arc<Self>, RouteError> {
        let local = Arc::new(LocalRouter::new());

        let cluster_router = match &cluster {
            Some(cluster) => {
                let router = ClusterRouter::new(
                    Arc::clone(cluster),
                    Arc::clone(&presences),
                    config.housekeeping_interval(),
                )
                .await?;

                // inbound stanzas from peers go straight to the local registry
                let handler_local = Arc::clone(&local);
                cluster.register_stanza_handler(Arc::new(move |stanza| {
                    let local = Arc::clone(&handler_local);
                    Box::pin(async move {
                        local
                            .route(&stanza)
                            .map_err(|e| -> HandlerError { Box::new(e) })
                    })
                }));
                Some(router)
            }
            None => None,
        };

        Ok(Arc::new(Self {
            users,
            block_lists,
            presences,
            local,
            cluster,
            cluster_router,
        }))
    }

    /// Validate and deliver one stanza.
    #[instrument(skip(self, stanza), fields(stanza = stanza.name(), to = ?stanza.to_jid()))]
    pub async fn route(
        self: &Arc<Self>,
        stanza: Stanza,
        validations: RoutingValidations,
    ) -> Result<(), RouteError> {
        let to = stanza.to_jid().cloned().ok_or(RouteError::NoDestination)?;

        if validations.contains(RoutingValidations::USER_EXISTENCE) {
            let username = to.node().map(|n| n.as_str()).unwrap_or_default();
            if !self.users.user_exists(username).await? {
                return Err(RouteError::NotExistingAccount);
            }
        }
        if validations.contains(RoutingValidations::BLOCKED_DESTINATION_JID)
            && self.is_blocked(&stanza, &to).await
        {
            return Err(RouteError::BlockedJid);
        }

        let ext_presences = self
            .presences
            .fetch_presences_matching_jid(&Jid::from(to.to_bare()))
            .await?;
        if ext_presences.is_empty() {
            return Err(RouteError::NotAuthenticated);
        }
        self.dispatch(stanza, &to, &ext_presences).await
    }

    /// Register a session with the local registry.
    pub fn bind(&self, session: ClientSession) {
        info!(user = session.username(), resource = session.resource(), "bound c2s session");
        self.local.bind(session);
    }

    /// Remove a session from the local registry.
    pub fn unbind(&self, user: &str, resource: &str) {
        info!(user, resource, "unbound c2s session");
        self.local.unbind(user, resource);
    }

    /// Fetch one local session.
    pub fn stream(&self, user: &str, resource: &str) -> Option<ClientSession> {
        self.local.stream(user, resource)
    }

    /// All local sessions of a user.
    pub fn streams(&self, user: &str) -> Vec<ClientSession> {
        self.local.streams(user)
    }

    /// Stop the housekeeping loop and withdraw from the cluster.
    pub async fn shutdown(&self) -> Result<(), RouteError> {
        if let Some(cluster_router) = &self.cluster_router {
            cluster_router.shutdown().await?;
        }
        Ok(())
    }

    async fn dispatch(
        self: &Arc<Self>,
        stanza: Stanza,
        to: &Jid,
        ext_presences: &[ExtPresence],
    ) -> Result<(), RouteError> {
        if addressing::is_full_with_user(to) {
            return self.route_to_resource(&stanza, to, ext_presences).await;
        }
        if matches!(stanza, Stanza::Message(_))
            && self
                .route_to_prioritary_resources(&stanza, ext_presences)
                .await?
        {
            return Ok(());
        }
        self.route_to_all_resources(&stanza, ext_presences).await
    }

    async fn route_to_resource(
        &self,
        stanza: &Stanza,
        to: &Jid,
        ext_presences: &[ExtPresence],
    ) -> Result<(), RouteError> {
        let wanted = to.resource().map(|r| r.as_str().to_string());
        for ext_presence in ext_presences {
            let Some(full) = ext_presence.full_jid() else {
                continue;
            };
            if Some(full.resource().as_str().to_string()) != wanted {
                continue;
            }
            return self
                .route_to_allocation(stanza, &ext_presence.allocation_id)
                .await;
        }
        Err(RouteError::ResourceNotFound)
    }

    /// Deliver a bare-addressed message to the highest-priority resource(s).
    /// Returns `false` when no positive priority exists and the caller should
    /// broadcast instead.
    async fn route_to_prioritary_resources(
        self: &Arc<Self>,
        stanza: &Stanza,
        ext_presences: &[ExtPresence],
    ) -> Result<bool, RouteError> {
        let mut sorted: Vec<&ExtPresence> = ext_presences.iter().collect();
        sorted.sort_by(|a, b| {
            b.priority().cmp(&a.priority()).then_with(|| {
                let a_jid = a.full_jid().map(|j| j.to_string()).unwrap_or_default();
                let b_jid = b.full_jid().map(|j| j.to_string()).unwrap_or_default();
                a_jid.cmp(&b_jid)
            })
        });
        let highest = sorted[0].priority();
        if highest <= 0 {
            return Ok(false);
        }
        let prioritary: Vec<&ExtPresence> = sorted
            .iter()
            .take_while(|e| e.priority() == highest)
            .copied()
            .collect();

        if let [only] = prioritary.as_slice() {
            if let Some(full) = only.full_jid() {
                // a single winner is targeted explicitly
                let direct = stanza.with_to(Jid::from(full));
                self.route_to_allocation(&direct, &only.allocation_id)
                    .await?;
                return Ok(true);
            }
        }

        let allocation_ids: BTreeSet<String> = prioritary
            .iter()
            .map(|e| e.allocation_id.clone())
            .collect();
        self.fan_out(stanza, allocation_ids).await?;
        Ok(true)
    }

    async fn route_to_all_resources(
        self: &Arc<Self>,
        stanza: &Stanza,
        ext_presences: &[ExtPresence],
    ) -> Result<(), RouteError> {
        let allocation_ids: BTreeSet<String> = ext_presences
            .iter()
            .map(|e| e.allocation_id.clone())
            .collect();
        self.fan_out(stanza, allocation_ids).await
    }

    /// Dispatch one task per allocation and return the first error observed.
    /// Remaining tasks run to completion detached; their errors are discarded.
    async fn fan_out(
        self: &Arc<Self>,
        stanza: &Stanza,
        allocation_ids: BTreeSet<String>,
    ) -> Result<(), RouteError> {
        let mut inflight: FuturesUnordered<JoinHandle<Result<(), RouteError>>> =
            FuturesUnordered::new();
        for allocation_id in allocation_ids {
            let router = Arc::clone(self);
            let stanza = stanza.clone();
            inflight.push(tokio::spawn(async move {
                router.route_to_allocation(&stanza, &allocation_id).await
            }));
        }
        while let Some(joined) = inflight.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(RouteError::Delivery(format!("dispatch task failed: {e}"))),
            }
        }
        Ok(())
    }

    async fn route_to_allocation(
        &self,
        stanza: &Stanza,
        allocation_id: &str,
    ) -> Result<(), RouteError> {
        match (&self.cluster, &self.cluster_router) {
            (Some(cluster), Some(cluster_router))
                if !cluster.is_local_allocation(allocation_id) =>
            {
                cluster_router.route(stanza, allocation_id).await
            }
            _ => self.local.route(stanza),
        }
    }

    /// A stanza is blocked when the sender has blocked the destination or the
    /// destination has blocked the sender.
    async fn is_blocked(&self, stanza: &Stanza, to: &Jid) -> bool {
        let Some(from) = stanza.from_jid() else {
            return false;
        };
        if let Some(sender) = from.node() {
            if self.jid_in_block_list(sender.as_str(), to).await {
                return true;
            }
        }
        if let Some(recipient) = to.node() {
            if self.jid_in_block_list(recipient.as_str(), from).await {
                return true;
            }
        }
        false
    }

    async fn jid_in_block_list(&self, username: &str, jid: &Jid) -> bool {
        let items = match self.block_lists.fetch_block_list_items(username).await {
            Ok(items) => items,
            Err(e) => {
                warn!(user = username, error = %e, "failed to fetch block list");
                return false;
            }
        };
        items.iter().any(|item| addressing::blocks(&item.jid, jid))
    }
}
