//! Cluster facade bundling membership, election and transport.

use std::sync::Arc;

use tracing::info;

use rookery_core::Stanza;

use crate::client::{ClusterClient, TransportMetrics};
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::kv::KV;
use crate::leader::Leader;
use crate::member::{Member, Members};
use crate::memberlist::MemberList;
use crate::server::{ClusterServer, StanzaHandler};

/// One handle over the whole cluster subsystem.
///
/// Construction binds the transport listener so the advertised member carries
/// the real port; joining the member directory and campaigning for leadership
/// are left to the caller. The inbound stanza handler is wired in by whoever
/// owns the dispatcher, keeping this type routing-agnostic.
pub struct Cluster {
    allocation_id: String,
    leader: Arc<dyn Leader>,
    member_list: Arc<MemberList>,
    server: Arc<ClusterServer>,
    client: ClusterClient,
}

impl Cluster {
    pub async fn new(
        config: &ClusterConfig,
        allocation_id: impl Into<String>,
        leader: Arc<dyn Leader>,
        kv: Arc<dyn KV>,
    ) -> Result<Self, ClusterError> {
        let allocation_id = allocation_id.into();

        let server = Arc::new(ClusterServer::new(config.port));
        let bound = server.start().await?;

        let local = Member {
            allocation_id: allocation_id.clone(),
            host: config.host.clone(),
            port: bound.port(),
        };
        let member_list = Arc::new(MemberList::new(kv, local, config.alive_ttl()));
        let client = ClusterClient::new(&config.breaker)?;

        info!(allocation_id = %allocation_id, addr = %bound, "cluster subsystem ready");

        Ok(Self {
            allocation_id,
            leader,
            member_list,
            server,
            client,
        })
    }

    /// This node's allocation identifier.
    pub fn allocation_id(&self) -> &str {
        &self.allocation_id
    }

    /// Whether `allocation_id` refers to this node.
    pub fn is_local_allocation(&self, allocation_id: &str) -> bool {
        self.allocation_id == allocation_id
    }

    /// Install the callback receiving stanzas from peer nodes.
    pub fn register_stanza_handler(&self, handler: StanzaHandler) {
        self.server.register_stanza_handler(handler);
    }

    /// Advertise this node in the member directory. Idempotent.
    pub async fn join(&self) -> Result<(), ClusterError> {
        self.member_list.join().await
    }

    /// Withdraw this node from the member directory. Idempotent.
    pub async fn leave(&self) -> Result<(), ClusterError> {
        self.member_list.leave().await
    }

    /// Last refreshed member snapshot.
    pub fn members(&self) -> Members {
        self.member_list.members()
    }

    /// Start campaigning for cluster leadership. Idempotent.
    pub async fn elect(&self) -> Result<(), ClusterError> {
        self.leader.elect().await
    }

    /// Release leadership, if held. Idempotent.
    pub async fn resign(&self) -> Result<(), ClusterError> {
        self.leader.resign().await
    }

    /// Whether this node currently leads the cluster.
    pub fn is_leader(&self) -> bool {
        self.leader.is_leader()
    }

    /// Deliver a stanza to a peer member over the transport.
    pub async fn route(&self, stanza: &Stanza, member: &Member) -> Result<(), ClusterError> {
        self.client.route(stanza, member).await
    }

    /// Transport client counters.
    pub fn transport_metrics(&self) -> &TransportMetrics {
        self.client.metrics()
    }

    /// Leave, resign and stop serving, in that order.
    pub async fn shutdown(&self) -> Result<(), ClusterError> {
        self.member_list.leave().await?;
        self.leader.resign().await?;
        self.server.shutdown().await;
        info!(allocation_id = %self.allocation_id, "cluster subsystem shut down");
        Ok(())
    }
}
