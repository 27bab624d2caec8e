//! etcd adapter for the KV contract and leader election.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Client, ElectionClient, GetOptions, KvClient, LeaderKey, LeaseClient, PutOptions,
    ResignOptions,
};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::EtcdConfig;
use crate::error::ClusterError;
use crate::kv::KV;
use crate::leader::Leader;

/// TTL of the lease backing the election session, in seconds.
const ELECTION_SESSION_TTL_SECS: i64 = 5;

/// Connect to etcd and hand back the election and KV halves.
pub async fn connect(
    config: &EtcdConfig,
    election_name: &str,
    candidate_value: &str,
) -> Result<(EtcdLeader, EtcdKv), ClusterError> {
    let client = Client::connect(config.endpoints.clone(), None)
        .await
        .map_err(|e| ClusterError::Kv(e.to_string()))?;
    let kv = EtcdKv {
        kv: client.kv_client(),
        lease: client.lease_client(),
    };
    let leader = EtcdLeader::new(
        client.election_client(),
        client.lease_client(),
        election_name,
        candidate_value,
    );
    Ok((leader, kv))
}

/// [`KV`] over etcd: every write is attached to a freshly granted lease.
pub struct EtcdKv {
    kv: KvClient,
    lease: LeaseClient,
}

#[async_trait]
impl KV for EtcdKv {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ClusterError> {
        let mut lease = self.lease.clone();
        let grant = lease
            .grant(ttl.as_secs().max(1) as i64, None)
            .await
            .map_err(|e| ClusterError::Kv(e.to_string()))?;

        let mut kv = self.kv.clone();
        kv.put(key, value, Some(PutOptions::new().with_lease(grant.id())))
            .await
            .map_err(|e| ClusterError::Kv(e.to_string()))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), ClusterError> {
        let mut kv = self.kv.clone();
        kv.delete(key, None)
            .await
            .map_err(|e| ClusterError::Kv(e.to_string()))?;
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, ClusterError> {
        let mut kv = self.kv.clone();
        let resp = kv
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| ClusterError::Kv(e.to_string()))?;

        let mut values = HashMap::with_capacity(resp.kvs().len());
        for entry in resp.kvs() {
            let key = entry
                .key_str()
                .map_err(|e| ClusterError::Kv(e.to_string()))?;
            let value = entry
                .value_str()
                .map_err(|e| ClusterError::Kv(e.to_string()))?;
            values.insert(key.to_string(), value.to_string());
        }
        Ok(values)
    }
}

/// [`Leader`] over etcd's election primitive.
///
/// `elect` grants a session lease, keeps it alive in the background and
/// campaigns; the campaign resolves once this candidate becomes leader. If the
/// session lease later fails to renew, leadership is dropped.
pub struct EtcdLeader {
    election: ElectionClient,
    lease: LeaseClient,
    election_name: String,
    candidate_value: String,
    is_leader: Arc<AtomicBool>,
    elected: AtomicBool,
    lease_id: Arc<AtomicI64>,
    leader_key: Arc<Mutex<Option<LeaderKey>>>,
    campaign_task: Mutex<Option<JoinHandle<()>>>,
}

impl EtcdLeader {
    pub fn new(
        election: ElectionClient,
        lease: LeaseClient,
        election_name: &str,
        candidate_value: &str,
    ) -> Self {
        Self {
            election,
            lease,
            election_name: election_name.to_string(),
            candidate_value: candidate_value.to_string(),
            is_leader: Arc::new(AtomicBool::new(false)),
            elected: AtomicBool::new(false),
            lease_id: Arc::new(AtomicI64::new(0)),
            leader_key: Arc::new(Mutex::new(None)),
            campaign_task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Leader for EtcdLeader {
    async fn elect(&self) -> Result<(), ClusterError> {
        if self
            .elected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let mut election = self.election.clone();
        let mut lease = self.lease.clone();
        let election_name = self.election_name.clone();
        let candidate_value = self.candidate_value.clone();
        let is_leader = Arc::clone(&self.is_leader);
        let lease_id_slot = Arc::clone(&self.lease_id);
        let leader_key_slot = Arc::clone(&self.leader_key);

        let handle = tokio::spawn(async move {
            let grant = match lease.grant(ELECTION_SESSION_TTL_SECS, None).await {
                Ok(grant) => grant,
                Err(e) => {
                    warn!(error = %e, "failed to grant election lease");
                    return;
                }
            };
            lease_id_slot.store(grant.id(), Ordering::SeqCst);

            let (mut keeper, mut responses) = match lease.keep_alive(grant.id()).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "failed to start election lease keepalive");
                    return;
                }
            };

            // renew the session lease at a third of its TTL
            let keepalive = tokio::spawn(async move {
                let period = Duration::from_secs((ELECTION_SESSION_TTL_SECS as u64 / 3).max(1));
                let mut tick = interval(period);
                loop {
                    tick.tick().await;
                    if keeper.keep_alive().await.is_err() {
                        break;
                    }
                    match responses.message().await {
                        Ok(Some(resp)) if resp.ttl() > 0 => {}
                        _ => break,
                    }
                }
            });

            match election
                .campaign(election_name, candidate_value, grant.id())
                .await
            {
                Ok(resp) => {
                    *leader_key_slot.lock().unwrap() = resp.leader().cloned();
                    is_leader.store(true, Ordering::SeqCst);
                    info!("elected as cluster leader");
                }
                Err(e) => {
                    warn!(error = %e, "leader campaign failed");
                    keepalive.abort();
                    return;
                }
            }

            // once the keepalive loop ends the session is gone, and with it
            // the leadership
            let _ = keepalive.await;
            is_leader.store(false, Ordering::SeqCst);
            warn!("election session expired, leadership lost");
        });
        *self.campaign_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    async fn resign(&self) -> Result<(), ClusterError> {
        if !self.elected.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(handle) = self.campaign_task.lock().unwrap().take() {
            handle.abort();
        }

        let leader_key = self.leader_key.lock().unwrap().take();
        if let Some(leader_key) = leader_key {
            let mut election = self.election.clone();
            election
                .resign(Some(ResignOptions::new().with_leader(leader_key)))
                .await
                .map_err(|e| ClusterError::Election(e.to_string()))?;
        }

        let lease_id = self.lease_id.swap(0, Ordering::SeqCst);
        if lease_id != 0 {
            let mut lease = self.lease.clone();
            if let Err(e) = lease.revoke(lease_id).await {
                warn!(error = %e, "failed to revoke election lease");
            }
        }

        self.is_leader.store(false, Ordering::SeqCst);
        self.elected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }
}
