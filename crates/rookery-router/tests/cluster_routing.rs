//! Cross-node routing and housekeeping over a real transport and a shared
//! in-memory coordination store.

use std::sync::Arc;
use std::time::Duration;

use jid::{FullJid, Jid};
use tokio::sync::mpsc;
use tokio::time::timeout;
use xmpp_parsers::message::{Message, MessageType};
use xmpp_parsers::presence::{Presence, Type};

use rookery_cluster::{Cluster, ClusterConfig, MemoryKv, SoloLeader, KV, MEMBER_LIST_PREFIX};
use rookery_core::Stanza;
use rookery_router::{C2sRouter, ClientSession, ClusterRouter, RouterConfig, RoutingValidations};
use rookery_storage::{MemoryStorage, PresenceStore};

fn presence(full: &str, priority: i8) -> (Presence, FullJid) {
    let jid: FullJid = full.parse().unwrap();
    let mut p = Presence::new(Type::None);
    p.from = Some(Jid::from(jid.clone()));
    p.priority = priority;
    (p, jid)
}

fn chat_message(from: &str, to: &str) -> Stanza {
    let mut msg = Message::new(Some(to.parse::<Jid>().unwrap()));
    msg.from = Some(from.parse().unwrap());
    msg.type_ = MessageType::Chat;
    msg.id = Some("x1".to_string());
    Stanza::Message(msg)
}

async fn node(
    allocation_id: &str,
    kv: Arc<MemoryKv>,
    directory: Arc<MemoryStorage>,
) -> (Arc<C2sRouter>, Arc<Cluster>) {
    let config = ClusterConfig::default().with_port(0);
    let cluster = Arc::new(
        Cluster::new(&config, allocation_id, Arc::new(SoloLeader::new()), kv)
            .await
            .unwrap(),
    );
    let router = C2sRouter::new(
        directory.clone(),
        directory.clone(),
        directory.clone(),
        Some(Arc::clone(&cluster)),
        RouterConfig::default(),
    )
    .await
    .unwrap();
    (router, cluster)
}

#[tokio::test]
async fn test_bare_message_fans_out_across_nodes() {
    let kv = Arc::new(MemoryKv::new());
    let directory = Arc::new(MemoryStorage::new());

    // node B hosts alice/laptop
    let (router_b, _cluster_b) = node("a2", kv.clone(), directory.clone()).await;
    let (laptop_tx, mut laptop_rx) = mpsc::channel(8);
    router_b.bind(ClientSession::new("alice", "laptop", laptop_tx));
    let (p, jid) = presence("alice@x.test/laptop", 10);
    directory.upsert_presence(&p, &jid, "a2").await.unwrap();

    // node A hosts alice/phone; created second so its first member snapshot
    // already contains both allocations
    let (router_a, _cluster_a) = node("a1", kv.clone(), directory.clone()).await;
    let (phone_tx, mut phone_rx) = mpsc::channel(8);
    router_a.bind(ClientSession::new("alice", "phone", phone_tx));
    let (p, jid) = presence("alice@x.test/phone", 10);
    directory.upsert_presence(&p, &jid, "a1").await.unwrap();

    router_a
        .route(
            chat_message("bob@x.test/desk", "alice@x.test"),
            RoutingValidations::empty(),
        )
        .await
        .unwrap();

    // local delivery on A
    let local = timeout(Duration::from_secs(5), phone_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(local.to_jid().unwrap().to_string(), "alice@x.test");

    // remote delivery crossed the wire to B
    let remote = timeout(Duration::from_secs(5), laptop_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remote.to_jid().unwrap().to_string(), "alice@x.test");
    assert_eq!(remote.name(), "message");

    router_a.shutdown().await.unwrap();
    router_b.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_full_jid_message_routes_to_owning_node_only() {
    let kv = Arc::new(MemoryKv::new());
    let directory = Arc::new(MemoryStorage::new());

    let (router_b, _cluster_b) = node("a2", kv.clone(), directory.clone()).await;
    let (laptop_tx, mut laptop_rx) = mpsc::channel(8);
    router_b.bind(ClientSession::new("alice", "laptop", laptop_tx));
    let (p, jid) = presence("alice@x.test/laptop", 0);
    directory.upsert_presence(&p, &jid, "a2").await.unwrap();

    let (router_a, _cluster_a) = node("a1", kv.clone(), directory.clone()).await;
    let (phone_tx, mut phone_rx) = mpsc::channel(8);
    router_a.bind(ClientSession::new("alice", "phone", phone_tx));
    let (p, jid) = presence("alice@x.test/phone", 0);
    directory.upsert_presence(&p, &jid, "a1").await.unwrap();

    router_a
        .route(
            chat_message("bob@x.test/desk", "alice@x.test/laptop"),
            RoutingValidations::empty(),
        )
        .await
        .unwrap();

    let remote = timeout(Duration::from_secs(5), laptop_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        remote.to_jid().unwrap().to_string(),
        "alice@x.test/laptop"
    );
    assert!(phone_rx.try_recv().is_err());

    router_a.shutdown().await.unwrap();
    router_b.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_housekeeping_reaps_dead_allocations() {
    let kv = Arc::new(MemoryKv::new());
    let directory = Arc::new(MemoryStorage::new());

    // presences for a live peer and a dead allocation
    for (full, alloc) in [
        ("alice@x.test/phone", "a1"),
        ("alice@x.test/laptop", "a2"),
        ("bob@x.test/desk", "a3"),
    ] {
        let (p, jid) = presence(full, 0);
        directory.upsert_presence(&p, &jid, alloc).await.unwrap();
    }

    // a2 is a live member; a3 is not
    kv.put("memberlist/a2", "127.0.0.1:19999", Duration::from_secs(60))
        .await
        .unwrap();

    let config = ClusterConfig::default().with_port(0);
    let cluster = Arc::new(
        Cluster::new(&config, "a1", Arc::new(SoloLeader::new()), kv.clone())
            .await
            .unwrap(),
    );
    let cluster_router = ClusterRouter::new(
        Arc::clone(&cluster),
        directory.clone(),
        Duration::from_secs(60),
    )
    .await
    .unwrap();

    cluster_router
        .house_keeping(Duration::from_secs(2))
        .await
        .unwrap();

    let mut remaining = directory.fetch_allocation_ids().await.unwrap();
    remaining.sort();
    assert_eq!(remaining, vec!["a1", "a2"]);

    cluster_router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_housekeeping_is_leader_only() {
    let kv = Arc::new(MemoryKv::new());
    let directory = Arc::new(MemoryStorage::new());

    let (p, jid) = presence("bob@x.test/desk", 0);
    directory.upsert_presence(&p, &jid, "a9").await.unwrap();

    let config = ClusterConfig::default().with_port(0);
    let cluster = Arc::new(
        Cluster::new(&config, "a1", Arc::new(SoloLeader::new()), kv)
            .await
            .unwrap(),
    );
    let cluster_router = ClusterRouter::new(
        Arc::clone(&cluster),
        directory.clone(),
        Duration::from_secs(60),
    )
    .await
    .unwrap();

    cluster.resign().await.unwrap();
    cluster_router
        .house_keeping(Duration::from_secs(2))
        .await
        .unwrap();

    // the dead allocation's presence survives because nobody led the pass
    assert_eq!(directory.fetch_allocation_ids().await.unwrap(), vec!["a9"]);

    cluster_router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_withdraws_member_advertisement() {
    let kv = Arc::new(MemoryKv::new());
    let directory = Arc::new(MemoryStorage::new());

    let (router, _cluster) = node("a1", kv.clone(), directory).await;
    assert!(!kv.get_prefix(MEMBER_LIST_PREFIX).await.unwrap().is_empty());

    router.shutdown().await.unwrap();
    assert!(kv.get_prefix(MEMBER_LIST_PREFIX).await.unwrap().is_empty());
}
