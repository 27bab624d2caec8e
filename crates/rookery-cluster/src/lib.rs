//! # rookery-cluster
//!
//! Cluster subsystem of the rookery routing core: a KV-backed member list with
//! TTL keepalives, leader election, and the HTTP/2 cleartext transport that
//! carries serialized stanzas between nodes.
//!
//! The [`Cluster`] facade bundles all of it behind one handle. The stanza
//! handler is registered by whoever owns the dispatcher, so this crate never
//! learns about routing.

pub mod breaker;
pub mod client;
pub mod cluster;
pub mod config;
pub mod etcd;
pub mod kv;
pub mod leader;
pub mod member;
pub mod memberlist;
pub mod pool;
pub mod server;

mod error;

pub use breaker::CircuitBreaker;
pub use client::{ClusterClient, TransportMetrics};
pub use cluster::Cluster;
pub use config::{BreakerConfig, ClusterConfig, EtcdConfig, DEFAULT_CLUSTER_PORT};
pub use error::ClusterError;
pub use kv::{MemoryKv, KV};
pub use leader::{Leader, SoloLeader};
pub use member::{Member, Members};
pub use memberlist::{MemberList, MEMBER_LIST_PREFIX};
pub use server::{ClusterServer, HandlerError, StanzaHandler, ROUTE_PATH};
