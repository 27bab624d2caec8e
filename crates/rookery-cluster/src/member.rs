//! Cluster member records.

use crate::error::ClusterError;

/// A single live allocation in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Unique identifier of the running node.
    pub allocation_id: String,
    /// Host the node's transport listens on.
    pub host: String,
    /// Port the node's transport listens on.
    pub port: u16,
}

impl Member {
    /// Base URL of the member's transport endpoint.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// `host:port` form advertised in the member directory.
    pub(crate) fn advertised_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Decode a directory entry back into a member.
    pub(crate) fn from_kv(key: &str, value: &str, prefix: &str) -> Result<Member, ClusterError> {
        let allocation_id = key
            .strip_prefix(prefix)
            .ok_or_else(|| ClusterError::MalformedMember(format!("unexpected key {key}")))?;
        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| ClusterError::MalformedMember(format!("missing port in {value}")))?;
        let port = port
            .parse()
            .map_err(|_| ClusterError::MalformedMember(format!("bad port in {value}")))?;
        Ok(Member {
            allocation_id: allocation_id.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

/// Snapshot of every live member.
#[derive(Debug, Clone, Default)]
pub struct Members(Vec<Member>);

impl Members {
    pub fn new(members: Vec<Member>) -> Self {
        Self(members)
    }

    /// The member owning `allocation_id`, if it is alive.
    pub fn member(&self, allocation_id: &str) -> Option<&Member> {
        self.0.iter().find(|m| m.allocation_id == allocation_id)
    }

    /// Allocation identifiers of every member.
    pub fn allocation_ids(&self) -> Vec<String> {
        self.0.iter().map(|m| m.allocation_id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
