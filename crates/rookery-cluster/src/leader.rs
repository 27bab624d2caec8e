//! Cluster leader election contract.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::ClusterError;

/// A single-leader election across the cluster.
///
/// `elect` is asynchronous in the campaign sense: it returns immediately and
/// callers poll [`Leader::is_leader`]. Losing the election session (lease
/// expiry) reverts `is_leader` to `false`.
#[async_trait]
pub trait Leader: Send + Sync {
    /// Start campaigning for leadership. Idempotent.
    async fn elect(&self) -> Result<(), ClusterError>;

    /// Release the election and close its session. Idempotent.
    async fn resign(&self) -> Result<(), ClusterError>;

    /// Whether this allocation currently holds leadership.
    fn is_leader(&self) -> bool;
}

/// Leader for deployments without a coordination store: the only candidate
/// wins instantly.
#[derive(Debug, Default)]
pub struct SoloLeader {
    elected: AtomicBool,
}

impl SoloLeader {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Leader for SoloLeader {
    async fn elect(&self) -> Result<(), ClusterError> {
        self.elected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resign(&self) -> Result<(), ClusterError> {
        self.elected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.elected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_solo_leader_lifecycle() {
        let leader = SoloLeader::new();
        assert!(!leader.is_leader());

        leader.elect().await.unwrap();
        assert!(leader.is_leader());
        leader.elect().await.unwrap();
        assert!(leader.is_leader());

        leader.resign().await.unwrap();
        assert!(!leader.is_leader());
        leader.resign().await.unwrap();
        assert!(!leader.is_leader());
    }
}
