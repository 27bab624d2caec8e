//! Pooled HTTP/2 client carrying stanzas to peer nodes.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use rookery_core::Stanza;

use crate::breaker::CircuitBreaker;
use crate::config::BreakerConfig;
use crate::error::ClusterError;
use crate::member::Member;
use crate::pool::BufferPool;
use crate::server::ROUTE_PATH;

const XML_MIME_TYPE: &str = "application/xml";

/// Counters kept by the transport client.
#[derive(Debug, Default)]
pub struct TransportMetrics {
    stanzas_sent: AtomicU64,
    send_failures: AtomicU64,
    breaker_opens: AtomicU64,
}

impl TransportMetrics {
    pub fn stanzas_sent(&self) -> u64 {
        self.stanzas_sent.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    pub fn breaker_opens(&self) -> u64 {
        self.breaker_opens.load(Ordering::Relaxed)
    }

    fn record_sent(&self) {
        self.stanzas_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_breaker_open(&self) {
        self.breaker_opens.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outbound half of the inter-node transport.
///
/// One HTTP/2 cleartext client is shared for every peer; the connection pool
/// below it multiplexes concurrent deliveries over a single TCP connection per
/// member. Calls go through a circuit breaker, and non-2xx responses fail the
/// call.
pub struct ClusterClient {
    http: reqwest::Client,
    breaker: CircuitBreaker,
    pool: BufferPool,
    metrics: TransportMetrics,
}

impl ClusterClient {
    pub fn new(breaker_config: &BreakerConfig) -> Result<Self, ClusterError> {
        let http = reqwest::Client::builder()
            .http2_prior_knowledge()
            .build()?;
        Ok(Self {
            http,
            breaker: CircuitBreaker::new(breaker_config),
            pool: BufferPool::default(),
            metrics: TransportMetrics::default(),
        })
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }

    /// Deliver a serialized stanza to `member`'s `/route` endpoint.
    #[instrument(skip(self, stanza), fields(allocation_id = %member.allocation_id, stanza = stanza.name()))]
    pub async fn route(&self, stanza: &Stanza, member: &Member) -> Result<(), ClusterError> {
        if let Some(retry_after) = self.breaker.allow() {
            self.metrics.record_failure();
            return Err(ClusterError::CircuitOpen(retry_after));
        }

        let body = self.serialize(stanza)?;
        let url = format!("{}{}", member.base_url(), ROUTE_PATH);

        let result = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, XML_MIME_TYPE)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                self.breaker.record_success();
                self.metrics.record_sent();
                debug!("stanza delivered to peer");
                Ok(())
            }
            Ok(response) => {
                self.record_call_failure();
                Err(ClusterError::PeerStatus(response.status().as_u16()))
            }
            Err(e) => {
                self.record_call_failure();
                Err(ClusterError::Transport(e))
            }
        }
    }

    fn serialize(&self, stanza: &Stanza) -> Result<Bytes, ClusterError> {
        let mut buffer = self.pool.get();
        if let Err(e) = stanza.to_element().write_to(&mut buffer) {
            self.pool.put(buffer);
            return Err(ClusterError::Encode(e.to_string()));
        }
        let body = Bytes::copy_from_slice(&buffer);
        self.pool.put(buffer);
        Ok(body)
    }

    fn record_call_failure(&self) {
        self.metrics.record_failure();
        if self.breaker.record_failure() {
            self.metrics.record_breaker_open();
            warn!("transport circuit breaker opened");
        }
    }
}
