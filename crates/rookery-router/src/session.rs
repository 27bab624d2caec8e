//! Handle to a live client attachment.

use tokio::sync::mpsc;
use tracing::debug;

use rookery_core::Stanza;

/// Outcome of handing a stanza to a session's outbound queue.
#[derive(Debug)]
pub enum SendResult {
    /// Queued for delivery.
    Sent,
    /// The outbound queue is full (backpressure).
    ChannelFull,
    /// The outbound queue is gone; the connection dropped.
    ChannelClosed,
}

/// A bound client session on this node.
///
/// The session owns its outbound queue; `send_element` only enqueues, so any
/// number of dispatcher tasks may deliver concurrently while the connection
/// actor drains the queue single-writer.
#[derive(Debug, Clone)]
pub struct ClientSession {
    username: String,
    resource: String,
    sender: mpsc::Sender<Stanza>,
}

impl ClientSession {
    pub fn new(
        username: impl Into<String>,
        resource: impl Into<String>,
        sender: mpsc::Sender<Stanza>,
    ) -> Self {
        Self {
            username: username.into(),
            resource: resource.into(),
            sender,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Enqueue a stanza for this session without blocking.
    pub fn send_element(&self, stanza: Stanza) -> SendResult {
        match self.sender.try_send(stanza) {
            Ok(()) => SendResult::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(user = %self.username, resource = %self.resource, "session queue full");
                SendResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(user = %self.username, resource = %self.resource, "session queue closed");
                SendResult::ChannelClosed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jid::{BareJid, Jid};
    use xmpp_parsers::message::Message;

    fn test_stanza() -> Stanza {
        let bare: BareJid = "alice@x.test".parse().unwrap();
        Stanza::Message(Message::new(Some(Jid::from(bare))))
    }

    #[tokio::test]
    async fn test_send_enqueues() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = ClientSession::new("alice", "phone", tx);

        assert!(matches!(session.send_element(test_stanza()), SendResult::Sent));
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_send_reports_backpressure() {
        let (tx, _rx) = mpsc::channel(1);
        let session = ClientSession::new("alice", "phone", tx);

        assert!(matches!(session.send_element(test_stanza()), SendResult::Sent));
        assert!(matches!(
            session.send_element(test_stanza()),
            SendResult::ChannelFull
        ));
    }

    #[tokio::test]
    async fn test_send_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let session = ClientSession::new("alice", "phone", tx);

        assert!(matches!(
            session.send_element(test_stanza()),
            SendResult::ChannelClosed
        ));
    }
}
