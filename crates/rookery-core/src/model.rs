//! Presence-directory record types.

use jid::{FullJid, Jid};
use serde::{Deserialize, Serialize};
use xmpp_parsers::presence::Presence;

/// Namespace of the entity-capabilities presence payload.
pub const CAPS_NS: &str = "http://jabber.org/protocol/caps";

/// Content-addressed service-discovery record, keyed by `(node, ver)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub node: String,
    pub ver: String,
    pub features: Vec<String>,
}

/// Capability reference advertised inside a presence stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsRef {
    pub node: String,
    pub ver: String,
}

impl CapsRef {
    /// Extract the caps reference from a presence's `c` payload, if present.
    pub fn from_presence(presence: &Presence) -> Option<CapsRef> {
        let payload = presence.payloads.iter().find(|p| p.is("c", CAPS_NS))?;
        Some(CapsRef {
            node: payload.attr("node")?.to_string(),
            ver: payload.attr("ver")?.to_string(),
        })
    }
}

/// Directory record for one online resource: the presence stanza plus the
/// allocation that registered it.
#[derive(Debug, Clone)]
pub struct ExtPresence {
    /// Identifier of the node that owns the session behind this presence.
    pub allocation_id: String,
    /// The presence stanza as last broadcast by the client.
    pub presence: Presence,
    /// Resolved capabilities, when the presence carries a known caps ref.
    pub caps: Option<Capabilities>,
}

impl ExtPresence {
    pub fn new(allocation_id: impl Into<String>, presence: Presence) -> Self {
        Self {
            allocation_id: allocation_id.into(),
            presence,
            caps: None,
        }
    }

    /// Advertised priority of this resource.
    pub fn priority(&self) -> i8 {
        self.presence.priority
    }

    /// The full JID this presence belongs to, taken from its sender address.
    pub fn full_jid(&self) -> Option<FullJid> {
        self.presence
            .from
            .clone()
            .and_then(|jid| jid.try_into_full().ok())
    }
}

/// One entry of a user's block list, consulted read-only during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockListItem {
    /// Owner of the block list.
    pub username: String,
    /// Blocked address; its shape decides the match mode.
    pub jid: Jid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use minidom::Element;
    use xmpp_parsers::presence::Type;

    fn presence(from: &str, priority: i8) -> Presence {
        let mut p = Presence::new(Type::None);
        p.from = Some(from.parse().unwrap());
        p.priority = priority;
        p
    }

    #[test]
    fn test_caps_ref_from_presence() {
        let mut p = presence("alice@x.test/phone", 0);
        p.payloads.push(
            Element::builder("c", CAPS_NS)
                .attr("node", "https://rookery.im")
                .attr("ver", "q07IKJEyjvHSyhy//CH0CxmKi8w=")
                .build(),
        );

        let caps = CapsRef::from_presence(&p).unwrap();
        assert_eq!(caps.node, "https://rookery.im");
        assert_eq!(caps.ver, "q07IKJEyjvHSyhy//CH0CxmKi8w=");
    }

    #[test]
    fn test_caps_ref_absent() {
        let p = presence("alice@x.test/phone", 0);
        assert!(CapsRef::from_presence(&p).is_none());
    }

    #[test]
    fn test_ext_presence_accessors() {
        let ext = ExtPresence::new("a1", presence("alice@x.test/phone", 7));
        assert_eq!(ext.priority(), 7);
        assert_eq!(ext.full_jid().unwrap().to_string(), "alice@x.test/phone");
    }

    #[test]
    fn test_ext_presence_bare_sender_has_no_full_jid() {
        let mut p = presence("alice@x.test/phone", 0);
        p.from = Some("alice@x.test".parse().unwrap());
        let ext = ExtPresence::new("a1", p);
        assert!(ext.full_jid().is_none());
    }
}
