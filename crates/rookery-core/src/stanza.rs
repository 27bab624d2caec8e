//! Stanza wrapper shared by the dispatcher and the cluster transport.

use jid::Jid;
use minidom::Element;
use xmpp_parsers::iq::Iq;
use xmpp_parsers::message::Message;
use xmpp_parsers::presence::Presence;

use crate::error::StanzaError;

/// A single protocol element exchanged over the wire.
#[derive(Debug, Clone)]
pub enum Stanza {
    Message(Message),
    Presence(Presence),
    Iq(Iq),
}

impl Stanza {
    /// Stanza kind name for tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Stanza::Message(_) => "message",
            Stanza::Presence(_) => "presence",
            Stanza::Iq(_) => "iq",
        }
    }

    /// Destination address, if any.
    pub fn to_jid(&self) -> Option<&Jid> {
        match self {
            Stanza::Message(m) => m.to.as_ref(),
            Stanza::Presence(p) => p.to.as_ref(),
            Stanza::Iq(iq) => iq.to.as_ref(),
        }
    }

    /// Sender address, if any.
    pub fn from_jid(&self) -> Option<&Jid> {
        match self {
            Stanza::Message(m) => m.from.as_ref(),
            Stanza::Presence(p) => p.from.as_ref(),
            Stanza::Iq(iq) => iq.from.as_ref(),
        }
    }

    /// Copy of this stanza readdressed to `to`.
    pub fn with_to(&self, to: Jid) -> Stanza {
        let mut stanza = self.clone();
        match &mut stanza {
            Stanza::Message(m) => m.to = Some(to),
            Stanza::Presence(p) => p.to = Some(to),
            Stanza::Iq(iq) => iq.to = Some(to),
        }
        stanza
    }

    /// Convert into its wire element.
    pub fn to_element(&self) -> Element {
        match self {
            Stanza::Message(m) => m.clone().into(),
            Stanza::Presence(p) => p.clone().into(),
            Stanza::Iq(iq) => iq.clone().into(),
        }
    }

    /// Serialize to an XML string.
    pub fn to_xml(&self) -> String {
        String::from(&self.to_element())
    }

    /// Decode a wire element into a stanza.
    pub fn from_element(elem: Element) -> Result<Stanza, StanzaError> {
        let name = elem.name().to_string();
        match name.as_str() {
            "message" => Message::try_from(elem)
                .map(Stanza::Message)
                .map_err(|e| StanzaError::Malformed(e.to_string())),
            "presence" => Presence::try_from(elem)
                .map(Stanza::Presence)
                .map_err(|e| StanzaError::Malformed(e.to_string())),
            "iq" => Iq::try_from(elem)
                .map(Stanza::Iq)
                .map_err(|e| StanzaError::Malformed(e.to_string())),
            _ => Err(StanzaError::UnsupportedElement(name)),
        }
    }

    /// Parse a single serialized stanza.
    pub fn from_xml(xml: &str) -> Result<Stanza, StanzaError> {
        let elem: Element = xml
            .parse()
            .map_err(|e: minidom::Error| StanzaError::Xml(e.to_string()))?;
        Self::from_element(elem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jid::BareJid;
    use xmpp_parsers::message::MessageType;

    fn test_message(to: &str) -> Message {
        let bare: BareJid = to.parse().unwrap();
        let mut msg = Message::new(Some(Jid::from(bare)));
        msg.type_ = MessageType::Chat;
        msg.id = Some("m1".to_string());
        msg
    }

    #[test]
    fn test_message_round_trip() {
        let stanza = Stanza::Message(test_message("alice@x.test"));
        let xml = stanza.to_xml();

        let parsed = Stanza::from_xml(&xml).unwrap();
        assert_eq!(parsed.name(), "message");
        assert_eq!(parsed.to_xml(), xml);
    }

    #[test]
    fn test_presence_round_trip() {
        let mut presence = Presence::new(xmpp_parsers::presence::Type::None);
        presence.from = Some("alice@x.test/phone".parse().unwrap());
        presence.priority = 5;

        let stanza = Stanza::Presence(presence);
        let xml = stanza.to_xml();

        let parsed = Stanza::from_xml(&xml).unwrap();
        assert_eq!(parsed.name(), "presence");
        assert_eq!(parsed.to_xml(), xml);
    }

    #[test]
    fn test_with_to_rewrites_destination() {
        let stanza = Stanza::Message(test_message("alice@x.test"));
        let full: Jid = "alice@x.test/laptop".parse().unwrap();

        let rewritten = stanza.with_to(full.clone());
        assert_eq!(rewritten.to_jid(), Some(&full));
        // the original is untouched
        assert_eq!(stanza.to_jid().unwrap().to_string(), "alice@x.test");
    }

    #[test]
    fn test_from_xml_rejects_garbage() {
        assert!(matches!(
            Stanza::from_xml("<message"),
            Err(StanzaError::Xml(_))
        ));
    }

    #[test]
    fn test_from_xml_rejects_unknown_element() {
        let err = Stanza::from_xml("<stream xmlns='jabber:client'/>").unwrap_err();
        assert!(matches!(err, StanzaError::UnsupportedElement(_)));
    }
}
