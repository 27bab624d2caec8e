//! Error types for stanza decoding.

use thiserror::Error;

/// Errors produced while decoding a wire element into a [`crate::Stanza`].
#[derive(Debug, Error)]
pub enum StanzaError {
    /// The payload is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The element is well-formed but not a valid stanza of its kind.
    #[error("malformed stanza: {0}")]
    Malformed(String),

    /// The root element is not a message, presence or iq.
    #[error("unsupported element: <{0}/>")]
    UnsupportedElement(String),
}
