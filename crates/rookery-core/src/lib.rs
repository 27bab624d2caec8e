//! # rookery-core
//!
//! Shared stanza and addressing model for the rookery routing core.
//!
//! This crate wraps the `xmpp-parsers` stanza types behind a single [`Stanza`]
//! enum, adds the JID shape/matching helpers the router dispatches on, and
//! defines the presence-directory record types exchanged between nodes.

pub mod addressing;
pub mod model;
pub mod stanza;

mod error;

pub use error::StanzaError;
pub use model::{BlockListItem, Capabilities, CapsRef, ExtPresence};
pub use stanza::Stanza;
