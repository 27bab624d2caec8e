//! In-process session registry and local delivery.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::instrument;

use rookery_core::Stanza;

use crate::error::RouteError;
use crate::session::{ClientSession, SendResult};

/// Sessions of one user on this node, keyed by resource.
#[derive(Debug, Default)]
struct Resources {
    sessions: RwLock<Vec<ClientSession>>,
}

impl Resources {
    fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    fn bind(&self, session: ClientSession) {
        let mut sessions = self.sessions.write().unwrap();
        if sessions.iter().any(|s| s.resource() == session.resource()) {
            return; // bind is idempotent per resource
        }
        sessions.push(session);
    }

    fn unbind(&self, resource: &str) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.retain(|s| s.resource() != resource);
    }

    fn stream(&self, resource: &str) -> Option<ClientSession> {
        self.sessions
            .read()
            .unwrap()
            .iter()
            .find(|s| s.resource() == resource)
            .cloned()
    }

    fn all_streams(&self) -> Vec<ClientSession> {
        self.sessions.read().unwrap().clone()
    }

    fn route(&self, stanza: &Stanza) -> Result<(), RouteError> {
        let to_resource = stanza
            .to_jid()
            .and_then(|jid| jid.resource())
            .map(|r| r.as_str().to_string());

        match to_resource {
            Some(resource) => {
                let session = self
                    .stream(&resource)
                    .ok_or(RouteError::ResourceNotFound)?;
                deliver(&session, stanza.clone())
            }
            None => {
                // bare destination: every session of the user gets a copy
                let mut first_err = None;
                for session in self.all_streams() {
                    if let Err(e) = deliver(&session, stanza.clone()) {
                        first_err.get_or_insert(e);
                    }
                }
                match first_err {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
        }
    }
}

fn deliver(session: &ClientSession, stanza: Stanza) -> Result<(), RouteError> {
    match session.send_element(stanza) {
        SendResult::Sent => Ok(()),
        SendResult::ChannelFull => Err(RouteError::Delivery(format!(
            "outbound queue full for {}/{}",
            session.username(),
            session.resource()
        ))),
        SendResult::ChannelClosed => Err(RouteError::Delivery(format!(
            "outbound queue closed for {}/{}",
            session.username(),
            session.resource()
        ))),
    }
}

/// Registry of the sessions bound on this node.
///
/// Two-level locking: a coarse lock on the user table and a fine lock on each
/// user's resource list. None of the operations block on I/O.
#[derive(Debug, Default)]
pub struct LocalRouter {
    table: RwLock<HashMap<String, Arc<Resources>>>,
}

impl LocalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Creates the user's resource set on first bind;
    /// binding an already-bound resource is a no-op.
    pub fn bind(&self, session: ClientSession) {
        let user = session.username().to_string();
        let resources = self.table.read().unwrap().get(&user).cloned();

        let resources = match resources {
            Some(resources) => resources,
            None => {
                let mut table = self.table.write().unwrap();
                // double-checked: another bind may have created the set while
                // we were upgrading the lock
                Arc::clone(table.entry(user).or_default())
            }
        };
        resources.bind(session);
    }

    /// Remove a session; the user entry goes away with its last resource.
    pub fn unbind(&self, user: &str, resource: &str) {
        if self.table.read().unwrap().get(user).is_none() {
            return;
        }
        let mut table = self.table.write().unwrap();
        if let Some(resources) = table.get(user) {
            resources.unbind(resource);
            if resources.len() == 0 {
                table.remove(user);
            }
        }
    }

    /// Fetch one session by user and resource.
    pub fn stream(&self, user: &str, resource: &str) -> Option<ClientSession> {
        let resources = self.table.read().unwrap().get(user).cloned()?;
        resources.stream(resource)
    }

    /// All local sessions of a user.
    pub fn streams(&self, user: &str) -> Vec<ClientSession> {
        match self.table.read().unwrap().get(user) {
            Some(resources) => resources.all_streams(),
            None => Vec::new(),
        }
    }

    /// Deliver a stanza to the destination user's local session(s).
    #[instrument(skip(self, stanza), fields(to = ?stanza.to_jid()))]
    pub fn route(&self, stanza: &Stanza) -> Result<(), RouteError> {
        let user = stanza
            .to_jid()
            .and_then(|jid| jid.node())
            .map(|n| n.as_str().to_string())
            .ok_or(RouteError::ResourceNotFound)?;

        let resources = self
            .table
            .read()
            .unwrap()
            .get(&user)
            .cloned()
            .ok_or(RouteError::ResourceNotFound)?;
        resources.route(stanza)
    }
}
