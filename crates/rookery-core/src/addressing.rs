//! JID shape tests and matching modes used by routing and block lists.

use jid::Jid;

/// How two JIDs are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Domain parts are equal.
    Domain,
    /// Node and domain parts are equal.
    Bare,
    /// Domain and resource parts are equal.
    DomainAndResource,
    /// Node, domain and resource parts are equal.
    Full,
}

/// JID carrying node, domain and resource.
pub fn is_full_with_user(jid: &Jid) -> bool {
    jid.node().is_some() && jid.resource().is_some()
}

/// JID carrying domain and resource but no node.
pub fn is_full_with_server(jid: &Jid) -> bool {
    jid.node().is_none() && jid.resource().is_some()
}

/// JID carrying node and domain but no resource.
pub fn is_bare_with_user(jid: &Jid) -> bool {
    jid.node().is_some() && jid.resource().is_none()
}

/// JID carrying a domain only.
pub fn is_server_only(jid: &Jid) -> bool {
    jid.node().is_none() && jid.resource().is_none()
}

/// Compare `candidate` against `pattern` under the given mode.
pub fn matches(pattern: &Jid, candidate: &Jid, mode: MatchMode) -> bool {
    let domain_eq = pattern.domain() == candidate.domain();
    match mode {
        MatchMode::Domain => domain_eq,
        MatchMode::Bare => domain_eq && pattern.node() == candidate.node(),
        MatchMode::DomainAndResource => domain_eq && pattern.resource() == candidate.resource(),
        MatchMode::Full => {
            domain_eq
                && pattern.node() == candidate.node()
                && pattern.resource() == candidate.resource()
        }
    }
}

/// Whether a block-list entry covers `target`.
///
/// The entry's own shape picks the mode: a full JID blocks exactly that
/// resource, a bare JID blocks every resource of that user, a domain/resource
/// pair blocks that resource on any user of the domain, and a lone domain
/// blocks the whole domain.
pub fn blocks(blocked: &Jid, target: &Jid) -> bool {
    let mode = if is_full_with_user(blocked) {
        MatchMode::Full
    } else if is_bare_with_user(blocked) {
        MatchMode::Bare
    } else if is_full_with_server(blocked) {
        MatchMode::DomainAndResource
    } else {
        MatchMode::Domain
    };
    matches(blocked, target, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid(s: &str) -> Jid {
        s.parse().unwrap()
    }

    #[test]
    fn test_shapes() {
        assert!(is_full_with_user(&jid("alice@x.test/phone")));
        assert!(is_bare_with_user(&jid("alice@x.test")));
        assert!(is_full_with_server(&jid("x.test/phone")));
        assert!(is_server_only(&jid("x.test")));

        assert!(!is_full_with_user(&jid("alice@x.test")));
        assert!(!is_bare_with_user(&jid("x.test")));
    }

    #[test]
    fn test_match_modes() {
        let full = jid("alice@x.test/phone");

        assert!(matches(&jid("x.test"), &full, MatchMode::Domain));
        assert!(matches(&jid("alice@x.test"), &full, MatchMode::Bare));
        assert!(matches(
            &jid("x.test/phone"),
            &full,
            MatchMode::DomainAndResource
        ));
        assert!(matches(&jid("alice@x.test/phone"), &full, MatchMode::Full));

        assert!(!matches(&jid("bob@x.test"), &full, MatchMode::Bare));
        assert!(!matches(
            &jid("x.test/laptop"),
            &full,
            MatchMode::DomainAndResource
        ));
        assert!(!matches(&jid("alice@x.test/laptop"), &full, MatchMode::Full));
        assert!(!matches(&jid("y.test"), &full, MatchMode::Domain));
    }

    #[test]
    fn test_blocks_mode_follows_entry_shape() {
        // bare entry blocks every resource of the user
        assert!(blocks(&jid("bob@x.test"), &jid("bob@x.test/phone")));
        assert!(blocks(&jid("bob@x.test"), &jid("bob@x.test")));
        assert!(!blocks(&jid("bob@x.test"), &jid("carol@x.test")));

        // full entry blocks exactly that resource
        assert!(blocks(&jid("bob@x.test/phone"), &jid("bob@x.test/phone")));
        assert!(!blocks(&jid("bob@x.test/phone"), &jid("bob@x.test/laptop")));

        // domain entry blocks the whole domain
        assert!(blocks(&jid("x.test"), &jid("anyone@x.test/anywhere")));
        assert!(!blocks(&jid("x.test"), &jid("anyone@y.test")));
    }
}
