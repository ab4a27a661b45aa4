//! Live user state.

use crate::snomask::SnoMask;
use corvid_proto::Message;
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Operator privileges granted at OPER time.
#[derive(Debug, Clone)]
pub struct OperPrivs {
    /// Oper block name, shown in the interned audit identity.
    pub name: String,
    /// May place and lift reservations.
    pub resv: bool,
    /// May target other servers with `ON <server>`.
    pub remote_ban: bool,
}

/// One user known to this node, local or remote.
#[derive(Debug)]
pub struct User {
    pub uid: String,
    pub nick: String,
    pub user: String,
    pub host: String,
    pub realname: String,
    /// Name of the server the user sits on; ours for local users.
    pub server: String,
    pub invisible: bool,
    pub oper: Option<OperPrivs>,
    /// Server-notice subscriptions (meaningful for local opers only).
    pub snomask: SnoMask,
    /// Folded names of joined channels.
    pub channels: HashSet<String>,
    /// Writer handle; `None` for remote users.
    pub sender: Option<mpsc::UnboundedSender<Message>>,
}

impl User {
    #[inline]
    pub fn is_local(&self) -> bool {
        self.sender.is_some()
    }

    #[inline]
    pub fn is_oper(&self) -> bool {
        self.oper.is_some()
    }

    /// Queue a message toward a local user. Errors mean the connection is
    /// tearing down; the caller has nothing useful to do about it.
    pub fn send(&self, msg: Message) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(msg);
        }
    }

    /// `nick!user@host` form used in notices.
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }

    /// Audit identity: `nick!user@host{opername}`, the form interned in
    /// the oper hash.
    pub fn oper_name(&self) -> String {
        match &self.oper {
            Some(privs) => format!("{}{{{}}}", self.hostmask(), privs.name),
            None => self.hostmask(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            uid: "0CVAAAAAB".to_string(),
            nick: "alice".to_string(),
            user: "a".to_string(),
            host: "example.com".to_string(),
            realname: "Alice".to_string(),
            server: "irc.example.net".to_string(),
            invisible: false,
            oper: None,
            snomask: SnoMask::NONE,
            channels: HashSet::new(),
            sender: None,
        }
    }

    #[test]
    fn oper_name_includes_block_name() {
        let mut u = user();
        assert_eq!(u.oper_name(), "alice!a@example.com");
        u.oper = Some(OperPrivs {
            name: "ops".to_string(),
            resv: true,
            remote_ban: false,
        });
        assert_eq!(u.oper_name(), "alice!a@example.com{ops}");
    }

    #[test]
    fn remote_users_have_no_writer() {
        let u = user();
        assert!(!u.is_local());
        u.send(Message::new("PING", vec!["x".into()])); // must not panic
    }
}
