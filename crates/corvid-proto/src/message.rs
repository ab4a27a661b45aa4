//! Owned message type and serialization.
//!
//! [`Message`] is what the daemon constructs and queues for writers; the
//! `Display` impl produces the wire form without the trailing CRLF (the
//! line codec appends it).

use crate::numeric::Numeric;

/// The source of a message: a server name/SID or a `nick!user@host` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    Server(String),
    User {
        nick: String,
        user: String,
        host: String,
    },
}

impl Prefix {
    pub fn user(nick: impl Into<String>, user: impl Into<String>, host: impl Into<String>) -> Self {
        Prefix::User {
            nick: nick.into(),
            user: user.into(),
            host: host.into(),
        }
    }

    /// Parse a raw prefix token. Anything containing `!` is a user
    /// prefix; a lone token (server name, SID, or bare UID) is kept as
    /// [`Prefix::Server`] since the two are indistinguishable on the wire.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('!') {
            Some((nick, rest)) => {
                let (user, host) = rest.split_once('@').unwrap_or((rest, ""));
                Prefix::user(nick, user, host)
            }
            None => Prefix::Server(raw.to_string()),
        }
    }

    /// The nickname, when this prefix names a user.
    pub fn nickname(&self) -> Option<&str> {
        match self {
            Prefix::User { nick, .. } => Some(nick),
            Prefix::Server(_) => None,
        }
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prefix::Server(name) => write!(f, "{name}"),
            Prefix::User { nick, user, host } => write!(f, "{nick}!{user}@{host}"),
        }
    }
}

/// An owned IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<Prefix>,
    pub command: String,
    pub args: Vec<String>,
}

impl Message {
    /// Build a message from a command name and arguments.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Message {
            prefix: None,
            command: command.into(),
            args,
        }
    }

    /// A NOTICE to `target`.
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("NOTICE", vec![target.into(), text.into()])
    }

    /// A numeric reply; the first argument is conventionally the target nick.
    pub fn numeric(numeric: Numeric, args: Vec<String>) -> Self {
        Message::new(numeric.to_string(), args)
    }

    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// The numeric code, when the command is a three-digit reply.
    pub fn numeric_code(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }
}

impl std::fmt::Display for Message {
    /// Wire serialization. The final argument gets a `:` sentinel when it
    /// contains a space, is empty, or itself starts with `:`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        let last = self.args.len().wrapping_sub(1);
        for (i, arg) in self.args.iter().enumerate() {
            let sentinel =
                i == last && (arg.is_empty() || arg.contains(' ') || arg.starts_with(':'));
            if sentinel {
                write!(f, " :{arg}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_trailing_colon() {
        let msg = Message::notice("ops", "Added RESV [#spam]")
            .with_prefix(Prefix::Server("irc.example.net".into()));
        assert_eq!(
            msg.to_string(),
            ":irc.example.net NOTICE ops :Added RESV [#spam]"
        );
    }

    #[test]
    fn single_word_trailing_needs_no_colon() {
        let msg = Message::new("PING", vec!["token".into()]);
        assert_eq!(msg.to_string(), "PING token");
    }

    #[test]
    fn empty_and_colon_leading_trailing() {
        let msg = Message::new("QUIT", vec!["".into()]);
        assert_eq!(msg.to_string(), "QUIT :");
        let msg = Message::new("PRIVMSG", vec!["#c".into(), ":)".into()]);
        assert_eq!(msg.to_string(), "PRIVMSG #c ::)");
    }

    #[test]
    fn prefix_roundtrip() {
        assert_eq!(
            Prefix::parse("nick!user@host"),
            Prefix::user("nick", "user", "host")
        );
        assert_eq!(
            Prefix::parse("irc.example.net"),
            Prefix::Server("irc.example.net".into())
        );
        assert_eq!(Prefix::parse("nick!user@host").nickname(), Some("nick"));
    }

    #[test]
    fn numeric_wire_form() {
        let msg = Message::numeric(
            Numeric::ERR_NEEDMOREPARAMS,
            vec!["nick".into(), "RESV".into(), "Not enough parameters".into()],
        );
        assert_eq!(msg.to_string(), "461 nick RESV :Not enough parameters");
        assert_eq!(msg.numeric_code(), Some(461));
    }
}
