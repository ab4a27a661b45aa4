//! Zero-copy borrowed messages.
//!
//! [`MessageRef`] holds slices of the original line, so dispatch never
//! allocates. Convert with [`MessageRef::to_owned`] only when a message
//! must outlive its input buffer (e.g. relays).

use crate::error::MessageParseError;
use crate::message::{Message, Prefix};
use crate::parser::parse_line;

/// A parsed IRC message borrowing from the input line.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRef<'a> {
    /// Raw tags section without the leading `@`, if the peer sent one.
    pub tags: Option<&'a str>,
    /// Raw prefix token without the leading `:`.
    pub prefix: Option<&'a str>,
    /// Command name as received (case preserved).
    pub command: &'a str,
    /// Positional arguments, trailing included.
    pub args: Vec<&'a str>,
}

impl<'a> MessageRef<'a> {
    /// Parse one line (CRLF tolerated) into a borrowed message.
    pub fn parse(line: &'a str) -> Result<Self, MessageParseError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }
        let raw = parse_line(trimmed).map_err(|_| MessageParseError::InvalidCommand)?;
        Ok(MessageRef {
            tags: raw.tags,
            prefix: raw.prefix,
            command: raw.command,
            args: raw.params,
        })
    }

    #[inline]
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).copied()
    }

    /// Number of arguments present (the `parc`-style gate for remote forms).
    #[inline]
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Source nickname, when the prefix is a `nick!user@host` triple.
    pub fn source_nick(&self) -> Option<&'a str> {
        let p = self.prefix?;
        p.split_once('!').map(|(nick, _)| nick)
    }

    /// Bare source token: a server name, SID, or UID.
    pub fn source(&self) -> Option<&'a str> {
        match self.prefix {
            Some(p) => Some(p.split_once('!').map(|(n, _)| n).unwrap_or(p)),
            None => None,
        }
    }

    /// Allocate an owned [`Message`] preserving prefix and arguments.
    pub fn to_owned(&self) -> Message {
        Message {
            prefix: self.prefix.map(Prefix::parse),
            command: self.command.to_string(),
            args: self.args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resv_command() {
        let msg = MessageRef::parse("RESV 60 Evil* ON *.example.net :abuse\r\n").unwrap();
        assert_eq!(msg.command, "RESV");
        assert_eq!(msg.arg(0), Some("60"));
        assert_eq!(msg.arg(3), Some("*.example.net"));
        assert_eq!(msg.arg(4), Some("abuse"));
        assert_eq!(msg.arg_count(), 5);
    }

    #[test]
    fn source_classification() {
        let from_user = MessageRef::parse(":nick!u@h UNRESV #spam").unwrap();
        assert_eq!(from_user.source_nick(), Some("nick"));
        assert_eq!(from_user.source(), Some("nick"));

        let from_server = MessageRef::parse(":0CV ENCAP * RESV 60 Bad* 0 :x").unwrap();
        assert_eq!(from_server.source_nick(), None);
        assert_eq!(from_server.source(), Some("0CV"));
    }

    #[test]
    fn empty_line_is_an_error() {
        assert_eq!(
            MessageRef::parse("\r\n"),
            Err(MessageParseError::EmptyMessage)
        );
    }

    #[test]
    fn to_owned_keeps_wire_shape() {
        let msg = MessageRef::parse(":hub.net RESV * spamchan :x").unwrap();
        let owned = msg.to_owned();
        assert_eq!(owned.to_string(), ":hub.net RESV * spamchan x");
    }
}
