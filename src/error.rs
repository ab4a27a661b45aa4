//! Unified error handling for corvidd.

use corvid_proto::{Message, Numeric, Prefix};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during command handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not enough parameters")]
    NeedMoreParams,

    #[error("not registered")]
    NotRegistered,

    #[error("send error: {0}")]
    Send(#[from] mpsc::error::SendError<Message>),

    /// Client quit; the connection loop tears the session down.
    #[error("client quit: {0:?}")]
    Quit(Option<String>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Convert to an IRC error reply.
    ///
    /// Returns `None` for errors with no client-visible numeric (send
    /// failures, quits, internal errors).
    pub fn to_irc_reply(&self, server_name: &str, nick: &str, cmd_name: &str) -> Option<Message> {
        let prefix = Prefix::Server(server_name.to_string());
        match self {
            Self::NeedMoreParams => Some(
                Message::numeric(
                    Numeric::ERR_NEEDMOREPARAMS,
                    vec![
                        nick.to_string(),
                        cmd_name.to_string(),
                        "Not enough parameters".to_string(),
                    ],
                )
                .with_prefix(prefix),
            ),
            Self::NotRegistered => Some(
                Message::numeric(
                    Numeric::ERR_NOTREGISTERED,
                    vec!["*".to_string(), "You have not registered".to_string()],
                )
                .with_prefix(prefix),
            ),
            Self::Send(_) | Self::Quit(_) | Self::Internal(_) => None,
        }
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn need_more_params_maps_to_461() {
        let reply = HandlerError::NeedMoreParams
            .to_irc_reply("irc.example.net", "alice", "RESV")
            .unwrap();
        assert_eq!(reply.numeric_code(), Some(461));
        assert_eq!(reply.args[1], "RESV");
    }

    #[test]
    fn internal_errors_have_no_reply() {
        assert!(
            HandlerError::Internal("oops".into())
                .to_irc_reply("s", "n", "RESV")
                .is_none()
        );
    }
}
