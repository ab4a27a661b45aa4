//! IRC wire-protocol core for the corvid daemon.
//!
//! This crate holds the protocol pieces the server consumes: an owned
//! [`Message`] type with RFC-correct serialization, a zero-copy
//! [`MessageRef`] parser, RFC 1459 case mapping, wildcard mask matching,
//! and the numeric replies the daemon emits.

pub mod borrowed;
pub mod casemap;
pub mod chan;
pub mod error;
pub mod matching;
pub mod message;
pub mod nick;
pub mod numeric;
mod parser;

pub use borrowed::MessageRef;
pub use casemap::{irc_eq, irc_fold, irc_fold_char};
pub use chan::{check_channel_name, is_channel_name};
pub use error::MessageParseError;
pub use matching::wildcard_match;
pub use message::{Message, Prefix};
pub use nick::is_valid_nick;
pub use numeric::Numeric;
