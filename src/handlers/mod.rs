//! Command handler infrastructure.
//!
//! Two handler families: [`ClientHandler`] for commands from registered
//! local clients, [`PeerHandler`] for frames arriving over a server link.
//! The [`Registry`] maps command names to handlers; the connection loops
//! own dispatch.

pub mod connection;
pub mod names;
pub mod oper;
pub mod resv;

use crate::db::Database;
use crate::error::HandlerResult;
use crate::state::{Matrix, Peer};
use async_trait::async_trait;
use corvid_proto::{Message, MessageRef, Numeric};
use std::collections::HashMap;
use std::sync::Arc;

pub use crate::error::HandlerError;

/// Context passed to client command handlers.
pub struct Context<'a> {
    pub matrix: &'a Arc<Matrix>,
    pub db: &'a Database,
    /// The issuing user's uid.
    pub uid: &'a str,
}

impl Context<'_> {
    /// The caller's current nick, `*` when unknown.
    pub async fn nick(&self) -> String {
        match self.matrix.users.get(self.uid) {
            Some(user) => user.read().await.nick.clone(),
            None => "*".to_string(),
        }
    }

    /// Queue a message to the caller.
    pub async fn send(&self, msg: Message) {
        self.matrix.send_to_user(self.uid, msg).await;
    }

    /// Server NOTICE to the caller.
    pub async fn notice(&self, text: &str) {
        self.matrix.notice_user(self.uid, text).await;
    }

    /// Server numeric to the caller; the nick argument is prepended.
    pub async fn numeric(&self, numeric: Numeric, mut args: Vec<String>) {
        args.insert(0, self.nick().await);
        self.send(Message::numeric(numeric, args).with_prefix(self.matrix.server_prefix()))
            .await;
    }
}

/// Who originated a frame on a server link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A user (remote oper) on some server behind the link.
    Person(String),
    /// A server itself, by name or SID.
    Server(String),
}

impl Origin {
    /// The uid, when the origin is a person.
    pub fn person_uid(&self) -> Option<&str> {
        match self {
            Origin::Person(uid) => Some(uid),
            Origin::Server(_) => None,
        }
    }
}

/// Context passed to peer frame handlers.
pub struct PeerContext<'a> {
    pub matrix: &'a Arc<Matrix>,
    pub db: &'a Database,
    /// The link the frame arrived on (excluded from relays).
    pub peer: &'a Arc<Peer>,
    pub origin: Origin,
}

/// Handler for commands from registered local clients.
#[async_trait]
pub trait ClientHandler: Send + Sync {
    async fn handle(&self, ctx: &Context<'_>, msg: &MessageRef<'_>) -> HandlerResult;
}

/// Handler for frames from server links.
#[async_trait]
pub trait PeerHandler: Send + Sync {
    async fn handle(&self, ctx: &PeerContext<'_>, msg: &MessageRef<'_>) -> HandlerResult;
}

/// Command registry.
pub struct Registry {
    client: HashMap<&'static str, Arc<dyn ClientHandler>>,
    peer: HashMap<&'static str, Arc<dyn PeerHandler>>,
}

impl Registry {
    /// Build the registry with every handler registered.
    pub fn build() -> Arc<Registry> {
        let mut client: HashMap<&'static str, Arc<dyn ClientHandler>> = HashMap::new();
        let mut peer: HashMap<&'static str, Arc<dyn PeerHandler>> = HashMap::new();

        client.insert("PING", Arc::new(connection::PingHandler));
        client.insert("QUIT", Arc::new(connection::QuitHandler));
        client.insert("NAMES", Arc::new(names::NamesHandler));
        client.insert("OPER", Arc::new(oper::OperHandler));
        client.insert("SNOMASK", Arc::new(oper::SnomaskHandler));
        client.insert("RESV", Arc::new(resv::ResvHandler));
        client.insert("UNRESV", Arc::new(resv::UnresvHandler));

        peer.insert("RESV", Arc::new(crate::s2s::resv::RemoteResvHandler));
        peer.insert("UNRESV", Arc::new(crate::s2s::resv::RemoteUnresvHandler));
        peer.insert("ENCAP", Arc::new(crate::s2s::encap::EncapHandler));
        peer.insert("BAN", Arc::new(crate::s2s::ban::BanHandler));
        peer.insert("UID", Arc::new(crate::s2s::uid::UidHandler));
        peer.insert("NICK", Arc::new(crate::s2s::uid::RemoteNickHandler));
        peer.insert("QUIT", Arc::new(crate::s2s::uid::RemoteQuitHandler));

        Arc::new(Registry { client, peer })
    }

    pub fn client(&self, command: &str) -> Option<Arc<dyn ClientHandler>> {
        self.client.get(command.to_ascii_uppercase().as_str()).cloned()
    }

    pub fn peer(&self, command: &str) -> Option<Arc<dyn PeerHandler>> {
        self.peer.get(command.to_ascii_uppercase().as_str()).cloned()
    }
}

// ============================================================================
// Privilege gate
// ============================================================================

/// Whether the caller may place and lift reservations.
pub async fn may_resv(matrix: &Matrix, uid: &str) -> bool {
    match matrix.users.get(uid) {
        Some(user) => user
            .read()
            .await
            .oper
            .as_ref()
            .is_some_and(|privs| privs.resv),
        None => false,
    }
}

/// Whether the caller may target other servers with `ON`.
pub async fn may_remote_ban(matrix: &Matrix, uid: &str) -> bool {
    match matrix.users.get(uid) {
        Some(user) => user
            .read()
            .await
            .oper
            .as_ref()
            .is_some_and(|privs| privs.remote_ban),
        None => false,
    }
}

/// ERR_NOPRIVS denial naming the missing privilege.
pub async fn send_noprivs(ctx: &Context<'_>, privilege: &str) {
    ctx.numeric(
        Numeric::ERR_NOPRIVS,
        vec![privilege.to_string(), "Insufficient oper privs".to_string()],
    )
    .await;
}
