//! Remote client tracking.
//!
//! TS6 `UID` introduces a user on a remote server; `NICK` and `QUIT`
//! from a person keep the maps current. These also feed the `+F`
//! far-connect and `+n` global nick-change notice streams.

use crate::error::HandlerResult;
use crate::handlers::{PeerContext, PeerHandler};
use crate::snomask::SnoMask;
use crate::state::{user::User, Matrix};
use async_trait::async_trait;
use corvid_proto::{irc_fold, MessageRef};

/// Best-effort mapping of an origin token (SID or server name) to a
/// server name we can display. Unknown SIDs fall back to the link's name.
fn origin_server_name(matrix: &Matrix, ctx: &PeerContext<'_>, token: &str) -> String {
    for peer in matrix.peers.iter() {
        if peer.sid == token || corvid_proto::irc_eq(&peer.name, token) {
            return peer.name.clone();
        }
    }
    if token.len() == 3 && token.as_bytes()[0].is_ascii_digit() {
        ctx.peer.name.clone()
    } else {
        token.to_string()
    }
}

/// `:<sid> UID <nick> <hops> <ts> <+modes> <user> <host> <ip> <uid> :<real>`
pub struct UidHandler;

#[async_trait]
impl PeerHandler for UidHandler {
    async fn handle(&self, ctx: &PeerContext<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        if msg.arg_count() < 9 {
            tracing::debug!(args = msg.arg_count(), "Dropping short UID frame");
            return Ok(());
        }
        let nick = msg.args[0];
        let modes = msg.args[3];
        let username = msg.args[4];
        let host = msg.args[5];
        let ip = msg.args[6];
        let uid = msg.args[7];
        let realname = msg.args[8];

        let server = match &ctx.origin {
            crate::handlers::Origin::Server(token) => origin_server_name(ctx.matrix, ctx, token),
            crate::handlers::Origin::Person(_) => {
                tracing::debug!("UID from a person origin; dropping");
                return Ok(());
            }
        };

        ctx.matrix.add_user(User {
            uid: uid.to_string(),
            nick: nick.to_string(),
            user: username.to_string(),
            host: host.to_string(),
            realname: realname.to_string(),
            server: server.clone(),
            invisible: modes.contains('i'),
            oper: modes.contains('o').then(|| crate::state::OperPrivs {
                name: "remote".to_string(),
                // Remote opers act through their own server's gate; local
                // privilege flags stay off.
                resv: false,
                remote_ban: false,
            }),
            snomask: SnoMask::NONE,
            channels: Default::default(),
            sender: None,
        });

        ctx.matrix
            .sendto_realops(
                SnoMask::FAR_CONNECT,
                &format!("Client connecting: {nick} ({username}@{host}) [{ip}] [{realname}]"),
            )
            .await;
        Ok(())
    }
}

/// `:<uid> QUIT :<reason>` — remote client exit.
pub struct RemoteQuitHandler;

#[async_trait]
impl PeerHandler for RemoteQuitHandler {
    async fn handle(&self, ctx: &PeerContext<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        let Some(uid) = ctx.origin.person_uid() else {
            return Ok(());
        };
        let Some(user) = ctx.matrix.users.get(uid).map(|u| u.value().clone()) else {
            return Ok(());
        };
        let (nick, username, host) = {
            let user = user.read().await;
            (user.nick.clone(), user.user.clone(), user.host.clone())
        };
        let comment = msg.arg(0).unwrap_or("Client Quit");

        ctx.matrix.remove_user(uid).await;
        ctx.matrix
            .sendto_realops(
                SnoMask::FAR_CONNECT,
                &format!("Client exiting: {nick} ({username}@{host}) [{comment}]"),
            )
            .await;
        Ok(())
    }
}

/// `:<uid> NICK <newnick> [<ts>]` — remote nick change.
pub struct RemoteNickHandler;

#[async_trait]
impl PeerHandler for RemoteNickHandler {
    async fn handle(&self, ctx: &PeerContext<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        let Some(uid) = ctx.origin.person_uid() else {
            return Ok(());
        };
        let Some(new_nick) = msg.arg(0).filter(|n| !n.is_empty()) else {
            return Ok(());
        };
        let Some(user) = ctx.matrix.users.get(uid).map(|u| u.value().clone()) else {
            return Ok(());
        };

        let (old_nick, username, host) = {
            let user = user.read().await;
            (user.nick.clone(), user.user.clone(), user.host.clone())
        };

        ctx.matrix.nicks.remove(&irc_fold(&old_nick));
        ctx.matrix
            .nicks
            .insert(irc_fold(new_nick), uid.to_string());
        user.write().await.nick = new_nick.to_string();

        ctx.matrix
            .sendto_realops(
                SnoMask::NICK_CHANGE,
                &format!("Nick change: From {old_nick} to {new_nick} [{username}@{host}]"),
            )
            .await;
        Ok(())
    }
}
