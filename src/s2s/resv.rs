//! Remote RESV/UNRESV forms.
//!
//! Two wire variants reach a node: the legacy cluster commands
//! (`RESV <target> <mask> :<reason>`, `UNRESV <target> <mask>`) and the
//! encapsulated forms dispatched out of [`crate::s2s::encap`]. Remote
//! frames bypass the privilege gate; authority was established on the
//! originating server's hop. Malformed frames are dropped silently to
//! keep the mesh quiet.

use crate::error::HandlerResult;
use crate::handlers::resv::{parse_resv, remove_resv, ResvActor};
use crate::handlers::{PeerContext, PeerHandler};
use crate::s2s::router;
use async_trait::async_trait;
use corvid_proto::{wildcard_match, MessageRef};

/// Resolve the frame's origin into an acting person. Frames whose origin
/// is a server (not a person on one) are not applied locally.
async fn person_actor(ctx: &PeerContext<'_>) -> Option<ResvActor> {
    let uid = ctx.origin.person_uid()?;
    ResvActor::from_uid(ctx.matrix, uid).await
}

fn origin_wire_id(ctx: &PeerContext<'_>) -> String {
    match &ctx.origin {
        crate::handlers::Origin::Person(uid) => uid.clone(),
        crate::handlers::Origin::Server(name) => name.clone(),
    }
}

/// `:<src> RESV <target-server-glob> <mask> :<reason>` (legacy cluster).
pub struct RemoteResvHandler;

#[async_trait]
impl PeerHandler for RemoteResvHandler {
    async fn handle(&self, ctx: &PeerContext<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        // Explicit argument gate before anything touches the frame.
        if msg.arg_count() < 3 {
            tracing::debug!(args = msg.arg_count(), "Dropping short RESV frame");
            return Ok(());
        }
        let (target, name, reason) = (msg.args[0], msg.args[1], msg.args[2]);

        let source_id = origin_wire_id(ctx);
        router::propagate_resv(
            ctx.matrix,
            Some(&ctx.peer.name),
            &source_id,
            target,
            0,
            name,
            reason,
        );

        if !wildcard_match(target, &ctx.matrix.info.name) {
            return Ok(());
        }
        let Some(actor) = person_actor(ctx).await else {
            return Ok(());
        };

        // The legacy form cannot carry a duration; a temporary placed on
        // the far side arrives here as permanent.
        tracing::warn!(
            mask = %name,
            peer = %ctx.peer.name,
            "Legacy RESV applied as permanent; originating temp intent (if any) was dropped"
        );
        parse_resv(ctx.matrix, ctx.db, &actor, name, reason, 0, false).await;
        Ok(())
    }
}

/// `:<src> UNRESV <target-server-glob> <mask>` (legacy cluster).
pub struct RemoteUnresvHandler;

#[async_trait]
impl PeerHandler for RemoteUnresvHandler {
    async fn handle(&self, ctx: &PeerContext<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        if msg.arg_count() < 2 {
            tracing::debug!(args = msg.arg_count(), "Dropping short UNRESV frame");
            return Ok(());
        }
        let (target, name) = (msg.args[0], msg.args[1]);

        let source_id = origin_wire_id(ctx);
        router::propagate_generic(
            ctx.matrix,
            Some(&ctx.peer.name),
            &source_id,
            "UNRESV",
            target,
            name,
        );

        if !wildcard_match(target, &ctx.matrix.info.name) {
            return Ok(());
        }
        let Some(actor) = person_actor(ctx).await else {
            return Ok(());
        };
        remove_resv(ctx.matrix, ctx.db, &actor, name, false).await;
        Ok(())
    }
}

/// `ENCAP <tgt> RESV <duration> <mask> 0 :<reason>`; duration is carried
/// in seconds, applied locally only (the ENCAP layer already routed).
pub(crate) async fn encap_resv(ctx: &PeerContext<'_>, msg: &MessageRef<'_>) {
    if msg.arg_count() < 6 {
        tracing::debug!(args = msg.arg_count(), "Dropping short ENCAP RESV");
        return;
    }
    let Ok(duration) = msg.args[2].parse::<i64>() else {
        return;
    };
    if duration < 0 {
        return;
    }
    let (name, reason) = (msg.args[3], msg.args[5]);
    let Some(actor) = person_actor(ctx).await else {
        return;
    };
    parse_resv(ctx.matrix, ctx.db, &actor, name, reason, duration, false).await;
}

/// `ENCAP <tgt> UNRESV <mask>`.
pub(crate) async fn encap_unresv(ctx: &PeerContext<'_>, msg: &MessageRef<'_>) {
    if msg.arg_count() < 3 {
        tracing::debug!(args = msg.arg_count(), "Dropping short ENCAP UNRESV");
        return;
    }
    let name = msg.args[2];
    let Some(actor) = person_actor(ctx).await else {
        return;
    };
    remove_resv(ctx.matrix, ctx.db, &actor, name, false).await;
}
