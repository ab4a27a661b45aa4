//! ENCAP: encapsulated subcommand forwarding.
//!
//! `ENCAP <target-server-glob> <subcommand> [args...]` carries a command
//! to every server matching the glob. The frame is relayed to matching
//! peers (minus the arrival link) and executed locally when our name
//! matches.

use crate::caps::CapSet;
use crate::error::HandlerResult;
use crate::handlers::{PeerContext, PeerHandler};
use crate::s2s::router;
use async_trait::async_trait;
use corvid_proto::{wildcard_match, MessageRef};

pub struct EncapHandler;

#[async_trait]
impl PeerHandler for EncapHandler {
    async fn handle(&self, ctx: &PeerContext<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        if msg.arg_count() < 2 {
            tracing::debug!(args = msg.arg_count(), "Dropping short ENCAP frame");
            return Ok(());
        }
        let target = msg.args[0];
        let subcommand = msg.args[1];

        // Pass the frame onward unchanged, original prefix included.
        router::sendto_match_servs(
            ctx.matrix,
            Some(&ctx.peer.name),
            target,
            CapSet::ENCAP,
            CapSet::EMPTY,
            &msg.to_owned(),
        );

        if !wildcard_match(target, &ctx.matrix.info.name) {
            return Ok(());
        }

        match subcommand.to_ascii_uppercase().as_str() {
            "RESV" => crate::s2s::resv::encap_resv(ctx, msg).await,
            "UNRESV" => crate::s2s::resv::encap_unresv(ctx, msg).await,
            other => {
                tracing::debug!(subcommand = %other, "Unhandled ENCAP subcommand");
            }
        }
        Ok(())
    }
}
