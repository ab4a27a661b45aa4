//! Inbound propagated bans (`BAN` frames).
//!
//! `:<src> BAN R * <mask> <created> <hold-Δ> <lifetime-Δ> <oper> :<reason>`
//! replicates a reservation across the mesh. Convergence is
//! last-writer-wins on `(created, lifetime)`; a frame with `hold-Δ == 0`
//! is a tombstone that deactivates the record but keeps it until its
//! lifetime passes. Only type `R` is applied here; other ban types are
//! relayed for nodes that manage them.

use crate::caps::CapSet;
use crate::error::HandlerResult;
use crate::handlers::{Origin, PeerContext, PeerHandler};
use crate::s2s::router;
use crate::snomask::SnoMask;
use crate::state::{BanUpdate, Matrix, ResvConf, ResvFlags, ResvKind};
use async_trait::async_trait;
use corvid_proto::MessageRef;
use std::sync::Arc;

pub struct BanHandler;

/// Fields pulled off a `BAN R` frame.
struct BanFrame<'a> {
    mask: &'a str,
    created: i64,
    hold: i64,
    lifetime: i64,
    reason: &'a str,
}

fn parse_frame<'a>(msg: &MessageRef<'a>) -> Option<BanFrame<'a>> {
    if msg.arg_count() < 8 {
        return None;
    }
    let created = msg.args[3].parse::<i64>().ok()?;
    let hold_delta = msg.args[4].parse::<i64>().ok()?;
    let lifetime_delta = msg.args[5].parse::<i64>().ok()?;
    if created <= 0 || hold_delta < 0 || lifetime_delta < hold_delta {
        return None;
    }
    Some(BanFrame {
        mask: msg.args[2],
        created,
        hold: created + hold_delta,
        lifetime: created + lifetime_delta,
        reason: msg.args[7],
    })
}

/// Apply an accepted frame to the store. Returns the stored record and
/// whether it is active (vs a tombstone), or `None` when the frame lost
/// the tie-break.
fn apply(matrix: &Matrix, frame: &BanFrame<'_>, setter: &str) -> Option<(Arc<ResvConf>, bool)> {
    let kind = ResvKind::classify(frame.mask);
    let mut store = matrix.store.lock();

    let incumbent = store.prop_bans.get(kind, frame.mask).cloned();
    let cand = ResvConf {
        kind,
        mask: frame.mask.to_string(),
        reason: frame.reason.to_string(),
        oper: store.opers.add(setter),
        created: frame.created,
        hold: frame.hold,
        lifetime: frame.lifetime,
        flags: ResvFlags {
            my_oper: false,
            temporary: true,
        },
    };

    match store.prop_bans.replace_old_ban(&cand) {
        BanUpdate::Stale | BanUpdate::Duplicate => {
            store.opers.delete(&cand.oper);
            None
        }
        BanUpdate::Supersedes => {
            if let Some(old) = incumbent {
                store.deactivate(&old);
                store.opers.delete(&old.oper);
            }
            let cand = Arc::new(cand);
            store.prop_bans.add_prop_ban(cand.clone());

            let active = frame.hold > frame.created;
            if active {
                // A same-mask local entry yields to the replicated one.
                if let Some(stray) = store.resvs.remove(kind, frame.mask) {
                    store.opers.delete(&stray.oper);
                }
                store.resvs.insert(cand.clone());
            }
            Some((cand, active))
        }
    }
}

#[async_trait]
impl PeerHandler for BanHandler {
    async fn handle(&self, ctx: &PeerContext<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        let Some(ban_type) = msg.arg(0) else {
            return Ok(());
        };

        if !ban_type.eq_ignore_ascii_case("R") {
            // K/D-line style bans are not managed here; keep the mesh
            // converging for nodes that do.
            router::sendto_server(
                ctx.matrix,
                Some(&ctx.peer.name),
                CapSet::BAN | CapSet::TS6,
                CapSet::EMPTY,
                &msg.to_owned(),
            );
            return Ok(());
        }

        let Some(frame) = parse_frame(msg) else {
            tracing::debug!(peer = %ctx.peer.name, "Dropping malformed BAN R frame");
            return Ok(());
        };

        let setter = match &ctx.origin {
            Origin::Person(uid) => match ctx.matrix.users.get(uid.as_str()) {
                Some(user) => user.read().await.oper_name(),
                None => uid.clone(),
            },
            Origin::Server(name) => name.clone(),
        };

        let Some((conf, active)) = apply(ctx.matrix, &frame, &setter) else {
            return Ok(());
        };

        if active {
            let minutes = (frame.hold - frame.created) / 60;
            ctx.matrix
                .sendto_realops(
                    SnoMask::GENERAL,
                    &format!(
                        "{} added global {} min. RESV for [{}] [{}]",
                        setter, minutes, frame.mask, frame.reason
                    ),
                )
                .await;
            match conf.kind {
                ResvKind::Channel => {
                    crate::enforce::resv_chan_forcepart(ctx.matrix, &conf.mask, &conf.reason).await;
                }
                ResvKind::Nick => {
                    crate::enforce::resv_nick_fnc(ctx.matrix, &conf.mask, &conf.reason).await;
                }
            }
        } else {
            ctx.matrix
                .sendto_realops(
                    SnoMask::GENERAL,
                    &format!("{} has removed the global RESV for: [{}]", setter, frame.mask),
                )
                .await;
        }

        // Relay the accepted frame onward, original prefix intact.
        router::sendto_server(
            ctx.matrix,
            Some(&ctx.peer.name),
            CapSet::BAN | CapSet::TS6,
            CapSet::EMPTY,
            &msg.to_owned(),
        );
        Ok(())
    }
}
