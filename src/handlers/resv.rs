//! RESV and UNRESV: nick/channel reservations ("jupes").
//!
//! Local operator entry points live here, together with the add/remove
//! flows shared with the server-to-server forms in [`crate::s2s::resv`].
//! A reservation is either local (optionally persisted), targeted at a
//! cluster subset via `ON <server>`, or a globally replicated prop-ban
//! with `created`/`hold`/`lifetime` convergence.

use super::{may_remote_ban, may_resv, send_noprivs, ClientHandler, Context};
use crate::db::Database;
use crate::error::{HandlerError, HandlerResult};
use crate::s2s::router;
use crate::snomask::SnoMask;
use crate::state::{wall_clock, Matrix, ResvConf, ResvFlags, ResvKind, Store};
use async_trait::async_trait;
use corvid_proto::{irc_eq, wildcard_match, MessageRef};
use std::sync::Arc;

/// Longest accepted duration: 52 weeks, in minutes.
const MAX_TEMP_MINUTES: i64 = 60 * 24 * 7 * 52;

/// Parse an optional leading duration argument.
///
/// A run of digits is a duration in minutes (capped at a year) and
/// yields seconds; anything else is not a duration and the argument is
/// the mask instead.
pub(crate) fn valid_temp_time(arg: &str) -> Option<i64> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let minutes = arg.parse::<i64>().unwrap_or(MAX_TEMP_MINUTES);
    Some(minutes.min(MAX_TEMP_MINUTES) * 60)
}

/// Character validity for a nick reservation mask: nick characters plus
/// `*`/`?` wildcards, not starting like a UID or hyphenated garbage, and
/// at least one concrete nick character or `*`.
pub(crate) fn clean_resv_nick(mask: &str) -> bool {
    let mut chars = mask.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() || c == '-' => return false,
        Some(_) => {}
        None => return false,
    }

    let mut stars = 0usize;
    let mut concrete = 0usize;
    for c in mask.chars() {
        if c == '*' {
            stars += 1;
        } else if c == '?' {
            // counts toward neither
        } else if corvid_proto::nick::is_nick_char(c) {
            concrete += 1;
        } else {
            return false;
        }
    }
    stars > 0 || concrete > 0
}

/// Wildcard floor: a mask must carry at least `min` non-wildcard
/// characters so `*` alone cannot reserve the whole namespace.
pub(crate) fn valid_wild_card_simple(mask: &str, min: usize) -> bool {
    mask.chars().filter(|&c| c != '*' && c != '?').count() >= min
}

/// Who is performing a reservation operation.
#[derive(Debug, Clone)]
pub(crate) struct ResvActor {
    /// Wire id used as the prefix of propagated frames.
    pub uid: String,
    /// Interned audit identity (`nick!user@host{oper}`).
    pub oper_name: String,
}

impl ResvActor {
    pub async fn from_uid(matrix: &Matrix, uid: &str) -> Option<ResvActor> {
        let user = matrix.users.get(uid)?;
        let user = user.read().await;
        Some(ResvActor {
            uid: user.uid.clone(),
            oper_name: user.oper_name(),
        })
    }
}

// ============================================================================
// Add flow
// ============================================================================

enum AddAction {
    /// Prop-ban: replicate with a BAN frame.
    Global,
    /// Local temporary: in-memory only.
    Temporary,
    /// Local permanent: persisted to the ban database.
    Permanent,
}

struct AddPlan {
    conf: Arc<ResvConf>,
    action: AddAction,
}

/// Validate and insert under the store lock. Returns the user-visible
/// rejection notice on failure.
#[allow(clippy::too_many_arguments)]
fn try_add(
    store: &mut Store,
    channellen: usize,
    nicklen: usize,
    min_nonwild: usize,
    actor_oper: &str,
    name: &str,
    reason: &str,
    temp_time: i64,
    propagated: bool,
    now: i64,
) -> Result<AddPlan, String> {
    let kind = ResvKind::classify(name);

    match kind {
        ResvKind::Channel => {
            if store.resvs.find_channel(name).is_some() {
                return Err(format!("A RESV has already been placed on channel: {name}"));
            }
            if name.len() > channellen {
                return Err(format!("Invalid RESV length: {name}"));
            }
        }
        ResvKind::Nick => {
            if !clean_resv_nick(name) {
                return Err(format!("You have specified an invalid resv: [{name}]"));
            }
            if name.len() > nicklen * 2 {
                return Err(format!("Invalid RESV length: {name}"));
            }
            if !valid_wild_card_simple(name, min_nonwild) {
                return Err(format!(
                    "Please include at least {min_nonwild} non-wildcard characters with the resv"
                ));
            }
            if store.resvs.find_nick_mask(name).is_some() {
                return Err(format!("A RESV has already been placed on nick: {name}"));
            }
        }
    }

    let oper = store.opers.add(actor_oper);
    let mut conf = ResvConf {
        kind,
        mask: name.to_string(),
        reason: reason.to_string(),
        oper,
        created: now,
        hold: 0,
        lifetime: 0,
        flags: ResvFlags::default(),
    };

    let action = if propagated {
        conf.hold = now + temp_time;
        conf.lifetime = conf.hold;
        conf.flags.my_oper = true;
        conf.flags.temporary = true;

        // A lingering tombstone must not outbid the fresh record.
        store.prop_bans.outbid(&mut conf);
        let evicted = store.prop_bans.get(kind, name).cloned();
        store.prop_bans.replace_old_ban(&conf);
        if let Some(old) = evicted {
            store.deactivate(&old);
            store.opers.delete(&old.oper);
        }
        AddAction::Global
    } else if temp_time > 0 {
        conf.hold = now + temp_time;
        conf.flags.temporary = true;
        AddAction::Temporary
    } else {
        AddAction::Permanent
    };

    let conf = Arc::new(conf);
    if matches!(action, AddAction::Global) {
        store.prop_bans.add_prop_ban(conf.clone());
    }
    store.resvs.insert(conf.clone());

    Ok(AddPlan { conf, action })
}

/// Create a reservation and carry out its side effects: notices, audit
/// log, propagation, persistence, and enforcement.
pub(crate) async fn parse_resv(
    matrix: &Arc<Matrix>,
    db: &Database,
    actor: &ResvActor,
    name: &str,
    reason: &str,
    temp_time: i64,
    propagated: bool,
) {
    let now = wall_clock();
    let limits = &matrix.config.limits;
    let outcome = {
        let mut store = matrix.store.lock();
        try_add(
            &mut store,
            limits.channellen,
            limits.nicklen,
            limits.min_nonwildcard_simple,
            &actor.oper_name,
            name,
            reason,
            temp_time,
            propagated,
            now,
        )
    };

    let plan = match outcome {
        Ok(plan) => plan,
        Err(notice) => {
            matrix.notice_user(&actor.uid, &notice).await;
            return;
        }
    };

    let minutes = temp_time / 60;
    match plan.action {
        AddAction::Global => {
            matrix
                .sendto_realops(
                    SnoMask::GENERAL,
                    &format!(
                        "{} added global {} min. RESV for [{}] [{}]",
                        actor.oper_name, minutes, name, reason
                    ),
                )
                .await;
            tracing::info!(
                target: "bandb",
                "R {} {} {} {}",
                actor.oper_name,
                minutes,
                name,
                reason
            );
            matrix
                .notice_user(
                    &actor.uid,
                    &format!("Added global {minutes} min. RESV [{name}]"),
                )
                .await;
            router::broadcast_ban_r(matrix, None, &actor.uid, &plan.conf);
        }
        AddAction::Temporary => {
            matrix
                .sendto_realops(
                    SnoMask::GENERAL,
                    &format!(
                        "{} added temporary {} min. RESV for [{}] [{}]",
                        actor.oper_name, minutes, name, reason
                    ),
                )
                .await;
            tracing::info!(
                target: "bandb",
                "R {} {} {} {}",
                actor.oper_name,
                minutes,
                name,
                reason
            );
            matrix
                .notice_user(
                    &actor.uid,
                    &format!("Added temporary {minutes} min. RESV [{name}]"),
                )
                .await;
        }
        AddAction::Permanent => {
            matrix
                .sendto_realops(
                    SnoMask::GENERAL,
                    &format!(
                        "{} added RESV for [{}] [{}]",
                        actor.oper_name, name, reason
                    ),
                )
                .await;
            tracing::info!(target: "bandb", "R {} 0 {} {}", actor.oper_name, name, reason);
            matrix
                .notice_user(&actor.uid, &format!("Added RESV [{name}]"))
                .await;
            if let Err(e) = db
                .bans()
                .add_resv(plan.conf.kind, name, reason, &actor.oper_name)
                .await
            {
                tracing::error!(error = %e, mask = %name, "Failed to persist RESV");
            }
        }
    }

    match plan.conf.kind {
        ResvKind::Channel => {
            crate::enforce::resv_chan_forcepart(matrix, name, reason).await;
        }
        ResvKind::Nick => {
            crate::enforce::resv_nick_fnc(matrix, name, reason).await;
        }
    }
}

// ============================================================================
// Remove flow
// ============================================================================

enum RemovePlan {
    NotFound,
    /// A prop-ban cannot be lifted on a subset of servers.
    GlobalOnLocalDenied,
    /// Raced with expiry; converged already, stay silent.
    RaceExpired,
    /// Global entry tombstoned; broadcast the record.
    Tombstoned(Arc<ResvConf>),
    RemovedLocal(Arc<ResvConf>),
}

fn try_remove(
    store: &mut Store,
    actor_oper: &str,
    name: &str,
    propagated: bool,
    now: i64,
) -> RemovePlan {
    let kind = ResvKind::classify(name);
    let found = match kind {
        ResvKind::Channel => store.resvs.find_channel(name).cloned(),
        ResvKind::Nick => store.resvs.find_nick_mask(name).cloned(),
    };
    let Some(conf) = found else {
        return RemovePlan::NotFound;
    };

    if conf.lifetime > 0 {
        if !propagated {
            return RemovePlan::GlobalOnLocalDenied;
        }
        if !store.prop_bans.lookup_prop_ban(&conf) {
            return RemovePlan::RaceExpired;
        }

        let mut tomb = (*conf).clone();
        // Forward motion even under clock regressions.
        tomb.created = if conf.created < now {
            now
        } else {
            conf.created + 1
        };
        tomb.hold = tomb.created;
        tomb.flags.my_oper = true;
        tomb.flags.temporary = true;
        store.opers.delete(&tomb.oper);
        tomb.oper = store.opers.add(actor_oper);

        let tomb = Arc::new(tomb);
        store.prop_bans.replace_old_ban(&tomb);
        store.prop_bans.add_prop_ban(tomb.clone());
        store.deactivate(&conf);
        RemovePlan::Tombstoned(tomb)
    } else {
        let removed = store.resvs.remove(kind, name).unwrap_or(conf);
        store.opers.delete(&removed.oper);
        RemovePlan::RemovedLocal(removed)
    }
}

/// Lift a reservation; `propagated` is false when the command was scoped
/// to specific servers.
pub(crate) async fn remove_resv(
    matrix: &Arc<Matrix>,
    db: &Database,
    actor: &ResvActor,
    name: &str,
    propagated: bool,
) {
    let now = wall_clock();
    let plan = {
        let mut store = matrix.store.lock();
        try_remove(&mut store, &actor.oper_name, name, propagated, now)
    };

    match plan {
        RemovePlan::NotFound => {
            if propagated {
                router::cluster_generic(matrix, &actor.uid, "UNRESV", name);
            }
            matrix
                .notice_user(&actor.uid, &format!("No RESV for {name}"))
                .await;
        }
        RemovePlan::GlobalOnLocalDenied => {
            matrix
                .notice_user(
                    &actor.uid,
                    &format!("Cannot remove global RESV {name} on specific servers"),
                )
                .await;
        }
        RemovePlan::RaceExpired => {}
        RemovePlan::Tombstoned(tomb) => {
            matrix
                .notice_user(&actor.uid, &format!("RESV for [{name}] is removed"))
                .await;
            matrix
                .sendto_realops(
                    SnoMask::GENERAL,
                    &format!(
                        "{} has removed the global RESV for: [{}]",
                        actor.oper_name, name
                    ),
                )
                .await;
            tracing::info!(target: "bandb", "UR {} {}", actor.oper_name, name);
            router::broadcast_ban_r(matrix, None, &actor.uid, &tomb);
        }
        RemovePlan::RemovedLocal(conf) => {
            if propagated {
                router::cluster_generic(matrix, &actor.uid, "UNRESV", name);
            }
            matrix
                .notice_user(&actor.uid, &format!("RESV for [{name}] is removed"))
                .await;
            tracing::info!(target: "bandb", "UR {} {}", actor.oper_name, name);
            if conf.hold == 0 {
                if let Err(e) = db.bans().del_resv(&conf.mask).await {
                    tracing::error!(error = %e, mask = %conf.mask, "Failed to delete persisted RESV");
                }
                matrix
                    .sendto_realops(
                        SnoMask::GENERAL,
                        &format!("{} has removed the RESV for: [{}]", actor.oper_name, name),
                    )
                    .await;
            } else {
                matrix
                    .sendto_realops(
                        SnoMask::GENERAL,
                        &format!(
                            "{} has removed the temporary RESV for: [{}]",
                            actor.oper_name, name
                        ),
                    )
                    .await;
            }
        }
    }
}

// ============================================================================
// Operator entry points
// ============================================================================

/// Handler for `RESV [duration] <mask> [ON <server>] :<reason>`.
pub struct ResvHandler;

#[async_trait]
impl ClientHandler for ResvHandler {
    async fn handle(&self, ctx: &Context<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        if !may_resv(ctx.matrix, ctx.uid).await {
            send_noprivs(ctx, "resv").await;
            return Ok(());
        }

        let mut loc = 0usize;
        let temp_time = match msg.arg(loc).and_then(valid_temp_time) {
            Some(t) => {
                loc += 1;
                t
            }
            None => 0,
        };

        let Some(name) = msg.arg(loc).filter(|a| !a.is_empty()) else {
            return Err(HandlerError::NeedMoreParams);
        };
        loc += 1;

        let mut target_server = None;
        let mut propagated = ctx.matrix.config.resv.use_propagated_bans;
        if msg.arg_count() >= loc + 2 && msg.arg(loc).is_some_and(|a| irc_eq(a, "ON")) {
            if !may_remote_ban(ctx.matrix, ctx.uid).await {
                send_noprivs(ctx, "remoteban").await;
                return Ok(());
            }
            target_server = msg.arg(loc + 1);
            loc += 2;
            // Targeted at specific servers; not a global prop-ban.
            propagated = false;
        }

        let Some(reason) = msg.arg(loc).filter(|a| !a.is_empty()) else {
            return Err(HandlerError::NeedMoreParams);
        };

        let actor = ResvActor::from_uid(ctx.matrix, ctx.uid)
            .await
            .ok_or_else(|| HandlerError::Internal("issuer vanished".into()))?;

        if let Some(target) = target_server {
            let sno = if temp_time > 0 {
                format!(
                    "{} is adding a {} min. RESV for [{}] on {} [{}]",
                    actor.oper_name,
                    temp_time / 60,
                    name,
                    target,
                    reason
                )
            } else {
                format!(
                    "{} is adding a permanent RESV for [{}] on {} [{}]",
                    actor.oper_name, name, target, reason
                )
            };
            ctx.matrix.sendto_realops(SnoMask::GENERAL, &sno).await;

            router::propagate_resv(ctx.matrix, None, &actor.uid, target, temp_time, name, reason);

            if !wildcard_match(target, &ctx.matrix.info.name) {
                return Ok(());
            }
        } else if !propagated {
            router::cluster_resv(ctx.matrix, &actor.uid, temp_time, name, reason);
        }

        if propagated && temp_time == 0 {
            ctx.notice("Cannot set a permanent global ban").await;
            return Ok(());
        }

        parse_resv(ctx.matrix, ctx.db, &actor, name, reason, temp_time, propagated).await;
        Ok(())
    }
}

/// Handler for `UNRESV <mask> [ON <server>]`.
pub struct UnresvHandler;

#[async_trait]
impl ClientHandler for UnresvHandler {
    async fn handle(&self, ctx: &Context<'_>, msg: &MessageRef<'_>) -> HandlerResult {
        if !may_resv(ctx.matrix, ctx.uid).await {
            send_noprivs(ctx, "resv").await;
            return Ok(());
        }

        let Some(name) = msg.arg(0).filter(|a| !a.is_empty()) else {
            return Err(HandlerError::NeedMoreParams);
        };

        let actor = ResvActor::from_uid(ctx.matrix, ctx.uid)
            .await
            .ok_or_else(|| HandlerError::Internal("issuer vanished".into()))?;

        let mut propagated = true;
        if msg.arg_count() == 3 && msg.arg(1).is_some_and(|a| irc_eq(a, "ON")) {
            if !may_remote_ban(ctx.matrix, ctx.uid).await {
                send_noprivs(ctx, "remoteban").await;
                return Ok(());
            }
            let target = msg.arg(2).unwrap_or("*");
            router::propagate_generic(ctx.matrix, None, &actor.uid, "UNRESV", target, name);
            if !wildcard_match(target, &ctx.matrix.info.name) {
                return Ok(());
            }
            propagated = false;
        }

        remove_resv(ctx.matrix, ctx.db, &actor, name, propagated).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_minutes_in_seconds() {
        assert_eq!(valid_temp_time("60"), Some(3600));
        assert_eq!(valid_temp_time("0"), Some(0));
        assert_eq!(valid_temp_time("Evil*"), None);
        assert_eq!(valid_temp_time(""), None);
        assert_eq!(valid_temp_time("5d"), None);
        // Capped at a year even for absurd input.
        assert_eq!(
            valid_temp_time("99999999999999999999"),
            Some(MAX_TEMP_MINUTES * 60)
        );
    }

    #[test]
    fn resv_nick_character_rules() {
        assert!(clean_resv_nick("Evil*"));
        assert!(clean_resv_nick("dcc-*"));
        assert!(clean_resv_nick("nick"));
        assert!(clean_resv_nick("ni?k*"));
        // UID-shaped or hyphen-leading masks are refused.
        assert!(!clean_resv_nick("0AA*"));
        assert!(!clean_resv_nick("-evil"));
        // Illegal characters.
        assert!(!clean_resv_nick("evil!*"));
        assert!(!clean_resv_nick("a b"));
        // Nothing concrete at all.
        assert!(!clean_resv_nick("???"));
        assert!(!clean_resv_nick(""));
    }

    #[test]
    fn wildcard_floor_counts_concrete_chars() {
        assert!(valid_wild_card_simple("Evil*", 3));
        assert!(!valid_wild_card_simple("Ev*", 3));
        assert!(!valid_wild_card_simple("*?*", 3));
        assert!(valid_wild_card_simple("abc", 3));
    }
}
