//! Reservation enforcement.
//!
//! When a reservation lands, live state must follow: occupants of a
//! reserved channel are force-parted, and users whose nick matches a
//! reserved mask are renamed to a guest nick. Both hooks snapshot their
//! target set first (the maps mutate under them) and are best-effort per
//! target; a failure never aborts the reservation itself.

use crate::snomask::SnoMask;
use crate::state::Matrix;
use corvid_proto::{irc_fold, wildcard_match, Message, Prefix};
use rand::Rng;

/// Force every non-exempt occupant out of a reserved channel.
///
/// Returns how many users were parted.
pub async fn resv_chan_forcepart(matrix: &Matrix, channel_name: &str, reason: &str) -> usize {
    let folded = irc_fold(channel_name);
    let Some(chan) = matrix.channels.get(&folded).map(|c| c.value().clone()) else {
        return 0;
    };

    let targets: Vec<String> = chan.read().await.members.keys().cloned().collect();
    let mut parted = 0;

    for uid in targets {
        let Some(user) = matrix.users.get(&uid).map(|u| u.value().clone()) else {
            continue;
        };
        let (hostmask, exempt) = {
            let user = user.read().await;
            (
                user.hostmask(),
                user.is_oper() && matrix.config.resv.exempt_opers,
            )
        };
        if exempt {
            continue;
        }

        let part = Message::new(
            "PART",
            vec![chan.read().await.name.clone(), reason.to_string()],
        )
        .with_prefix(Prefix::parse(&hostmask));

        // Show the part to the remaining room, then to the parting user.
        {
            let chan = chan.read().await;
            for member in chan.members.keys() {
                if member != &uid {
                    matrix.send_to_user(member, part.clone()).await;
                }
            }
        }
        matrix.send_to_user(&uid, part).await;

        chan.write().await.members.remove(&uid);
        user.write().await.channels.remove(&folded);
        parted += 1;
    }

    if chan.read().await.members.is_empty() {
        matrix.channels.remove(&folded);
    }

    parted
}

/// Force a nick change on every live local user whose nickname matches
/// the reserved mask. Returns how many users were renamed.
pub async fn resv_nick_fnc(matrix: &Matrix, mask: &str, _reason: &str) -> usize {
    let targets: Vec<(String, String)> = {
        let mut hits = Vec::new();
        for entry in matrix.users.iter() {
            let user = entry.value().read().await;
            if user.is_local() && wildcard_match(mask, &user.nick) {
                let exempt = user.is_oper() && matrix.config.resv.exempt_opers;
                if !exempt {
                    hits.push((user.uid.clone(), user.nick.clone()));
                }
            }
        }
        hits
    };

    let mut changed = 0;
    for (uid, old_nick) in targets {
        let Some(guest) = pick_guest_nick(matrix) else {
            continue;
        };
        let Some(user) = matrix.users.get(&uid).map(|u| u.value().clone()) else {
            continue;
        };

        let (hostmask, user_field, host_field, channels) = {
            let user = user.read().await;
            (
                user.hostmask(),
                user.user.clone(),
                user.host.clone(),
                user.channels.iter().cloned().collect::<Vec<_>>(),
            )
        };

        let change = Message::new("NICK", vec![guest.clone()]).with_prefix(Prefix::parse(&hostmask));
        matrix.send_to_user(&uid, change.clone()).await;
        for chan_name in &channels {
            if let Some(chan) = matrix.channels.get(chan_name) {
                let chan = chan.read().await;
                for member in chan.members.keys() {
                    if member != &uid {
                        matrix.send_to_user(member, change.clone()).await;
                    }
                }
            }
        }

        matrix.nicks.remove(&irc_fold(&old_nick));
        matrix.nicks.insert(irc_fold(&guest), uid.clone());
        user.write().await.nick = guest.clone();

        matrix
            .sendto_realops(
                SnoMask::NICK_CHANGE,
                &format!("Nick change: From {old_nick} to {guest} [{user_field}@{host_field}]"),
            )
            .await;
        changed += 1;
    }
    changed
}

/// Find a free `Guest#####` nick. Gives up after a handful of draws
/// rather than spinning on a pathological namespace.
fn pick_guest_nick(matrix: &Matrix) -> Option<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..10 {
        let candidate = format!("Guest{}", rng.gen_range(10000..100000));
        if matrix.find_uid_by_nick(&candidate).is_none() {
            return Some(candidate);
        }
    }
    None
}
