//! Capability-gated multicast to server peers.
//!
//! Every emission filters the peer set with a required/forbidden
//! capability pair. The legacy and encapsulated forms of a cluster
//! message use disjoint pairs (`CLUSTER & !ENCAP` vs `ENCAP & !CLUSTER`)
//! so a peer supporting both receives exactly one copy; within one link,
//! the mpsc writer preserves emit order.

use crate::caps::CapSet;
use crate::state::{Matrix, ResvConf};
use corvid_proto::{wildcard_match, Message, Prefix};

/// Send `msg` to every peer admitted by the capability pair, excluding
/// the link named by `skip` (the frame's arrival link, if any).
pub fn sendto_server(
    matrix: &Matrix,
    skip: Option<&str>,
    required: CapSet,
    forbidden: CapSet,
    msg: &Message,
) {
    for peer in matrix.peers.iter() {
        if skip.is_some_and(|name| corvid_proto::irc_eq(name, &peer.name)) {
            continue;
        }
        if peer.caps.admits(required, forbidden) {
            peer.send(msg.clone());
        }
    }
}

/// Like [`sendto_server`], restricted to peers whose name matches the
/// `target` glob.
pub fn sendto_match_servs(
    matrix: &Matrix,
    skip: Option<&str>,
    target: &str,
    required: CapSet,
    forbidden: CapSet,
    msg: &Message,
) {
    for peer in matrix.peers.iter() {
        if skip.is_some_and(|name| corvid_proto::irc_eq(name, &peer.name)) {
            continue;
        }
        if wildcard_match(target, &peer.name) && peer.caps.admits(required, forbidden) {
            peer.send(msg.clone());
        }
    }
}

fn prefixed(source_id: &str, command: &str, args: Vec<String>) -> Message {
    Message::new(command, args).with_prefix(Prefix::Server(source_id.to_string()))
}

/// Targeted RESV propagation (`ON <server>` clause or remote relay).
///
/// Permanent reservations go out in both the legacy and encapsulated
/// forms; temporary ones only as ENCAP, since the legacy form cannot
/// carry a duration and must not silently become permanent.
#[allow(clippy::too_many_arguments)]
pub fn propagate_resv(
    matrix: &Matrix,
    skip: Option<&str>,
    source_id: &str,
    target: &str,
    temp_time: i64,
    name: &str,
    reason: &str,
) {
    let encap = prefixed(
        source_id,
        "ENCAP",
        vec![
            target.to_string(),
            "RESV".to_string(),
            temp_time.to_string(),
            name.to_string(),
            "0".to_string(),
            reason.to_string(),
        ],
    );
    if temp_time == 0 {
        let legacy = prefixed(
            source_id,
            "RESV",
            vec![target.to_string(), name.to_string(), reason.to_string()],
        );
        sendto_match_servs(matrix, skip, target, CapSet::CLUSTER, CapSet::ENCAP, &legacy);
        sendto_match_servs(matrix, skip, target, CapSet::ENCAP, CapSet::CLUSTER, &encap);
    } else {
        sendto_match_servs(matrix, skip, target, CapSet::ENCAP, CapSet::EMPTY, &encap);
    }
}

/// Cluster-wide RESV (local oper omitted `ON`, entry not globally
/// replicated): [`propagate_resv`] with target `*` and no name filter.
pub fn cluster_resv(matrix: &Matrix, source_id: &str, temp_time: i64, name: &str, reason: &str) {
    let encap = prefixed(
        source_id,
        "ENCAP",
        vec![
            "*".to_string(),
            "RESV".to_string(),
            temp_time.to_string(),
            name.to_string(),
            "0".to_string(),
            reason.to_string(),
        ],
    );
    if temp_time == 0 {
        let legacy = prefixed(
            source_id,
            "RESV",
            vec!["*".to_string(), name.to_string(), reason.to_string()],
        );
        sendto_server(matrix, None, CapSet::CLUSTER, CapSet::ENCAP, &legacy);
        sendto_server(matrix, None, CapSet::ENCAP, CapSet::CLUSTER, &encap);
    } else {
        sendto_server(matrix, None, CapSet::ENCAP, CapSet::EMPTY, &encap);
    }
}

/// Targeted single-argument command pair (UNRESV): legacy
/// `<cmd> <target> <arg>` and `ENCAP <target> <cmd> <arg>`.
pub fn propagate_generic(
    matrix: &Matrix,
    skip: Option<&str>,
    source_id: &str,
    command: &str,
    target: &str,
    arg: &str,
) {
    let legacy = prefixed(
        source_id,
        command,
        vec![target.to_string(), arg.to_string()],
    );
    let encap = prefixed(
        source_id,
        "ENCAP",
        vec![target.to_string(), command.to_string(), arg.to_string()],
    );
    sendto_match_servs(matrix, skip, target, CapSet::CLUSTER, CapSet::ENCAP, &legacy);
    sendto_match_servs(matrix, skip, target, CapSet::ENCAP, CapSet::CLUSTER, &encap);
}

/// Cluster-wide form of [`propagate_generic`].
pub fn cluster_generic(matrix: &Matrix, source_id: &str, command: &str, arg: &str) {
    let legacy = prefixed(source_id, command, vec!["*".to_string(), arg.to_string()]);
    let encap = prefixed(
        source_id,
        "ENCAP",
        vec!["*".to_string(), command.to_string(), arg.to_string()],
    );
    sendto_server(matrix, None, CapSet::CLUSTER, CapSet::ENCAP, &legacy);
    sendto_server(matrix, None, CapSet::ENCAP, CapSet::CLUSTER, &encap);
}

/// Build the `BAN R` wire frame for a prop-ban record.
///
/// `:<src> BAN R * <mask> <created> <hold-Δ> <lifetime-Δ> * :<reason>`;
/// the reason collapses to `*` for removals (tombstones).
pub fn ban_r_frame(source_id: &str, conf: &ResvConf) -> Message {
    let reason = if conf.hold == conf.created {
        "*".to_string()
    } else {
        conf.reason.clone()
    };
    prefixed(
        source_id,
        "BAN",
        vec![
            "R".to_string(),
            "*".to_string(),
            conf.mask.clone(),
            conf.created.to_string(),
            (conf.hold - conf.created).to_string(),
            (conf.lifetime - conf.created).to_string(),
            "*".to_string(),
            reason,
        ],
    )
}

/// Broadcast a prop-ban record to every `BAN|TS6` peer.
pub fn broadcast_ban_r(matrix: &Matrix, skip: Option<&str>, source_id: &str, conf: &ResvConf) {
    let frame = ban_r_frame(source_id, conf);
    sendto_server(
        matrix,
        skip,
        CapSet::BAN | CapSet::TS6,
        CapSet::EMPTY,
        &frame,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::Peer;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn matrix_with_peers(caps: &[(&str, CapSet)]) -> (Arc<Matrix>, Vec<mpsc::UnboundedReceiver<Message>>) {
        let config = Config::parse(
            r#"
            [server]
            name = "irc.example.net"
            sid = "0CV"
            description = "test"

            [listen]
            client = "127.0.0.1:6667"
            "#,
        )
        .unwrap();
        let matrix = Matrix::new(config);
        let mut rxs = Vec::new();
        for (name, cap) in caps {
            let (tx, rx) = mpsc::unbounded_channel();
            matrix.peers.insert(
                corvid_proto::irc_fold(name),
                Arc::new(Peer {
                    name: name.to_string(),
                    sid: "9ZZ".to_string(),
                    caps: *cap,
                    sender: tx,
                }),
            );
            rxs.push(rx);
        }
        (matrix, rxs)
    }

    #[test]
    fn permanent_resv_uses_disjoint_masks() {
        let (matrix, mut rxs) = matrix_with_peers(&[
            ("legacy.example.net", CapSet::CLUSTER),
            ("modern.example.net", CapSet::ENCAP),
            ("both.example.net", CapSet::CLUSTER | CapSet::ENCAP),
        ]);

        cluster_resv(&matrix, "0CVAAAAAA", 0, "spamchan", "spam");

        // Legacy-only peer gets the bare RESV form.
        let msg = rxs[0].try_recv().unwrap();
        assert_eq!(msg.command, "RESV");
        assert!(rxs[0].try_recv().is_err());

        // Encap-only peer gets the wrapped form.
        let msg = rxs[1].try_recv().unwrap();
        assert_eq!(msg.command, "ENCAP");
        assert_eq!(msg.args[1], "RESV");
        assert!(rxs[1].try_recv().is_err());

        // A peer with both capabilities sees exactly one copy (legacy).
        let msg = rxs[2].try_recv().unwrap();
        assert_eq!(msg.command, "RESV");
        assert!(rxs[2].try_recv().is_err());
    }

    #[test]
    fn temporary_resv_never_uses_legacy_form() {
        let (matrix, mut rxs) = matrix_with_peers(&[
            ("legacy.example.net", CapSet::CLUSTER),
            ("both.example.net", CapSet::CLUSTER | CapSet::ENCAP),
        ]);

        cluster_resv(&matrix, "0CVAAAAAA", 60, "Evil*", "abuse");

        // Legacy cannot represent a duration: nothing arrives.
        assert!(rxs[0].try_recv().is_err());

        let msg = rxs[1].try_recv().unwrap();
        assert_eq!(msg.command, "ENCAP");
        assert_eq!(msg.args, vec!["*", "RESV", "60", "Evil*", "0", "abuse"]);
    }

    #[test]
    fn targeted_propagation_filters_by_glob_and_skips_arrival_link() {
        let (matrix, mut rxs) = matrix_with_peers(&[
            ("hub.example.net", CapSet::CLUSTER | CapSet::ENCAP),
            ("leaf.other.org", CapSet::CLUSTER | CapSet::ENCAP),
        ]);

        propagate_resv(
            &matrix,
            Some("hub.example.net"),
            "0CVAAAAAA",
            "*.example.net",
            0,
            "#spam",
            "x",
        );
        assert!(rxs[0].try_recv().is_err(), "arrival link must be skipped");
        assert!(rxs[1].try_recv().is_err(), "glob must filter non-matching");

        propagate_resv(&matrix, None, "0CVAAAAAA", "*.example.net", 0, "#spam", "x");
        let msg = rxs[0].try_recv().unwrap();
        assert_eq!(msg.command, "RESV");
        assert_eq!(msg.args, vec!["*.example.net", "#spam", "x"]);
    }

    #[test]
    fn ban_frame_shape_and_tombstone_reason() {
        let mut opers = crate::state::OperHash::default();
        let mut conf = ResvConf {
            kind: crate::state::ResvKind::Nick,
            mask: "Evil*".to_string(),
            reason: "abuse".to_string(),
            oper: opers.add("ops!o@h{ops}"),
            created: 1000,
            hold: 1060,
            lifetime: 1060,
            flags: Default::default(),
        };
        let frame = ban_r_frame("0CVAAAAAA", &conf);
        assert_eq!(
            frame.to_string(),
            ":0CVAAAAAA BAN R * Evil* 1000 60 60 * abuse"
        );

        conf.created = 1100;
        conf.hold = 1100;
        let frame = ban_r_frame("0CVAAAAAA", &conf);
        assert_eq!(frame.args[4], "0");
        assert_eq!(frame.args[7], "*", "tombstones carry reason *");
    }

    #[test]
    fn ban_broadcast_requires_ban_and_ts6() {
        let (matrix, mut rxs) = matrix_with_peers(&[
            ("old.example.net", CapSet::TS6),
            ("new.example.net", CapSet::TS6 | CapSet::BAN),
        ]);
        let mut opers = crate::state::OperHash::default();
        let conf = ResvConf {
            kind: crate::state::ResvKind::Nick,
            mask: "Evil*".to_string(),
            reason: "abuse".to_string(),
            oper: opers.add("ops!o@h{ops}"),
            created: 1000,
            hold: 1060,
            lifetime: 1060,
            flags: Default::default(),
        };
        broadcast_ban_r(&matrix, None, "0CVAAAAAA", &conf);
        assert!(rxs[0].try_recv().is_err());
        assert_eq!(rxs[1].try_recv().unwrap().command, "BAN");
    }
}
