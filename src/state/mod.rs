//! Process-wide server state.
//!
//! [`Matrix`] aggregates every singleton the daemon owns: the live
//! user/channel/peer maps and the reservation [`Store`]. The store is a
//! single value behind one lock so every RESV mutation is atomic with
//! respect to every other; handlers lock it, mutate, and release before
//! touching anything that can await.

pub mod channel;
pub mod operhash;
pub mod peer;
pub mod propban;
pub mod resv;
pub mod user;

pub use channel::{Channel, MemberModes};
pub use operhash::{OperHash, OperName};
pub use peer::Peer;
pub use propban::{BanUpdate, PropBanStore};
pub use resv::{ResvConf, ResvFlags, ResvKind, ResvStore};
pub use user::{OperPrivs, User};

use crate::config::Config;
use crate::snomask::SnoMask;
use corvid_proto::{irc_eq, irc_fold, Message, Prefix};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Current wall-clock time in seconds.
#[inline]
pub fn wall_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The reservation aggregate: oper interner, active store, prop-ban store.
#[derive(Debug, Default)]
pub struct Store {
    pub opers: OperHash,
    pub resvs: ResvStore,
    pub prop_bans: PropBanStore,
}

impl Store {
    /// Move a record out of active enforcement. The prop-ban store keeps
    /// its own reference for lifetime-bounded duplicate suppression.
    pub fn deactivate(&mut self, conf: &ResvConf) {
        self.resvs.remove(conf.kind, &conf.mask);
    }
}

/// This node's identity in the mesh.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub sid: String,
    pub description: String,
    pub network: String,
}

/// Shared server state.
pub struct Matrix {
    pub info: ServerInfo,
    pub config: Config,
    /// uid → user.
    pub users: DashMap<String, Arc<RwLock<User>>>,
    /// Folded nick → uid.
    pub nicks: DashMap<String, String>,
    /// Folded channel name → channel.
    pub channels: DashMap<String, Arc<RwLock<Channel>>>,
    /// Folded server name → peer link.
    pub peers: DashMap<String, Arc<Peer>>,
    /// The reservation aggregate.
    pub store: Mutex<Store>,
    /// Last global NAMES sweep, for the non-oper pace gate.
    last_names: AtomicI64,
    uid_serial: AtomicU32,
}

impl Matrix {
    pub fn new(config: Config) -> Arc<Matrix> {
        let info = ServerInfo {
            name: config.server.name.clone(),
            sid: config.server.sid.clone(),
            description: config.server.description.clone(),
            network: config.server.network.clone(),
        };
        Arc::new(Matrix {
            info,
            config,
            users: DashMap::new(),
            nicks: DashMap::new(),
            channels: DashMap::new(),
            peers: DashMap::new(),
            store: Mutex::new(Store::default()),
            last_names: AtomicI64::new(0),
            uid_serial: AtomicU32::new(0),
        })
    }

    /// Whether `name` names this server (case-folded).
    pub fn is_me(&self, name: &str) -> bool {
        irc_eq(name, &self.info.name) || name == self.info.sid
    }

    pub fn server_prefix(&self) -> Prefix {
        Prefix::Server(self.info.name.clone())
    }

    /// Allocate the next local TS6 UID: SID + six base-36 characters.
    pub fn next_uid(&self) -> String {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let mut n = self.uid_serial.fetch_add(1, Ordering::Relaxed);
        let mut tail = [b'A'; 6];
        for slot in tail.iter_mut().rev() {
            *slot = ALPHABET[(n % 36) as usize];
            n /= 36;
        }
        format!("{}{}", self.info.sid, std::str::from_utf8(&tail).unwrap_or("AAAAAA"))
    }

    /// Register a user in the maps.
    pub fn add_user(&self, user: User) -> Arc<RwLock<User>> {
        let uid = user.uid.clone();
        self.nicks.insert(irc_fold(&user.nick), uid.clone());
        let entry = Arc::new(RwLock::new(user));
        self.users.insert(uid, entry.clone());
        entry
    }

    /// Drop a user from the maps and from channel member lists.
    pub async fn remove_user(&self, uid: &str) {
        let Some((_, user)) = self.users.remove(uid) else {
            return;
        };
        let user = user.read().await;
        self.nicks.remove(&irc_fold(&user.nick));
        for chan_name in &user.channels {
            if let Some(chan) = self.channels.get(chan_name) {
                chan.write().await.members.remove(uid);
            }
        }
    }

    pub fn find_uid_by_nick(&self, nick: &str) -> Option<String> {
        self.nicks.get(&irc_fold(nick)).map(|r| r.value().clone())
    }

    /// Route a message to a user: directly for local users, via the peer
    /// link of the user's server otherwise.
    pub async fn send_to_user(&self, uid: &str, msg: Message) {
        let Some(user) = self.users.get(uid) else {
            return;
        };
        let user = user.read().await;
        if user.is_local() {
            user.send(msg);
        } else if let Some(peer) = self.peers.get(&irc_fold(&user.server)) {
            peer.send(msg);
        }
    }

    /// Server NOTICE to one user, routed.
    pub async fn notice_user(&self, uid: &str, text: &str) {
        let Some(user) = self.users.get(uid) else {
            return;
        };
        let nick = user.read().await.nick.clone();
        drop(user);
        let msg = Message::notice(nick, text).with_prefix(self.server_prefix());
        self.send_to_user(uid, msg).await;
    }

    /// Deliver a server notice to every local oper subscribed to `mask`.
    pub async fn sendto_realops(&self, mask: SnoMask, text: &str) {
        let line = format!("*** Notice -- {text}");
        for entry in self.users.iter() {
            let user = entry.value().read().await;
            if user.is_local() && user.is_oper() && user.snomask.contains(mask) {
                user.send(
                    Message::notice(user.nick.clone(), line.clone())
                        .with_prefix(self.server_prefix()),
                );
            }
        }
    }

    /// Non-oper pace gate for global NAMES: true when enough time has
    /// passed since the last sweep (and stamps the new time).
    pub fn names_pace_ok(&self, now: i64) -> bool {
        let last = self.last_names.load(Ordering::Relaxed);
        if last + self.config.limits.pace_wait > now {
            return false;
        }
        self.last_names.store(now, Ordering::Relaxed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config::parse(
            r#"
            [server]
            name = "irc.example.net"
            sid = "0CV"
            description = "test"

            [listen]
            client = "127.0.0.1:6667"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn uids_are_sid_prefixed_and_unique() {
        let matrix = Matrix::new(test_config());
        let a = matrix.next_uid();
        let b = matrix.next_uid();
        assert!(a.starts_with("0CV"));
        assert_eq!(a.len(), 9);
        assert_ne!(a, b);
        assert_eq!(a, "0CVAAAAAA");
        assert_eq!(b, "0CVAAAAAB");
    }

    #[test]
    fn is_me_folds_and_accepts_sid() {
        let matrix = Matrix::new(test_config());
        assert!(matrix.is_me("IRC.EXAMPLE.NET"));
        assert!(matrix.is_me("0CV"));
        assert!(!matrix.is_me("hub.example.net"));
    }

    #[test]
    fn names_pace_gate() {
        let matrix = Matrix::new(test_config());
        assert!(matrix.names_pace_ok(1000));
        assert!(!matrix.names_pace_ok(1005));
        assert!(matrix.names_pace_ok(1011));
    }

    #[tokio::test]
    async fn user_maps_stay_consistent() {
        let matrix = Matrix::new(test_config());
        let uid = matrix.next_uid();
        matrix.add_user(User {
            uid: uid.clone(),
            nick: "Alice[x]".to_string(),
            user: "a".to_string(),
            host: "h".to_string(),
            realname: "A".to_string(),
            server: matrix.info.name.clone(),
            invisible: false,
            oper: None,
            snomask: SnoMask::NONE,
            channels: Default::default(),
            sender: None,
        });
        assert_eq!(matrix.find_uid_by_nick("alice{X}"), Some(uid.clone()));
        matrix.remove_user(&uid).await;
        assert!(matrix.find_uid_by_nick("alice{x}").is_none());
    }
}
