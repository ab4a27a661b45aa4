//! Reservation records and the active store.
//!
//! A reservation forbids a channel name or a nickname mask. Channel
//! entries live in a hash keyed by the folded name (at most one per
//! name); nick entries are wildcard masks and live in an ordered list.

use super::operhash::OperName;
use corvid_proto::{irc_eq, irc_fold, wildcard_match};
use std::collections::HashMap;
use std::sync::Arc;

/// What a reservation forbids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResvKind {
    /// A literal channel name.
    Channel,
    /// A wildcard-capable nickname mask.
    Nick,
}

impl ResvKind {
    /// Classify a mask by its leading sigil.
    pub fn classify(mask: &str) -> ResvKind {
        if corvid_proto::is_channel_name(mask) {
            ResvKind::Channel
        } else {
            ResvKind::Nick
        }
    }
}

/// Record flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResvFlags {
    /// This node originated the record.
    pub my_oper: bool,
    /// Not persisted to the ban database.
    pub temporary: bool,
}

/// One reservation.
///
/// Timestamps are wall-clock seconds. `hold == 0` means permanent (and
/// persisted); `lifetime > 0` marks a replicated prop-ban record whose
/// tombstone must outlive replays.
#[derive(Debug, Clone)]
pub struct ResvConf {
    pub kind: ResvKind,
    pub mask: String,
    pub reason: String,
    pub oper: OperName,
    pub created: i64,
    pub hold: i64,
    pub lifetime: i64,
    pub flags: ResvFlags,
}

impl ResvConf {
    /// Whether this is a replicated prop-ban record.
    #[inline]
    pub fn is_propagated(&self) -> bool {
        self.lifetime > 0
    }

    /// Whether this entry belongs in the ban database.
    #[inline]
    pub fn is_persistent(&self) -> bool {
        self.hold == 0 && self.lifetime == 0
    }

    /// Key used by the hash stores.
    #[inline]
    pub fn folded_mask(&self) -> String {
        irc_fold(&self.mask)
    }
}

/// The active reservation store: channel hash + nick-mask list.
#[derive(Debug, Default)]
pub struct ResvStore {
    channels: HashMap<String, Arc<ResvConf>>,
    nicks: Vec<Arc<ResvConf>>,
}

impl ResvStore {
    /// Look up the reservation on a channel name, if any.
    pub fn find_channel(&self, name: &str) -> Option<&Arc<ResvConf>> {
        self.channels.get(&irc_fold(name))
    }

    /// Find a nick reservation by exact (folded) mask equality.
    pub fn find_nick_mask(&self, mask: &str) -> Option<&Arc<ResvConf>> {
        self.nicks.iter().find(|conf| irc_eq(&conf.mask, mask))
    }

    /// Whether an identical-mask reservation already exists.
    pub fn contains(&self, kind: ResvKind, mask: &str) -> bool {
        match kind {
            ResvKind::Channel => self.find_channel(mask).is_some(),
            ResvKind::Nick => self.find_nick_mask(mask).is_some(),
        }
    }

    /// Insert an entry into the structure matching its kind.
    pub fn insert(&mut self, conf: Arc<ResvConf>) {
        match conf.kind {
            ResvKind::Channel => {
                self.channels.insert(conf.folded_mask(), conf);
            }
            ResvKind::Nick => self.nicks.push(conf),
        }
    }

    /// Remove by kind + mask, returning the entry that was present.
    pub fn remove(&mut self, kind: ResvKind, mask: &str) -> Option<Arc<ResvConf>> {
        match kind {
            ResvKind::Channel => self.channels.remove(&irc_fold(mask)),
            ResvKind::Nick => {
                let idx = self.nicks.iter().position(|c| irc_eq(&c.mask, mask))?;
                Some(self.nicks.remove(idx))
            }
        }
    }

    /// First nick reservation whose mask covers `nick`, for enforcement.
    pub fn matching_nick_resv(&self, nick: &str) -> Option<&Arc<ResvConf>> {
        self.nicks.iter().find(|conf| wildcard_match(&conf.mask, nick))
    }

    /// Entries past their hold time, excluding prop-bans (the prop-ban
    /// store owns their expiry).
    pub fn expired_temps(&self, now: i64) -> Vec<Arc<ResvConf>> {
        self.channels
            .values()
            .chain(self.nicks.iter())
            .filter(|c| c.hold > 0 && c.hold <= now && c.lifetime == 0)
            .cloned()
            .collect()
    }

    /// Active prop-ban entries past their hold time.
    pub fn expired_propagated(&self, now: i64) -> Vec<Arc<ResvConf>> {
        self.channels
            .values()
            .chain(self.nicks.iter())
            .filter(|c| c.lifetime > 0 && c.hold <= now)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResvConf>> {
        self.channels.values().chain(self.nicks.iter())
    }

    pub fn len(&self) -> usize {
        self.channels.len() + self.nicks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::super::operhash::OperHash;
    use super::*;

    fn conf(kind: ResvKind, mask: &str) -> Arc<ResvConf> {
        let mut opers = OperHash::default();
        Arc::new(ResvConf {
            kind,
            mask: mask.to_string(),
            reason: "test".to_string(),
            oper: opers.add("ops!o@h{ops}"),
            created: 100,
            hold: 0,
            lifetime: 0,
            flags: ResvFlags::default(),
        })
    }

    #[test]
    fn classify_by_sigil() {
        assert_eq!(ResvKind::classify("#spam"), ResvKind::Channel);
        assert_eq!(ResvKind::classify("&local"), ResvKind::Channel);
        assert_eq!(ResvKind::classify("Evil*"), ResvKind::Nick);
    }

    #[test]
    fn channel_lookup_is_case_folded() {
        let mut store = ResvStore::default();
        store.insert(conf(ResvKind::Channel, "#Spam[1]"));
        assert!(store.find_channel("#spam{1}").is_some());
        assert!(store.contains(ResvKind::Channel, "#SPAM[1]"));
        assert!(store.find_channel("#other").is_none());
    }

    #[test]
    fn nick_masks_coexist_but_not_duplicates() {
        let mut store = ResvStore::default();
        store.insert(conf(ResvKind::Nick, "Evil*"));
        store.insert(conf(ResvKind::Nick, "Bad?guy"));
        assert_eq!(store.len(), 2);
        assert!(store.contains(ResvKind::Nick, "EVIL*"));
        assert!(store.matching_nick_resv("EvilBot").is_some());
        assert!(store.matching_nick_resv("Goodguy").is_none());
    }

    #[test]
    fn remove_returns_the_entry() {
        let mut store = ResvStore::default();
        store.insert(conf(ResvKind::Nick, "Evil*"));
        let removed = store.remove(ResvKind::Nick, "evil*").unwrap();
        assert_eq!(removed.mask, "Evil*");
        assert!(store.is_empty());
        assert!(store.remove(ResvKind::Nick, "evil*").is_none());
    }

    #[test]
    fn expiry_filters() {
        let mut store = ResvStore::default();
        let mut temp = (*conf(ResvKind::Nick, "Temp*")).clone();
        temp.hold = 50;
        store.insert(Arc::new(temp));
        let mut prop = (*conf(ResvKind::Nick, "Prop*")).clone();
        prop.hold = 50;
        prop.lifetime = 500;
        store.insert(Arc::new(prop));
        store.insert(conf(ResvKind::Nick, "Perm*"));

        let temps = store.expired_temps(60);
        assert_eq!(temps.len(), 1);
        assert_eq!(temps[0].mask, "Temp*");

        let props = store.expired_propagated(60);
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].mask, "Prop*");
    }
}
