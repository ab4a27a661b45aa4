//! Replicated-ban (prop-ban) store.
//!
//! Holds every reservation with a nonzero lifetime, keyed by
//! (kind, folded mask). Records converge across the mesh by
//! last-writer-wins on `(created, lifetime)`; a removed record becomes a
//! tombstone (`hold == created`) that lives until `lifetime` so a replay
//! from a slow peer cannot resurrect it.

use super::resv::{ResvConf, ResvKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Verdict of [`PropBanStore::replace_old_ban`] for a candidate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanUpdate {
    /// Candidate wins (no record, or strictly newer than the incumbent).
    Supersedes,
    /// Exact duplicate of the incumbent; a no-op.
    Duplicate,
    /// Older than the incumbent; reject.
    Stale,
}

#[derive(Debug, Default)]
pub struct PropBanStore {
    bans: HashMap<(ResvKind, String), Arc<ResvConf>>,
}

impl PropBanStore {
    fn key(conf: &ResvConf) -> (ResvKind, String) {
        (conf.kind, conf.folded_mask())
    }

    /// Compare a candidate against the incumbent for its key and evict
    /// the incumbent when the candidate wins. Newer `created` wins; ties
    /// resolve to the higher `lifetime`.
    pub fn replace_old_ban(&mut self, candidate: &ResvConf) -> BanUpdate {
        let key = Self::key(candidate);
        let verdict = match self.bans.get(&key) {
            None => BanUpdate::Supersedes,
            Some(old) => {
                match (candidate.created, candidate.lifetime).cmp(&(old.created, old.lifetime)) {
                    std::cmp::Ordering::Greater => BanUpdate::Supersedes,
                    std::cmp::Ordering::Equal => BanUpdate::Duplicate,
                    std::cmp::Ordering::Less => BanUpdate::Stale,
                }
            }
        };
        if verdict == BanUpdate::Supersedes {
            self.bans.remove(&key);
        }
        verdict
    }

    /// Insert a record; the caller has already run [`Self::replace_old_ban`].
    pub fn add_prop_ban(&mut self, conf: Arc<ResvConf>) {
        self.bans.insert(Self::key(&conf), conf);
    }

    /// Guarantee a locally-built record outbids any incumbent for its key.
    ///
    /// Shifts the whole `(created, hold, lifetime)` triple forward past
    /// the incumbent's `created` (durations preserved) and extends
    /// `lifetime` to cover the incumbent, so the record propagates even
    /// under clock regressions or a still-live tombstone.
    pub fn outbid(&self, conf: &mut ResvConf) {
        let key = (conf.kind, conf.folded_mask());
        if let Some(old) = self.bans.get(&key) {
            if old.created >= conf.created {
                let bump = old.created + 1 - conf.created;
                conf.created += bump;
                conf.hold += bump;
                conf.lifetime += bump;
            }
            conf.lifetime = conf.lifetime.max(old.lifetime);
        }
    }

    /// Whether `conf` is still the reigning record for its key.
    pub fn lookup_prop_ban(&self, conf: &Arc<ResvConf>) -> bool {
        self.bans
            .get(&Self::key(conf))
            .is_some_and(|current| Arc::ptr_eq(current, conf))
    }

    pub fn get(&self, kind: ResvKind, mask: &str) -> Option<&Arc<ResvConf>> {
        self.bans.get(&(kind, corvid_proto::irc_fold(mask)))
    }

    /// Drop records whose lifetime has elapsed, returning them.
    pub fn sweep(&mut self, now: i64) -> Vec<Arc<ResvConf>> {
        let expired: Vec<_> = self
            .bans
            .iter()
            .filter(|(_, c)| c.lifetime <= now)
            .map(|(k, _)| k.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|k| self.bans.remove(&k))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResvConf>> {
        self.bans.values()
    }

    pub fn len(&self) -> usize {
        self.bans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bans.is_empty()
    }
}
