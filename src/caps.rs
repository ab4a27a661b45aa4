//! Server-link capability negotiation.
//!
//! Peers advertise tokens in CAPAB; the cluster router filters recipients
//! with required/forbidden masks. The legacy/encapsulated emission pairs
//! rely on disjoint masks (`CLUSTER & !ENCAP` vs `ENCAP & !CLUSTER`) so a
//! peer supporting both never sees a frame twice.

/// A set of link capabilities, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapSet(u32);

impl CapSet {
    pub const EMPTY: CapSet = CapSet(0);
    /// TS6 dialect: UID/SID addressing, BAN frames.
    pub const TS6: CapSet = CapSet(1 << 0);
    /// ENCAP subcommand forwarding.
    pub const ENCAP: CapSet = CapSet(1 << 1);
    /// Legacy cluster commands (RESV/UNRESV wire forms).
    pub const CLUSTER: CapSet = CapSet(1 << 2);
    /// Propagated-ban (BAN) support.
    pub const BAN: CapSet = CapSet(1 << 3);

    const TOKENS: [(CapSet, &'static str); 4] = [
        (CapSet::TS6, "TS6"),
        (CapSet::ENCAP, "ENCAP"),
        (CapSet::CLUSTER, "CLUSTER"),
        (CapSet::BAN, "BAN"),
    ];

    /// Whether every capability in `required` is present.
    #[inline]
    pub fn has_all(self, required: CapSet) -> bool {
        self.0 & required.0 == required.0
    }

    /// Whether any capability in `other` is present.
    #[inline]
    pub fn has_any(self, other: CapSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Router admission check: all of `required`, none of `forbidden`.
    #[inline]
    pub fn admits(self, required: CapSet, forbidden: CapSet) -> bool {
        self.has_all(required) && !self.has_any(forbidden)
    }

    /// Parse a CAPAB token list; unknown tokens are ignored.
    pub fn parse_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> CapSet {
        let mut set = CapSet::EMPTY;
        for token in tokens {
            for (cap, name) in CapSet::TOKENS {
                if token.eq_ignore_ascii_case(name) {
                    set = set | cap;
                }
            }
        }
        set
    }

    /// Token list for our own CAPAB burst.
    pub fn tokens(self) -> String {
        CapSet::TOKENS
            .iter()
            .filter(|(cap, _)| self.has_all(*cap))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::ops::BitOr for CapSet {
    type Output = CapSet;
    fn bitor(self, rhs: CapSet) -> CapSet {
        CapSet(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_admit() {
        let caps = CapSet::parse_tokens("TS6 ENCAP QS unknown BAN".split_whitespace());
        assert!(caps.has_all(CapSet::TS6 | CapSet::ENCAP | CapSet::BAN));
        assert!(!caps.has_any(CapSet::CLUSTER));

        assert!(caps.admits(CapSet::BAN | CapSet::TS6, CapSet::EMPTY));
        assert!(caps.admits(CapSet::ENCAP, CapSet::CLUSTER));
        assert!(!caps.admits(CapSet::CLUSTER, CapSet::ENCAP));
    }

    #[test]
    fn disjoint_legacy_encap_masks() {
        let legacy_only = CapSet::CLUSTER | CapSet::TS6;
        let both = CapSet::CLUSTER | CapSet::ENCAP;

        // Legacy emission: CLUSTER without ENCAP.
        assert!(legacy_only.admits(CapSet::CLUSTER, CapSet::ENCAP));
        assert!(!both.admits(CapSet::CLUSTER, CapSet::ENCAP));
        // Encap emission: ENCAP without CLUSTER.
        assert!(!both.admits(CapSet::ENCAP, CapSet::CLUSTER));
    }

    #[test]
    fn token_list_roundtrip() {
        let caps = CapSet::TS6 | CapSet::BAN;
        assert_eq!(caps.tokens(), "TS6 BAN");
        assert_eq!(CapSet::parse_tokens(caps.tokens().split_whitespace()), caps);
    }
}
