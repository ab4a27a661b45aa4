//! Numeric replies.
//!
//! Only the numerics the daemon actually emits are listed; the wire form
//! is the three-digit zero-padded code.

/// A server numeric reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Numeric {
    RPL_WELCOME,
    RPL_SNOMASK,
    RPL_LOAD2HI,
    RPL_NAMREPLY,
    RPL_ENDOFNAMES,
    RPL_YOUREOPER,
    ERR_UNKNOWNCOMMAND,
    ERR_ERRONEUSNICKNAME,
    ERR_NICKNAMEINUSE,
    ERR_NOTREGISTERED,
    ERR_NEEDMOREPARAMS,
    ERR_ALREADYREGISTERED,
    ERR_PASSWDMISMATCH,
    ERR_BADCHANNAME,
    ERR_NOPRIVILEGES,
    ERR_NOPRIVS,
}

impl Numeric {
    /// The three-digit reply code.
    pub const fn code(self) -> u16 {
        match self {
            Numeric::RPL_WELCOME => 1,
            Numeric::RPL_SNOMASK => 8,
            Numeric::RPL_LOAD2HI => 263,
            Numeric::RPL_NAMREPLY => 353,
            Numeric::RPL_ENDOFNAMES => 366,
            Numeric::RPL_YOUREOPER => 381,
            Numeric::ERR_UNKNOWNCOMMAND => 421,
            Numeric::ERR_ERRONEUSNICKNAME => 432,
            Numeric::ERR_NICKNAMEINUSE => 433,
            Numeric::ERR_NOTREGISTERED => 451,
            Numeric::ERR_NEEDMOREPARAMS => 461,
            Numeric::ERR_ALREADYREGISTERED => 462,
            Numeric::ERR_PASSWDMISMATCH => 464,
            Numeric::ERR_BADCHANNAME => 479,
            Numeric::ERR_NOPRIVILEGES => 481,
            Numeric::ERR_NOPRIVS => 723,
        }
    }
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_padding() {
        assert_eq!(Numeric::RPL_WELCOME.code(), 1);
        assert_eq!(Numeric::RPL_WELCOME.to_string(), "001");
        assert_eq!(Numeric::ERR_NOPRIVS.to_string(), "723");
        assert_eq!(Numeric::ERR_NEEDMOREPARAMS.code(), 461);
    }
}
