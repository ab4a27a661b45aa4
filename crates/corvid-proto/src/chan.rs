//! Channel name rules.

/// Whether `name` carries an IRC channel sigil.
#[inline]
pub fn is_channel_name(name: &str) -> bool {
    matches!(name.as_bytes().first(), Some(b'#') | Some(b'&'))
}

/// Validate the characters of a channel name.
///
/// Must start with a sigil and contain no space, comma, BEL, NUL, or
/// CR/LF (RFC 1459 §1.3).
pub fn check_channel_name(name: &str) -> bool {
    if !is_channel_name(name) || name.len() < 2 {
        return false;
    }
    name.bytes()
        .all(|b| !matches!(b, b' ' | b',' | 0x07 | 0x00 | b'\r' | b'\n'))
}
