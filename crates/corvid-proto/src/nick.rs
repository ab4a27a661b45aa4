//! Nickname rules.

/// Characters allowed inside a nickname (RFC 2812 `special` + alnum + `-`).
#[inline]
pub fn is_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '[' | ']' | '\\' | '`' | '_' | '^' | '{' | '|' | '}' | '-')
}

/// Validate a nickname: nonempty, within `max_len`, legal characters,
/// and not starting with a digit or `-`.
pub fn is_valid_nick(nick: &str, max_len: usize) -> bool {
    if nick.is_empty() || nick.len() > max_len {
        return false;
    }
    let mut chars = nick.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() || c == '-' => return false,
        Some(c) if !is_nick_char(c) => return false,
        Some(_) => {}
        None => return false,
    }
    chars.all(is_nick_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_rfc_nicks() {
        assert!(is_valid_nick("guest", 30));
        assert!(is_valid_nick("n1ck[away]", 30));
        assert!(is_valid_nick("a^b|c", 30));
    }

    #[test]
    fn rejects_bad_starts_and_chars() {
        assert!(!is_valid_nick("", 30));
        assert!(!is_valid_nick("1abc", 30));
        assert!(!is_valid_nick("-abc", 30));
        assert!(!is_valid_nick("has space", 30));
        assert!(!is_valid_nick("toolongnick", 5));
    }
}
