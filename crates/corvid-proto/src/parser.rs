//! Nom-based line parser.
//!
//! Splits a raw line into tags / prefix / command / params without
//! allocating; [`crate::borrowed::MessageRef`] wraps the result.

use nom::{
    bytes::complete::{take_until, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    error::ErrorKind,
    sequence::preceded,
    IResult,
};

/// Raw pieces of a parsed line, borrowed from the input.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawMessage<'a> {
    pub tags: Option<&'a str>,
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
}

/// IRCv3 tags section: `@` up to the first space. The daemon ignores tag
/// content but must tolerate peers that send them.
fn tags(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_until(" "))(input)
}

fn prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

/// Command token: `1*letter / 3digit` per RFC 2812.
fn command(input: &str) -> IResult<&str, &str> {
    let (rest, cmd) = take_while1(|c: char| c.is_ascii_alphanumeric())(input)?;
    let all_letters = cmd.bytes().all(|b| b.is_ascii_alphabetic());
    let three_digits = cmd.len() == 3 && cmd.bytes().all(|b| b.is_ascii_digit());
    if all_letters || three_digits {
        Ok((rest, cmd))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::AlphaNumeric,
        )))
    }
}

/// Space-separated params with the `:`-trailing rule; runs of spaces
/// collapse, and the RFC cap of 15 params applies.
fn params(mut rest: &str) -> Vec<&str> {
    let mut out = Vec::new();
    while rest.as_bytes().first() == Some(&b' ') && out.len() < 15 {
        while rest.as_bytes().first() == Some(&b' ') {
            rest = &rest[1..];
        }
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            out.push(trailing);
            break;
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        out.push(&rest[..end]);
        rest = &rest[end..];
    }
    out
}

pub(crate) fn parse_line(input: &str) -> Result<RawMessage<'_>, ()> {
    fn inner(input: &str) -> IResult<&str, (Option<&str>, Option<&str>, &str)> {
        let (input, t) = opt(tags)(input)?;
        let (input, _) = space0(input)?;
        let (input, p) = opt(prefix)(input)?;
        let (input, _) = space0(input)?;
        let (input, c) = command(input)?;
        Ok((input, (t, p, c)))
    }

    let (rest, (tags, prefix, command)) = inner(input).map_err(|_| ())?;
    Ok(RawMessage {
        tags,
        prefix,
        command,
        params: params(rest),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_command() {
        let m = parse_line("PING").unwrap();
        assert_eq!(m.command, "PING");
        assert!(m.prefix.is_none());
        assert!(m.params.is_empty());
    }

    #[test]
    fn prefix_and_trailing() {
        let m = parse_line(":0CV BAN R * Evil* 1700000000 60 60 * :abuse").unwrap();
        assert_eq!(m.prefix, Some("0CV"));
        assert_eq!(m.command, "BAN");
        assert_eq!(
            m.params,
            vec!["R", "*", "Evil*", "1700000000", "60", "60", "*", "abuse"]
        );
    }

    #[test]
    fn collapses_space_runs() {
        let m = parse_line("RESV  60   Bad*  :two  words").unwrap();
        assert_eq!(m.params, vec!["60", "Bad*", "two  words"]);
    }

    #[test]
    fn tolerates_tags() {
        let m = parse_line("@time=2026-01-01T00:00:00Z :n!u@h PRIVMSG #c :hi").unwrap();
        assert_eq!(m.tags, Some("time=2026-01-01T00:00:00Z"));
        assert_eq!(m.command, "PRIVMSG");
    }

    #[test]
    fn rejects_mixed_command_tokens() {
        assert!(parse_line("PING1").is_err());
        assert!(parse_line("12").is_err());
        assert!(parse_line("1234").is_err());
    }

    #[test]
    fn empty_trailing_param() {
        let m = parse_line("UNRESV #spam :").unwrap();
        assert_eq!(m.params, vec!["#spam", ""]);
    }
}
