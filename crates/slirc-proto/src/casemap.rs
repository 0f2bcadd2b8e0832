//! RFC 1459 case mapping.
//!
//! On top of ASCII, `[]\~` are the uppercase forms of `{}|^`. Nicknames
//! that differ only in these characters are the same nickname.

/// Fold one character.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        c => c.to_ascii_lowercase(),
    }
}

/// Fold a whole string, e.g. for use as a map key.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive comparison without allocating.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .chars()
            .zip(b.chars())
            .all(|(x, y)| irc_lower_char(x) == irc_lower_char(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_characters_fold() {
        assert_eq!(irc_lower_char('['), '{');
        assert_eq!(irc_lower_char(']'), '}');
        assert_eq!(irc_lower_char('\\'), '|');
        assert_eq!(irc_lower_char('~'), '^');
        assert_eq!(irc_lower_char('Q'), 'q');
        assert_eq!(irc_lower_char('#'), '#');
    }

    #[test]
    fn strings_fold_and_compare() {
        assert_eq!(irc_to_lower("Nick[Away]"), "nick{away}");
        assert_eq!(irc_to_lower("a\\b~"), "a|b^");
        assert!(irc_eq("Test~Name", "test^name"));
        assert!(!irc_eq("alice", "alicE_"));
        assert!(!irc_eq("bob", "rob"));
    }
}
