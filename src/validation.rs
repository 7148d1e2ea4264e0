//! Input bounding helpers shared by the reply path, the console and the peer store.
//!
//! Everything that crosses a fixed-size boundary (inbound bodies, outgoing payloads,
//! the 32-byte name field on disk) is cut here, always on a UTF-8 character boundary.

/// Longest prefix of `s` that fits in `max_bytes` without splitting a character.
pub fn clamp_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Parse the leading run of ASCII digits; stops at the first other byte.
///
/// Empty or non-numeric input yields 0 and overflow saturates, so callers that
/// forward the value to the clock see it rejected as a regression rather than wrapped.
pub fn parse_leading_digits(s: &str) -> u32 {
    let mut n: u32 = 0;
    for b in s.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        n = n.saturating_mul(10).saturating_add(u32::from(b - b'0'));
    }
    n
}

/// Clean a peer-supplied display name for console output and the relay table:
/// control characters are dropped and the result is cut to `max_bytes`.
pub fn sanitize_name(name: &str, max_bytes: usize) -> String {
    let cleaned: String = name.chars().filter(|c| !c.is_control()).collect();
    clamp_utf8(cleaned.trim(), max_bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_never_splits_multibyte() {
        // "пинг" is 8 bytes; cutting at 3 must fall back to 2 (one full char)
        assert_eq!(clamp_utf8("пинг", 3), "п");
        assert_eq!(clamp_utf8("пинг", 8), "пинг");
        assert_eq!(clamp_utf8("ping", 0), "");
    }

    #[test]
    fn leading_digits_only() {
        assert_eq!(parse_leading_digits("1700000000"), 1_700_000_000);
        assert_eq!(parse_leading_digits("123abc"), 123);
        assert_eq!(parse_leading_digits("abc"), 0);
        assert_eq!(parse_leading_digits(""), 0);
        assert_eq!(parse_leading_digits("99999999999"), u32::MAX);
    }

    #[test]
    fn sanitize_strips_controls() {
        assert_eq!(sanitize_name(" Relay\n01 ", 32), "Relay01");
        assert_eq!(sanitize_name("Ретранслятор", 6), "Рет");
    }
}
