use std::borrow::Cow;

/// Strips control characters from backend-provided display strings.
///
/// Campaign names, category names, and guide titles come from the partner
/// backend and end up in terminal logs and the persisted records. A hostile or
/// buggy payload could smuggle ANSI escape sequences or raw C0 controls into
/// both, so everything below 0x20 plus DEL is removed. These are single-line
/// display names, so unlike prose sanitizers we drop tab/newline/CR as well.
///
/// ANSI CSI sequences (`ESC [` ... final byte) are removed as a unit; a bare
/// ESC or any other control character is dropped individually.
///
/// Returns `Cow::Borrowed` when the input is already clean (the common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                // CSI sequence: consume through its final byte (0x40..=0x7e)
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            // Bare ESC is dropped either way
        } else if !c.is_ascii_control() {
            out.push(c);
        }
    }

    Cow::Owned(out)
}
