//! Logging utilities: single-line escaping for chat text and masking for
//! credentials that must never land in a log file verbatim.

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Truncates very long strings (over `max_preview`) with an ellipsis to cap log noise.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 200; // chat messages are short; menus never exceed this
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                // Represent other control chars as hex \xNN
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Mask a credential for logging: first four characters, then an ellipsis.
/// Short values are fully masked.
pub fn mask_secret(s: &str) -> String {
    if s.len() <= 4 {
        return "····".to_string();
    }
    let head: String = s.chars().take(4).collect();
    format!("{head}…")
}

#[cfg(test)]
mod tests {
    use super::{escape_log, mask_secret};

    #[test]
    fn escapes_newlines() {
        let s = "Line1\nLine2\r\tEnd";
        let esc = escape_log(s);
        assert_eq!(esc, "Line1\\nLine2\\r\\tEnd");
    }

    #[test]
    fn masks_tokens() {
        assert_eq!(mask_secret("123456789:AAF0"), "1234…");
        assert_eq!(mask_secret("abc"), "····");
    }
}
