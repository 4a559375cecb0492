//! Folder and file name sanitization for titles coming from the source site.

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Sanitizes a playlist or track title for use as a single path component.
///
/// - Drops `\ / : * ? " < > |`, NUL and control characters
/// - Collapses runs of whitespace into one space
/// - Trims leading/trailing spaces and dots
/// - Limits length to 255 bytes
pub fn sanitize_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_space = false;

    for c in name.chars() {
        if matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c == '\0' {
            continue;
        }
        if c.is_whitespace() || c.is_control() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.');

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].trim_end().to_string()
    } else {
        trimmed.to_string()
    }
}
