//! line normalizer - raw log fragments into clean newline-terminated lines

/// Split a raw fragment on carriage returns (terminal-style rewrites show up
/// as embedded `\r`), drop segments that are empty after trimming, and make
/// sure every surviving segment ends with exactly one newline.
///
/// Never fails; may produce zero lines from one fragment.
pub fn normalize_fragment(fragment: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for sub in fragment.split('\r') {
        let trimmed = sub.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut line = String::with_capacity(trimmed.len() + 1);
        line.push_str(trimmed);
        line.push('\n');
        lines.push(line);
    }
    lines
}
