pub const MAX_DISPLAY_NAME_CHARS: usize = 255;
pub const FALLBACK_NAME: &str = "unnamed";

/// Turn a client-supplied upload filename into a safe display name.
///
/// Keeps only the last path component, replaces path separators and NUL,
/// drops other control characters, trims, and caps the length. Never fails:
/// an empty result becomes [`FALLBACK_NAME`].
pub fn sanitize_display_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' | '\0' => Some('_'),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    let truncated: String = cleaned
        .trim()
        .chars()
        .take(MAX_DISPLAY_NAME_CHARS)
        .collect();
    let name = truncated.trim();

    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Carry `previous`'s extension over to `name` when `name` has none.
/// A leading dot alone (`.env`) is not an extension.
pub fn keep_extension(name: &str, previous: &str) -> String {
    if extension(name).is_some() {
        return name.to_string();
    }
    let Some(ext) = extension(previous) else {
        return name.to_string();
    };

    let room = MAX_DISPLAY_NAME_CHARS.saturating_sub(ext.chars().count() + 1);
    let stem: String = name.chars().take(room).collect();
    format!("{}.{ext}", stem.trim_end())
}

fn extension(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Build a safe `Content-Disposition` header value.
pub fn content_disposition_value(filename: &str) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    // RFC 5987 percent-encoding for filename*.
    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => String::from(b as char),
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("attachment; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}
