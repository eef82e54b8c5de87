//! Backend path helpers
//!
//! Backend paths are `/`-separated strings regardless of host OS. These helpers
//! never touch the filesystem.

/// Expand a leading `~` against `home`.
///
/// `~` and `~/rest` are expanded; `~user` forms and paths without a leading
/// tilde are returned unchanged, as is everything when `home` is `None`.
pub fn expand_home(path: &str, home: Option<&str>) -> String {
    let Some(home) = home else {
        return path.to_string();
    };
    if path == "~" {
        return home.to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) => join_path(home, rest),
        None => path.to_string(),
    }
}

/// Strip redundant trailing separators, keeping a lone `/`.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Join a name (or relative path) onto a base path with a single separator.
pub fn join_path(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if name.is_empty() {
        return normalize_path(base);
    }
    if base.is_empty() || base == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

/// Parent of a backend path, `None` at `/`.
pub fn parent_path(path: &str) -> Option<String> {
    let path = normalize_path(path);
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Path of `path` relative to `root`, compared component-wise.
///
/// Returns `None` when `path` does not live under `root` (so `/data2` is not
/// under `/data`). The returned slice has no leading separator and is empty
/// when `path` is the root itself.
pub fn relative_to<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    let root = root.trim_end_matches('/');
    let rest = path.strip_prefix(root)?;
    if rest.is_empty() {
        return Some("");
    }
    if root.is_empty() || rest.starts_with('/') {
        return Some(rest.trim_matches('/'));
    }
    None
}

/// Decode `%XX` escapes. Invalid escapes are kept verbatim.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = |b: u8| (b as char).to_digit(16).unwrap_or(0) as u8;
            out.push(hex(bytes[i + 1]) << 4 | hex(bytes[i + 2]));
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
