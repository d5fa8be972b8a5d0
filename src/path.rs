//! String path helpers shared by every backend.
//!
//! Paths inside an image are `/`-separated strings and never touch the host
//! filesystem, so these helpers work on `str` rather than `std::path`.

/// Rewrite `alt_separator` to `/`.
pub fn normalize_separators(path: &str, alt_separator: Option<char>) -> String {
    match alt_separator {
        Some(sep) if sep != '/' => path.replace(sep, "/"),
        _ => path.to_string(),
    }
}

/// Join `name` onto `base` with POSIX semantics.
///
/// An absolute `name` replaces `base`. No `.`/`..` processing happens; the
/// result is exactly the string a caller used to reach the node.
///
/// ```rust
/// use imagefs::path::join;
///
/// assert_eq!(join("/etc", "passwd", None), "/etc/passwd");
/// assert_eq!(join("/", "etc", None), "/etc");
/// assert_eq!(join("/etc", "/var", None), "/var");
/// assert_eq!(join("C:", "Windows\\System32", Some('\\')), "C:/Windows/System32");
/// ```
pub fn join(base: &str, name: &str, alt_separator: Option<char>) -> String {
    let base = normalize_separators(base, alt_separator);
    let name = normalize_separators(name, alt_separator);

    if name.starts_with('/') || base.is_empty() {
        name
    } else if name.is_empty() || base.ends_with('/') {
        base + &name
    } else {
        format!("{base}/{name}")
    }
}

/// Lexically collapse duplicate slashes, `.` and `..`.
///
/// `..` never climbs above the root of an absolute path. Relative paths keep
/// their leading `..` components.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Everything before the last component, without trailing slashes.
///
/// ```rust
/// use imagefs::path::dirname;
///
/// assert_eq!(dirname("/a/b"), "/a");
/// assert_eq!(dirname("/a"), "/");
/// assert_eq!(dirname("a"), "");
/// ```
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        None => "",
        Some(idx) => {
            let head = &path[..=idx];
            let trimmed = head.trim_end_matches('/');
            if trimmed.is_empty() { &head[..1] } else { trimmed }
        }
    }
}

/// The last component of `path`.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        None => path,
        Some(idx) => &path[idx + 1..],
    }
}

/// Non-empty components of `path`, in order.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}
