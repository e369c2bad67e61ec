//! Drive path helpers.
//!
//! Logical paths produced by the enumerator look like `/dir/sub/file.txt`.
//! Paths sent back to the remote are relative to the drive root, forward-slash
//! separated, without a leading slash (`dir/sub/file.txt`).

const DRIVE_ROOT_PREFIX: &str = "/drive/root:";
const DRIVES_PREFIX: &str = "/drives/";
const ROOT_MARKER: &str = "/root:";

/// Strip the `/drive/root:` (or `/drives/{id}/root:`) prefix from a parent
/// reference path.
pub fn strip_drive_root(path: &str) -> &str {
    if let Some(idx) = path.find(DRIVE_ROOT_PREFIX) {
        return &path[idx + DRIVE_ROOT_PREFIX.len()..];
    }
    if path.starts_with(DRIVES_PREFIX) {
        if let Some(idx) = path.find(ROOT_MARKER) {
            return &path[idx + ROOT_MARKER.len()..];
        }
    }
    path
}

/// Logical path of an item given its parent reference path.
pub fn logical_path(parent_path: Option<&str>, name: &str) -> String {
    match parent_path {
        Some(parent) => format!("{}/{}", strip_drive_root(parent), name),
        None => name.to_string(),
    }
}

/// Normalise a directory path: forward slashes, no leading or trailing slash.
/// The drive root normalises to the empty string.
pub fn normalize_dir(dir: &str) -> String {
    dir.replace('\\', "/").trim_matches('/').to_string()
}

/// Split a path into its normalised parent directory and file name.
pub fn split_path(path: &str) -> (String, &str) {
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => (normalize_dir(&trimmed[..idx]), &trimmed[idx + 1..]),
        None => (String::new(), trimmed),
    }
}

/// Join a normalised parent directory and a file name into a drive path.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_drive_root() {
        assert_eq!(strip_drive_root("/drive/root:"), "");
        assert_eq!(strip_drive_root("/drive/root:/dir/sub"), "/dir/sub");
        assert_eq!(strip_drive_root("/drives/b!xyz/root:/dir"), "/dir");
        assert_eq!(strip_drive_root("/elsewhere"), "/elsewhere");
    }

    #[test]
    fn test_logical_path() {
        assert_eq!(logical_path(Some("/drive/root:/dir"), "a.txt"), "/dir/a.txt");
        assert_eq!(logical_path(Some("/drive/root:"), "a.txt"), "/a.txt");
        assert_eq!(logical_path(None, "a.txt"), "a.txt");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/dir/b.txt"), ("dir".to_string(), "b.txt"));
        assert_eq!(split_path("/a/b/c.txt"), ("a/b".to_string(), "c.txt"));
        assert_eq!(split_path("/root.txt"), (String::new(), "root.txt"));
        assert_eq!(split_path("dir/b.url"), ("dir".to_string(), "b.url"));
        assert_eq!(split_path("plain"), (String::new(), "plain"));
        assert_eq!(split_path("\\win\\path.txt"), ("win".to_string(), "path.txt"));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "b.url"), "b.url");
        assert_eq!(join("dir", "b.url"), "dir/b.url");
    }
}
