//! Internet shortcut files.

use spdedupe_core::path;

/// Extension given to every shortcut.
pub const SHORTCUT_EXTENSION: &str = "url";

/// Body of a shortcut pointing at `target_url`.
pub fn shortcut_body(target_url: &str) -> String {
    format!("[InternetShortcut]\r\nURL={target_url}\r\n")
}

/// Shortcut file name for a file: its stem with a `.url` extension.
///
/// Only the last extension is replaced; a leading dot does not start one.
pub fn shortcut_name(file_name: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    format!("{stem}.{SHORTCUT_EXTENSION}")
}

/// Where the shortcut for a file at `logical_path` goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutLocation {
    /// Normalised parent directory, empty for the drive root.
    pub parent: String,
    pub name: String,
}

impl ShortcutLocation {
    /// Location of the shortcut replacing the file at `logical_path`.
    pub fn for_file(logical_path: &str, file_name: &str) -> Self {
        let (parent, _) = path::split_path(logical_path);
        Self {
            parent,
            name: shortcut_name(file_name),
        }
    }

    /// Path relative to the drive root, as sent to the remote.
    pub fn drive_path(&self) -> String {
        path::join(&self.parent, &self.name)
    }

    /// Path as reported to the operator, with a leading slash.
    pub fn display_path(&self) -> String {
        format!("/{}", self.drive_path())
    }

    /// Whether the shortcut would land on the file at `logical_path` in the
    /// same drive. Drive paths compare case-insensitively.
    pub fn collides_with(&self, logical_path: &str) -> bool {
        self.drive_path()
            .to_lowercase()
            .eq(&path::normalize_dir(logical_path).to_lowercase())
    }
}
