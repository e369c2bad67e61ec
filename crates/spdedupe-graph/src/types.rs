//! Wire types of the drive API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spdedupe_core::HashAlgorithm;

/// Host and server-relative path of a site, parsed from its URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteAddress {
    pub host: String,
    /// Decoded path segments, empty for the root site.
    pub segments: Vec<String>,
}

impl SiteAddress {
    /// Parse an absolute site URL. Returns `None` for anything without a host.
    pub fn parse(site_url: &str) -> Option<Self> {
        let url = reqwest::Url::parse(site_url.trim()).ok()?;
        let host = url.host_str()?.to_string();
        let segments = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        urlencoding::decode(s)
                            .map(|d| d.into_owned())
                            .unwrap_or_else(|_| s.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { host, segments })
    }

    /// Server-relative path with a leading slash.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

impl std::fmt::Display for SiteAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.path())
    }
}

/// A document library of a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Opaque cursor to the next page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageToken(pub String);

impl PageToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of children of a folder.
#[derive(Debug, Clone, Default)]
pub struct ChildrenPage {
    pub items: Vec<DriveItem>,
    pub next_page: Option<PageToken>,
}

/// Hashes the remote computed for a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hashes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_xor_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32_hash: Option<String>,
}

impl Hashes {
    pub fn quick_xor(digest: impl Into<String>) -> Self {
        Self {
            quick_xor_hash: Some(digest.into()),
            ..Default::default()
        }
    }

    pub fn sha1(digest: impl Into<String>) -> Self {
        Self {
            sha1_hash: Some(digest.into()),
            ..Default::default()
        }
    }

    pub fn sha256(digest: impl Into<String>) -> Self {
        Self {
            sha256_hash: Some(digest.into()),
            ..Default::default()
        }
    }

    pub fn crc32(digest: impl Into<String>) -> Self {
        Self {
            crc32_hash: Some(digest.into()),
            ..Default::default()
        }
    }

    /// First non-empty hash in order quickXor, sha1, sha256, crc32.
    pub fn preferred(&self) -> Option<(HashAlgorithm, &str)> {
        [
            (HashAlgorithm::QuickXor, &self.quick_xor_hash),
            (HashAlgorithm::Sha1, &self.sha1_hash),
            (HashAlgorithm::Sha256, &self.sha256_hash),
            (HashAlgorithm::Crc32, &self.crc32_hash),
        ]
        .into_iter()
        .find_map(|(algorithm, digest)| {
            digest
                .as_deref()
                .filter(|d| !d.is_empty())
                .map(|d| (algorithm, d))
        })
    }
}

/// File facet of an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Hashes>,
}

/// Folder facet of an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    #[serde(default)]
    pub child_count: u64,
}

/// Location of an item's parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Of the form `/drive/root:<dirs>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A file or folder as returned by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderFacet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileFacet>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default, rename = "lastModifiedDateTime")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<ParentReference>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }

    /// Preferred hash of a file item.
    pub fn preferred_hash(&self) -> Option<(HashAlgorithm, &str)> {
        self.file.as_ref()?.hashes.as_ref()?.preferred()
    }
}
