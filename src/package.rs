//! Read-only access to a deposit package on disk.
//!
//! Covers what the validators need from the bag layout: payload enumeration, checksum
//! manifests, `bag-info.txt` and the identity claim declared in it.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::{Result, ValidationError};

pub const PAYLOAD_DIR: &str = "data";
pub const BAG_INFO: &str = "bag-info.txt";

pub const ORGANIZATIONAL_IDENTIFIER_KEY: &str = "Has-Organizational-Identifier";
pub const IS_VERSION_OF_KEY: &str = "Is-Version-Of";
pub const USER_ACCOUNT_KEY: &str = "Data-Station-User-Account";

/// Package root on disk, optionally backed by a temporary copy that is removed on drop
#[derive(Debug)]
pub struct PackageWorkspace {
    root: PathBuf,
    _staging: Option<TempDir>,
}

impl PackageWorkspace {
    /// Use a package directory in place
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(ValidationError::PackageNotFound {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            root: path.to_path_buf(),
            _staging: None,
        })
    }

    /// Copy a package into a fresh temporary directory and validate the copy
    pub async fn stage(source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref();
        if !source.is_dir() {
            return Err(ValidationError::PackageNotFound {
                path: source.to_path_buf(),
            });
        }

        let staging = TempDir::new()?;
        let root = staging.path().join(
            source
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("bag")),
        );

        for entry in walk_sorted(source) {
            let entry = entry.map_err(|e| ValidationError::Io(std::io::Error::other(e)))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| ValidationError::Io(std::io::Error::other(e)))?;
            let target = root.join(relative);

            match entry.file_type() {
                Some(ft) if ft.is_dir() => tokio::fs::create_dir_all(&target).await?,
                Some(ft) if ft.is_file() => {
                    tokio::fs::copy(entry.path(), &target).await?;
                }
                _ => {}
            }
        }
        debug!(source = %source.display(), staged = %root.display(), "package staged");

        Ok(Self {
            root,
            _staging: Some(staging),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_staged(&self) -> bool {
        self._staging.is_some()
    }

    /// Bag name as shown in reports
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn walk_sorted(root: &Path) -> ignore::Walk {
    WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
}

/// Forward-slash relative path, the form used in manifests and messages
pub fn to_bag_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Payload files relative to the bag root, in traversal order.
///
/// Entries that cannot be read are returned as `Err` with a human-readable description instead
/// of failing the whole walk.
pub fn payload_files(root: &Path) -> Vec<std::result::Result<String, String>> {
    let payload = root.join(PAYLOAD_DIR);
    if !payload.is_dir() {
        return Vec::new();
    }

    walk_sorted(&payload)
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_some_and(|ft| !ft.is_dir()) => Some(
                entry
                    .path()
                    .strip_prefix(root)
                    .map(to_bag_path)
                    .map_err(|e| e.to_string()),
            ),
            Ok(_) => None,
            Err(e) => Some(Err(format!("Bag is not valid: unreadable payload entry: {}", e))),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Lowercase hex digest of a file
    pub async fn digest_file(&self, path: &Path) -> std::io::Result<String> {
        match self {
            Self::Md5 => digest_file::<Md5>(path).await,
            Self::Sha1 => digest_file::<Sha1>(path).await,
            Self::Sha256 => digest_file::<Sha256>(path).await,
            Self::Sha512 => digest_file::<Sha512>(path).await,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

async fn digest_file<D: Digest>(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub checksum: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub file_name: String,
    /// `None` for an algorithm this crate cannot compute
    pub algorithm: Option<ChecksumAlgorithm>,
    pub algorithm_name: String,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn parse(file_name: &str, algorithm_name: &str, content: &str) -> Self {
        let entries = content
            .lines()
            .filter_map(|line| {
                let line = line.trim_end_matches('\r');
                let (checksum, path) = line.split_once(|c: char| c.is_whitespace())?;
                let path = path.trim_start();
                if checksum.is_empty() || path.is_empty() {
                    return None;
                }
                Some(ManifestEntry {
                    checksum: checksum.to_ascii_lowercase(),
                    path: decode_manifest_path(path),
                })
            })
            .collect();

        Self {
            file_name: file_name.to_string(),
            algorithm: ChecksumAlgorithm::from_name(algorithm_name),
            algorithm_name: algorithm_name.to_string(),
            entries,
        }
    }

    pub fn is_tag_manifest(&self) -> bool {
        self.file_name.starts_with("tagmanifest-")
    }

    pub fn lists(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }
}

/// Undo BagIt percent-encoding of CR, LF and `%` in manifest paths
pub fn decode_manifest_path(path: &str) -> String {
    path.replace("%0A", "\n")
        .replace("%0a", "\n")
        .replace("%0D", "\r")
        .replace("%0d", "\r")
        .replace("%25", "%")
}

/// All `manifest-*.txt` and `tagmanifest-*.txt` files at the bag root, sorted by file name
pub async fn read_manifests(root: &Path) -> Result<Vec<Manifest>> {
    let mut names = Vec::new();
    let mut dir = tokio::fs::read_dir(root).await?;
    while let Some(entry) = dir.next_entry().await? {
        if let Some(name) = entry.file_name().to_str()
            && manifest_algorithm(name).is_some()
        {
            names.push(name.to_string());
        }
    }
    names.sort();

    let mut manifests = Vec::with_capacity(names.len());
    for name in names {
        let content = tokio::fs::read_to_string(root.join(&name)).await?;
        if let Some(algorithm) = manifest_algorithm(&name) {
            manifests.push(Manifest::parse(&name, algorithm, &content));
        }
    }
    Ok(manifests)
}

fn manifest_algorithm(file_name: &str) -> Option<&str> {
    let rest = file_name
        .strip_prefix("manifest-")
        .or_else(|| file_name.strip_prefix("tagmanifest-"))?;
    rest.strip_suffix(".txt").filter(|alg| !alg.is_empty())
}

/// Ordered `Key: value` pairs from `bag-info.txt`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagInfo {
    entries: Vec<(String, String)>,
}

impl BagInfo {
    pub fn parse(content: &str) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();

        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = entries.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                entries.push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        Self { entries }
    }

    pub async fn read(root: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(root.join(BAG_INFO)).await?;
        Ok(Self::parse(&content))
    }

    /// First value for `key`, compared case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).next()
    }

    pub fn get_all<'a, 'k>(
        &'a self,
        key: &'k str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'k> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifiers the package declares about itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityClaim {
    pub organizational_identifier: Option<String>,
    pub sword_token: Option<String>,
    pub owner_account: Option<String>,
}

impl IdentityClaim {
    pub fn from_bag_info(info: &BagInfo) -> Self {
        let non_empty = |key: &str| {
            info.get(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            organizational_identifier: non_empty(ORGANIZATIONAL_IDENTIFIER_KEY),
            sword_token: non_empty(IS_VERSION_OF_KEY),
            owner_account: non_empty(USER_ACCOUNT_KEY),
        }
    }
}
