//! Structural checks: manifest coverage, manifest checksums, required files.

use std::path::{Component, Path};

use tracing::debug;

use crate::package::{self, Manifest};
use crate::rules::Outcome;

/// Every payload file is listed in at least one payload manifest.
///
/// Stops at the first offending entry in traversal order.
pub async fn manifests_cover_payload(root: &Path) -> Outcome {
    let manifests = match package::read_manifests(root).await {
        Ok(manifests) => manifests,
        Err(e) => return Outcome::violation(format!("Bag is not valid: {}", e)),
    };
    let payload_manifests: Vec<&Manifest> =
        manifests.iter().filter(|m| !m.is_tag_manifest()).collect();

    for entry in package::payload_files(root) {
        match entry {
            Ok(path) if payload_manifests.iter().any(|m| m.lists(&path)) => {}
            Ok(path) => {
                return Outcome::violation(format!(
                    "Bag is not valid: File [{}] is in the payload directory but isn't listed in any manifest!",
                    path
                ));
            }
            Err(message) => return Outcome::violation(message),
        }
    }

    Outcome::Success
}

/// Every manifest entry exists and carries the right digest
pub async fn manifest_checksums_match(root: &Path) -> Outcome {
    let manifests = match package::read_manifests(root).await {
        Ok(manifests) => manifests,
        Err(e) => return Outcome::violation(format!("Bag is not valid: {}", e)),
    };

    let mut messages = Vec::new();
    for manifest in &manifests {
        messages.extend(verify_manifest(root, manifest).await);
    }
    Outcome::from_messages(messages)
}

async fn verify_manifest(root: &Path, manifest: &Manifest) -> Vec<String> {
    let Some(algorithm) = manifest.algorithm else {
        return vec![format!(
            "Bag is not valid: unsupported checksum algorithm '{}' in {}",
            manifest.algorithm_name, manifest.file_name
        )];
    };
    debug!(manifest = %manifest.file_name, entries = manifest.entries.len(), "verifying manifest");

    let mut messages = Vec::new();
    for entry in &manifest.entries {
        if !stays_inside_bag(&entry.path) {
            messages.push(format!(
                "Bag is not valid: File [{}] listed in {} points outside the bag",
                entry.path, manifest.file_name
            ));
            continue;
        }

        let full_path = root.join(&entry.path);
        if !full_path.is_file() {
            messages.push(format!(
                "Bag is not valid: File [{}] is listed in {} but does not exist!",
                entry.path, manifest.file_name
            ));
            continue;
        }

        match algorithm.digest_file(&full_path).await {
            Ok(digest) if digest == entry.checksum => {}
            Ok(_) => messages.push(format!(
                "Bag is not valid: {} checksum of file [{}] does not match the manifest",
                algorithm, entry.path
            )),
            Err(e) => messages.push(format!(
                "Bag is not valid: File [{}] could not be read: {}",
                entry.path, e
            )),
        }
    }
    messages
}

fn stays_inside_bag(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// `path` exists below the bag root and is a regular file
pub async fn file_exists(root: &Path, path: &Path) -> Outcome {
    let shown = package::to_bag_path(path);
    match tokio::fs::metadata(root.join(path)).await {
        Ok(metadata) if metadata.is_file() => Outcome::Success,
        Ok(_) => Outcome::violation(format!("{} is not a regular file", shown)),
        Err(_) => Outcome::violation(format!("{} does not exist", shown)),
    }
}
