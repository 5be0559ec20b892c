// SPDX-License-Identifier: Apache-2.0

//! The RFC 8572 `boot-image` object and its builder.

use serde::Serialize;

use crate::digest::{self, HashAlgorithm};
use crate::error::Result;
use crate::inputs::ImagePath;

/// One integrity record for one physical copy of a boot image.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImageVerification {
    /// Algorithm identity in the `ietf-sztp-conveyed-info` namespace.
    pub hash_algorithm: String,
    /// Digest in the RFC 8572 colon-separated hex-octet form.
    pub hash_value: String,
}

/// RFC 8572 `boot-image` object. `os-name` and `os-version` serialize as
/// null when not supplied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BootImage {
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub download_uri: Vec<String>,
    pub image_verification: Vec<ImageVerification>,
}

/// Builds the descriptor for a set of image paths, or `None` when there is
/// no image to describe.
///
/// URIs are synthesized per destination per root prefix. Verification
/// entries are likewise repeated per root: the device checks each mount
/// point's copy independently, so the duplication is deliberate. Each
/// source file is hashed once and the value shared across its entries.
pub fn build_boot_image(
    os_name: Option<&str>,
    os_version: Option<&str>,
    images: &[ImagePath],
    algorithm: HashAlgorithm,
    roots: &[String],
) -> Result<Option<BootImage>> {
    if images.is_empty() {
        return Ok(None);
    }

    let mut download_uri = Vec::new();
    for image in images {
        if roots.is_empty() {
            download_uri.push(image.destination.clone());
        } else {
            for root in roots {
                download_uri.push(file_uri(root, &image.destination));
            }
        }
    }

    let copies = roots.len().max(1);
    let mut image_verification = Vec::new();
    for image in images {
        let hash_value = digest::file_digest(&image.source, algorithm)?;
        for _ in 0..copies {
            image_verification.push(ImageVerification {
                hash_algorithm: algorithm.conveyed_info_identity().to_string(),
                hash_value: hash_value.clone(),
            });
        }
    }

    Ok(Some(BootImage {
        os_name: os_name.map(str::to_string),
        os_version: os_version.map(str::to_string),
        download_uri,
        image_verification,
    }))
}

fn file_uri(root: &str, destination: &str) -> String {
    format!(
        "file://{}/{}",
        root.trim_end_matches('/'),
        destination.trim_start_matches('/')
    )
}
