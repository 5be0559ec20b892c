// SPDX-License-Identifier: Apache-2.0

//! Media layout and artifact persistence.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::NamedTempFile;
use tracing::info;

use crate::assemble::BootstrapArtifactSet;
use crate::error::{Error, Result};
use crate::inputs::ImagePath;

pub const CONVEYED_INFORMATION_FILE: &str = "conveyed-information.cms";
pub const OWNER_CERTIFICATE_FILE: &str = "owner-certificate.cms";
pub const OWNERSHIP_VOUCHER_FILE: &str = "ownership-voucher.vcj";
pub const ACTIONS_FILE: &str = "ztp_actions.cms";

const ENROLLMENT_DIR: &str = "EN";
const BOOTSTRAP_DATA_DIR: &str = "bootstrap-data";

/// Directory a device with `serial` reads its artifacts from.
pub fn bootstrap_data_dir(output_root: &Path, serial: &str) -> PathBuf {
    output_root
        .join(ENROLLMENT_DIR)
        .join(serial)
        .join(BOOTSTRAP_DATA_DIR)
}

/// Writes the artifact set under `output_root` and returns the directory
/// it landed in. Each file goes to a sibling temp file first and is
/// renamed into place, so a reader never observes a half-written
/// artifact. There is no rollback across files: when a later write fails,
/// the artifacts already renamed stay on the media and the error says so.
pub fn write_artifacts(
    set: &BootstrapArtifactSet,
    output_root: &Path,
    serial: &str,
) -> Result<PathBuf> {
    let dir = bootstrap_data_dir(output_root, serial);
    fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

    let mut written = 0usize;
    persist_artifact(
        &dir,
        CONVEYED_INFORMATION_FILE,
        &set.conveyed_information,
        &mut written,
    )?;
    persist_artifact(
        &dir,
        OWNER_CERTIFICATE_FILE,
        &set.owner_certificate,
        &mut written,
    )?;
    if let Some(voucher) = &set.ownership_voucher {
        persist_artifact(&dir, OWNERSHIP_VOUCHER_FILE, voucher, &mut written)?;
    }
    if let Some(actions) = &set.actions {
        persist_artifact(&dir, ACTIONS_FILE, actions, &mut written)?;
    }
    Ok(dir)
}

fn persist_artifact(dir: &Path, name: &str, bytes: &[u8], written: &mut usize) -> Result<()> {
    match write_atomic(dir, name, bytes) {
        Ok(()) => {
            *written += 1;
            info!(artifact = name, bytes = bytes.len(), "artifact written");
            Ok(())
        }
        Err(source) if *written == 0 => Err(Error::io(&dir.join(name), source)),
        Err(source) => Err(Error::PartialWrite {
            dir: dir.to_path_buf(),
            file: name.to_string(),
            source,
        }),
    }
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

/// Copies each boot image to its destination under `output_root`,
/// creating intermediate directories.
pub fn copy_boot_images(images: &[ImagePath], output_root: &Path) -> Result<()> {
    for image in images {
        let dest = output_root.join(image.destination.trim_start_matches('/'));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::copy(&image.source, &dest).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::FileNotFound(image.source.clone())
            } else {
                Error::io(&dest, e)
            }
        })?;
        info!(
            source = %image.source.display(),
            dest = %dest.display(),
            "boot image copied"
        );
    }
    Ok(())
}

/// Unpacks the boot archive onto the media root. The format follows the
/// file name: `.zip`, `.tar`, or a gzip-compressed tar.
pub fn unpack_boot_archive(archive: &Path, output_root: &Path) -> Result<()> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if name.ends_with(".zip") {
        let mut zip =
            zip::ZipArchive::new(open_archive(archive)?).map_err(|e| bad_archive(archive, e))?;
        zip.extract(output_root)
            .map_err(|e| bad_archive(archive, e))?;
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        tar::Archive::new(GzDecoder::new(open_archive(archive)?))
            .unpack(output_root)
            .map_err(|e| Error::io(output_root, e))?;
    } else if name.ends_with(".tar") {
        tar::Archive::new(open_archive(archive)?)
            .unpack(output_root)
            .map_err(|e| Error::io(output_root, e))?;
    } else {
        return Err(Error::InvalidInput(format!(
            "unsupported boot archive format: {}",
            archive.display()
        )));
    }
    info!(archive = %archive.display(), "boot archive unpacked");
    Ok(())
}

fn open_archive(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::read(path, e))
}

fn bad_archive(path: &Path, err: zip::result::ZipError) -> Error {
    Error::InvalidInput(format!("archive {}: {err}", path.display()))
}
