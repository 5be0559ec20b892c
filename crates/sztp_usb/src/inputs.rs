// SPDX-License-Identifier: Apache-2.0

//! Caller-supplied run configuration, fully typed.

use std::path::PathBuf;

use clap::ValueEnum;
use serde::Serialize;

use crate::digest::HashAlgorithm;

/// Mount points a device may assign to the inserted media. Download URIs
/// and verification entries are emitted once per root.
pub const USB_ROOT_DIRS: &[&str] = &["/disk2:", "/disk3:"];

/// Where a bootable archive is expected to place the OS image, relative to
/// the output root.
pub const BOOT_IMAGE_RELATIVE_PATH: &str = "boot/install-image.iso";

/// How the device applies the delivered configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConfigHandling {
    Merge,
    Replace,
}

/// One boot image source file and the destination it occupies relative to
/// a USB mount root.
#[derive(Debug, Clone)]
pub struct ImagePath {
    pub source: PathBuf,
    pub destination: String,
}

/// Everything one bootstrap run needs besides key material.
#[derive(Debug, Clone)]
pub struct ProvisioningInputs {
    pub pre_config: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub post_config: Option<PathBuf>,
    pub config_handling: ConfigHandling,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub image_paths: Vec<ImagePath>,
    pub hash_algorithm: HashAlgorithm,
    pub owner_cert: PathBuf,
    pub ownership_voucher: Option<PathBuf>,
    pub serial_number: String,
    pub root_prefixes: Vec<String>,
    pub bootable: bool,
    pub generate_actions: bool,
}

/// Key material handed to the cryptographic engine.
#[derive(Debug, Clone)]
pub struct Certificates {
    pub owner_private_key: PathBuf,
    pub owner_cert: PathBuf,
}
