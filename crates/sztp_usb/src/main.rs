// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sztp_usb::assemble::assemble;
use sztp_usb::cms::OpenSslEngine;
use sztp_usb::digest::HashAlgorithm;
use sztp_usb::error::{self, Error};
use sztp_usb::inputs::{
    BOOT_IMAGE_RELATIVE_PATH, Certificates, ConfigHandling, ImagePath, ProvisioningInputs,
    USB_ROOT_DIRS,
};
use sztp_usb::output::{copy_boot_images, unpack_boot_archive, write_artifacts};
use sztp_usb::validate::validate;

/// Generates SZTP bootstrapping data onto removable media.
#[derive(Debug, Parser)]
struct Cli {
    /// Script the device runs before applying the configuration.
    #[arg(long)]
    pre_config: Option<PathBuf>,

    /// Configuration delivered to the device.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Script the device runs after applying the configuration.
    #[arg(long)]
    post_config: Option<PathBuf>,

    /// How the device applies the delivered configuration.
    #[arg(long, value_enum, default_value = "merge")]
    config_handling: ConfigHandling,

    /// Boot image to advertise. Repeat for multiple images.
    #[arg(long)]
    image: Vec<PathBuf>,

    /// Where the boot images live relative to a USB mount root.
    #[arg(long)]
    image_relative_path: Option<String>,

    /// Digest algorithm for image-verification entries.
    #[arg(long, default_value = "sha-256")]
    image_hash_algorithm: String,

    /// OS name advertised in the boot image descriptor.
    #[arg(long)]
    os_name: Option<String>,

    /// OS version advertised in the boot image descriptor.
    #[arg(long)]
    os_version: Option<String>,

    /// Copy the boot images onto the output media.
    #[arg(long, default_value_t = false)]
    copy_image: bool,

    /// Build bootable media: unpack --boot-file onto the output root and
    /// advertise the image it carries.
    #[arg(long, default_value_t = false)]
    bootable: bool,

    /// Boot environment archive for bootable media (.zip, .tar, .tar.gz).
    #[arg(long)]
    boot_file: Option<PathBuf>,

    /// Emit the signed actions artifact even for non-bootable media.
    #[arg(long, default_value_t = false)]
    generate_actions: bool,

    /// Owner certificate chain, PEM.
    #[arg(long)]
    owner_cert: PathBuf,

    /// Owner private key, PEM.
    #[arg(long)]
    owner_key: PathBuf,

    /// Ownership voucher to distribute alongside the onboarding data. A
    /// blank value means no voucher.
    #[arg(long)]
    ownership_voucher: Option<String>,

    /// Serial number of the device the media is prepared for.
    #[arg(long)]
    serial_number: String,

    /// Media root the bootstrapping data is written to.
    #[arg(short, long)]
    output: PathBuf,
}

/// A fully resolved run: pipeline inputs plus the media-level decisions
/// that never reach the pipeline itself.
#[derive(Debug)]
struct RunConfig {
    inputs: ProvisioningInputs,
    certificates: Certificates,
    output_root: PathBuf,
    copy_image: bool,
    boot_archive: Option<PathBuf>,
}

/// Applies the option resolution rules. Bootable media pins the image
/// layout: the archive supplies the image at its well-known place under
/// the output root, so copying is forced off and the relative path is
/// fixed.
fn build_run_config(cli: &Cli) -> error::Result<RunConfig> {
    let hash_algorithm = HashAlgorithm::parse(&cli.image_hash_algorithm)?;

    let mut copy_image = cli.copy_image;
    let mut relative_path = cli.image_relative_path.clone();
    let mut sources = cli.image.clone();
    let mut boot_archive = None;

    if cli.bootable {
        let Some(archive) = cli.boot_file.clone() else {
            return Err(Error::InvalidInput(
                "bootable media requires --boot-file".into(),
            ));
        };
        boot_archive = Some(archive);
        copy_image = false;
        relative_path = Some(BOOT_IMAGE_RELATIVE_PATH.to_string());
        sources = vec![cli.output.join(BOOT_IMAGE_RELATIVE_PATH)];
    } else if copy_image && relative_path.is_none() {
        return Err(Error::InvalidInput(
            "--copy-image requires --image-relative-path".into(),
        ));
    }

    let image_paths = sources
        .into_iter()
        .map(|source| {
            let destination = destination_for(&source, relative_path.as_deref());
            ImagePath {
                source,
                destination,
            }
        })
        .collect();

    let inputs = ProvisioningInputs {
        pre_config: cli.pre_config.clone(),
        config: cli.config.clone(),
        post_config: cli.post_config.clone(),
        config_handling: cli.config_handling,
        os_name: cli.os_name.clone(),
        os_version: cli.os_version.clone(),
        image_paths,
        hash_algorithm,
        owner_cert: cli.owner_cert.clone(),
        ownership_voucher: cli
            .ownership_voucher
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from),
        serial_number: cli.serial_number.clone(),
        root_prefixes: USB_ROOT_DIRS.iter().map(|s| s.to_string()).collect(),
        bootable: cli.bootable,
        generate_actions: cli.generate_actions,
    };
    let certificates = Certificates {
        owner_private_key: cli.owner_key.clone(),
        owner_cert: cli.owner_cert.clone(),
    };

    Ok(RunConfig {
        inputs,
        certificates,
        output_root: cli.output.clone(),
        copy_image,
        boot_archive,
    })
}

/// Destination of a copied image: the relative path names the directory,
/// the source keeps its file name. Without a relative path the source
/// path is carried verbatim.
fn destination_for(source: &Path, relative_path: Option<&str>) -> String {
    match relative_path {
        Some(rel) => {
            let dir = Path::new(rel).parent().unwrap_or_else(|| Path::new(""));
            let name = source.file_name().unwrap_or(source.as_os_str());
            dir.join(name).to_string_lossy().into_owned()
        }
        None => source.to_string_lossy().into_owned(),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = build_run_config(cli)?;
    let engine = OpenSslEngine;

    validate(&config.inputs, &engine).context("input validation failed")?;

    if let Some(archive) = &config.boot_archive {
        unpack_boot_archive(archive, &config.output_root)
            .with_context(|| format!("unpacking boot archive '{}' failed", archive.display()))?;
    }

    let set = assemble(&config.inputs, &config.certificates, &engine)
        .context("assembling bootstrap artifacts failed")?;
    let dir = write_artifacts(&set, &config.output_root, &config.inputs.serial_number)
        .context("writing bootstrap artifacts failed")?;

    if config.copy_image {
        copy_boot_images(&config.inputs.image_paths, &config.output_root)
            .context("copying boot images failed")?;
    }

    println!("Bootstrapping data generated under {}", dir.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    run(&cli)
}
