// SPDX-License-Identifier: Apache-2.0

//! The pipeline core: drives the cryptographic engine to turn validated
//! inputs into the artifact set a device reads from the media.

use std::fs;

use serde_json::json;
use tracing::debug;

use crate::cms::{CmsEncoding, CryptoEngine};
use crate::error::{Error, Result};
use crate::inputs::{Certificates, ProvisioningInputs};
use crate::models::onboarding::{ConveyedInformation, build_onboarding_information};

/// Everything one run produces. Buffers are immutable once assembled; the
/// output writer is their only consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapArtifactSet {
    /// Signed, DER-encoded onboarding information.
    pub conveyed_information: Vec<u8>,
    /// Owner certificate chain in its degenerate PKCS7 form.
    pub owner_certificate: Vec<u8>,
    /// Opaque voucher bytes, when one is distributed.
    pub ownership_voucher: Option<Vec<u8>>,
    /// Signed actions directive, present for bootable media or on request.
    pub actions: Option<Vec<u8>>,
}

/// Runs the assembly pipeline, strictly in order: onboarding information
/// is built and signed into DER conveyed information, the owner
/// certificate chain is wrapped in its degenerate form, the voucher passes
/// through untouched, and the actions directive is signed when requested.
/// The first failing step aborts the run; nothing produced earlier
/// escapes.
pub fn assemble(
    inputs: &ProvisioningInputs,
    certificates: &Certificates,
    engine: &impl CryptoEngine,
) -> Result<BootstrapArtifactSet> {
    let envelope = ConveyedInformation {
        onboarding_information: build_onboarding_information(inputs)?,
    };
    let payload = envelope.to_json()?;
    debug!(bytes = payload.len(), "onboarding information serialized");

    let conveyed_information = engine.sign(
        &payload,
        &certificates.owner_private_key,
        &certificates.owner_cert,
        CmsEncoding::Der,
    )?;
    debug!(bytes = conveyed_information.len(), "conveyed information signed");

    let chain = fs::read_to_string(&inputs.owner_cert)
        .map_err(|e| Error::read(&inputs.owner_cert, e))?;
    if chain.trim().is_empty() {
        return Err(Error::InvalidCertificate {
            path: inputs.owner_cert.clone(),
            reason: "certificate file is empty".into(),
        });
    }
    let owner_certificate = engine.degenerate_form(&chain)?;

    let ownership_voucher = match &inputs.ownership_voucher {
        Some(path) => Some(fs::read(path).map_err(|e| Error::read(path, e))?),
        None => None,
    };

    let actions = if inputs.bootable || inputs.generate_actions {
        let directive = actions_directive()?;
        Some(engine.sign(
            &directive,
            &certificates.owner_private_key,
            &certificates.owner_cert,
            CmsEncoding::Der,
        )?)
    } else {
        None
    };

    Ok(BootstrapArtifactSet {
        conveyed_information,
        owner_certificate,
        ownership_voucher,
        actions,
    })
}

/// The fixed directive telling the device to reload from the inserted
/// media once onboarding completes.
fn actions_directive() -> Result<Vec<u8>> {
    serde_json::to_vec(&json!({"actions": {"reload-bootmedia-usb": true}}))
        .map_err(|e| Error::DataCreation(e.to_string()))
}
