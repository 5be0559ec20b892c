// SPDX-License-Identifier: Apache-2.0

//! Precondition checks that gate the pipeline.

use std::path::Path;

use crate::cms::CryptoEngine;
use crate::error::{Error, Result};
use crate::inputs::ProvisioningInputs;

/// Verifies every precondition before any artifact is built: at least one
/// configuration artifact, every supplied configuration path an existing
/// regular file, a non-empty serial number, and a parseable owner
/// certificate. The engine is consulted only for the certificate check,
/// after everything cheaper has passed; a failure earlier in the list
/// returns before any engine call is made.
pub fn validate(inputs: &ProvisioningInputs, engine: &impl CryptoEngine) -> Result<()> {
    if inputs.pre_config.is_none() && inputs.config.is_none() && inputs.post_config.is_none() {
        return Err(Error::InvalidInput(
            "at least one of pre-config, config or post-config is required".into(),
        ));
    }

    for path in [&inputs.pre_config, &inputs.config, &inputs.post_config]
        .into_iter()
        .flatten()
    {
        require_file(path)?;
    }

    if inputs.serial_number.is_empty() {
        return Err(Error::InvalidSerialNumber);
    }

    require_file(&inputs.owner_cert)?;
    if !engine.is_valid_certificate(&inputs.owner_cert)? {
        return Err(Error::InvalidCertificate {
            path: inputs.owner_cert.clone(),
            reason: "not a PEM-encoded X.509 certificate".into(),
        });
    }

    Ok(())
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::FileNotFound(path.to_path_buf()))
    }
}
