// SPDX-License-Identifier: Apache-2.0

//! The RFC 8572 `onboarding-information` object, its conveyed-information
//! envelope, and the builder that fills both from run inputs.

use std::fs;
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::inputs::{ConfigHandling, ProvisioningInputs};
use crate::models::boot_image::{BootImage, build_boot_image};

/// RFC 8572 `onboarding-information` object. The three artifact fields
/// keep their keys and serialize as `null` when absent, while a missing
/// boot image omits its key entirely.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OnboardingInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_image: Option<BootImage>,
    pub configuration_handling: ConfigHandling,
    pub pre_configuration_script: Option<String>,
    pub configuration: Option<String>,
    pub post_configuration_script: Option<String>,
}

/// Envelope keyed by the YANG module namespace the device expects to find
/// inside the signed conveyed information.
#[derive(Debug, Serialize)]
pub struct ConveyedInformation {
    #[serde(rename = "ietf-sztp-conveyed-info:onboarding-information")]
    pub onboarding_information: OnboardingInformation,
}

impl ConveyedInformation {
    /// Serializes the plaintext handed to the signing step.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::DataCreation(e.to_string()))
    }
}

/// Composes the onboarding-information object from validated inputs: the
/// optional boot-image descriptor plus the base64-encoded configuration
/// artifacts.
pub fn build_onboarding_information(inputs: &ProvisioningInputs) -> Result<OnboardingInformation> {
    let boot_image = build_boot_image(
        inputs.os_name.as_deref(),
        inputs.os_version.as_deref(),
        &inputs.image_paths,
        inputs.hash_algorithm,
        &inputs.root_prefixes,
    )?;

    Ok(OnboardingInformation {
        boot_image,
        configuration_handling: inputs.config_handling,
        pre_configuration_script: encode_artifact(inputs.pre_config.as_deref())?,
        configuration: encode_artifact(inputs.config.as_deref())?,
        post_configuration_script: encode_artifact(inputs.post_config.as_deref())?,
    })
}

/// Reads and base64-encodes an optional artifact file. Scripts and
/// configurations are small, so a whole-file read is fine here.
fn encode_artifact(path: Option<&Path>) -> Result<Option<String>> {
    match path {
        None => Ok(None),
        Some(p) => {
            let raw = fs::read(p).map_err(|e| Error::read(p, e))?;
            Ok(Some(STANDARD.encode(raw)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::HashAlgorithm;
    use crate::error::ErrorKind;
    use std::io::Write;

    fn minimal_inputs(config: Option<&Path>) -> ProvisioningInputs {
        ProvisioningInputs {
            pre_config: None,
            config: config.map(Path::to_path_buf),
            post_config: None,
            config_handling: ConfigHandling::Merge,
            os_name: None,
            os_version: None,
            image_paths: Vec::new(),
            hash_algorithm: HashAlgorithm::Sha256,
            owner_cert: "/unused/owner-cert.pem".into(),
            ownership_voucher: None,
            serial_number: "SN123".into(),
            root_prefixes: Vec::new(),
            bootable: false,
            generate_actions: false,
        }
    }

    #[test]
    fn envelope_serializes_nulls_and_namespaced_key() {
        let info = build_onboarding_information(&minimal_inputs(None)).unwrap();
        let envelope = ConveyedInformation {
            onboarding_information: info,
        };

        let json = String::from_utf8(envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            "{\"ietf-sztp-conveyed-info:onboarding-information\":{\
             \"configuration-handling\":\"merge\",\
             \"pre-configuration-script\":null,\
             \"configuration\":null,\
             \"post-configuration-script\":null}}"
        );
    }

    #[test]
    fn configuration_is_base64_of_file_contents() {
        let mut config = tempfile::NamedTempFile::new().unwrap();
        config.write_all(b"hostname device-one\n").unwrap();

        let mut inputs = minimal_inputs(Some(config.path()));
        inputs.config_handling = ConfigHandling::Replace;
        let info = build_onboarding_information(&inputs).unwrap();

        assert_eq!(
            info.configuration.as_deref(),
            Some(STANDARD.encode(b"hostname device-one\n").as_str())
        );
        assert!(info.pre_configuration_script.is_none());

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["configuration-handling"], "replace");
        assert!(value.get("boot-image").is_none());
    }

    #[test]
    fn missing_artifact_file_is_file_not_found() {
        let inputs = minimal_inputs(Some(Path::new("/no/such/config.cfg")));
        let err = build_onboarding_information(&inputs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn boot_image_key_present_when_an_image_is_supplied() {
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(b"image-bytes").unwrap();

        let mut inputs = minimal_inputs(None);
        inputs.image_paths = vec![crate::inputs::ImagePath {
            source: image.path().to_path_buf(),
            destination: "boot/install-image.iso".into(),
        }];
        inputs.root_prefixes = vec!["/disk2:".into()];

        let info = build_onboarding_information(&inputs).unwrap();
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(
            value["boot-image"]["download-uri"][0],
            "file:///disk2:/boot/install-image.iso"
        );
    }
}
