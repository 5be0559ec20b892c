// SPDX-License-Identifier: Apache-2.0

//! CMS packaging operations behind one engine trait.
//!
//! The pipeline only consumes this contract. The production implementation
//! binds to libcrypto through the `openssl` crate and works entirely in
//! memory; no scratch files are shared between calls, so independent runs
//! never contend.

use std::fs;
use std::path::Path;

use openssl::cms::{CMSOptions, CmsContentInfo};
use openssl::pkcs7::Pkcs7;
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::X509;
use openssl::x509::store::X509StoreBuilder;
use x509_parser::der_parser::parse_der;
use x509_parser::parse_x509_certificate;

use crate::error::{Error, Result};

/// Serialized forms a CMS structure moves between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmsEncoding {
    Der,
    Pem,
}

/// Outer content type of a CMS/PKCS7 structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Unencrypted,
    Signed,
    Enveloped,
}

const OID_PKCS7_DATA: &str = "1.2.840.113549.1.7.1";
const OID_PKCS7_SIGNED: &str = "1.2.840.113549.1.7.2";
const OID_PKCS7_ENVELOPED: &str = "1.2.840.113549.1.7.3";

/// Cryptographic operations the assembler relies on. Every call is
/// synchronous and reports failures through the pipeline error taxonomy,
/// never through an ambiguous return value.
pub trait CryptoEngine {
    /// Signs `payload` with the owner key pair, embedding the content, and
    /// returns the requested serialized form.
    fn sign(
        &self,
        payload: &[u8],
        private_key: &Path,
        signer_cert: &Path,
        output: CmsEncoding,
    ) -> Result<Vec<u8>>;

    /// Envelopes `payload` for the holder of `recipient_cert`.
    fn encrypt(&self, payload: &[u8], recipient_cert: &Path, output: CmsEncoding)
    -> Result<Vec<u8>>;

    /// Opens a DER enveloped structure with the recipient key pair.
    fn decrypt(&self, payload: &[u8], private_key: &Path, recipient_cert: &Path)
    -> Result<Vec<u8>>;

    /// Verifies a DER signed structure against `trust_anchor` and returns
    /// the embedded payload.
    fn verify(&self, payload: &[u8], trust_anchor: &Path, signer_cert: &Path) -> Result<Vec<u8>>;

    /// Wraps `payload` in a plain data ContentInfo, unsigned.
    fn encode_data(&self, payload: &[u8], output: CmsEncoding) -> Result<Vec<u8>>;

    /// Re-serializes an existing CMS structure between encodings.
    fn reencode(&self, payload: &[u8], input: CmsEncoding, output: CmsEncoding) -> Result<Vec<u8>>;

    /// Builds the degenerate PKCS7 form of a PEM certificate chain:
    /// certificates only, no signer, no signed content.
    fn degenerate_form(&self, certificate_chain: &str) -> Result<Vec<u8>>;

    /// Pulls every certificate out of a DER PKCS7 structure, re-encoded as
    /// concatenated PEM blocks.
    fn extract_certificates(&self, pkcs7_der: &[u8]) -> Result<String>;

    /// Reports the outer content type of a DER structure. Malformed input
    /// is a decoding error; a well-formed structure with an unrecognized
    /// content type is a classification error.
    fn classify(&self, payload: &[u8]) -> Result<ContentClass>;

    /// Cheap syntactic check that `path` holds a PEM-encoded X.509
    /// certificate. Read failures are errors, parse failures are `false`.
    fn is_valid_certificate(&self, path: &Path) -> Result<bool>;
}

/// Engine backed by libcrypto.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSslEngine;

impl CryptoEngine for OpenSslEngine {
    fn sign(
        &self,
        payload: &[u8],
        private_key: &Path,
        signer_cert: &Path,
        output: CmsEncoding,
    ) -> Result<Vec<u8>> {
        let key = PKey::private_key_from_pem(&read_file(private_key)?).map_err(|e| {
            Error::Signing(format!("bad private key {}: {e}", private_key.display()))
        })?;
        let cert = load_cert(signer_cert)?;
        let cms = CmsContentInfo::sign(
            Some(&cert),
            Some(&key),
            None,
            Some(payload),
            CMSOptions::BINARY,
        )
        .map_err(|e| Error::Signing(e.to_string()))?;
        serialize(&cms, output)
    }

    fn encrypt(
        &self,
        payload: &[u8],
        recipient_cert: &Path,
        output: CmsEncoding,
    ) -> Result<Vec<u8>> {
        let cert = load_cert(recipient_cert)?;
        let mut recipients =
            Stack::new().map_err(|e| Error::Encryption(e.to_string()))?;
        recipients
            .push(cert)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        let cms = CmsContentInfo::encrypt(
            &recipients,
            payload,
            Cipher::aes_256_cbc(),
            CMSOptions::BINARY,
        )
        .map_err(|e| Error::Encryption(e.to_string()))?;
        serialize(&cms, output)
    }

    fn decrypt(
        &self,
        payload: &[u8],
        private_key: &Path,
        recipient_cert: &Path,
    ) -> Result<Vec<u8>> {
        let cms = parse(payload, CmsEncoding::Der)?;
        let key = PKey::private_key_from_pem(&read_file(private_key)?).map_err(|e| {
            Error::Decryption(format!("bad private key {}: {e}", private_key.display()))
        })?;
        let cert = load_cert(recipient_cert)?;
        cms.decrypt(&key, &cert)
            .map_err(|e| Error::Decryption(e.to_string()))
    }

    fn verify(&self, payload: &[u8], trust_anchor: &Path, signer_cert: &Path) -> Result<Vec<u8>> {
        let mut cms = parse(payload, CmsEncoding::Der)?;
        let anchor = load_cert(trust_anchor)?;
        let signer = load_cert(signer_cert)?;

        let mut builder =
            X509StoreBuilder::new().map_err(|e| Error::Verification(e.to_string()))?;
        builder
            .add_cert(anchor)
            .map_err(|e| Error::Verification(e.to_string()))?;
        let store = builder.build();

        let mut signers = Stack::new().map_err(|e| Error::Verification(e.to_string()))?;
        signers
            .push(signer)
            .map_err(|e| Error::Verification(e.to_string()))?;

        let mut content = Vec::new();
        cms.verify(
            Some(&signers),
            Some(&store),
            None,
            Some(&mut content),
            CMSOptions::empty(),
        )
        .map_err(|e| Error::Verification(e.to_string()))?;
        Ok(content)
    }

    fn encode_data(&self, payload: &[u8], output: CmsEncoding) -> Result<Vec<u8>> {
        // libcrypto offers no safe constructor for a bare data
        // ContentInfo, so the DER is assembled directly and then parsed
        // back through it.
        let der = data_content_info(payload);
        let cms =
            CmsContentInfo::from_der(&der).map_err(|e| Error::DataCreation(e.to_string()))?;
        serialize(&cms, output)
    }

    fn reencode(&self, payload: &[u8], input: CmsEncoding, output: CmsEncoding) -> Result<Vec<u8>> {
        let cms = parse(payload, input)?;
        serialize(&cms, output)
    }

    fn degenerate_form(&self, certificate_chain: &str) -> Result<Vec<u8>> {
        let certs = X509::stack_from_pem(certificate_chain.as_bytes())
            .map_err(|e| Error::DataCreation(format!("bad certificate chain: {e}")))?;
        if certs.is_empty() {
            return Err(Error::DataCreation(
                "certificate chain holds no certificates".into(),
            ));
        }
        let mut stack = Stack::new().map_err(|e| Error::DataCreation(e.to_string()))?;
        for cert in certs {
            stack
                .push(cert)
                .map_err(|e| Error::DataCreation(e.to_string()))?;
        }
        // Certs-only signed-data: no signers, no content. PARTIAL skips
        // finalization, which would fail without a signer, and DETACHED
        // keeps the eContent absent.
        let cms = CmsContentInfo::sign::<Private>(
            None,
            None,
            Some(&stack),
            None,
            CMSOptions::PARTIAL | CMSOptions::DETACHED,
        )
        .map_err(|e| Error::DataCreation(e.to_string()))?;
        cms.to_der().map_err(|e| Error::Encoding(e.to_string()))
    }

    fn extract_certificates(&self, pkcs7_der: &[u8]) -> Result<String> {
        let parsed = Pkcs7::from_der(pkcs7_der).map_err(|e| Error::Decoding(e.to_string()))?;
        let signed = parsed
            .signed()
            .ok_or_else(|| Error::ContentExtraction("structure is not signed-data".into()))?;
        let certs = signed.certificates().ok_or_else(|| {
            Error::ContentExtraction("structure carries no certificates".into())
        })?;

        let mut pem = String::new();
        for cert in certs {
            let block = cert
                .to_pem()
                .map_err(|e| Error::ContentExtraction(e.to_string()))?;
            pem.push_str(&String::from_utf8_lossy(&block));
        }
        Ok(pem)
    }

    fn classify(&self, payload: &[u8]) -> Result<ContentClass> {
        let (_, outer) = parse_der(payload)
            .map_err(|_| Error::Decoding("payload is not a DER structure".into()))?;
        let children = outer.as_sequence().map_err(|_| {
            Error::ContentClassification("outer structure is not a sequence".into())
        })?;
        let oid = children
            .first()
            .and_then(|child| child.as_oid().ok())
            .ok_or_else(|| {
                Error::ContentClassification("content-type identifier missing".into())
            })?;

        match oid.to_id_string().as_str() {
            OID_PKCS7_DATA => Ok(ContentClass::Unencrypted),
            OID_PKCS7_SIGNED => Ok(ContentClass::Signed),
            OID_PKCS7_ENVELOPED => Ok(ContentClass::Enveloped),
            other => Err(Error::ContentClassification(format!(
                "unrecognized content type {other}"
            ))),
        }
    }

    fn is_valid_certificate(&self, path: &Path) -> Result<bool> {
        let raw = read_file(path)?;
        let Ok(block) = pem::parse(&raw) else {
            return Ok(false);
        };
        if block.tag() != "CERTIFICATE" {
            return Ok(false);
        }
        Ok(parse_x509_certificate(block.contents()).is_ok())
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::read(path, e))
}

fn load_cert(path: &Path) -> Result<X509> {
    X509::from_pem(&read_file(path)?).map_err(|e| Error::InvalidCertificate {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn parse(payload: &[u8], input: CmsEncoding) -> Result<CmsContentInfo> {
    match input {
        CmsEncoding::Der => CmsContentInfo::from_der(payload),
        CmsEncoding::Pem => CmsContentInfo::from_pem(payload),
    }
    .map_err(|e| Error::Decoding(e.to_string()))
}

fn serialize(cms: &CmsContentInfo, output: CmsEncoding) -> Result<Vec<u8>> {
    match output {
        CmsEncoding::Der => cms.to_der(),
        CmsEncoding::Pem => cms.to_pem(),
    }
    .map_err(|e| Error::Encoding(e.to_string()))
}

/// `ContentInfo { contentType: id-data, content: [0] EXPLICIT OCTET STRING }`
fn data_content_info(payload: &[u8]) -> Vec<u8> {
    const OID_DATA_DER: &[u8] = &[
        0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01,
    ];
    let octets = der_tlv(0x04, payload);
    let explicit = der_tlv(0xa0, &octets);
    let mut body = OID_DATA_DER.to_vec();
    body.extend_from_slice(&explicit);
    der_tlv(0x30, &body)
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    use openssl::asn1::{Asn1Integer, Asn1Time};
    use openssl::bn::{BigNum, MsbOption};
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509Builder, X509NameBuilder};

    use super::{CmsEncoding, ContentClass, CryptoEngine};
    use crate::error::{Error, Result};

    /// Self-signed identity written into a test directory.
    pub(crate) struct OwnerIdentity {
        pub key_path: PathBuf,
        pub cert_path: PathBuf,
    }

    /// Generates an RSA key and a self-signed certificate, written as
    /// `<stem>-key.pem` and `<stem>-cert.pem` under `dir`.
    pub(crate) fn write_owner_identity(dir: &Path, stem: &str) -> OwnerIdentity {
        let rsa = Rsa::generate(2048).unwrap();
        let key = PKey::from_rsa(rsa).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", &format!("sztp-test-{stem}"))
            .unwrap();
        let name = name.build();

        let mut serial = BigNum::new().unwrap();
        serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
        let serial = Asn1Integer::from_bn(&serial).unwrap();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        let cert = builder.build();

        let key_path = dir.join(format!("{stem}-key.pem"));
        let cert_path = dir.join(format!("{stem}-cert.pem"));
        std::fs::write(&key_path, key.private_key_to_pem_pkcs8().unwrap()).unwrap();
        std::fs::write(&cert_path, cert.to_pem().unwrap()).unwrap();
        OwnerIdentity {
            key_path,
            cert_path,
        }
    }

    /// Deterministic in-memory engine for pipeline tests. Records every
    /// operation and can be primed to fail one of them.
    pub(crate) struct StubEngine {
        pub calls: RefCell<Vec<&'static str>>,
        fail_op: Option<&'static str>,
    }

    impl StubEngine {
        pub fn new() -> Self {
            StubEngine {
                calls: RefCell::new(Vec::new()),
                fail_op: None,
            }
        }

        pub fn failing(op: &'static str) -> Self {
            StubEngine {
                calls: RefCell::new(Vec::new()),
                fail_op: Some(op),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }

        fn enter(&self, op: &'static str) -> Result<()> {
            self.calls.borrow_mut().push(op);
            match self.fail_op {
                Some(fail) if fail == op => Err(match op {
                    "degenerate_form" => Error::DataCreation(format!("stub {op} failure")),
                    _ => Error::Signing(format!("stub {op} failure")),
                }),
                _ => Ok(()),
            }
        }
    }

    impl CryptoEngine for StubEngine {
        fn sign(
            &self,
            payload: &[u8],
            _private_key: &Path,
            _signer_cert: &Path,
            _output: CmsEncoding,
        ) -> Result<Vec<u8>> {
            self.enter("sign")?;
            let mut out = b"SIGNED[".to_vec();
            out.extend_from_slice(payload);
            out.push(b']');
            Ok(out)
        }

        fn encrypt(
            &self,
            payload: &[u8],
            _recipient_cert: &Path,
            _output: CmsEncoding,
        ) -> Result<Vec<u8>> {
            self.enter("encrypt")?;
            Ok(payload.to_vec())
        }

        fn decrypt(
            &self,
            payload: &[u8],
            _private_key: &Path,
            _recipient_cert: &Path,
        ) -> Result<Vec<u8>> {
            self.enter("decrypt")?;
            Ok(payload.to_vec())
        }

        fn verify(
            &self,
            payload: &[u8],
            _trust_anchor: &Path,
            _signer_cert: &Path,
        ) -> Result<Vec<u8>> {
            self.enter("verify")?;
            Ok(payload.to_vec())
        }

        fn encode_data(&self, payload: &[u8], _output: CmsEncoding) -> Result<Vec<u8>> {
            self.enter("encode_data")?;
            Ok(payload.to_vec())
        }

        fn reencode(
            &self,
            payload: &[u8],
            _input: CmsEncoding,
            _output: CmsEncoding,
        ) -> Result<Vec<u8>> {
            self.enter("reencode")?;
            Ok(payload.to_vec())
        }

        fn degenerate_form(&self, certificate_chain: &str) -> Result<Vec<u8>> {
            self.enter("degenerate_form")?;
            Ok(format!("DEGENERATE[{certificate_chain}]").into_bytes())
        }

        fn extract_certificates(&self, _pkcs7_der: &[u8]) -> Result<String> {
            self.enter("extract_certificates")?;
            Ok(String::new())
        }

        fn classify(&self, _payload: &[u8]) -> Result<ContentClass> {
            self.enter("classify")?;
            Ok(ContentClass::Signed)
        }

        fn is_valid_certificate(&self, _path: &Path) -> Result<bool> {
            self.enter("is_valid_certificate")?;
            Ok(true)
        }
    }
}
