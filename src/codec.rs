//! PEM/DER decoding for certificate and key material.
//!
//! Command output from the system under test wraps PEM blocks in YAML
//! documents, so every entry point locates the PEM boundaries inside
//! arbitrary surrounding text before handing the substring to the PEM
//! parser. Pure transformation, no side effects.

use crate::cert::Certificate;
use crate::error::{HarnessError, Result};
use crate::key::KeyPair;

const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";

/// Outcome of decoding a single PEM block of unknown kind.
pub enum DecodedPem {
    Certificate(Certificate),
    KeyPair(KeyPair),
}

/// Decodes the first PEM block found in `text`, which may be surrounded
/// by non-PEM content.
pub fn decode(text: &str) -> Result<DecodedPem> {
    let begin = text
        .find("-----BEGIN ")
        .ok_or_else(|| HarnessError::Decode("no PEM block found".to_string()))?;
    let label_start = begin + "-----BEGIN ".len();
    let label_end = text[label_start..]
        .find("-----")
        .map(|i| label_start + i)
        .ok_or_else(|| HarnessError::Decode("unterminated PEM header".to_string()))?;

    match &text[label_start..label_end] {
        CERTIFICATE_LABEL => Ok(DecodedPem::Certificate(decode_certificate(text)?)),
        RSA_PRIVATE_KEY_LABEL => Ok(DecodedPem::KeyPair(decode_private_key(text)?)),
        other => Err(HarnessError::Decode(format!(
            "unsupported PEM label '{other}'"
        ))),
    }
}

/// Decodes the first `CERTIFICATE` block in `text` as an X.509
/// certificate.
pub fn decode_certificate(text: &str) -> Result<Certificate> {
    let block = extract_block(text, CERTIFICATE_LABEL)?;
    let pem = pem::parse(unindent(block))?;
    Certificate::from_der(pem.contents())
}

/// Decodes the first `RSA PRIVATE KEY` block in `text` as a PKCS#1 RSA
/// private key.
pub fn decode_private_key(text: &str) -> Result<KeyPair> {
    let block = extract_block(text, RSA_PRIVATE_KEY_LABEL)?;
    let pem = pem::parse(unindent(block))?;
    KeyPair::from_pkcs1_der(pem.contents())
}

/// Decodes every `CERTIFICATE` block in `text`, for multi-root trust
/// bundles.
pub fn decode_certificate_bundle(text: &str) -> Result<Vec<Certificate>> {
    let mut certificates = Vec::new();
    let mut rest = text;
    while let Ok(block) = extract_block(rest, CERTIFICATE_LABEL) {
        let pem = pem::parse(unindent(block))?;
        certificates.push(Certificate::from_der(pem.contents())?);
        let consumed = block.as_ptr() as usize - rest.as_ptr() as usize + block.len();
        rest = &rest[consumed..];
    }
    if certificates.is_empty() {
        return Err(HarnessError::Decode(
            "no certificate blocks found".to_string(),
        ));
    }
    Ok(certificates)
}

/// Returns the substring of `text` spanning the first PEM block with the
/// given label, boundary markers included.
pub fn extract_block<'a>(text: &'a str, label: &str) -> Result<&'a str> {
    let begin_marker = format!("-----BEGIN {label}-----");
    let end_marker = format!("-----END {label}-----");

    let start = text
        .find(&begin_marker)
        .ok_or_else(|| HarnessError::Decode(format!("no '{begin_marker}' block found")))?;
    let end = text[start..]
        .find(&end_marker)
        .map(|i| start + i + end_marker.len())
        .ok_or_else(|| HarnessError::Decode(format!("missing '{end_marker}' marker")))?;

    Ok(&text[start..end])
}

/// Strips per-line indentation a YAML block scalar leaves on the PEM
/// body.
fn unindent(block: &str) -> String {
    block
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}
