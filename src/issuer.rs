//! Minimal certificate authority: signs a [`CertificateRequest`] with a
//! stored CA certificate and key pair.
//!
//! The issuer embeds the requested validity window, usage sets, CA flag
//! and DNS names with no transformation; serial numbers are sampled
//! fresh per issuance so no two certificates in a run collide.

use der::asn1::BitString;
use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts;
use sha1::{Digest, Sha1};
use x509_cert::certificate::CertificateInner;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    SubjectKeyIdentifier,
};
use crate::cert::params::{CertificateRequest, ExtensionValue};
use crate::error::{HarnessError, Result};
use crate::key::KeyPair;
use crate::tbs_certificate::{TbsCertificate, sha256_with_rsa};

/// A certificate together with the private key it certifies, i.e. a CA
/// able to sign further certificates.
pub struct CertificateWithKey {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl CertificateWithKey {
    /// Creates a self-signed certificate: issuer and subject names are
    /// identical and the signature validates against the certificate's
    /// own public key.
    pub fn self_signed(request: &CertificateRequest, key: KeyPair) -> Result<CertificateWithKey> {
        let subject = request.subject().as_x509_name()?;
        let issuer_ski = derive_key_id(key.public())?;
        let cert = sign_request(request, subject, &key, key.public(), issuer_ski)?;
        Ok(CertificateWithKey { cert, key })
    }

    /// Issues a certificate for an externally supplied subject public
    /// key, signed by this CA.
    pub fn issue(
        &self,
        request: &CertificateRequest,
        subject_public: &RsaPublicKey,
    ) -> Result<Certificate> {
        issue(request, &self.cert, &self.key, subject_public)
    }

    /// Issues a certificate together with a freshly generated key pair of
    /// the given modulus size. Used both for first issuance and for
    /// regeneration; a regenerated certificate never reproduces the
    /// previous certificate or key bytes.
    pub fn issue_with_new_key(
        &self,
        request: &CertificateRequest,
        bits: usize,
    ) -> Result<CertificateWithKey> {
        let key = KeyPair::generate(bits)?;
        let cert = self.issue(request, key.public())?;
        Ok(CertificateWithKey { cert, key })
    }
}

/// Issues a certificate signed by `issuer_cert`/`issuer_key`.
///
/// Fails with an issuance error when the issuer key does not match the
/// issuer certificate's public key, since the resulting signature could
/// never be verified against the issuer's certificate.
pub fn issue(
    request: &CertificateRequest,
    issuer_cert: &Certificate,
    issuer_key: &KeyPair,
    subject_public: &RsaPublicKey,
) -> Result<Certificate> {
    if issuer_cert.public_key()? != *issuer_key.public() {
        return Err(HarnessError::Issuance(
            "The provided issuer key does not match the issuer certificate's public key."
                .to_string(),
        ));
    }

    // Chain on the issuer's subject key id where present so the child's
    // authority key id matches it byte for byte.
    let issuer_ski = match issuer_cert.subject_key_id()? {
        ski if !ski.is_empty() => ski,
        _ => derive_key_id(issuer_key.public())?,
    };

    let issuer_name = issuer_cert.inner.tbs_certificate.subject.clone();
    sign_request(request, issuer_name, issuer_key, subject_public, issuer_ski)
}

fn sign_request(
    request: &CertificateRequest,
    issuer_name: x509_cert::name::Name,
    issuer_key: &KeyPair,
    subject_public: &RsaPublicKey,
    issuer_ski: Vec<u8>,
) -> Result<Certificate> {
    let subject_key_id = match &request.subject_key_id {
        Some(id) => id.clone(),
        None => derive_key_id(subject_public)?,
    };

    let mut extensions = vec![
        ExtensionValue::from_extension(
            &BasicConstraints {
                is_ca: request.is_ca,
                max_path_length: None,
            },
            true,
        )?,
        ExtensionValue::from_extension(
            &SubjectKeyIdentifier {
                key_identifier: subject_key_id,
            },
            false,
        )?,
        ExtensionValue::from_extension(
            &AuthorityKeyIdentifier {
                key_identifier: issuer_ski,
            },
            false,
        )?,
    ];

    if !request.key_usage.is_empty() {
        let key_usage = KeyUsage::from_options(&request.key_usage);
        extensions.push(ExtensionValue::from_extension(&key_usage, true)?);
    }

    if !request.extended_key_usage.is_empty() {
        let eku = ExtendedKeyUsage {
            usage: request.extended_key_usage.clone(),
        };
        extensions.push(ExtensionValue::from_extension(&eku, false)?);
    }

    if !request.alternative_names.is_empty() {
        let san = SubjectAltName {
            names: request.alternative_names.clone(),
        };
        extensions.push(ExtensionValue::from_extension(&san, false)?);
    }

    let serial_number = match &request.serial {
        Some(serial) => serial.clone(),
        None => random_serial(),
    };

    let tbs_cert = TbsCertificate {
        serial_number,
        issuer: issuer_name,
        not_before: request.validity.not_before,
        not_after: request.validity.not_after,
        subject: request.subject().as_x509_name()?,
        subject_public_key: subject_public.clone(),
        extensions,
    };

    let tbs_inner = tbs_cert.to_tbs_certificate_inner()?;
    let tbs_der = der::Encode::to_der(&tbs_inner)?;
    let signature = issuer_key.sign(&tbs_der);

    log::debug!(
        "issued certificate CN={} ({} bit key, ca={})",
        request.common_name,
        subject_public.size() * 8,
        request.is_ca
    );

    Ok(Certificate {
        inner: CertificateInner {
            tbs_certificate: tbs_inner,
            signature_algorithm: sha256_with_rsa()?,
            signature: BitString::from_bytes(&signature)
                .map_err(|e| HarnessError::Issuance(format!("failed to encode signature: {e}")))?,
        },
    })
}

/// RFC 5280 method 1 key identifier: SHA-1 over the subject public key
/// bits.
fn derive_key_id(public: &RsaPublicKey) -> Result<Vec<u8>> {
    let spki = x509_cert::spki::SubjectPublicKeyInfoOwned::from_key(public.clone())
        .map_err(|e| HarnessError::Issuance(format!("failed to encode public key: {e}")))?;
    Ok(Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec())
}

/// A random 128-bit serial, clamped positive and non-zero so the DER
/// INTEGER encoding stays within 20 octets.
fn random_serial() -> Vec<u8> {
    let mut bytes: [u8; 16] = rand::random();
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    bytes.to_vec()
}
