pub mod extensions;
pub mod params;

use der::{Decode, Encode, EncodePem};
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;

use crate::error::{HarnessError, Result};
use extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage,
    KeyUsageOption, SubjectAltName, SubjectKeyIdentifier, ToAndFromX509Extension,
};
use params::DistinguishedName;

/// A decoded X.509 certificate.
///
/// Immutable once issued or decoded; "regeneration" always produces a
/// brand-new `Certificate` value with a fresh serial and key pair.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub inner: CertificateInner,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der)?;
        Ok(Certificate { inner })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| HarnessError::Decode(e.to_string()))
    }

    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| HarnessError::Decode(e.to_string()))
    }

    pub fn subject_cn(&self) -> Result<String> {
        Ok(DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)?.common_name)
    }

    pub fn issuer_cn(&self) -> Result<String> {
        Ok(DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)?.common_name)
    }

    pub fn serial(&self) -> Vec<u8> {
        self.inner.tbs_certificate.serial_number.as_bytes().to_vec()
    }

    /// The CA flag from the Basic Constraints extension; absent extension
    /// means not a CA.
    pub fn is_ca(&self) -> bool {
        self.decode_extension::<BasicConstraints>()
            .ok()
            .flatten()
            .map(|bc| bc.is_ca)
            .unwrap_or(false)
    }

    /// The key usage set; empty when the extension is absent.
    pub fn key_usage(&self) -> Result<Vec<KeyUsageOption>> {
        Ok(self
            .decode_extension::<KeyUsage>()?
            .map(|ku| ku.options())
            .unwrap_or_default())
    }

    /// The extended key usage set; empty when the extension is absent.
    pub fn extended_key_usage(&self) -> Result<Vec<ExtendedKeyUsageOption>> {
        Ok(self
            .decode_extension::<ExtendedKeyUsage>()?
            .map(|eku| eku.usage)
            .unwrap_or_default())
    }

    /// Subject alternative DNS names, in certificate order.
    pub fn dns_names(&self) -> Result<Vec<String>> {
        Ok(self
            .decode_extension::<SubjectAltName>()?
            .map(|san| san.names)
            .unwrap_or_default())
    }

    pub fn subject_key_id(&self) -> Result<Vec<u8>> {
        Ok(self
            .decode_extension::<SubjectKeyIdentifier>()?
            .map(|ski| ski.key_identifier)
            .unwrap_or_default())
    }

    pub fn authority_key_id(&self) -> Result<Vec<u8>> {
        Ok(self
            .decode_extension::<AuthorityKeyIdentifier>()?
            .map(|aki| aki.key_identifier)
            .unwrap_or_default())
    }

    pub fn not_before(&self) -> OffsetDateTime {
        x509_time_to_offset(&self.inner.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> OffsetDateTime {
        x509_time_to_offset(&self.inner.tbs_certificate.validity.not_after)
    }

    /// `NotAfter − NotBefore` in whole hours.
    pub fn validity_hours(&self) -> i64 {
        (self.not_after() - self.not_before()).whole_hours()
    }

    /// The subject's RSA public key.
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        let spki_der = self
            .inner
            .tbs_certificate
            .subject_public_key_info
            .to_der()?;
        RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| HarnessError::Decode(format!("subject public key is not RSA: {e}")))
    }

    /// Modulus size of the subject's RSA public key, in bits.
    pub fn key_size_bits(&self) -> Result<usize> {
        Ok(self.public_key()?.size() * 8)
    }

    fn decode_extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        let Some(extensions) = &self.inner.tbs_certificate.extensions else {
            return Ok(None);
        };
        for ext in extensions {
            if ext.extn_id == E::OID {
                return Ok(Some(E::from_x509_extension_value(ext.extn_value.as_bytes())?));
            }
        }
        Ok(None)
    }
}

fn x509_time_to_offset(time: &x509_cert::time::Time) -> OffsetDateTime {
    match time {
        x509_cert::time::Time::UtcTime(ut) => OffsetDateTime::from(ut.to_system_time()),
        x509_cert::time::Time::GeneralTime(gt) => OffsetDateTime::from(gt.to_system_time()),
    }
}
