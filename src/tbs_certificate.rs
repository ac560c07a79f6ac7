use der::Encode;
use der::asn1::OctetString;
use rsa::RsaPublicKey;
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::cert::params::ExtensionValue;
use crate::error::{HarnessError, Result};

/// The signature algorithm identifier for everything the harness signs:
/// SHA-256 with RSA encryption, NULL parameters per RFC 5280.
pub fn sha256_with_rsa() -> Result<AlgorithmIdentifierOwned> {
    Ok(AlgorithmIdentifierOwned {
        oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
        parameters: Some(der::Any::null()),
    })
}

/// The "To Be Signed" portion of an X.509 certificate, before DER
/// encoding and signing.
///
/// The issuer name is carried as a ready-made X.509 name (cloned from the
/// issuing certificate's subject) so chain building never depends on a
/// string round-trip of the distinguished name.
pub struct TbsCertificate {
    pub serial_number: Vec<u8>,
    pub issuer: Name,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub subject: Name,
    pub subject_public_key: RsaPublicKey,
    pub extensions: Vec<ExtensionValue>,
}

impl TbsCertificate {
    /// Converts into `x509_cert`'s representation for DER encoding.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let not_before = x509_cert::time::Time::UtcTime(der::asn1::UtcTime::from_system_time(
            self.not_before.into(),
        )?);
        let not_after = x509_cert::time::Time::UtcTime(der::asn1::UtcTime::from_system_time(
            self.not_after.into(),
        )?);

        let serial_number = SerialNumber::new(self.serial_number.as_slice())
            .map_err(|e| HarnessError::Issuance(format!("invalid serial number: {e}")))?;

        let subject_public_key_info =
            x509_cert::spki::SubjectPublicKeyInfoOwned::from_key(self.subject_public_key.clone())
                .map_err(|e| {
                    HarnessError::Issuance(format!("failed to encode subject public key: {e}"))
                })?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number,
            signature: sha256_with_rsa()?,
            issuer: self.issuer.clone(),
            validity: x509_cert::time::Validity {
                not_before,
                not_after,
            },
            subject: self.subject.clone(),
            subject_public_key_info,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        })
    }

    /// DER-encodes the TBS body, the exact bytes the issuer signs.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_tbs_certificate_inner()?.to_der()?)
    }
}
