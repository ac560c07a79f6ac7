use std::fmt;
use std::str::FromStr;

use const_oid::AssociatedOid;
use der::{
    Decode, Encode,
    asn1::{Ia5String, OctetString},
    oid::ObjectIdentifier,
};
use x509_cert::ext::pkix::name::GeneralName;

use crate::error::HarnessError;

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

/// Trait for converting to and from X.509 extension values.
///
/// Each extension the harness issues or inspects implements this, so the
/// issuer and the verifier share one encode/decode seam.
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>, HarnessError>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, HarnessError>
    where
        Self: Sized;
}

/// The key usage values a request may carry.
///
/// The set is closed; anything else is rejected at parse time with the
/// user-visible message consuming scenarios assert on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyUsageOption {
    DigitalSignature,
    NonRepudiation,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

impl KeyUsageOption {
    pub const ALL: [KeyUsageOption; 9] = [
        KeyUsageOption::DigitalSignature,
        KeyUsageOption::NonRepudiation,
        KeyUsageOption::KeyEncipherment,
        KeyUsageOption::DataEncipherment,
        KeyUsageOption::KeyAgreement,
        KeyUsageOption::KeyCertSign,
        KeyUsageOption::CrlSign,
        KeyUsageOption::EncipherOnly,
        KeyUsageOption::DecipherOnly,
    ];

    pub fn name(self) -> &'static str {
        match self {
            KeyUsageOption::DigitalSignature => "digital_signature",
            KeyUsageOption::NonRepudiation => "non_repudiation",
            KeyUsageOption::KeyEncipherment => "key_encipherment",
            KeyUsageOption::DataEncipherment => "data_encipherment",
            KeyUsageOption::KeyAgreement => "key_agreement",
            KeyUsageOption::KeyCertSign => "key_cert_sign",
            KeyUsageOption::CrlSign => "crl_sign",
            KeyUsageOption::EncipherOnly => "encipher_only",
            KeyUsageOption::DecipherOnly => "decipher_only",
        }
    }

    fn flag(self) -> KeyUsages {
        match self {
            KeyUsageOption::DigitalSignature => KeyUsages::DigitalSignature,
            KeyUsageOption::NonRepudiation => KeyUsages::NonRepudiation,
            KeyUsageOption::KeyEncipherment => KeyUsages::KeyEncipherment,
            KeyUsageOption::DataEncipherment => KeyUsages::DataEncipherment,
            KeyUsageOption::KeyAgreement => KeyUsages::KeyAgreement,
            KeyUsageOption::KeyCertSign => KeyUsages::KeyCertSign,
            KeyUsageOption::CrlSign => KeyUsages::CRLSign,
            KeyUsageOption::EncipherOnly => KeyUsages::EncipherOnly,
            KeyUsageOption::DecipherOnly => KeyUsages::DecipherOnly,
        }
    }
}

impl fmt::Display for KeyUsageOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyUsageOption {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyUsageOption::ALL
            .into_iter()
            .find(|option| option.name() == s)
            .ok_or_else(|| {
                HarnessError::Issuance(format!(
                    "The provided key usage '{s}' is not supported. Valid values include \
                     digital_signature, non_repudiation, key_encipherment, data_encipherment, \
                     key_agreement, key_cert_sign, crl_sign, encipher_only and decipher_only."
                ))
            })
    }
}

/// The extended key usage values a request may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtendedKeyUsageOption {
    ClientAuth,
    ServerAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
}

impl ExtendedKeyUsageOption {
    pub const ALL: [ExtendedKeyUsageOption; 5] = [
        ExtendedKeyUsageOption::ClientAuth,
        ExtendedKeyUsageOption::ServerAuth,
        ExtendedKeyUsageOption::CodeSigning,
        ExtendedKeyUsageOption::EmailProtection,
        ExtendedKeyUsageOption::TimeStamping,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExtendedKeyUsageOption::ClientAuth => "client_auth",
            ExtendedKeyUsageOption::ServerAuth => "server_auth",
            ExtendedKeyUsageOption::CodeSigning => "code_signing",
            ExtendedKeyUsageOption::EmailProtection => "email_protection",
            ExtendedKeyUsageOption::TimeStamping => "timestamping",
        }
    }
}

impl fmt::Display for ExtendedKeyUsageOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExtendedKeyUsageOption {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExtendedKeyUsageOption::ALL
            .into_iter()
            .find(|option| option.name() == s)
            .ok_or_else(|| {
                HarnessError::Issuance(format!(
                    "The provided extended key usage '{s}' is not supported. Valid values \
                     include client_auth, server_auth, code_signing, email_protection and \
                     timestamping."
                ))
            })
    }
}

impl From<ExtendedKeyUsageOption> for ObjectIdentifier {
    fn from(value: ExtendedKeyUsageOption) -> Self {
        match value {
            ExtendedKeyUsageOption::ClientAuth => const_oid::db::rfc5912::ID_KP_CLIENT_AUTH,
            ExtendedKeyUsageOption::ServerAuth => const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
            ExtendedKeyUsageOption::CodeSigning => const_oid::db::rfc5912::ID_KP_CODE_SIGNING,
            ExtendedKeyUsageOption::EmailProtection => {
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION
            }
            ExtendedKeyUsageOption::TimeStamping => const_oid::db::rfc5912::ID_KP_TIME_STAMPING,
        }
    }
}

/// The Subject Alternative Name (SAN) extension, restricted to DNS names.
#[derive(Debug, Clone)]
pub struct SubjectAltName {
    pub names: Vec<String>,
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = <x509_cert::ext::pkix::SubjectAltName as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, HarnessError> {
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.names
                .iter()
                .map(|name| {
                    Ia5String::try_from(name.clone())
                        .map(GeneralName::DnsName)
                        .map_err(|e| HarnessError::Issuance(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
        );
        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, HarnessError> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?;
        let names = san
            .0
            .iter()
            .filter_map(|name| match name {
                GeneralName::DnsName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect();
        Ok(Self { names })
    }
}

/// The Basic Constraints extension: CA flag and optional path length.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConstraints {
    pub is_ca: bool,
    pub max_path_length: Option<u8>,
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = <x509_cert::ext::pkix::BasicConstraints as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, HarnessError> {
        let bc = x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint: self.max_path_length,
        };
        Ok(bc.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, HarnessError> {
        let bc = x509_cert::ext::pkix::BasicConstraints::from_der(extension)?;
        Ok(Self {
            is_ca: bc.ca,
            max_path_length: bc.path_len_constraint,
        })
    }
}

/// The Key Usage extension as a flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl KeyUsage {
    pub fn from_options(options: &[KeyUsageOption]) -> Self {
        let mut flags: FlagSet<KeyUsages> = FlagSet::empty();
        for option in options {
            flags |= option.flag();
        }
        KeyUsage(flags)
    }

    pub fn options(&self) -> Vec<KeyUsageOption> {
        KeyUsageOption::ALL
            .into_iter()
            .filter(|option| self.0.contains(option.flag()))
            .collect()
    }
}

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, HarnessError> {
        let ku = X509KeyUsage(self.0);
        Ok(ku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, HarnessError> {
        let ku = X509KeyUsage::from_der(extension)?;
        Ok(Self(ku.0))
    }
}

/// The Extended Key Usage extension.
#[derive(Debug, Clone, Default)]
pub struct ExtendedKeyUsage {
    pub usage: Vec<ExtendedKeyUsageOption>,
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = <x509_cert::ext::pkix::ExtendedKeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, HarnessError> {
        let oids: Vec<ObjectIdentifier> = self.usage.iter().map(|v| (*v).into()).collect();
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage(oids);
        Ok(eku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, HarnessError> {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(extension)?;
        let usage = eku
            .0
            .iter()
            .map(|oid| {
                ExtendedKeyUsageOption::ALL
                    .into_iter()
                    .find(|option| ObjectIdentifier::from(*option) == *oid)
                    .ok_or_else(|| {
                        HarnessError::Decode(format!("unsupported extended key usage OID {oid}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { usage })
    }
}

/// The Subject Key Identifier extension. Always set on issued
/// certificates, since the verifier checks for a non-zero length.
#[derive(Debug, Clone)]
pub struct SubjectKeyIdentifier {
    pub key_identifier: Vec<u8>,
}

impl ToAndFromX509Extension for SubjectKeyIdentifier {
    const OID: ObjectIdentifier =
        <x509_cert::ext::pkix::SubjectKeyIdentifier as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, HarnessError> {
        let ski =
            x509_cert::ext::pkix::SubjectKeyIdentifier(OctetString::new(
                self.key_identifier.as_slice(),
            )?);
        Ok(ski.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, HarnessError> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(extension)?;
        Ok(Self {
            key_identifier: ski.0.as_bytes().to_vec(),
        })
    }
}

/// The Authority Key Identifier extension, key-identifier form only.
///
/// Issued certificates carry the issuing CA's subject key identifier here,
/// which is what the chain assertions compare against.
#[derive(Debug, Clone)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Vec<u8>,
}

impl ToAndFromX509Extension for AuthorityKeyIdentifier {
    const OID: ObjectIdentifier =
        <x509_cert::ext::pkix::AuthorityKeyIdentifier as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, HarnessError> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(self.key_identifier.as_slice())?),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };
        Ok(aki.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, HarnessError> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(extension)?;
        Ok(Self {
            key_identifier: aki
                .key_identifier
                .map(|id| id.as_bytes().to_vec())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_constraints_round_trip() {
        let original = BasicConstraints {
            is_ca: true,
            max_path_length: Some(3),
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original.is_ca, decoded.is_ca);
        assert_eq!(original.max_path_length, decoded.max_path_length);
    }

    #[test]
    fn key_usage_options_round_trip() {
        let options = [KeyUsageOption::DigitalSignature, KeyUsageOption::KeyCertSign];
        let ku = KeyUsage::from_options(&options);
        let encoded = ku.to_x509_extension_value().unwrap();
        let decoded = KeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(decoded.options(), options.to_vec());
    }

    #[test]
    fn extended_key_usage_round_trip() {
        let original = ExtendedKeyUsage {
            usage: vec![
                ExtendedKeyUsageOption::ServerAuth,
                ExtendedKeyUsageOption::ClientAuth,
            ],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = ExtendedKeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original.usage, decoded.usage);
    }

    #[test]
    fn every_key_usage_name_parses_back() {
        for option in KeyUsageOption::ALL {
            assert_eq!(option.name().parse::<KeyUsageOption>().unwrap(), option);
        }
    }

    #[test]
    fn unsupported_key_usage_names_the_valid_set() {
        let err = "digital_sinnature".parse::<KeyUsageOption>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "The provided key usage 'digital_sinnature' is not supported. Valid values include \
             digital_signature, non_repudiation, key_encipherment, data_encipherment, \
             key_agreement, key_cert_sign, crl_sign, encipher_only and decipher_only."
        );
    }

    #[test]
    fn unsupported_extended_key_usage_names_the_valid_set() {
        let err = "code_sinning".parse::<ExtendedKeyUsageOption>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "The provided extended key usage 'code_sinning' is not supported. Valid values \
             include client_auth, server_auth, code_signing, email_protection and timestamping."
        );
    }
}
