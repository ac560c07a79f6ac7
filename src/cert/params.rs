use bon::Builder;
use const_oid::ObjectIdentifier;
use time::{Duration, OffsetDateTime};
use x509_cert::name::{Name, RdnSequence};

use crate::cert::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::{ExtendedKeyUsageOption, KeyUsageOption};
use crate::error::{HarnessError, Result};

/// Default validity of an issued certificate, in hours (365 days).
pub const DEFAULT_VALIDITY_HOURS: i64 = 8760;

/// Subject or issuer name of a certificate.
///
/// The harness identifies certificates by common name only; the other
/// distinguished-name attributes never appear in the scenarios it drives.
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: String,
}

impl DistinguishedName {
    pub fn new(common_name: &str) -> Self {
        DistinguishedName {
            common_name: common_name.to_string(),
        }
    }

    /// Encodes the name as an X.509 RDN sequence (`CN=<common name>`).
    pub fn as_x509_name(&self) -> Result<Name> {
        use core::str::FromStr;
        RdnSequence::from_str(&format!("CN={}", self.common_name))
            .map_err(|e| HarnessError::Issuance(format!("invalid common name: {e}")))
    }

    /// Extracts the common name from an X.509 name.
    pub fn from_x509_name(name: &Name) -> Result<Self> {
        for rdn in name.0.iter() {
            for attr in rdn.0.iter() {
                if attr.oid != const_oid::db::rfc4519::CN {
                    continue;
                }
                let value = attr
                    .value
                    .decode_as::<der::asn1::Utf8StringRef>()
                    .map(|s| s.to_string())
                    .or_else(|_| {
                        attr.value
                            .decode_as::<der::asn1::PrintableStringRef>()
                            .map(|s| s.to_string())
                    })
                    .map_err(|e| {
                        HarnessError::Decode(format!("common name is not a string: {e}"))
                    })?;
                return Ok(DistinguishedName { common_name: value });
            }
        }
        Ok(DistinguishedName::default())
    }
}

/// Certificate validity period.
///
/// `NotAfter − NotBefore` on an issued certificate equals the requested
/// duration exactly; there is no clock-skew padding in this harness.
/// Instants are floored to whole seconds since X.509 time has no
/// sub-second precision.
#[derive(Clone, Copy, Debug)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// A validity window starting now and lasting exactly `hours` hours.
    pub fn for_hours(hours: i64) -> Self {
        let not_before = floor_to_seconds(OffsetDateTime::now_utc());
        Self {
            not_before,
            not_after: not_before + Duration::hours(hours),
        }
    }

    /// A validity window starting now and lasting exactly `days` days.
    pub fn for_days(days: i64) -> Self {
        Validity::for_hours(days * 24)
    }

    /// An explicit window, e.g. one entirely in the past for an expired
    /// test certificate.
    pub fn between(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Self {
        Self {
            not_before: floor_to_seconds(not_before),
            not_after: floor_to_seconds(not_after),
        }
    }
}

impl Default for Validity {
    fn default() -> Self {
        Validity::for_hours(DEFAULT_VALIDITY_HOURS)
    }
}

fn floor_to_seconds(instant: OffsetDateTime) -> OffsetDateTime {
    instant - Duration::nanoseconds(i64::from(instant.nanosecond()))
}

/// Everything the issuer needs to mint one certificate.
///
/// Immutable value passed into the issuer; the requested usage sets, CA
/// flag, DNS names and validity are embedded into the certificate with no
/// transformation. `serial` and `subject_key_id` default to a random
/// 128-bit value and a SHA-1 digest of the subject public key when not
/// supplied.
#[derive(Clone, Debug, Builder)]
pub struct CertificateRequest {
    pub common_name: String,
    #[builder(default)]
    pub validity: Validity,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub key_usage: Vec<KeyUsageOption>,
    #[builder(default)]
    pub extended_key_usage: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub alternative_names: Vec<String>,
    pub serial: Option<Vec<u8>>,
    pub subject_key_id: Option<Vec<u8>>,
}

impl CertificateRequest {
    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::new(&self.common_name)
    }
}

/// A DER-encoded X.509 extension value ready to be placed in a TBS body.
#[derive(Clone, Debug)]
pub struct ExtensionValue {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionValue {
    pub fn from_extension<E: ToAndFromX509Extension>(extension: &E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_duration_is_exact() {
        for hours in [90, 8760] {
            let validity = Validity::for_hours(hours);
            assert_eq!((validity.not_after - validity.not_before).whole_hours(), hours);
            assert_eq!(validity.not_before.nanosecond(), 0);
        }
    }

    #[test]
    fn common_name_round_trips_through_x509() {
        let dn = DistinguishedName::new("root-ca");
        let name = dn.as_x509_name().unwrap();
        assert_eq!(DistinguishedName::from_x509_name(&name).unwrap(), dn);
    }
}
