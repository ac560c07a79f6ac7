//! Structural certificate checks consumed by test assertions.
//!
//! Each check is an independent pure predicate over decoded
//! [`Certificate`] values; composing several against one certificate
//! makes up an end-to-end scenario. A failed predicate names the
//! attribute or chain link that did not match.

use std::collections::BTreeSet;

use der::Encode;

use crate::cert::Certificate;
use crate::cert::params::{ExtendedKeyUsageOption, KeyUsageOption};
use crate::error::{HarnessError, Result};
use crate::key::verify_sha256_rsa;

/// Checks subject and issuer common names.
pub fn assert_identity(
    cert: &Certificate,
    expected_subject_cn: &str,
    expected_issuer_cn: &str,
) -> Result<()> {
    let subject = cert.subject_cn()?;
    if subject != expected_subject_cn {
        return Err(mismatch("subject common name", expected_subject_cn, &subject));
    }
    let issuer = cert.issuer_cn()?;
    if issuer != expected_issuer_cn {
        return Err(mismatch("issuer common name", expected_issuer_cn, &issuer));
    }
    Ok(())
}

/// Checks the Basic Constraints CA flag.
pub fn assert_is_ca(cert: &Certificate, expected: bool) -> Result<()> {
    let actual = cert.is_ca();
    if actual != expected {
        return Err(mismatch(
            "CA flag",
            &expected.to_string(),
            &actual.to_string(),
        ));
    }
    Ok(())
}

/// Checks the key usage set. Unordered set equality, not positional.
pub fn assert_key_usage(cert: &Certificate, expected: &[KeyUsageOption]) -> Result<()> {
    let actual: BTreeSet<_> = cert.key_usage()?.into_iter().collect();
    let expected_set: BTreeSet<_> = expected.iter().copied().collect();
    if actual != expected_set {
        return Err(mismatch(
            "key usage",
            &names(expected_set.iter().map(|o| o.name())),
            &names(actual.iter().map(|o| o.name())),
        ));
    }
    Ok(())
}

/// Checks the extended key usage set. Unordered set equality.
pub fn assert_extended_key_usage(
    cert: &Certificate,
    expected: &[ExtendedKeyUsageOption],
) -> Result<()> {
    let actual: BTreeSet<_> = cert.extended_key_usage()?.into_iter().collect();
    let expected_set: BTreeSet<_> = expected.iter().copied().collect();
    if actual != expected_set {
        return Err(mismatch(
            "extended key usage",
            &names(expected_set.iter().map(|o| o.name())),
            &names(actual.iter().map(|o| o.name())),
        ));
    }
    Ok(())
}

/// Checks that `NotAfter − NotBefore` equals `expected_hours` exactly.
pub fn assert_validity_duration(cert: &Certificate, expected_hours: i64) -> Result<()> {
    let actual = cert.validity_hours();
    if actual != expected_hours {
        return Err(mismatch(
            "validity duration in hours",
            &expected_hours.to_string(),
            &actual.to_string(),
        ));
    }
    Ok(())
}

/// Checks the subject public key modulus size in bits.
pub fn assert_key_size(cert: &Certificate, expected_bits: usize) -> Result<()> {
    let actual = cert.key_size_bits()?;
    if actual != expected_bits {
        return Err(mismatch(
            "key size in bits",
            &expected_bits.to_string(),
            &actual.to_string(),
        ));
    }
    Ok(())
}

/// Recomputes the signature check over the child's to-be-signed body
/// using the parent's public key.
pub fn assert_signed_by(child: &Certificate, parent: &Certificate) -> Result<()> {
    let child_cn = child.subject_cn().unwrap_or_default();
    let parent_cn = parent.subject_cn().unwrap_or_default();

    if child.inner.signature_algorithm.oid != const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION {
        return Err(HarnessError::ChainVerification(format!(
            "certificate '{child_cn}' uses an unsupported signature algorithm {}",
            child.inner.signature_algorithm.oid
        )));
    }

    let tbs_der = child.inner.tbs_certificate.to_der()?;
    let signature = child.inner.signature.raw_bytes();

    verify_sha256_rsa(&parent.public_key()?, &tbs_der, signature).map_err(|e| {
        HarnessError::ChainVerification(format!(
            "certificate '{child_cn}' is not signed by '{parent_cn}': {e}"
        ))
    })
}

/// Checks subject alternative DNS names. Exact ordered-list equality.
pub fn assert_dns_names(cert: &Certificate, expected: &[&str]) -> Result<()> {
    let actual = cert.dns_names()?;
    if actual != expected {
        return Err(mismatch(
            "DNS names",
            &expected.join(", "),
            &actual.join(", "),
        ));
    }
    Ok(())
}

/// Checks that the certificate carries a non-empty subject key
/// identifier.
pub fn assert_has_subject_key_id(cert: &Certificate) -> Result<()> {
    if cert.subject_key_id()?.is_empty() {
        return Err(HarnessError::ChainVerification(
            "subject key identifier is empty".to_string(),
        ));
    }
    Ok(())
}

fn mismatch(attribute: &str, expected: &str, actual: &str) -> HarnessError {
    HarnessError::ChainVerification(format!(
        "{attribute} mismatch: expected '{expected}', got '{actual}'"
    ))
}

fn names<'a>(iter: impl Iterator<Item = &'a str>) -> String {
    iter.collect::<Vec<_>>().join(", ")
}
