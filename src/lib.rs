//! # certharness — certificate hierarchy and mutual-TLS test harness
//!
//! A verification harness for acceptance-testing a credential-management
//! service: it emulates a minimal certificate authority, drives mutual
//! TLS handshakes against the system under test, and checks structural
//! properties of the certificates that come back. It is a verifier and
//! driver, not a production CA.
//!
//! ## Components
//!
//! - [`codec`]: PEM/DER decoding of certificate and PKCS#1 RSA key
//!   material, tolerant of surrounding non-PEM text such as YAML command
//!   output.
//! - [`issuer`]: signs a [`cert::params::CertificateRequest`] with a
//!   stored CA certificate and key pair; self-signed when subject and
//!   issuer coincide.
//! - [`client`]: builds a blocking HTTPS client that presents a client
//!   certificate and trusts exactly the supplied server-CA bundle.
//! - [`verify`]: independent predicates over decoded certificates —
//!   identity, CA flag, usage sets, validity duration, key size, chain
//!   signatures, DNS names.
//! - [`server`]: a deterministic TLS listener with an explicit
//!   client-certificate policy, standing in for the system under test in
//!   handshake scenarios.
//! - [`scenario`]: explicit per-scenario connection parameters replacing
//!   the ambient globals of the original suite.
//!
//! ## Issuing and checking a chain
//!
//! ```rust,no_run
//! use certharness::cert::params::{CertificateRequest, KeyUsageOption, Validity};
//! use certharness::issuer::CertificateWithKey;
//! use certharness::key::KeyPair;
//! use certharness::verify;
//!
//! # fn main() -> certharness::error::Result<()> {
//! let ca_request = CertificateRequest::builder()
//!     .common_name("root-ca".to_string())
//!     .is_ca(true)
//!     .key_usage(vec![KeyUsageOption::KeyCertSign, KeyUsageOption::CrlSign])
//!     .build();
//! let ca = CertificateWithKey::self_signed(&ca_request, KeyPair::generate(2048)?)?;
//!
//! let leaf_request = CertificateRequest::builder()
//!     .common_name("leaf-1".to_string())
//!     .validity(Validity::for_hours(90))
//!     .key_usage(vec![KeyUsageOption::DigitalSignature])
//!     .alternative_names(vec!["example.com".to_string()])
//!     .build();
//! let leaf = ca.issue_with_new_key(&leaf_request, 3072)?;
//!
//! verify::assert_identity(&leaf.cert, "leaf-1", "root-ca")?;
//! verify::assert_signed_by(&leaf.cert, &ca.cert)?;
//! verify::assert_validity_duration(&leaf.cert, 90)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Every failure maps to one variant of [`error::HarnessError`]; a
//! failure fails the enclosing scenario without retries, and the
//! messages consuming scenarios assert on (the unsupported-usage
//! enumerations, `unknown certificate`) are preserved verbatim.

pub mod cert;
pub mod client;
pub mod codec;
pub mod error;
pub mod issuer;
pub mod key;
pub mod scenario;
pub mod server;
pub mod tbs_certificate;
pub mod verify;
