//! Builds the mutual-TLS HTTPS client a scenario uses to reach the
//! system under test.
//!
//! The builder is a transport-layer configuration step only: it loads and
//! validates key material up front (fail fast, before any network
//! attempt), configures the client to present the identity when the
//! server asks for it, and pins server verification to the supplied
//! trust bundle instead of ambient system roots. Distinguishing a
//! TLS-level rejection from a graceful HTTP-level one is the caller's
//! job; this module only guarantees the error taxonomy.

use std::error::Error as _;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::codec;
use crate::error::{HarnessError, Result};

/// Bound on every request, handshake included. The harness has no
/// retries; expiry is a network error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A blocking HTTPS client holding one client identity and one exclusive
/// trust bundle. Built per scenario, used for a single request, then
/// discarded.
#[derive(Debug)]
pub struct MtlsClient {
    http: reqwest::blocking::Client,
}

impl MtlsClient {
    /// Loads the trust bundle and client certificate/key from disk and
    /// builds the client.
    ///
    /// Fails with a configuration error when any file is missing,
    /// unreadable or undecodable; no network activity happens here.
    pub fn build(
        trust_bundle_path: &Path,
        client_cert_path: &Path,
        client_key_path: &Path,
    ) -> Result<Self> {
        let bundle_pem = read_material(trust_bundle_path)?;
        let cert_pem = read_material(client_cert_path)?;
        let key_pem = read_material(client_key_path)?;

        // Decode through the codec first so bad material is reported as
        // ours, not as an opaque TLS-stack failure later.
        let roots = codec::decode_certificate_bundle(&bundle_pem).map_err(|e| {
            HarnessError::Configuration(format!(
                "trust bundle {}: {e}",
                trust_bundle_path.display()
            ))
        })?;
        codec::decode_certificate(&cert_pem).map_err(|e| {
            HarnessError::Configuration(format!(
                "client certificate {}: {e}",
                client_cert_path.display()
            ))
        })?;
        codec::decode_private_key(&key_pem).map_err(|e| {
            HarnessError::Configuration(format!("client key {}: {e}", client_key_path.display()))
        })?;

        let cert_block = codec::extract_block(&cert_pem, "CERTIFICATE")?;
        let key_block = codec::extract_block(&key_pem, "RSA PRIVATE KEY")?;
        let identity =
            reqwest::Identity::from_pem(format!("{cert_block}\n{key_block}\n").as_bytes())
                .map_err(|e| {
                    HarnessError::Configuration(format!("client identity rejected: {e}"))
                })?;

        let mut builder = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .identity(identity)
            .timeout(REQUEST_TIMEOUT);

        for root in &roots {
            let der = root.to_der()?;
            let root = reqwest::Certificate::from_der(&der).map_err(|e| {
                HarnessError::Configuration(format!("trust bundle certificate rejected: {e}"))
            })?;
            builder = builder.add_root_certificate(root);
        }

        let http = builder
            .build()
            .map_err(|e| HarnessError::Configuration(format!("client construction failed: {e}")))?;

        log::debug!(
            "built mTLS client: bundle={} ({} roots), cert={}",
            trust_bundle_path.display(),
            roots.len(),
            client_cert_path.display()
        );

        Ok(MtlsClient { http })
    }

    /// One HTTPS POST with an opaque JSON body. Returns the response body
    /// regardless of HTTP status, so application-layer rejections stay
    /// observable to the caller's assertions.
    pub fn post(&self, url: &str, body: &str) -> Result<String> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .map_err(transport_error)?;
        response.text().map_err(transport_error)
    }

    /// One HTTPS GET; same body semantics as [`MtlsClient::post`].
    pub fn get(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).send().map_err(transport_error)?;
        response.text().map_err(transport_error)
    }
}

/// Maps a transport failure into the harness taxonomy, preserving the
/// underlying message chain.
///
/// Peer alert text is TLS-stack specific, so rejections of the client
/// certificate (expired, untrusted, malformed) are normalized to contain
/// the contract string "unknown certificate" with the original alert kept
/// as detail.
fn transport_error(err: reqwest::Error) -> HarnessError {
    if err.is_timeout() {
        return HarnessError::Network(format!("request timed out after {REQUEST_TIMEOUT:?}"));
    }

    let mut messages = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        messages.push(inner.to_string());
        source = inner.source();
    }
    let detail = messages.join(": ");

    if is_certificate_rejection(&detail) {
        HarnessError::Network(format!("unknown certificate ({detail})"))
    } else {
        HarnessError::Network(detail)
    }
}

fn is_certificate_rejection(detail: &str) -> bool {
    let lower = detail.to_lowercase();
    lower.contains("alert")
        && (lower.contains("certificate")
            || lower.contains("unknownca")
            || lower.contains("unknown ca")
            || lower.contains("accessdenied"))
}

fn read_material(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(HarnessError::Configuration(format!(
            "{} does not exist",
            path.display()
        )));
    }
    fs::read_to_string(path)
        .map_err(|e| HarnessError::Configuration(format!("{}: {e}", path.display())))
}
