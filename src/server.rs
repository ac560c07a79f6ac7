//! Deterministic stand-in for the system under test's TLS listener.
//!
//! The "require" versus "request" client-certificate behavior of the real
//! service is implementation-defined at the TLS layer, so the harness
//! encodes it as an explicit [`ClientCertPolicy`] and reproduces both
//! outcomes: `Require` aborts the handshake with a TLS alert on a bad
//! client certificate, while `Request` completes the handshake and pushes
//! the identity failure to the application layer as an HTTP 401.
//!
//! rustls always presents a configured client identity regardless of the
//! server's CA hints, so under `Request` the server accepts any
//! certificate during the handshake and re-verifies the presented chain
//! before answering.

use std::io::{BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use rustls::DigitallySignedStruct;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{RootCertStore, ServerConfig, SignatureScheme};
use time::OffsetDateTime;

use crate::cert::Certificate;
use crate::codec;
use crate::error::{HarnessError, Result};
use crate::verify;

/// How the server treats client certificates during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCertPolicy {
    /// Client certificates are neither requested nor verified.
    None,
    /// The server asks for a client certificate but completes the
    /// handshake without a valid one; authentication is decided at the
    /// HTTP layer.
    Request,
    /// The handshake is aborted with a TLS alert unless the client
    /// presents a certificate that verifies against the client CA.
    Require,
}

/// Body of the application-layer rejection in `Request` mode. Asserted
/// verbatim by consuming scenarios.
pub const AUTH_REQUIRED_BODY: &str =
    r#"{"error":"access_denied","error_description":"Full authentication is required to access this resource"}"#;

/// A one-scenario HTTPS server on an ephemeral localhost port.
///
/// Echoes the request body back on authenticated requests and answers 401
/// with [`AUTH_REQUIRED_BODY`] otherwise. Dropped at scenario end; the
/// accept loop shuts down with it.
pub struct ScenarioServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ScenarioServer {
    /// Starts the server with the given PEM-encoded server certificate
    /// chain and key. `client_ca_pem` is the CA that client certificates
    /// must chain to; it is required unless the policy is `None`.
    pub fn start(
        server_chain_pem: &str,
        server_key_pem: &str,
        client_ca_pem: Option<&str>,
        policy: ClientCertPolicy,
    ) -> Result<ScenarioServer> {
        // Idempotent; keeps ServerConfig::builder() unambiguous when
        // several provider backends end up compiled in.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let chain = pem_to_cert_chain(server_chain_pem)?;
        let key = pem_to_private_key(server_key_pem)?;

        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| HarnessError::Configuration(format!("TLS protocol setup: {e}")))?;

        let config = match policy {
            ClientCertPolicy::None => builder.with_no_client_auth().with_single_cert(chain, key),
            ClientCertPolicy::Require => {
                let roots = client_root_store(client_ca_pem, policy)?;
                let verifier = WebPkiClientVerifier::builder_with_provider(
                    Arc::new(roots),
                    provider.clone(),
                )
                .build()
                .map_err(|e| {
                    HarnessError::Configuration(format!("client verifier setup: {e}"))
                })?;
                builder
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(chain, key)
            }
            ClientCertPolicy::Request => {
                let verifier = Arc::new(AcceptAnyClientCert {
                    algorithms: provider.signature_verification_algorithms,
                });
                builder
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(chain, key)
            }
        }
        .map_err(|e| HarnessError::Configuration(format!("TLS server setup: {e}")))?;

        let client_ca = match (policy, client_ca_pem) {
            (ClientCertPolicy::None, _) => None,
            (_, Some(pem_text)) => Some(codec::decode_certificate(pem_text)?),
            (_, None) => {
                return Err(HarnessError::Configuration(
                    "client CA required for this client certificate policy".to_string(),
                ));
            }
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .map_err(|e| HarnessError::Configuration(format!("failed to bind listener: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| HarnessError::Configuration(format!("failed to read local addr: {e}")))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_shutdown = Arc::clone(&shutdown);
        let tls_config = Arc::new(config);

        let handle = std::thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                match stream {
                    Ok(stream) => {
                        if let Err(e) =
                            handle_connection(stream, &tls_config, policy, client_ca.as_ref())
                        {
                            log::debug!("scenario server connection ended: {e}");
                        }
                    }
                    Err(e) => log::warn!("scenario server accept failed: {e}"),
                }
            }
        });

        log::debug!("scenario server listening on {addr} with policy {policy:?}");

        Ok(ScenarioServer {
            addr,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Base URL for requests; the server certificate must carry a
    /// `localhost` DNS SAN.
    pub fn base_url(&self) -> String {
        format!("https://localhost:{}", self.addr.port())
    }
}

impl Drop for ScenarioServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Unblock the accept loop.
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    config: &Arc<ServerConfig>,
    policy: ClientCertPolicy,
    client_ca: Option<&Certificate>,
) -> std::io::Result<()> {
    let mut conn = rustls::ServerConnection::new(Arc::clone(config))
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let mut tls = rustls::Stream::new(&mut conn, &mut stream);

    let body = read_request(&mut tls)?;

    let authorized = match policy {
        ClientCertPolicy::None => true,
        // Require: the verifier already rejected bad certificates during
        // the handshake.
        ClientCertPolicy::Require => tls.conn.peer_certificates().is_some(),
        ClientCertPolicy::Request => peer_chains_to(tls.conn.peer_certificates(), client_ca),
    };

    let response = if authorized {
        let payload = if body.is_empty() {
            "{}".to_string()
        } else {
            body
        };
        http_response(200, "OK", &payload)
    } else {
        http_response(401, "Unauthorized", AUTH_REQUIRED_BODY)
    };

    tls.write_all(response.as_bytes())?;
    tls.conn.send_close_notify();
    tls.flush()?;
    Ok(())
}

/// Application-layer identity check used in `Request` mode: the presented
/// end-entity certificate must be signed by the client CA and currently
/// valid.
fn peer_chains_to(
    peer: Option<&[CertificateDer<'_>]>,
    client_ca: Option<&Certificate>,
) -> bool {
    let (Some(chain), Some(ca)) = (peer, client_ca) else {
        return false;
    };
    let Some(end_entity) = chain.first() else {
        return false;
    };
    let Ok(cert) = Certificate::from_der(end_entity.as_ref()) else {
        return false;
    };
    if verify::assert_signed_by(&cert, ca).is_err() {
        return false;
    }
    let now = OffsetDateTime::now_utc();
    cert.not_before() <= now && now <= cert.not_after()
}

fn read_request<S: Read>(stream: &mut S) -> std::io::Result<String> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before request headers",
            ));
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = find_header_end(&raw) {
            break pos;
        }
        if raw.len() > 64 * 1024 {
            return Err(std::io::Error::other("request headers too large"));
        }
    };

    let headers = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    let mut body = raw[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);
    Ok(String::from_utf8_lossy(&body).to_string())
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

fn http_response(status: u16, reason: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn pem_to_cert_chain(pem_text: &str) -> Result<Vec<CertificateDer<'static>>> {
    let chain = rustls_pemfile::certs(&mut BufReader::new(pem_text.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| HarnessError::Configuration(format!("server certificate chain: {e}")))?;
    if chain.is_empty() {
        return Err(HarnessError::Configuration(
            "server certificate chain is empty".to_string(),
        ));
    }
    Ok(chain)
}

fn pem_to_private_key(pem_text: &str) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(pem_text.as_bytes()))
        .map_err(|e| HarnessError::Configuration(format!("server private key: {e}")))?
        .ok_or_else(|| HarnessError::Configuration("no server private key found".to_string()))
}

fn client_root_store(
    client_ca_pem: Option<&str>,
    policy: ClientCertPolicy,
) -> Result<RootCertStore> {
    let pem_text = client_ca_pem.ok_or_else(|| {
        HarnessError::Configuration(format!("client CA required for policy {policy:?}"))
    })?;
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(pem_text.as_bytes())) {
        let cert =
            cert.map_err(|e| HarnessError::Configuration(format!("client CA bundle: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| HarnessError::Configuration(format!("client CA rejected: {e}")))?;
    }
    if roots.is_empty() {
        return Err(HarnessError::Configuration(
            "client CA bundle is empty".to_string(),
        ));
    }
    Ok(roots)
}

/// `Request`-mode handshake verifier: asks for a client certificate but
/// never fails the handshake over it. Signature checks still run so the
/// peer proves possession of its key.
#[derive(Debug)]
struct AcceptAnyClientCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }

    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }
}
