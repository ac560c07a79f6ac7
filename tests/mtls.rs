mod util;

use std::fs;
use std::path::{Path, PathBuf};

use time::{Duration, OffsetDateTime};

use certharness::cert::params::Validity;
use certharness::client::MtlsClient;
use certharness::error::HarnessError;
use certharness::issuer::CertificateWithKey;
use certharness::server::{AUTH_REQUIRED_BODY, ClientCertPolicy, ScenarioServer};

const POST_DATA: &str = r#"{"name":"mtlstest","type":"password"}"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_pem(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

struct Fixture {
    server: ScenarioServer,
    server_ca_path: PathBuf,
    client_cert_path: PathBuf,
    client_key_path: PathBuf,
    _dir: tempfile::TempDir,
}

/// Issues a server CA + leaf, starts the scenario server with the given
/// policy trusting `client_ca`, and writes the supplied client identity
/// to disk.
fn start_fixture(
    policy: ClientCertPolicy,
    client_ca: &CertificateWithKey,
    client_identity: &CertificateWithKey,
) -> Fixture {
    let server_ca = util::generate_ca("server-ca");
    let server_leaf = util::server_leaf(&server_ca);

    let chain_pem = format!(
        "{}\n{}",
        server_leaf.cert.to_pem().unwrap(),
        server_ca.cert.to_pem().unwrap()
    );
    let client_ca_pem = client_ca.cert.to_pem().unwrap();

    let server = ScenarioServer::start(
        &chain_pem,
        &server_leaf.key.to_pkcs1_pem().unwrap(),
        Some(&client_ca_pem),
        policy,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let server_ca_path = write_pem(dir.path(), "server_ca_cert.pem", &server_ca.cert.to_pem().unwrap());
    let client_cert_path = write_pem(
        dir.path(),
        "client.pem",
        &client_identity.cert.to_pem().unwrap(),
    );
    let client_key_path = write_pem(
        dir.path(),
        "client_key.pem",
        &client_identity.key.to_pkcs1_pem().unwrap(),
    );

    Fixture {
        server,
        server_ca_path,
        client_cert_path,
        client_key_path,
        _dir: dir,
    }
}

/// A certificate signed by the CA the server trusts reaches the
/// authenticated endpoint and gets the credential echoed back.
#[test]
fn trusted_client_certificate_is_accepted() {
    init_logging();
    let client_ca = util::generate_ca("client-ca");
    let identity = util::client_leaf(&client_ca, "credhub_test_client", Validity::for_hours(90));
    let fixture = start_fixture(ClientCertPolicy::Require, &client_ca, &identity);

    let client = MtlsClient::build(
        &fixture.server_ca_path,
        &fixture.client_cert_path,
        &fixture.client_key_path,
    )
    .unwrap();

    let body = client
        .post(&format!("{}/api/v1/data", fixture.server.base_url()), POST_DATA)
        .unwrap();
    assert!(body.contains(r#""type":"password""#), "got body: {body}");
}

/// An expired client certificate against a server that requires client
/// certificates fails at the TLS layer with "unknown certificate" and no
/// response body.
#[test]
fn expired_client_certificate_is_rejected_in_the_handshake() {
    init_logging();
    let client_ca = util::generate_ca("client-ca");
    let now = OffsetDateTime::now_utc();
    let expired = util::client_leaf(
        &client_ca,
        "credhub_test_client",
        Validity::between(now - Duration::hours(48), now - Duration::seconds(2)),
    );
    let fixture = start_fixture(ClientCertPolicy::Require, &client_ca, &expired);

    let client = MtlsClient::build(
        &fixture.server_ca_path,
        &fixture.client_cert_path,
        &fixture.client_key_path,
    )
    .unwrap();

    let err = client
        .post(&format!("{}/api/v1/data", fixture.server.base_url()), POST_DATA)
        .unwrap_err();

    match err {
        HarnessError::Network(message) => {
            assert!(
                message.contains("unknown certificate"),
                "got message: {message}"
            );
        }
        other => panic!("expected a network error, got {other:?}"),
    }
}

/// A certificate signed by a CA the server does not trust, against a
/// server that merely requests client certificates: the handshake and
/// the HTTP exchange complete, and the rejection surfaces at the
/// application layer.
#[test]
fn untrusted_ca_surfaces_as_application_rejection_when_requested() {
    init_logging();
    let client_ca = util::generate_ca("client-ca");
    let rogue_ca = util::generate_ca("rogue-ca");
    let identity = util::client_leaf(&rogue_ca, "credhub_test_client", Validity::for_hours(90));
    let fixture = start_fixture(ClientCertPolicy::Request, &client_ca, &identity);

    let client = MtlsClient::build(
        &fixture.server_ca_path,
        &fixture.client_cert_path,
        &fixture.client_key_path,
    )
    .unwrap();

    let body = client
        .post(&format!("{}/api/v1/data", fixture.server.base_url()), POST_DATA)
        .unwrap();
    assert!(
        body.contains("Full authentication is required to access this resource"),
        "got body: {body}"
    );
    assert_eq!(body, AUTH_REQUIRED_BODY);
}

/// A trusted certificate also passes the application-layer check in
/// request mode.
#[test]
fn trusted_certificate_is_accepted_when_requested() {
    init_logging();
    let client_ca = util::generate_ca("client-ca");
    let identity = util::client_leaf(&client_ca, "credhub_test_client", Validity::for_hours(90));
    let fixture = start_fixture(ClientCertPolicy::Request, &client_ca, &identity);

    let client = MtlsClient::build(
        &fixture.server_ca_path,
        &fixture.client_cert_path,
        &fixture.client_key_path,
    )
    .unwrap();

    let body = client
        .post(&format!("{}/api/v1/data", fixture.server.base_url()), POST_DATA)
        .unwrap();
    assert!(body.contains(r#""type":"password""#), "got body: {body}");
}

/// With client certificates neither requested nor verified, any client
/// reaches the endpoint; a GET with no body is answered with the empty
/// JSON object.
#[test]
fn no_client_auth_policy_ignores_the_client_certificate() {
    init_logging();
    let server_ca = util::generate_ca("server-ca");
    let server_leaf = util::server_leaf(&server_ca);
    let chain_pem = format!(
        "{}\n{}",
        server_leaf.cert.to_pem().unwrap(),
        server_ca.cert.to_pem().unwrap()
    );
    let server = ScenarioServer::start(
        &chain_pem,
        &server_leaf.key.to_pkcs1_pem().unwrap(),
        None,
        ClientCertPolicy::None,
    )
    .unwrap();

    // An identity from a CA the server has never seen.
    let rogue_ca = util::generate_ca("rogue-ca");
    let identity = util::client_leaf(&rogue_ca, "credhub_test_client", Validity::for_hours(90));

    let dir = tempfile::tempdir().unwrap();
    let server_ca_path = write_pem(dir.path(), "server_ca_cert.pem", &server_ca.cert.to_pem().unwrap());
    let cert_path = write_pem(dir.path(), "client.pem", &identity.cert.to_pem().unwrap());
    let key_path = write_pem(dir.path(), "client_key.pem", &identity.key.to_pkcs1_pem().unwrap());

    let client = MtlsClient::build(&server_ca_path, &cert_path, &key_path).unwrap();
    let body = client
        .get(&format!("{}/api/v1/data", server.base_url()))
        .unwrap();
    assert_eq!(body, "{}");
}

/// Missing key material fails fast with a configuration error, before
/// any network attempt.
#[test]
fn missing_material_fails_before_any_network_attempt() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let present = write_pem(dir.path(), "ca.pem", "-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----");

    let err = MtlsClient::build(
        &present,
        &dir.path().join("missing.pem"),
        &dir.path().join("missing_key.pem"),
    )
    .unwrap_err();
    assert!(matches!(err, HarnessError::Configuration(_)));
}

/// Unparseable key material is also a configuration error.
#[test]
fn undecodable_material_is_a_configuration_error() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_pem(dir.path(), "ca.pem", "not pem at all");
    let cert = write_pem(dir.path(), "client.pem", "also not pem");
    let key = write_pem(dir.path(), "client_key.pem", "still not pem");

    let err = MtlsClient::build(&bundle, &cert, &key).unwrap_err();
    assert!(matches!(err, HarnessError::Configuration(_)));
}
