use certharness::cert::params::{
    CertificateRequest, ExtendedKeyUsageOption, KeyUsageOption, Validity,
};
use certharness::issuer::CertificateWithKey;
use certharness::key::KeyPair;

#[allow(dead_code)]
pub fn generate_ca(common_name: &str) -> CertificateWithKey {
    let request = ca_request(common_name);
    CertificateWithKey::self_signed(&request, KeyPair::generate(2048).unwrap()).unwrap()
}

#[allow(dead_code)]
pub fn ca_request(common_name: &str) -> CertificateRequest {
    CertificateRequest::builder()
        .common_name(common_name.to_string())
        .validity(Validity::for_hours(8760))
        .is_ca(true)
        .key_usage(vec![KeyUsageOption::KeyCertSign, KeyUsageOption::CrlSign])
        .build()
}

/// A server leaf with a `localhost` SAN, suitable for the scenario
/// server.
#[allow(dead_code)]
pub fn server_leaf(ca: &CertificateWithKey) -> CertificateWithKey {
    let request = CertificateRequest::builder()
        .common_name("localhost".to_string())
        .validity(Validity::for_hours(90))
        .key_usage(vec![
            KeyUsageOption::DigitalSignature,
            KeyUsageOption::KeyEncipherment,
        ])
        .extended_key_usage(vec![ExtendedKeyUsageOption::ServerAuth])
        .alternative_names(vec!["localhost".to_string()])
        .build();
    ca.issue_with_new_key(&request, 2048).unwrap()
}

/// A client leaf signed by `ca` with the given validity window.
#[allow(dead_code)]
pub fn client_leaf(
    ca: &CertificateWithKey,
    common_name: &str,
    validity: Validity,
) -> CertificateWithKey {
    let request = CertificateRequest::builder()
        .common_name(common_name.to_string())
        .validity(validity)
        .key_usage(vec![KeyUsageOption::DigitalSignature])
        .extended_key_usage(vec![ExtendedKeyUsageOption::ClientAuth])
        .build();
    ca.issue_with_new_key(&request, 2048).unwrap()
}
