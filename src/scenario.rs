//! Per-scenario connection parameters.
//!
//! The original acceptance suite passed these through ambient suite-wide
//! globals populated in a before-each hook; here they are an explicit
//! value constructed once per scenario and threaded into each operation,
//! so concurrently running scenarios never share mutable state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::client::MtlsClient;
use crate::error::{HarnessError, Result};

/// Connection parameters for one scenario, loadable from a JSON config
/// file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    /// Base URL of the system under test, e.g. `https://localhost:8844`.
    pub api_url: String,
    /// Directory holding CA material handed over by earlier test steps
    /// (server CA bundle, client CA certificate and key).
    pub credential_root: PathBuf,
    /// Directory holding generated client certificates and keys.
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("certs")
}

impl ScenarioConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| HarnessError::Configuration(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| HarnessError::Configuration(format!("{}: {e}", path.display())))
    }
}

/// One scenario's view of the world. Owns no network state; clients are
/// built per request and discarded.
pub struct ScenarioContext {
    pub config: ScenarioConfig,
}

impl ScenarioContext {
    pub fn new(config: ScenarioConfig) -> Self {
        ScenarioContext { config }
    }

    pub fn load(config_path: &Path) -> Result<Self> {
        Ok(ScenarioContext::new(ScenarioConfig::load(config_path)?))
    }

    /// Path of a file under the credential root (CA material).
    pub fn credential_path(&self, name: &str) -> PathBuf {
        self.config.credential_root.join(name)
    }

    /// Path of a file under the generated-certificate directory.
    pub fn cert_path(&self, name: &str) -> PathBuf {
        self.config.cert_dir.join(name)
    }

    /// Builds an mTLS client from named material and performs one POST of
    /// an opaque JSON body against the configured API.
    pub fn mtls_post(
        &self,
        api_path: &str,
        body: &str,
        server_ca_file: &str,
        client_cert_file: &str,
        client_key_file: &str,
    ) -> Result<String> {
        let client = MtlsClient::build(
            &self.credential_path(server_ca_file),
            &self.cert_path(client_cert_file),
            &self.cert_path(client_key_file),
        )?;
        client.post(&format!("{}{}", self.config.api_url, api_path), body)
    }
}
