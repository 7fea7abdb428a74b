//! # Configuration Options
//!
//! This module defines configuration options.
//!
//! This module is base for `cli` module and not dependent on it. Therefore,
//! this module can be used independently.
//!
//! ## Configuration File
//!
//! Configuration options can be read from a TOML file. File contents are
//! described in `RelayConfig` struct.

use crate::errors::RelayError;
use alloy_primitives::Address;
use bitcoin::Network;
use header_chain::common::constants::BLOCKS_PER_EPOCH;
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use std::{fs::File, io::Read, path::PathBuf};

pub mod env;

/// Configuration options for the relay and its maintainer.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Bitcoin network whose difficulty the relay follows.
    pub network: Network,
    /// Owner of the relay. Performs genesis and administration.
    pub owner: Address,
    /// Identity the maintainer submits difficulty proofs with.
    pub submitter: Address,
    /// Height of the genesis header. Must be the first block of an epoch.
    pub genesis_height: u64,
    /// Headers required on each side of a retarget.
    pub proof_length: u64,
    /// Whether only authorized submitters may prove new epochs.
    #[serde(default)]
    pub authorization_required: bool,
    /// Submitters authorized at startup.
    #[serde(default)]
    pub authorized_submitters: Vec<Address>,
    /// Number of epochs to keep. Unbounded if not set.
    pub history_window: Option<usize>,
    /// Relay state is restored from and saved to this file, if set.
    pub snapshot_path: Option<PathBuf>,

    /// Bitcoin remote procedure call URL.
    pub bitcoin_rpc_url: String,
    /// Bitcoin RPC user.
    pub bitcoin_rpc_user: SecretString,
    /// Bitcoin RPC user password.
    pub bitcoin_rpc_password: SecretString,

    #[serde(default)]
    pub maintainer: MaintainerConfig,

    /// Telemetry configuration
    pub telemetry: Option<TelemetryConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaintainerConfig {
    /// Wait between polls when the next epoch can't be proven yet.
    pub idle_backoff_secs: u64,
    /// Wait before retrying after a failed attempt.
    pub restart_backoff_secs: u64,
    /// Retries for a single Bitcoin RPC call.
    pub rpc_retry_count: usize,
}

impl MaintainerConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_secs(self.restart_backoff_secs)
    }
}

impl Default for MaintainerConfig {
    fn default() -> Self {
        Self {
            idle_backoff_secs: 60,
            restart_backoff_secs: 120,
            rpc_retry_count: 5,
        }
    }
}

/// Configuration for the metrics endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    pub host: String,
    pub port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

impl RelayConfig {
    /// Create a new `RelayConfig` with default values.
    pub fn new() -> Self {
        RelayConfig {
            ..Default::default()
        }
    }

    /// Read contents of a TOML file and generate a `RelayConfig`.
    pub fn try_parse_file(path: PathBuf) -> Result<Self, RelayError> {
        let mut contents = String::new();

        let mut file = match File::open(path.clone()) {
            Ok(f) => f,
            Err(e) => return Err(RelayError::ConfigError(e.to_string())),
        };

        if let Err(e) = file.read_to_string(&mut contents) {
            return Err(RelayError::ConfigError(e.to_string()));
        }

        tracing::trace!("Using configuration file: {:?}", path);

        RelayConfig::try_parse_from(contents)
    }

    /// Try to parse a `RelayConfig` from given TOML formatted string and
    /// generate a `RelayConfig`.
    pub fn try_parse_from(input: String) -> Result<Self, RelayError> {
        let config = match toml::from_str::<RelayConfig>(&input) {
            Ok(c) => c,
            Err(e) => return Err(RelayError::ConfigError(e.to_string())),
        };
        config.validate()?;

        Ok(config)
    }

    /// Rejects values the relay would refuse at genesis anyway.
    pub fn validate(&self) -> Result<(), RelayError> {
        let mut misconfigs = Vec::new();

        if self.genesis_height % BLOCKS_PER_EPOCH != 0 {
            misconfigs.push(format!(
                "genesis_height {} is not the first block of an epoch",
                self.genesis_height
            ));
        }
        if self.proof_length == 0 || self.proof_length >= BLOCKS_PER_EPOCH {
            misconfigs.push(format!(
                "proof_length {} must be between 1 and 2015",
                self.proof_length
            ));
        }
        if self.authorization_required
            && !self.authorized_submitters.contains(&self.submitter)
        {
            misconfigs.push("submitter is not in authorized_submitters".to_string());
        }

        if !misconfigs.is_empty() {
            return Err(RelayError::ConfigError(format!(
                "Invalid relay configuration: {:?}",
                misconfigs
            )));
        }

        Ok(())
    }
}

// only needed for tests
#[cfg(test)]
impl PartialEq for RelayConfig {
    fn eq(&self, other: &Self) -> bool {
        use secrecy::ExposeSecret;

        self.network == other.network
            && self.owner == other.owner
            && self.submitter == other.submitter
            && self.genesis_height == other.genesis_height
            && self.proof_length == other.proof_length
            && self.authorization_required == other.authorization_required
            && self.authorized_submitters == other.authorized_submitters
            && self.history_window == other.history_window
            && self.snapshot_path == other.snapshot_path
            && self.bitcoin_rpc_url == other.bitcoin_rpc_url
            && self.bitcoin_rpc_user.expose_secret() == other.bitcoin_rpc_user.expose_secret()
            && self.bitcoin_rpc_password.expose_secret()
                == other.bitcoin_rpc_password.expose_secret()
            && self.maintainer == other.maintainer
            && self.telemetry == other.telemetry
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            network: Network::Regtest,
            owner: Address::repeat_byte(0x11),
            submitter: Address::repeat_byte(0x22),
            genesis_height: 0,
            proof_length: 6,
            authorization_required: false,
            authorized_submitters: Vec::new(),
            history_window: None,
            snapshot_path: None,

            bitcoin_rpc_url: "http://127.0.0.1:18443".to_string(),
            bitcoin_rpc_user: "admin".to_string().into(),
            bitcoin_rpc_password: "admin".to_string().into(),

            maintainer: MaintainerConfig::default(),
            telemetry: Some(TelemetryConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RelayConfig;
    use crate::errors::RelayError;
    use alloy_primitives::Address;
    use bitcoin::Network;
    use std::io::Write;

    const CONFIG: &str = r#"
        network = "signet"
        owner = "0x1111111111111111111111111111111111111111"
        submitter = "0x2222222222222222222222222222222222222222"
        genesis_height = 201600
        proof_length = 20
        authorization_required = true
        authorized_submitters = ["0x2222222222222222222222222222222222222222"]
        history_window = 12
        bitcoin_rpc_url = "http://127.0.0.1:38332"
        bitcoin_rpc_user = "relay"
        bitcoin_rpc_password = "hunter2"

        [maintainer]
        idle_backoff_secs = 30

        [telemetry]
        host = "127.0.0.1"
        port = 9100
    "#;

    #[test]
    fn parse_from_string() {
        // In case of a incorrect file content, we should receive an error.
        let content = "brokenfilecontent";
        assert!(RelayConfig::try_parse_from(content.to_string()).is_err());

        let config = RelayConfig::try_parse_from(CONFIG.to_string()).unwrap();
        assert_eq!(config.network, Network::Signet);
        assert_eq!(config.owner, Address::repeat_byte(0x11));
        assert_eq!(config.genesis_height, 201600);
        assert_eq!(config.history_window, Some(12));
        assert_eq!(config.maintainer.idle_backoff_secs, 30);
        // Unset maintainer options keep their defaults.
        assert_eq!(config.maintainer.restart_backoff_secs, 120);
        assert_eq!(config.telemetry.as_ref().unwrap().port, 9100);
    }

    #[test]
    fn parse_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let from_file = RelayConfig::try_parse_file(file.path().to_path_buf()).unwrap();
        let from_str = RelayConfig::try_parse_from(CONFIG.to_string()).unwrap();
        assert_eq!(from_file, from_str);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RelayConfig::try_parse_file(dir.path().join("missing.toml")),
            Err(RelayError::ConfigError(_))
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let content = CONFIG.replace("genesis_height = 201600", "genesis_height = 201601");
        assert!(matches!(
            RelayConfig::try_parse_from(content),
            Err(RelayError::ConfigError(_))
        ));

        let content = CONFIG.replace("proof_length = 20", "proof_length = 0");
        assert!(RelayConfig::try_parse_from(content).is_err());

        let content = CONFIG.replace(
            "authorized_submitters = [\"0x2222222222222222222222222222222222222222\"]",
            "authorized_submitters = []",
        );
        assert!(RelayConfig::try_parse_from(content).is_err());
    }

    #[test]
    fn default_config_is_valid() {
        RelayConfig::new().validate().unwrap();
    }
}
