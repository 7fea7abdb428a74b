//! # Environment Variable Support For [`RelayConfig`]

use super::{MaintainerConfig, RelayConfig, TelemetryConfig};
use crate::errors::RelayError;
use alloy_primitives::Address;
use std::{fmt::Display, str::FromStr};

pub(crate) fn read_string_from_env(env_var: &'static str) -> Result<String, RelayError> {
    std::env::var(env_var).map_err(|e| RelayError::EnvVarNotSet(e, env_var))
}

pub(crate) fn read_string_from_env_then_parse<T: FromStr>(
    env_var: &'static str,
) -> Result<T, RelayError>
where
    <T as FromStr>::Err: Display,
{
    read_string_from_env(env_var)?
        .parse::<T>()
        .map_err(|e| RelayError::EnvVarMalformed(env_var, e.to_string()))
}

/// Like [`read_string_from_env_then_parse`] but an unset variable is `None`.
fn read_optional_from_env<T: FromStr>(env_var: &'static str) -> Result<Option<T>, RelayError>
where
    <T as FromStr>::Err: Display,
{
    match read_string_from_env_then_parse(env_var) {
        Ok(value) => Ok(Some(value)),
        Err(RelayError::EnvVarNotSet(_, _)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn read_address_list_from_env(env_var: &'static str) -> Result<Vec<Address>, RelayError> {
    let Ok(list) = std::env::var(env_var) else {
        return Ok(Vec::new());
    };

    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            Address::from_str(entry)
                .map_err(|e| RelayError::EnvVarMalformed(env_var, format!("{entry}: {e}")))
        })
        .collect()
}

impl MaintainerConfig {
    pub fn from_env() -> Result<Self, RelayError> {
        let defaults = MaintainerConfig::default();

        Ok(MaintainerConfig {
            idle_backoff_secs: read_optional_from_env("MAINTAINER_IDLE_BACKOFF_SECS")?
                .unwrap_or(defaults.idle_backoff_secs),
            restart_backoff_secs: read_optional_from_env("MAINTAINER_RESTART_BACKOFF_SECS")?
                .unwrap_or(defaults.restart_backoff_secs),
            rpc_retry_count: read_optional_from_env("MAINTAINER_RPC_RETRY_COUNT")?
                .unwrap_or(defaults.rpc_retry_count),
        })
    }
}

impl TelemetryConfig {
    /// Telemetry is enabled when `TELEMETRY_HOST` or `TELEMETRY_PORT` is set.
    pub fn from_env() -> Result<Option<Self>, RelayError> {
        let host = read_optional_from_env::<String>("TELEMETRY_HOST")?;
        let port = read_optional_from_env::<u16>("TELEMETRY_PORT")?;
        if host.is_none() && port.is_none() {
            return Ok(None);
        }

        let defaults = TelemetryConfig::default();
        Ok(Some(TelemetryConfig {
            host: host.unwrap_or(defaults.host),
            port: port.unwrap_or(defaults.port),
        }))
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, RelayError> {
        let config = RelayConfig {
            network: read_string_from_env_then_parse("NETWORK")?,
            owner: read_string_from_env_then_parse("OWNER_ADDRESS")?,
            submitter: read_string_from_env_then_parse("SUBMITTER_ADDRESS")?,
            genesis_height: read_string_from_env_then_parse("GENESIS_HEIGHT")?,
            proof_length: read_string_from_env_then_parse("PROOF_LENGTH")?,
            authorization_required: read_optional_from_env("AUTHORIZATION_REQUIRED")?
                .unwrap_or(false),
            authorized_submitters: read_address_list_from_env("AUTHORIZED_SUBMITTERS")?,
            history_window: read_optional_from_env("HISTORY_WINDOW")?,
            snapshot_path: read_optional_from_env("SNAPSHOT_PATH")?,

            bitcoin_rpc_url: read_string_from_env("BITCOIN_RPC_URL")?,
            bitcoin_rpc_user: read_string_from_env("BITCOIN_RPC_USER")?.into(),
            bitcoin_rpc_password: read_string_from_env("BITCOIN_RPC_PASSWORD")?.into(),

            maintainer: MaintainerConfig::from_env()?,
            telemetry: TelemetryConfig::from_env()?,
        };
        config.validate()?;

        tracing::debug!("Relay configuration read from environment: {:?}", config);

        Ok(config)
    }
}
