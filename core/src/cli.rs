//! # Command Line Interface
//!
//! This module defines command line interface for binaries. `Clap` is used
//! for easy generation of help messages and handling arguments.

use crate::config::RelayConfig;
use crate::errors::RelayError;
use crate::utils;
use clap::{Parser, Subcommand};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing::Level;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Perform genesis from the configured node if needed and keep proving
    /// new difficulty epochs until interrupted.
    Maintain,
    /// Verify a hex encoded header file offline and print every header.
    Inspect {
        /// File holding concatenated 80 byte headers, hex encoded.
        headers_file: PathBuf,
    },
}

/// Bitcoin SPV light relay
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// TOML formatted configuration file.
    #[arg(long, short)]
    pub config_file: Option<PathBuf>,
    /// Verbosity level, ranging from 0 (none) to 5 (highest)
    #[arg(short, long, default_value_t = 3)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

/// Parse all the command line arguments and generate an `Args`.
fn parse() -> Result<Args, RelayError> {
    parse_from(env::args())
}

/// Parse given iterator. This is good for isolated environments, like tests.
pub fn parse_from<I, T>(itr: I) -> Result<Args, RelayError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Args::try_parse_from(itr) {
        Ok(c) => Ok(c),
        Err(e) => Err(RelayError::ConfigError(e.to_string())),
    }
}

/// Maps the verbosity argument to a tracing level. 0 disables the default
/// directive and leaves filtering to `RUST_LOG`.
pub fn level_filter(verbose: u8) -> Option<LevelFilter> {
    match verbose {
        0 => None,
        other => Some(LevelFilter::from_level(
            Level::from_str(&other.to_string()).unwrap_or(Level::INFO),
        )),
    }
}

/// Parses CLI arguments and initializes the logger. If there are any errors,
/// prints error and exits the program.
pub fn get_args_from_cli() -> Args {
    let args = match parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            exit(1);
        }
    };

    if let Err(e) = utils::initialize_logger(level_filter(args.verbose)) {
        eprintln!("{e}");
        exit(1);
    }

    args
}

/// Reads the relay configuration, either from environment variables or from
/// the configuration file given in `args`.
///
/// Environment variables take precedence when all of the required ones are
/// set.
pub fn get_configuration(args: &Args) -> Result<RelayConfig, RelayError> {
    match RelayConfig::from_env() {
        Ok(config) => {
            tracing::info!(
                "All the environment variables are set. Using them instead of configuration file..."
            );

            return Ok(config);
        }
        Err(RelayError::EnvVarNotSet(_, var)) => {
            tracing::info!(
                "Environment variable {var} is not set, using configuration file..."
            );
        }
        Err(e) => return Err(e),
    }

    let Some(config_file) = args.config_file.clone() else {
        return Err(RelayError::ConfigError(
            "Neither environment variables are set nor a configuration file is provided"
                .to_string(),
        ));
    };

    RelayConfig::try_parse_file(config_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// With help message flag, we should see the help message. Shocking.
    #[test]
    fn help_message() {
        match parse_from(vec!["lightrelay", "--help"]) {
            Ok(_) => panic!("expected configuration error"),
            Err(RelayError::ConfigError(e)) => println!("{e}"),
            e => panic!("unexpected error {e:#?}"),
        }
    }

    /// With version flag, we should see the program version read from
    /// `Cargo.toml`.
    #[test]
    fn version() {
        match parse_from(vec!["lightrelay", "--version"]) {
            Ok(_) => panic!("expected configuration error"),
            Err(RelayError::ConfigError(e)) => println!("{e}"),
            e => panic!("unexpected error {e:#?}"),
        }
    }

    #[test]
    fn subcommands() {
        let args = parse_from(vec!["lightrelay", "-c", "relay.toml", "maintain"]).unwrap();
        assert_eq!(args.command, Command::Maintain);
        assert_eq!(args.config_file, Some(PathBuf::from("relay.toml")));
        assert_eq!(args.verbose, 3);

        let args =
            parse_from(vec!["lightrelay", "--verbose", "5", "inspect", "headers.hex"]).unwrap();
        assert_eq!(
            args.command,
            Command::Inspect {
                headers_file: PathBuf::from("headers.hex")
            }
        );
        assert_eq!(args.config_file, None);
        assert_eq!(args.verbose, 5);

        assert!(parse_from(vec!["lightrelay"]).is_err());
        assert!(parse_from(vec!["lightrelay", "inspect"]).is_err());
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_filter(0), None);
        assert_eq!(level_filter(1), Some(LevelFilter::ERROR));
        assert_eq!(level_filter(3), Some(LevelFilter::INFO));
        assert_eq!(level_filter(5), Some(LevelFilter::TRACE));
        assert_eq!(level_filter(9), Some(LevelFilter::INFO));
    }

    #[test]
    #[serial_test::serial]
    fn configuration_needs_a_source() {
        std::env::remove_var("NETWORK");
        let args = parse_from(vec!["lightrelay", "maintain"]).unwrap();
        assert!(matches!(
            get_configuration(&args),
            Err(RelayError::ConfigError(_))
        ));
    }
}
