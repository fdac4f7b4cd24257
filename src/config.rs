//! Runtime configuration, built once in `main` and passed to every component.

use crate::abi::Address;
use crate::error::{Error, Result};
use crate::parse::Args;
use log::warn;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub registry: Option<Address>,
    pub badge: Option<Address>,
    pub gateway: Option<String>,
    pub upload_url: String,
    pub fetch_timeout: Duration,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: defaults::rpc_url(None),
            registry: None,
            badge: None,
            gateway: None,
            upload_url: defaults::upload_url(),
            fetch_timeout: Duration::from_secs(defaults::TIMEOUT_SECS),
            max_concurrent: defaults::MAX_CONCURRENT,
            max_retries: 0,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            show_progress: false,
        }
    }
}

impl Config {
    pub(crate) fn from_args(args: &Args) -> Result<Self> {
        if args.client_id.as_deref().is_none_or(str::is_empty) {
            warn!("Missing THIRDWEB_CLIENT_ID");
        }
        let rpc_url = match args.rpc_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => url.to_string(),
            None => defaults::rpc_url(args.client_id.as_deref()),
        };

        Ok(Self {
            rpc_url,
            registry: parse_optional_address("registry", args.registry.as_deref())?,
            badge: parse_optional_address("badge", args.badge.as_deref())?,
            gateway: args.gateway.clone().filter(|g| !g.is_empty()),
            upload_url: args.upload_url.clone().unwrap_or_else(defaults::upload_url),
            fetch_timeout: Duration::from_secs(args.timeout_secs.max(1)),
            max_concurrent: args.concurrent.max(1),
            max_retries: args.retries,
            retry_delay_ms: args.retry_delay_ms,
            show_progress: !args.quiet,
        })
    }

    pub fn registry(&self) -> Result<&Address> {
        self.registry
            .as_ref()
            .ok_or_else(|| Error::Config("Contract address not configured".into()))
    }

    pub fn badge(&self) -> Result<&Address> {
        self.badge
            .as_ref()
            .ok_or_else(|| Error::Config("Badge contract address not configured".into()))
    }
}

fn parse_optional_address(what: &str, value: Option<&str>) -> Result<Option<Address>> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => Address::parse(v)
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {what} address: {e}"))),
    }
}

mod defaults {
    /// Sepolia.
    pub const CHAIN_ID: u64 = 11_155_111;
    pub const TIMEOUT_SECS: u64 = 10;
    pub const MAX_CONCURRENT: usize = 8;
    pub const RETRY_DELAY_MS: u64 = 500;

    pub fn rpc_url(client_id: Option<&str>) -> String {
        match client_id.filter(|c| !c.is_empty()) {
            Some(id) => format!("https://{CHAIN_ID}.rpc.thirdweb.com/{id}"),
            None => "https://ethereum-sepolia-rpc.publicnode.com".into(),
        }
    }

    pub fn upload_url() -> String {
        "http://localhost:3000/api/files".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["plantsoul"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["legacy", "1"]);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_rpc_url_from_client_id() {
        let config = Config::from_args(&args(&["--client-id", "abc123", "--rpc-url", ""])).unwrap();
        assert_eq!(config.rpc_url, "https://11155111.rpc.thirdweb.com/abc123");
    }

    #[test]
    fn test_explicit_rpc_url_wins() {
        let config = Config::from_args(&args(&[
            "--client-id",
            "abc123",
            "--rpc-url",
            "http://127.0.0.1:8545",
        ]))
        .unwrap();
        assert_eq!(config.rpc_url, "http://127.0.0.1:8545");
    }

    #[test]
    fn test_invalid_registry_is_config_error() {
        let err = Config::from_args(&args(&["--registry", "0x12"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_registry_reported() {
        let config = Config::from_args(&args(&["--registry", ""])).unwrap();
        assert_eq!(
            config.registry().unwrap_err().to_string(),
            "config error: Contract address not configured"
        );
    }

    #[test]
    fn test_flag_defaults_match_config_defaults() {
        let from_flags = Config::from_args(&args(&[])).unwrap();
        let defaults = Config::default();
        assert_eq!(from_flags.fetch_timeout, defaults.fetch_timeout);
        assert_eq!(from_flags.max_concurrent, defaults.max_concurrent);
        assert_eq!(from_flags.max_retries, defaults.max_retries);
        assert_eq!(from_flags.retry_delay_ms, defaults.retry_delay_ms);
    }
}
