//! TOML configuration.
//!
//! ```toml
//! [rpc]
//! url = "https://api.mainnet-beta.solana.com"
//!
//! [[pools]]
//! type = "cpmm"
//! address = "..."
//!
//! [[routes]]
//! pools = ["...", "...", "..."]
//! token_a = "So11111111111111111111111111111111111111112"
//! token_b = "..."
//! token_c = "..."
//! amount_atomic = 1000000000
//! ```

use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::broadcaster::BroadcastOptions;
use crate::flashloan::LendingAccounts;
use crate::hydration::HydrationOptions;
use crate::leg_simulator::SimulationPolicy;
use crate::pool::RawPoolRecord;
use crate::rate_limiter::BackoffPolicy;

/// Signing key path override.
pub const KEYPAIR_PATH_ENV: &str = "ARB_KEYPAIR_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {detail}")]
    Invalid { field: String, detail: String },
}

impl ConfigError {
    pub fn reason(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config-read",
            ConfigError::Parse(_) => "config-parse",
            ConfigError::Invalid { .. } => "config-invalid",
        }
    }

    fn invalid(field: impl Into<String>, detail: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub hydration: HydrationConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub flashloan: Option<FlashloanConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pools: Vec<RawPoolRecord>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
    /// Minimum spacing between batched reads.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_min_request_interval_ms() -> u64 {
    100
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HydrationConfig {
    pub batch_size: usize,
    pub force_refresh: bool,
    pub max_concurrent_batches: usize,
    pub max_rate_limit_retries: u32,
    pub resolve_decimals: bool,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_max_exponent: u32,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        let options = HydrationOptions::default();
        let backoff = BackoffPolicy::default();
        Self {
            batch_size: options.batch_size,
            force_refresh: options.force_refresh,
            max_concurrent_batches: options.max_concurrent_batches,
            max_rate_limit_retries: options.max_rate_limit_retries,
            resolve_decimals: options.resolve_decimals,
            backoff_base_ms: backoff.base_ms,
            backoff_max_ms: backoff.max_ms,
            backoff_max_exponent: backoff.max_exponent,
        }
    }
}

impl HydrationConfig {
    pub fn options(&self) -> HydrationOptions {
        HydrationOptions {
            batch_size: self.batch_size,
            force_refresh: self.force_refresh,
            max_concurrent_batches: self.max_concurrent_batches,
            max_rate_limit_retries: self.max_rate_limit_retries,
            resolve_decimals: self.resolve_decimals,
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_ms: self.backoff_base_ms,
            max_ms: self.backoff_max_ms,
            max_exponent: self.backoff_max_exponent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub prefer_sdk: bool,
    pub math_fallback: bool,
    pub slippage_bps: u16,
    pub quote_timeout_ms: u64,
    /// Default per-leg impact bound for routes that set none.
    pub max_impact_pct: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let policy = SimulationPolicy::default();
        Self {
            prefer_sdk: policy.prefer_sdk,
            math_fallback: policy.math_fallback,
            slippage_bps: policy.slippage_bps,
            quote_timeout_ms: 5_000,
            max_impact_pct: 5.0,
        }
    }
}

impl SimulationConfig {
    pub fn policy(&self) -> SimulationPolicy {
        SimulationPolicy {
            prefer_sdk: self.prefer_sdk,
            math_fallback: self.math_fallback,
            slippage_bps: self.slippage_bps,
        }
    }

    pub fn quote_timeout(&self) -> Duration {
        Duration::from_millis(self.quote_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub enabled: bool,
    pub keypair_path: Option<String>,
    pub skip_preflight: bool,
    pub max_retries: usize,
    pub skip_confirm: bool,
    pub confirm_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub compute_unit_limit: Option<u32>,
    pub compute_unit_price: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let broadcast = BroadcastOptions::default();
        Self {
            enabled: false,
            keypair_path: None,
            skip_preflight: broadcast.skip_preflight,
            max_retries: broadcast.max_retries,
            skip_confirm: broadcast.skip_confirm,
            confirm_timeout_ms: broadcast.confirm_timeout.as_millis() as u64,
            poll_interval_ms: broadcast.poll_interval.as_millis() as u64,
            compute_unit_limit: Some(400_000),
            compute_unit_price: None,
        }
    }
}

impl ExecutionConfig {
    pub fn broadcast_options(&self) -> BroadcastOptions {
        BroadcastOptions {
            skip_preflight: self.skip_preflight,
            max_retries: self.max_retries,
            skip_confirm: self.skip_confirm,
            confirm_timeout: Duration::from_millis(self.confirm_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// `ARB_KEYPAIR_PATH` wins over `keypair_path`.
    pub fn resolve_keypair_path(&self) -> Option<String> {
        std::env::var(KEYPAIR_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| self.keypair_path.clone())
    }
}

/// Token-lending reserve used for flash loans. Absent section means the
/// provider is unconfigured.
#[derive(Debug, Clone, Deserialize)]
pub struct FlashloanConfig {
    pub program_id: String,
    pub lending_market: String,
    pub reserve: String,
    pub liquidity_mint: String,
    pub liquidity_supply: String,
    pub fee_receiver: String,
    pub host_fee_receiver: Option<String>,
    #[serde(default = "default_borrow_tag")]
    pub borrow_tag: u8,
    #[serde(default = "default_repay_tag")]
    pub repay_tag: u8,
}

fn default_borrow_tag() -> u8 {
    19
}

fn default_repay_tag() -> u8 {
    20
}

impl FlashloanConfig {
    pub fn lending_accounts(&self) -> Result<LendingAccounts, ConfigError> {
        Ok(LendingAccounts {
            program_id: parse_pubkey("flashloan.program_id", &self.program_id)?,
            lending_market: parse_pubkey("flashloan.lending_market", &self.lending_market)?,
            reserve: parse_pubkey("flashloan.reserve", &self.reserve)?,
            liquidity_mint: parse_pubkey("flashloan.liquidity_mint", &self.liquidity_mint)?,
            liquidity_supply: parse_pubkey("flashloan.liquidity_supply", &self.liquidity_supply)?,
            fee_receiver: parse_pubkey("flashloan.fee_receiver", &self.fee_receiver)?,
            host_fee_receiver: self
                .host_fee_receiver
                .as_deref()
                .map(|k| parse_pubkey("flashloan.host_fee_receiver", k))
                .transpose()?,
            borrow_tag: self.borrow_tag,
            repay_tag: self.repay_tag,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is unset.
    pub level: String,
    pub dir: String,
    pub file: String,
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: "solana-tri-arb.log".to_string(),
            json_file: true,
        }
    }
}

/// One triangle to simulate.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub name: Option<String>,
    pub pools: Vec<String>,
    #[serde(alias = "tokenA")]
    pub token_a: Option<String>,
    #[serde(alias = "tokenB")]
    pub token_b: Option<String>,
    #[serde(alias = "tokenC")]
    pub token_c: Option<String>,
    #[serde(alias = "dxAtomic")]
    pub amount_atomic: u64,
    pub max_impact_pct: Option<f64>,
    #[serde(default)]
    pub execute: bool,
}

impl RouteConfig {
    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("route-{}", index + 1))
    }

    pub fn pool_addresses(&self) -> Result<Vec<Pubkey>, ConfigError> {
        self.pools
            .iter()
            .map(|p| parse_pubkey("routes.pools", p))
            .collect()
    }

    /// `(tokenA, tokenB, tokenC)`; a missing token stays `None` so the
    /// simulator reports it.
    pub fn tokens(&self) -> Result<[Option<Pubkey>; 3], ConfigError> {
        let parse = |field: &str, v: &Option<String>| {
            v.as_deref().map(|k| parse_pubkey(field, k)).transpose()
        };
        Ok([
            parse("routes.token_a", &self.token_a)?,
            parse("routes.token_b", &self.token_b)?,
            parse("routes.token_c", &self.token_c)?,
        ])
    }
}

pub fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey, ConfigError> {
    Pubkey::from_str(value.trim()).map_err(|e| ConfigError::invalid(field, format!("'{}': {}", value, e)))
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.rpc.url)
            .map_err(|e| ConfigError::invalid("rpc.url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "rpc.url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if self.rpc.timeout_ms == 0 {
            return Err(ConfigError::invalid("rpc.timeout_ms", "must be > 0"));
        }

        if self.hydration.batch_size == 0 {
            return Err(ConfigError::invalid("hydration.batch_size", "must be > 0"));
        }
        if self.hydration.max_concurrent_batches == 0 {
            return Err(ConfigError::invalid("hydration.max_concurrent_batches", "must be > 0"));
        }
        if self.hydration.backoff_base_ms == 0 || self.hydration.backoff_max_ms < self.hydration.backoff_base_ms {
            return Err(ConfigError::invalid(
                "hydration.backoff",
                "need 0 < backoff_base_ms <= backoff_max_ms",
            ));
        }

        if self.simulation.slippage_bps > 10_000 {
            return Err(ConfigError::invalid("simulation.slippage_bps", "must be <= 10000"));
        }
        check_impact("simulation.max_impact_pct", self.simulation.max_impact_pct)?;

        for (i, route) in self.routes.iter().enumerate() {
            let field = format!("routes[{}]", i);
            if route.pools.len() != 3 {
                return Err(ConfigError::invalid(
                    field,
                    format!("expected 3 pools, got {}", route.pools.len()),
                ));
            }
            route.pool_addresses()?;
            route.tokens()?;
            if let Some(max) = route.max_impact_pct {
                check_impact(&format!("{}.max_impact_pct", field), max)?;
            }
        }

        if let Some(flashloan) = &self.flashloan {
            flashloan.lending_accounts()?;
        }
        if self.execution.enabled {
            if self.execution.resolve_keypair_path().is_none() {
                return Err(ConfigError::invalid(
                    "execution.keypair_path",
                    format!("required when execution is enabled (or set {})", KEYPAIR_PATH_ENV),
                ));
            }
            if self.flashloan.is_none() {
                return Err(ConfigError::invalid("flashloan", "required when execution is enabled"));
            }
        }
        Ok(())
    }
}

fn check_impact(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(field, format!("must be a finite non-negative number, got {}", value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOL: &str = "So11111111111111111111111111111111111111112";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn minimal() -> String {
        r#"
[rpc]
url = "https://api.mainnet-beta.solana.com"
"#
        .to_string()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str(&minimal()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.hydration.batch_size, 100);
        assert_eq!(config.hydration.backoff_policy(), BackoffPolicy::default());
        assert!(config.simulation.prefer_sdk);
        assert!(!config.simulation.math_fallback);
        assert!(config.execution.broadcast_options().skip_preflight);
        assert_eq!(config.execution.broadcast_options().max_retries, 0);
        assert!(config.flashloan.is_none());
        assert_eq!(config.rpc.commitment, "confirmed");
    }

    #[test]
    fn test_pools_and_routes() {
        let toml = format!(
            r#"{}
[[pools]]
type = "cpmm"
address = "{sol}"
baseMint = "{sol}"
quoteMint = "{usdc}"
feeBps = 25

[[routes]]
name = "sol-usdc-x"
pools = ["{sol}", "{usdc}", "{sol}"]
tokenA = "{sol}"
token_b = "{usdc}"
amount_atomic = 1000000000
"#,
            minimal(),
            sol = SOL,
            usdc = USDC
        );
        let config = Config::from_toml_str(&toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.pools[0].type_tag.as_deref(), Some("cpmm"));
        assert_eq!(config.pools[0].fee_bps, Some(25));

        let route = &config.routes[0];
        let [a, b, c] = route.tokens().unwrap();
        assert_eq!(a, Some(Pubkey::from_str(SOL).unwrap()));
        assert!(b.is_some());
        assert_eq!(c, None);
        assert_eq!(route.pool_addresses().unwrap().len(), 3);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_url = r#"
[rpc]
url = "ws://localhost:8900"
"#;
        let err = Config::from_toml_str(bad_url).unwrap().validate().unwrap_err();
        assert_eq!(err.reason(), "config-invalid");

        let bad_route = format!(
            "{}\n[[routes]]\npools = [\"{}\"]\namount_atomic = 1\n",
            minimal(),
            SOL
        );
        assert!(Config::from_toml_str(&bad_route).unwrap().validate().is_err());

        let execution_without_flashloan = format!(
            "{}\n[execution]\nenabled = true\nkeypair_path = \"/tmp/id.json\"\n",
            minimal()
        );
        assert!(Config::from_toml_str(&execution_without_flashloan)
            .unwrap()
            .validate()
            .is_err());
    }
}
