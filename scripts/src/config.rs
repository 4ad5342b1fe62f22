//! Loading and validation of the deployment configuration file

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use starknet::core::types::FieldElement;

use crate::{
    constants::{
        DEFAULT_BATCH_TIMEOUT, DEFAULT_DEPLOY_TIMEOUT, DEFAULT_INITIAL_BACKOFF,
        DEFAULT_INITIAL_VOLATILITY, DEFAULT_MAX_FEE, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL,
        DEFAULT_SUBMIT_TIMEOUT,
    },
    errors::ScriptError,
    types::{
        decimal_to_fixed_point, to_fixed_point, u128_to_felt, OptionSide, OptionSpec, OptionType,
    },
    utils::parse_felt,
};

// --------------
// | Raw Config |
// --------------

/// The configuration file as written on disk
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    /// The node RPC URL
    #[serde(default)]
    rpc_url: Option<String>,
    /// The account sending every transaction
    account_address: String,
    /// The AMM the options are listed on
    amm_address: String,
    /// The declared option token class
    option_token_class_hash: String,
    /// The fee ceiling of every transaction, in wei
    #[serde(default)]
    max_fee: Option<String>,
    /// The quote token address
    quote_token_address: String,
    /// The base token address
    base_token_address: String,
    /// The initial volatility, in whole percent
    #[serde(default = "default_initial_volatility")]
    initial_volatility: u64,
    /// The AMM ABI, relative to the config file
    amm_abi_path: PathBuf,
    /// The option token ABI, relative to the config file
    option_token_abi_path: PathBuf,
    /// The LP tokens of every known AMM
    lp_tokens: Vec<RawLpTokens>,
    /// The options to deploy, in order
    options: Vec<RawOptionSpec>,
    /// Network wait bounds
    #[serde(default)]
    timeouts: RawTimeouts,
    /// Receipt poll retries
    #[serde(default)]
    retry: RawRetryPolicy,
    /// Whether the account uses the Cairo 0 `__execute__` encoding
    #[serde(default)]
    legacy_account: bool,
}

/// The initial volatility used when the config does not set one
fn default_initial_volatility() -> u64 {
    DEFAULT_INITIAL_VOLATILITY
}

/// The LP tokens of a single AMM
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLpTokens {
    /// The AMM address
    amm: String,
    /// The LP token of the call pool
    call: Option<String>,
    /// The LP token of the put pool
    put: Option<String>,
}

/// A strike price in quote token units
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStrike {
    /// A whole number, e.g. `1300`
    Whole(u64),
    /// A decimal string, e.g. `"1350.5"`
    Decimal(String),
}

/// An option as written in the config
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptionSpec {
    /// Call or put
    option_type: OptionType,
    /// The strike in quote token units, converted to 64.61 fixed point
    #[serde(default)]
    strike_price: Option<RawStrike>,
    /// The strike already in 64.61 fixed point, in hex or decimal
    #[serde(default)]
    strike_price_raw: Option<String>,
    /// The maturity as a unix timestamp
    maturity: u64,
    /// Long or short
    side: OptionSide,
}

impl RawOptionSpec {
    /// The strike price in 64.61 fixed point
    fn fixed_point_strike(&self) -> Result<u128, String> {
        match (&self.strike_price, &self.strike_price_raw) {
            (Some(RawStrike::Whole(whole)), None) => Ok(to_fixed_point(*whole)),
            (Some(RawStrike::Decimal(decimal)), None) => decimal_to_fixed_point(decimal),
            (None, Some(raw)) => {
                let raw = raw.trim();
                match raw.strip_prefix("0x") {
                    Some(hex) => u128::from_str_radix(hex, 16),
                    None => raw.parse::<u128>(),
                }
                .map_err(|e| format!("invalid `strike_price_raw` {:?}: {}", raw, e))
            }
            (Some(_), Some(_)) => {
                Err("`strike_price` and `strike_price_raw` are mutually exclusive".to_string())
            }
            (None, None) => Err("missing `strike_price`".to_string()),
        }
    }
}

/// Network wait bounds as written in the config
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTimeouts {
    /// Bound on a single submission, in seconds
    submit_secs: Option<u64>,
    /// Bound on a deployment wait, in seconds
    deploy_secs: Option<u64>,
    /// Bound on the multicall wait, in seconds
    batch_secs: Option<u64>,
    /// Interval between receipt polls, in milliseconds
    poll_interval_ms: Option<u64>,
}

/// Receipt poll retries as written in the config
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetryPolicy {
    /// Number of retries after the first attempt
    max_retries: Option<u32>,
    /// Backoff before the first retry, in milliseconds
    initial_backoff_ms: Option<u64>,
}

// ----------------
// | Typed Config |
// ----------------

/// Bounds on how long the scripts wait on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on a single transaction submission
    pub submit: Duration,
    /// Bound on waiting for a deployment to be accepted
    pub deploy: Duration,
    /// Bound on waiting for the `add_option` multicall to be accepted
    pub batch: Duration,
    /// Interval between receipt polls
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            submit: DEFAULT_SUBMIT_TIMEOUT,
            deploy: DEFAULT_DEPLOY_TIMEOUT,
            batch: DEFAULT_BATCH_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Retries of receipt polls that failed to reach the node.
///
/// Transaction submissions are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry, doubled on each further retry
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// A policy that surfaces the first failure
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    /// The backoff before retry number `attempt` (starting at 0)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2_u32.saturating_pow(attempt))
    }
}

/// An LP token registered for an AMM and option type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpTokenEntry {
    /// The AMM the pool belongs to
    pub amm: FieldElement,
    /// The option type the pool underwrites
    pub option_type: OptionType,
    /// The LP token address
    pub lp_token: FieldElement,
}

/// The LP token of every (AMM, option type) pool known to the scripts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LpTokenTable(
    /// The table entries
    Vec<LpTokenEntry>,
);

impl LpTokenTable {
    /// Builds a table from its entries
    pub fn new(entries: Vec<LpTokenEntry>) -> Self {
        Self(entries)
    }

    /// Looks up the LP token of the `option_type` pool of `amm`
    pub fn lookup(
        &self,
        amm: FieldElement,
        option_type: OptionType,
    ) -> Result<FieldElement, ScriptError> {
        self.0
            .iter()
            .find(|entry| entry.amm == amm && entry.option_type == option_type)
            .map(|entry| entry.lp_token)
            .ok_or_else(|| {
                ScriptError::Configuration(format!(
                    "no {} LP token configured for AMM {:#x}",
                    option_type, amm
                ))
            })
    }
}

/// Everything the orchestrator needs besides the list of options
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// The node RPC URL, may be overridden from the command line
    pub rpc_url: Option<String>,
    /// The account sending every transaction
    pub account_address: FieldElement,
    /// The AMM the options are listed on
    pub amm_address: FieldElement,
    /// The declared class of the option token contract
    pub option_token_class_hash: FieldElement,
    /// The fee ceiling of every transaction
    pub max_fee: FieldElement,
    /// The quote token of the listed options
    pub quote_token_address: FieldElement,
    /// The base token of the listed options
    pub base_token_address: FieldElement,
    /// The initial volatility of listed options, in 64.61 fixed point
    pub initial_volatility: u128,
    /// The AMM ABI file
    pub amm_abi_path: PathBuf,
    /// The option token ABI file
    pub option_token_abi_path: PathBuf,
    /// The LP token lookup table
    pub lp_tokens: LpTokenTable,
    /// Network wait bounds
    pub timeouts: Timeouts,
    /// Retry policy of receipt polls
    pub retry: RetryPolicy,
    /// Whether the account uses the Cairo 0 `__execute__` encoding
    pub legacy_account: bool,
}

impl DeploymentConfig {
    /// The initial volatility as a felt
    pub fn initial_volatility_felt(&self) -> FieldElement {
        u128_to_felt(self.initial_volatility)
    }
}

/// A parsed configuration file: the deployment config and the options to list
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// The deployment config
    pub config: DeploymentConfig,
    /// The options to deploy and list, in order
    pub options: Vec<OptionSpec>,
}

impl ConfigFile {
    /// Reads and validates a configuration file.
    ///
    /// Relative ABI paths are resolved against the directory of the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ScriptError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        Self::from_json_str(&contents, base_dir)
    }

    /// Parses and validates a configuration given as a JSON string
    pub fn from_json_str(json: &str, base_dir: &Path) -> Result<Self, ScriptError> {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| ScriptError::Configuration(format!("malformed config: {}", e)))?;

        let max_fee = match &raw.max_fee {
            Some(fee) => parse_felt("max_fee", fee)?,
            None => u128_to_felt(DEFAULT_MAX_FEE),
        };
        if max_fee == FieldElement::ZERO {
            return Err(ScriptError::Configuration(
                "`max_fee` must be non-zero".to_string(),
            ));
        }

        let mut lp_entries = Vec::new();
        for pools in &raw.lp_tokens {
            let amm = parse_felt("lp_tokens.amm", &pools.amm)?;
            let pools_by_type = [(OptionType::Call, &pools.call), (OptionType::Put, &pools.put)];
            for (option_type, lp_token) in pools_by_type {
                if let Some(lp_token) = lp_token {
                    lp_entries.push(LpTokenEntry {
                        amm,
                        option_type,
                        lp_token: parse_felt("lp_tokens", lp_token)?,
                    });
                }
            }
        }

        let options = raw
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| {
                let strike_price = option.fixed_point_strike().map_err(|e| {
                    ScriptError::Configuration(format!("option #{}: {}", i, e))
                })?;
                if strike_price == 0 {
                    return Err(ScriptError::Configuration(format!(
                        "option #{} has a zero strike price",
                        i
                    )));
                }
                if option.maturity == 0 {
                    return Err(ScriptError::Configuration(format!(
                        "option #{} has no maturity",
                        i
                    )));
                }

                Ok(OptionSpec {
                    option_type: option.option_type,
                    strike_price,
                    maturity: option.maturity,
                    side: option.side,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            submit: raw.timeouts.submit_secs.map(Duration::from_secs).unwrap_or(defaults.submit),
            deploy: raw.timeouts.deploy_secs.map(Duration::from_secs).unwrap_or(defaults.deploy),
            batch: raw.timeouts.batch_secs.map(Duration::from_secs).unwrap_or(defaults.batch),
            poll_interval: raw
                .timeouts
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        };

        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: raw.retry.max_retries.unwrap_or(default_retry.max_retries),
            initial_backoff: raw
                .retry
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(default_retry.initial_backoff),
        };

        let config = DeploymentConfig {
            rpc_url: raw.rpc_url,
            account_address: parse_felt("account_address", &raw.account_address)?,
            amm_address: parse_felt("amm_address", &raw.amm_address)?,
            option_token_class_hash: parse_felt(
                "option_token_class_hash",
                &raw.option_token_class_hash,
            )?,
            max_fee,
            quote_token_address: parse_felt("quote_token_address", &raw.quote_token_address)?,
            base_token_address: parse_felt("base_token_address", &raw.base_token_address)?,
            initial_volatility: to_fixed_point(raw.initial_volatility),
            amm_abi_path: base_dir.join(raw.amm_abi_path),
            option_token_abi_path: base_dir.join(raw.option_token_abi_path),
            lp_tokens: LpTokenTable::new(lp_entries),
            timeouts,
            retry,
            legacy_account: raw.legacy_account,
        };

        Ok(Self { config, options })
    }
}
