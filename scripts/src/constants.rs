//! Constants used in the option deployment scripts

use std::time::Duration;

/// The number of fractional bits in the AMM's 64.61 fixed point representation
pub const FIXED_POINT_PRECISION_BITS: u32 = 61;

/// The most fractional digits accepted in a decimal strike price
pub const MAX_DECIMAL_FRACTION_DIGITS: usize = 18;

/// The `name` constructor argument of every option token
pub const OPTION_TOKEN_NAME: u64 = 123456789;

/// The `symbol` constructor argument of every option token
pub const OPTION_TOKEN_SYMBOL: u64 = 1234;

/// The number of decimals of every option token
pub const OPTION_TOKEN_DECIMALS: u64 = 18;

/// The initial supply of every option token
pub const OPTION_TOKEN_INITIAL_SUPPLY: u128 = 0;

/// The default initial volatility, in whole percent, of a newly listed option
pub const DEFAULT_INITIAL_VOLATILITY: u64 = 80;

/// The default fee ceiling, in wei, of every transaction sent by the scripts
pub const DEFAULT_MAX_FEE: u128 = 10_000_000_000_000_000;

/// The name of the AMM function registering a new option
pub const ADD_OPTION_FN_NAME: &str = "add_option";

/// The name under which a contract's constructor appears in its ABI
pub const CONSTRUCTOR_FN_NAME: &str = "constructor";

/// How long to wait for a deployment transaction to be accepted
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(600);

/// How long to wait for the `add_option` multicall to be accepted
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(900);

/// How long to wait for a transaction submission to be answered by the node
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// The interval at which transaction receipts are polled
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The default number of retries of a receipt poll that failed to reach the node
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The backoff before the first retry, doubled on every subsequent retry
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// The deployments key in the deployments file
pub const DEPLOYMENTS_KEY: &str = "deployments";

/// The option tokens key in the deployments file
pub const OPTION_TOKENS_KEY: &str = "option_tokens";

/// The `add_option` multicall transaction hash key in the deployments file
pub const ADD_OPTIONS_TX_KEY: &str = "add_options_transaction";
