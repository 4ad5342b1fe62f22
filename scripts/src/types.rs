//! Type definitions used throughout the scripts

use std::fmt::{self, Display};

use serde::Deserialize;
use starknet::{accounts::Call, core::types::FieldElement};

use crate::constants::{FIXED_POINT_PRECISION_BITS, MAX_DECIMAL_FRACTION_DIGITS};

/// The type of an option, as understood by the AMM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// A call option
    Call,
    /// A put option
    Put,
}

impl OptionType {
    /// The on-chain encoding of the option type
    pub fn to_felt(self) -> FieldElement {
        match self {
            OptionType::Call => FieldElement::ZERO,
            OptionType::Put => FieldElement::ONE,
        }
    }
}

impl Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// The side of an option position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionSide {
    /// Side `0`
    Long,
    /// Side `1`
    Short,
}

impl OptionSide {
    /// The on-chain encoding of the option side
    pub fn to_felt(self) -> FieldElement {
        match self {
            OptionSide::Long => FieldElement::ZERO,
            OptionSide::Short => FieldElement::ONE,
        }
    }
}

impl Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionSide::Long => write!(f, "long"),
            OptionSide::Short => write!(f, "short"),
        }
    }
}

/// A single option instrument to deploy a token for and list on the AMM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    /// Call or put
    pub option_type: OptionType,
    /// The strike price in 64.61 fixed point
    pub strike_price: u128,
    /// The maturity as a unix timestamp
    pub maturity: u64,
    /// Long or short
    pub side: OptionSide,
}

impl Display for OptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} strike={} maturity={}",
            self.side,
            self.option_type,
            self.strike_price >> FIXED_POINT_PRECISION_BITS,
            self.maturity
        )
    }
}

/// The finality an accepted transaction reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    /// Accepted by the sequencer on L2
    AcceptedOnL2,
    /// Proven and accepted on L1
    AcceptedOnL1,
}

impl Display for Finality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finality::AcceptedOnL2 => write!(f, "ACCEPTED_ON_L2"),
            Finality::AcceptedOnL1 => write!(f, "ACCEPTED_ON_L1"),
        }
    }
}

/// The outcome of waiting on a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// The transaction executed successfully
    Accepted(Finality),
    /// The transaction was included but reverted
    Reverted(String),
}

/// A transaction submitted to the network which has not been waited on yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedDeployment {
    /// The address the contract will live at once the deployment is accepted
    pub address: FieldElement,
    /// The hash of the deployment transaction
    pub transaction_hash: FieldElement,
}

/// An option token whose deployment was accepted by the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentResult {
    /// Index of the option spec the token was deployed for
    pub index: usize,
    /// The address of the option token
    pub address: FieldElement,
    /// The hash of the deployment transaction
    pub transaction_hash: FieldElement,
    /// The finality the deployment reached
    pub status: Finality,
}

/// A contract invocation bound to its arguments but not yet sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    /// The contract being called
    pub to: FieldElement,
    /// The selector of the function being called
    pub selector: FieldElement,
    /// The serialized arguments
    pub calldata: Vec<FieldElement>,
}

impl From<PreparedCall> for Call {
    fn from(call: PreparedCall) -> Self {
        Call {
            to: call.to,
            selector: call.selector,
            calldata: call.calldata,
        }
    }
}

/// The receipt of the accepted `add_option` multicall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// The hash of the multicall transaction
    pub transaction_hash: FieldElement,
    /// The finality the multicall reached
    pub status: Finality,
    /// The number of calls bundled into the transaction
    pub num_calls: usize,
    /// The option tokens the multicall registered, in call order
    pub option_tokens: Vec<DeploymentResult>,
}

/// Converts a whole number to the AMM's 64.61 fixed point representation
pub fn to_fixed_point(whole: u64) -> u128 {
    (whole as u128) << FIXED_POINT_PRECISION_BITS
}

/// Converts a non-negative decimal such as `1350.5` to 64.61 fixed point.
///
/// Fractions without an exact binary representation (e.g. `0.05`) are
/// truncated to the nearest 2^-61 below.
pub fn decimal_to_fixed_point(value: &str) -> Result<u128, String> {
    let value = value.trim();
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err("empty decimal".to_string());
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(format!("{:?} is not a non-negative decimal", value));
    }
    if fraction.len() > MAX_DECIMAL_FRACTION_DIGITS {
        return Err(format!(
            "{:?} has more than {} fractional digits",
            value, MAX_DECIMAL_FRACTION_DIGITS
        ));
    }

    let whole: u64 = match whole {
        "" => 0,
        digits => digits.parse().map_err(|e| format!("{:?}: {}", value, e))?,
    };
    let fraction_bits = match fraction {
        "" => 0,
        digits => {
            let numerator: u128 = digits.parse().map_err(|e| format!("{:?}: {}", value, e))?;
            (numerator << FIXED_POINT_PRECISION_BITS) / 10_u128.pow(digits.len() as u32)
        }
    };

    Ok(to_fixed_point(whole) + fraction_bits)
}

/// Converts a `u128` to a field element
pub fn u128_to_felt(value: u128) -> FieldElement {
    let two_pow_64 = FieldElement::from(u64::MAX) + FieldElement::ONE;
    FieldElement::from((value >> 64) as u64) * two_pow_64 + FieldElement::from(value as u64)
}

#[cfg(test)]
mod tests {
    use starknet::core::types::FieldElement;

    use super::{decimal_to_fixed_point, to_fixed_point, u128_to_felt, OptionSide, OptionType};

    #[test]
    fn test_fixed_point_matches_amm_constants() {
        // Values used by the AMM for a 1300 strike and an 80% volatility
        assert_eq!(to_fixed_point(1300), 2997595911977802137600);
        assert_eq!(to_fixed_point(80), 184467440737095516160);
    }

    #[test]
    fn test_decimal_to_fixed_point() {
        assert_eq!(decimal_to_fixed_point("1300"), Ok(to_fixed_point(1300)));
        assert_eq!(
            decimal_to_fixed_point("1350.5"),
            Ok(to_fixed_point(1350) + (1 << 60))
        );
        assert_eq!(decimal_to_fixed_point(".25"), Ok(1 << 59));
        // 2^61 / 20, truncated
        assert_eq!(decimal_to_fixed_point("0.05"), Ok(115292150460684697));

        assert!(decimal_to_fixed_point("").is_err());
        assert!(decimal_to_fixed_point("-1").is_err());
        assert!(decimal_to_fixed_point("1.2.3").is_err());
        assert!(decimal_to_fixed_point("1e3").is_err());
        assert!(decimal_to_fixed_point("0.0000000000000000001").is_err());
    }

    #[test]
    fn test_u128_to_felt() {
        let value = to_fixed_point(1800);
        assert_eq!(
            u128_to_felt(value),
            FieldElement::from_dec_str("4150517416584649113600").unwrap()
        );
        assert_eq!(u128_to_felt(0), FieldElement::ZERO);
        assert_eq!(
            u128_to_felt(u128::MAX),
            FieldElement::from_dec_str("340282366920938463463374607431768211455").unwrap()
        );
    }

    #[test]
    fn test_onchain_encodings() {
        assert_eq!(OptionType::Call.to_felt(), FieldElement::ZERO);
        assert_eq!(OptionType::Put.to_felt(), FieldElement::ONE);
        assert_eq!(OptionSide::Long.to_felt(), FieldElement::ZERO);
        assert_eq!(OptionSide::Short.to_felt(), FieldElement::ONE);
    }
}
