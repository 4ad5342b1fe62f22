//! Deploys an option token per option spec and lists all of them on the AMM
//! in a single multicall.
//!
//! Deployments are sequential: the `add_option` call of an option is only
//! prepared once its token deployment has been accepted. A failure aborts the
//! run, and submissions are never retried. Tokens deployed before the failure
//! stay deployed, and are reported in the returned error.

use std::{future::Future, time::Duration};

use starknet::core::types::FieldElement;
use tracing::{debug, info, warn};

use crate::{
    abi::{CallArgs, ContractAbis},
    client::{ClientError, NetworkClient},
    config::{DeploymentConfig, RetryPolicy},
    constants::{
        ADD_OPTION_FN_NAME, CONSTRUCTOR_FN_NAME, OPTION_TOKEN_DECIMALS,
        OPTION_TOKEN_INITIAL_SUPPLY, OPTION_TOKEN_NAME, OPTION_TOKEN_SYMBOL,
    },
    errors::{ScriptError, TxFailure},
    types::{
        u128_to_felt, DeploymentResult, Finality, OptionSpec, TransactionReceipt,
        TransactionStatus,
    },
};

/// An option whose deployment has been fully prepared offline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOption {
    /// The option
    pub spec: OptionSpec,
    /// The LP token of the pool the option is listed in
    pub lp_token: FieldElement,
    /// The option token constructor calldata
    pub constructor_calldata: Vec<FieldElement>,
}

/// Serializes the option token constructor arguments for `spec`
pub fn option_token_calldata(
    config: &DeploymentConfig,
    abis: &ContractAbis,
    spec: &OptionSpec,
) -> Result<Vec<FieldElement>, ScriptError> {
    let args = CallArgs::new()
        .felt("name", FieldElement::from(OPTION_TOKEN_NAME))
        .felt("symbol", FieldElement::from(OPTION_TOKEN_SYMBOL))
        .felt("decimals", FieldElement::from(OPTION_TOKEN_DECIMALS))
        .u256("initial_supply", OPTION_TOKEN_INITIAL_SUPPLY)
        .felt("recipient", config.amm_address)
        .felt("owner", config.amm_address)
        .felt("quote_token_address", config.quote_token_address)
        .felt("base_token_address", config.base_token_address)
        .felt("option_type", spec.option_type.to_felt())
        .felt("strike_price", u128_to_felt(spec.strike_price))
        .felt("maturity", FieldElement::from(spec.maturity))
        .felt("side", spec.side.to_felt());

    abis.option_token.encode_calldata(CONSTRUCTOR_FN_NAME, &args)
}

/// Serializes the `add_option` arguments listing `option_token` on the AMM
pub fn add_option_calldata(
    config: &DeploymentConfig,
    abis: &ContractAbis,
    spec: &OptionSpec,
    lp_token: FieldElement,
    option_token: FieldElement,
) -> Result<Vec<FieldElement>, ScriptError> {
    let args = CallArgs::new()
        .felt("option_side", spec.side.to_felt())
        .felt("maturity", FieldElement::from(spec.maturity))
        .felt("strike_price", u128_to_felt(spec.strike_price))
        .felt("quote_token_address", config.quote_token_address)
        .felt("base_token_address", config.base_token_address)
        .felt("option_type", spec.option_type.to_felt())
        .felt("lptoken_address", lp_token)
        .felt("option_token_address_", option_token)
        .felt("initial_volatility", config.initial_volatility_felt());

    abis.amm.encode_calldata(ADD_OPTION_FN_NAME, &args)
}

/// Resolves the LP token and constructor calldata of every option without
/// touching the network, failing on the first option that cannot be deployed
/// or registered
pub fn plan(
    config: &DeploymentConfig,
    abis: &ContractAbis,
    specs: &[OptionSpec],
) -> Result<Vec<PlannedOption>, ScriptError> {
    if specs.is_empty() {
        return Err(ScriptError::Configuration("no options to deploy".to_string()));
    }

    specs
        .iter()
        .map(|spec| plan_option(config, abis, spec))
        .collect()
}

/// Resolves the LP token and constructor calldata of `spec`, and checks its
/// `add_option` arguments against the AMM ABI
fn plan_option(
    config: &DeploymentConfig,
    abis: &ContractAbis,
    spec: &OptionSpec,
) -> Result<PlannedOption, ScriptError> {
    let lp_token = config.lp_tokens.lookup(config.amm_address, spec.option_type)?;
    let constructor_calldata = option_token_calldata(config, abis, spec)?;
    // The token address is only known once deployed
    add_option_calldata(config, abis, spec, lp_token, FieldElement::ZERO)?;

    Ok(PlannedOption {
        spec: *spec,
        lp_token,
        constructor_calldata,
    })
}

/// Deploys a token for every spec, in order, then registers all of them with
/// the AMM in a single transaction.
///
/// An option that cannot be deployed or registered as configured (no LP token
/// for the AMM, arguments the ABIs do not accept) aborts the run before its
/// deployment is submitted.
pub async fn run<C: NetworkClient>(
    client: &C,
    config: &DeploymentConfig,
    abis: &ContractAbis,
    specs: &[OptionSpec],
) -> Result<TransactionReceipt, ScriptError> {
    if specs.is_empty() {
        return Err(ScriptError::Configuration("no options to deploy".to_string()));
    }

    let mut deployed: Vec<DeploymentResult> = Vec::with_capacity(specs.len());
    let mut calls = Vec::with_capacity(specs.len());

    info!("Starting to process {} options", specs.len());
    for (index, spec) in specs.iter().enumerate() {
        info!("Processing option #{}: {}", index, spec);

        let PlannedOption {
            lp_token,
            constructor_calldata,
            ..
        } = match plan_option(config, abis, spec) {
            Ok(planned) => planned,
            Err(e) => return Err(invalid_option(index, e, deployed)),
        };
        debug!("Constructor calldata: {:?}", constructor_calldata);

        let result = match deploy_option_token(client, config, index, constructor_calldata).await {
            Ok(result) => result,
            Err(failure) => {
                warn_orphans(&deployed);
                return Err(ScriptError::Deployment {
                    index,
                    failure,
                    deployed,
                });
            }
        };
        info!(
            "Option token deployed: {:#x} ({})",
            result.address, result.status
        );
        deployed.push(result);

        let call = add_option_calldata(config, abis, spec, lp_token, result.address).and_then(
            |calldata| client.prepare_call(config.amm_address, ADD_OPTION_FN_NAME, calldata),
        );
        match call {
            Ok(call) => calls.push(call),
            Err(e) => return Err(invalid_option(index, e, deployed)),
        }
        info!("Call prepared: {}", spec);
    }

    let num_calls = calls.len();
    info!("Starting to execute the multicall of {} calls", num_calls);
    let submission = with_timeout(
        config.timeouts.submit,
        client.execute_batch(calls, config.max_fee),
    )
    .await;
    let transaction_hash = match submission {
        Ok(hash) => hash,
        Err(failure) => return Err(batch_failure(failure, deployed)),
    };
    info!("Multicall submitted: {:#x}", transaction_hash);

    let status = match await_acceptance(
        client,
        transaction_hash,
        &config.retry,
        config.timeouts.batch,
    )
    .await
    {
        Ok(status) => status,
        Err(failure) => return Err(batch_failure(failure, deployed)),
    };
    info!("Multicall executed ({})", status);

    Ok(TransactionReceipt {
        transaction_hash,
        status,
        num_calls,
        option_tokens: deployed,
    })
}

/// Submits the deployment of the option token at `index` and waits for it to
/// be accepted
async fn deploy_option_token<C: NetworkClient>(
    client: &C,
    config: &DeploymentConfig,
    index: usize,
    constructor_calldata: Vec<FieldElement>,
) -> Result<DeploymentResult, TxFailure> {
    let submitted = with_timeout(
        config.timeouts.submit,
        client.deploy(
            config.option_token_class_hash,
            constructor_calldata,
            config.max_fee,
        ),
    )
    .await?;
    debug!(
        "Deployment of option #{} submitted: {:#x}",
        index, submitted.transaction_hash
    );

    let status = await_acceptance(
        client,
        submitted.transaction_hash,
        &config.retry,
        config.timeouts.deploy,
    )
    .await?;

    Ok(DeploymentResult {
        index,
        address: submitted.address,
        transaction_hash: submitted.transaction_hash,
        status,
    })
}

/// Bounds a single network request by `limit`
async fn with_timeout<T>(
    limit: Duration,
    request: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, TxFailure> {
    match tokio::time::timeout(limit, request).await {
        Ok(res) => res.map_err(TxFailure::from),
        Err(_) => Err(TxFailure::TimedOut(limit)),
    }
}

/// Waits for a transaction to be accepted, retrying polls that failed to
/// reach the node, for at most `limit` overall
async fn await_acceptance<C: NetworkClient>(
    client: &C,
    transaction_hash: FieldElement,
    retry: &RetryPolicy,
    limit: Duration,
) -> Result<Finality, TxFailure> {
    let wait = async {
        let mut attempt = 0;
        loop {
            match client.wait_for_acceptance(transaction_hash).await {
                Ok(TransactionStatus::Accepted(finality)) => return Ok(finality),
                Ok(TransactionStatus::Reverted(reason)) => {
                    return Err(TxFailure::Rejected(format!("reverted: {}", reason)))
                }
                Err(ClientError::Transport(e)) if attempt < retry.max_retries => {
                    let backoff = retry.backoff(attempt);
                    warn!(
                        "Polling {:#x} failed ({}), retrying in {:?}",
                        transaction_hash, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    match tokio::time::timeout(limit, wait).await {
        Ok(res) => res,
        Err(_) => Err(TxFailure::TimedOut(limit)),
    }
}

/// Wraps a failure of the `add_option` multicall
fn batch_failure(failure: TxFailure, deployed: Vec<DeploymentResult>) -> ScriptError {
    warn!(
        "{} option tokens are deployed but not registered with the AMM",
        deployed.len()
    );
    ScriptError::BatchSubmission { failure, deployed }
}

/// Wraps an error that makes the option at `index` impossible to deploy or
/// register, keeping track of the tokens deployed before it
fn invalid_option(index: usize, err: ScriptError, deployed: Vec<DeploymentResult>) -> ScriptError {
    let reason = match err {
        ScriptError::Configuration(reason) => reason,
        e => e.to_string(),
    };

    warn_orphans(&deployed);
    ScriptError::InvalidOption {
        index,
        reason,
        deployed,
    }
}

/// Logs every token the run deployed but will not register
fn warn_orphans(deployed: &[DeploymentResult]) {
    for result in deployed {
        warn!(
            "Option token {:#x} (option #{}) was deployed but will not be registered",
            result.address, result.index
        );
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use starknet::core::types::FieldElement;

    use crate::{
        abi::{ContractAbi, ContractAbis},
        config::{DeploymentConfig, LpTokenEntry, LpTokenTable, RetryPolicy, Timeouts},
        errors::ScriptError,
        types::{to_fixed_point, OptionSide, OptionSpec, OptionType},
    };

    use super::{add_option_calldata, plan};

    fn abis() -> ContractAbis {
        ContractAbis::new(
            ContractAbi::from_json_str(include_str!("../config/abi/amm_abi.json")).unwrap(),
            ContractAbi::from_json_str(include_str!("../config/abi/option_token_abi.json"))
                .unwrap(),
        )
        .unwrap()
    }

    fn config() -> DeploymentConfig {
        let amm = FieldElement::from(0xa11_u64);
        DeploymentConfig {
            rpc_url: None,
            account_address: FieldElement::ONE,
            amm_address: amm,
            option_token_class_hash: FieldElement::from(0xc1a55_u64),
            max_fee: FieldElement::from(1000_u64),
            quote_token_address: FieldElement::from(0x40_u64),
            base_token_address: FieldElement::from(0x50_u64),
            initial_volatility: to_fixed_point(80),
            amm_abi_path: PathBuf::new(),
            option_token_abi_path: PathBuf::new(),
            lp_tokens: LpTokenTable::new(vec![LpTokenEntry {
                amm,
                option_type: OptionType::Put,
                lp_token: FieldElement::from(0x1b_u64),
            }]),
            timeouts: Timeouts::default(),
            retry: RetryPolicy::none(),
            legacy_account: true,
        }
    }

    fn put(strike: u64) -> OptionSpec {
        OptionSpec {
            option_type: OptionType::Put,
            strike_price: to_fixed_point(strike),
            maturity: 1677196799,
            side: OptionSide::Short,
        }
    }

    #[test]
    fn test_plan_builds_constructor_calldata() {
        let planned = plan(&config(), &abis(), &[put(1300)]).unwrap();

        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].lp_token, FieldElement::from(0x1b_u64));

        let calldata = &planned[0].constructor_calldata;
        // name, symbol, decimals, supply (2), recipient, owner, quote, base, type, strike, maturity, side
        assert_eq!(calldata.len(), 13);
        assert_eq!(calldata[5], FieldElement::from(0xa11_u64));
        assert_eq!(calldata[6], FieldElement::from(0xa11_u64));
        assert_eq!(calldata[9], FieldElement::ONE);
        assert_eq!(
            calldata[10],
            FieldElement::from_dec_str("2997595911977802137600").unwrap()
        );
        assert_eq!(calldata[12], FieldElement::ONE);
    }

    #[test]
    fn test_plan_requires_lp_token() {
        let call = OptionSpec {
            option_type: OptionType::Call,
            ..put(1500)
        };

        assert!(matches!(
            plan(&config(), &abis(), &[put(1300), call]),
            Err(ScriptError::Configuration(_))
        ));
        assert!(matches!(
            plan(&config(), &abis(), &[]),
            Err(ScriptError::Configuration(_))
        ));
    }

    #[test]
    fn test_plan_checks_add_option_abi() {
        let abis = ContractAbis::new(
            ContractAbi::from_json_str(include_str!("../tests/fixtures/amm_abi_fee_rate.json"))
                .unwrap(),
            ContractAbi::from_json_str(include_str!("../config/abi/option_token_abi.json"))
                .unwrap(),
        )
        .unwrap();

        assert!(matches!(
            plan(&config(), &abis, &[put(1300)]),
            Err(ScriptError::Configuration(msg)) if msg.contains("fee_rate")
        ));
    }

    #[test]
    fn test_add_option_calldata() {
        let option_token = FieldElement::from(0x70_u64);
        let calldata = add_option_calldata(
            &config(),
            &abis(),
            &put(1400),
            FieldElement::from(0x1b_u64),
            option_token,
        )
        .unwrap();

        assert_eq!(calldata.len(), 9);
        assert_eq!(calldata[0], FieldElement::ONE);
        assert_eq!(calldata[6], FieldElement::from(0x1b_u64));
        assert_eq!(calldata[7], option_token);
        assert_eq!(
            calldata[8],
            FieldElement::from_dec_str("184467440737095516160").unwrap()
        );
    }
}
