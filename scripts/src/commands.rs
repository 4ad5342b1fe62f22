//! Implementations of the deploy scripts

use itertools::Itertools;
use tracing::{error, info};

use crate::{
    abi::ContractAbis,
    cli::CreateOptionsArgs,
    client::StarknetClient,
    config::ConfigFile,
    errors::ScriptError,
    orchestrator::{plan, run},
    utils::{setup_account, write_deployed_options},
};

/// Deploys and lists every option of the config file, recording the deployed
/// tokens in the deployments file even when the run aborts
pub async fn create_options(args: CreateOptionsArgs) -> Result<(), ScriptError> {
    let ConfigFile { config, options } = ConfigFile::load(&args.config)?;
    let abis = ContractAbis::load(&config.amm_abi_path, &config.option_token_abi_path)?;

    // Fail on a missing LP token before anything is deployed
    let planned = plan(&config, &abis, &options)?;
    for (i, option) in planned.iter().enumerate() {
        info!(
            "Option #{}: {} (LP token {:#x})",
            i, option.spec, option.lp_token
        );
    }

    if args.dry_run {
        for (i, option) in planned.iter().enumerate() {
            info!(
                "Option #{} constructor calldata: [{}]",
                i,
                option
                    .constructor_calldata
                    .iter()
                    .map(|felt| format!("{:#x}", felt))
                    .join(", ")
            );
        }
        info!("Dry run, nothing was sent");
        return Ok(());
    }

    let private_key = args.private_key.ok_or_else(|| {
        ScriptError::Configuration("a private key is required to send transactions".to_string())
    })?;
    let rpc_url = args
        .rpc_url
        .or_else(|| config.rpc_url.clone())
        .ok_or_else(|| ScriptError::Configuration("no RPC URL configured".to_string()))?;

    let account = setup_account(
        &rpc_url,
        config.account_address,
        &private_key,
        config.legacy_account,
    )
    .await?;
    info!("Account created: {:#x}", config.account_address);

    let client = StarknetClient::new(account, config.timeouts.poll_interval);

    match run(&client, &config, &abis, &options).await {
        Ok(receipt) => {
            if let Some(path) = &args.deployments_path {
                write_deployed_options(
                    path,
                    &options,
                    &receipt.option_tokens,
                    Some(receipt.transaction_hash),
                )?;
            }

            info!(
                "Registered {} options with AMM {:#x}\n\
                Transaction hash: {:#x}\n\
                Status: {}",
                receipt.num_calls, config.amm_address, receipt.transaction_hash, receipt.status,
            );
            Ok(())
        }
        Err(e) => {
            if let Some(path) = &args.deployments_path {
                if !e.deployed().is_empty() {
                    if let Err(write_err) = write_deployed_options(path, &options, e.deployed(), None)
                    {
                        error!("Could not record orphaned option tokens: {}", write_err);
                    }
                }
            }
            Err(e)
        }
    }
}
