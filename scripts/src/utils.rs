//! Utilities for the option deployment scripts.

use std::{fs, path::Path, str::FromStr};

use serde_json::{json, Map, Value};
use starknet::{
    accounts::{ExecutionEncoding, SingleOwnerAccount},
    core::types::FieldElement,
    providers::{jsonrpc::HttpTransport, JsonRpcClient, Provider},
    signers::{LocalWallet, SigningKey},
};
use tracing::debug;
use url::Url;

use crate::{
    constants::{ADD_OPTIONS_TX_KEY, DEPLOYMENTS_KEY, OPTION_TOKENS_KEY},
    errors::ScriptError,
    types::{DeploymentResult, OptionSpec},
};

/// The account type the scripts sign transactions with
pub type StarknetAccount = SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>;

/// Parses a felt given either in `0x`-prefixed hex or in decimal
pub fn parse_felt(field: &str, value: &str) -> Result<FieldElement, ScriptError> {
    let value = value.trim();
    let parsed = if value.starts_with("0x") || value.starts_with("0X") {
        FieldElement::from_hex_be(value).map_err(|e| e.to_string())
    } else {
        FieldElement::from_dec_str(value).map_err(|e| e.to_string())
    };

    parsed.map_err(|e| ScriptError::Configuration(format!("invalid `{}` {:?}: {}", field, value, e)))
}

/// Sets up the account from which the scripts send transactions,
/// fetching the chain ID from the node at `rpc_url`.
pub async fn setup_account(
    rpc_url: &str,
    address: FieldElement,
    private_key: &str,
    legacy_account: bool,
) -> Result<StarknetAccount, ScriptError> {
    let url = Url::from_str(rpc_url).map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    let provider = JsonRpcClient::new(HttpTransport::new(url));

    let secret = FieldElement::from_hex_be(private_key)
        .map_err(|e| ScriptError::ClientInitialization(format!("invalid private key: {}", e)))?;
    let signer = LocalWallet::from(SigningKey::from_secret_scalar(secret));

    let chain_id = provider
        .chain_id()
        .await
        .map_err(|e| ScriptError::Network(format!("error fetching chain ID: {}", e)))?;
    debug!("Connected to chain {:#x}", chain_id);

    let encoding = if legacy_account {
        ExecutionEncoding::Legacy
    } else {
        ExecutionEncoding::New
    };

    Ok(SingleOwnerAccount::new(
        provider, signer, address, chain_id, encoding,
    ))
}

/// Reads the deployments file, or an empty object if it does not exist yet
fn read_deployments(file_path: &Path) -> Result<Value, ScriptError> {
    if !file_path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents =
        fs::read_to_string(file_path).map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
    serde_json::from_str(&contents).map_err(|e| ScriptError::WriteDeployments(e.to_string()))
}

/// Records the option tokens deployed in a run, and the `add_option`
/// multicall hash if it went through, in the deployments file.
///
/// Tokens are appended to those of previous runs, so that tokens orphaned by
/// an aborted run stay on record.
pub fn write_deployed_options(
    file_path: &Path,
    specs: &[OptionSpec],
    deployed: &[DeploymentResult],
    add_options_tx: Option<FieldElement>,
) -> Result<(), ScriptError> {
    let mut parsed_json = read_deployments(file_path)?;

    let deployments = parsed_json
        .as_object_mut()
        .ok_or_else(|| ScriptError::WriteDeployments("deployments file is not an object".into()))?
        .entry(DEPLOYMENTS_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    let deployments = deployments.as_object_mut().ok_or_else(|| {
        ScriptError::WriteDeployments(format!("`{}` is not an object", DEPLOYMENTS_KEY))
    })?;

    let tokens = deployments
        .entry(OPTION_TOKENS_KEY)
        .or_insert_with(|| Value::Array(vec![]));
    let tokens = tokens.as_array_mut().ok_or_else(|| {
        ScriptError::WriteDeployments(format!("`{}` is not an array", OPTION_TOKENS_KEY))
    })?;

    for result in deployed {
        let spec = specs.get(result.index).ok_or_else(|| {
            ScriptError::WriteDeployments(format!("no option spec #{}", result.index))
        })?;
        tokens.push(json!({
            "address": format!("{:#x}", result.address),
            "deploy_transaction": format!("{:#x}", result.transaction_hash),
            "option_type": spec.option_type.to_string(),
            "side": spec.side.to_string(),
            "strike_price": format!("{:#x}", spec.strike_price),
            "maturity": spec.maturity,
            "registered": add_options_tx.is_some(),
        }));
    }

    if let Some(tx) = add_options_tx {
        deployments.insert(ADD_OPTIONS_TX_KEY.to_string(), Value::String(format!("{:#x}", tx)));
    }

    let serialized = serde_json::to_string_pretty(&parsed_json)
        .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
    fs::write(file_path, serialized).map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use starknet::core::types::FieldElement;

    use crate::errors::ScriptError;

    use super::parse_felt;

    #[test]
    fn test_parse_felt_hex_and_decimal() {
        assert_eq!(parse_felt("x", "0x10").unwrap(), FieldElement::from(16_u64));
        assert_eq!(parse_felt("x", "16").unwrap(), FieldElement::from(16_u64));
        // Testnet quote token address, in decimal
        assert_eq!(
            parse_felt(
                "x",
                "159707947995249021625440365289670166666892266109381225273086299925265990694"
            )
            .unwrap(),
            FieldElement::from_hex_be(
                "0x5a643907b9a4bc6a55e9069c4fd5fd1f5c79a22470690f75556c4736e34426"
            )
            .unwrap()
        );
    }

    #[test]
    fn test_parse_felt_rejects_garbage() {
        assert!(matches!(
            parse_felt("amm_address", "0xnothex"),
            Err(ScriptError::Configuration(msg)) if msg.contains("amm_address")
        ));
    }
}
