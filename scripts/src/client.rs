//! The network capabilities the orchestrator depends on, and their
//! implementation over a Starknet JSON-RPC node

use std::{
    fmt::{self, Display},
    time::Duration,
};

use starknet::{
    accounts::{Account, AccountError, Call, ConnectedAccount},
    contract::ContractFactory,
    core::{
        types::{
            ExecutionResult, FieldElement, InvokeTransactionResult, MaybePendingTransactionReceipt,
            StarknetError, TransactionFinalityStatus,
        },
        utils::get_selector_from_name,
    },
    providers::{Provider, ProviderError},
};
use tracing::trace;

use crate::{
    errors::{ScriptError, TxFailure},
    types::{Finality, PreparedCall, SubmittedDeployment, TransactionStatus},
    utils::StarknetAccount,
};

/// An error returned by a [`NetworkClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The node refused the transaction
    Rejected(String),
    /// The node could not be reached, or answered garbage
    Transport(String),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Rejected(s) => write!(f, "rejected: {}", s),
            ClientError::Transport(s) => write!(f, "transport error: {}", s),
        }
    }
}

impl From<ClientError> for TxFailure {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Rejected(s) => TxFailure::Rejected(s),
            ClientError::Transport(s) => TxFailure::Network(s),
        }
    }
}

/// Builds a call to `function_name` on `to` without sending it
pub fn prepare_call(
    to: FieldElement,
    function_name: &str,
    calldata: Vec<FieldElement>,
) -> Result<PreparedCall, ScriptError> {
    let selector = get_selector_from_name(function_name).map_err(|e| {
        ScriptError::Configuration(format!("invalid function name {:?}: {}", function_name, e))
    })?;

    Ok(PreparedCall {
        to,
        selector,
        calldata,
    })
}

/// The network operations the option deployment depends on
#[allow(async_fn_in_trait)]
pub trait NetworkClient {
    /// Submits the deployment of a new instance of `class_hash`.
    ///
    /// Returns once the node has accepted the transaction for inclusion,
    /// not once it has been executed.
    async fn deploy(
        &self,
        class_hash: FieldElement,
        constructor_calldata: Vec<FieldElement>,
        max_fee: FieldElement,
    ) -> Result<SubmittedDeployment, ClientError>;

    /// Blocks until the transaction is executed, returning whether it succeeded
    async fn wait_for_acceptance(
        &self,
        transaction_hash: FieldElement,
    ) -> Result<TransactionStatus, ClientError>;

    /// Binds a call to its arguments without sending it
    fn prepare_call(
        &self,
        to: FieldElement,
        function_name: &str,
        calldata: Vec<FieldElement>,
    ) -> Result<PreparedCall, ScriptError> {
        prepare_call(to, function_name, calldata)
    }

    /// Submits every call in `calls`, in order, as a single transaction
    async fn execute_batch(
        &self,
        calls: Vec<PreparedCall>,
        max_fee: FieldElement,
    ) -> Result<FieldElement, ClientError>;
}

/// Maps an account error to a [`ClientError`], keeping node rejections
/// apart from transport failures
fn classify_account_error<S: Display>(err: AccountError<S>) -> ClientError {
    match err {
        AccountError::Provider(ProviderError::StarknetError(e)) => {
            ClientError::Rejected(format!("{:?}", e))
        }
        AccountError::Provider(e) => ClientError::Transport(e.to_string()),
        e => ClientError::Rejected(e.to_string()),
    }
}

/// A [`NetworkClient`] sending transactions from a single-owner account
/// through a JSON-RPC node
pub struct StarknetClient {
    /// The account signing every transaction
    account: StarknetAccount,
    /// The interval at which receipts are polled
    poll_interval: Duration,
}

impl StarknetClient {
    /// Wraps an account, polling receipts every `poll_interval`
    pub fn new(account: StarknetAccount, poll_interval: Duration) -> Self {
        Self {
            account,
            poll_interval,
        }
    }
}

impl NetworkClient for StarknetClient {
    async fn deploy(
        &self,
        class_hash: FieldElement,
        constructor_calldata: Vec<FieldElement>,
        max_fee: FieldElement,
    ) -> Result<SubmittedDeployment, ClientError> {
        let contract_factory = ContractFactory::new(class_hash, &self.account);
        let deployment = contract_factory
            .deploy(
                constructor_calldata,
                FieldElement::from(rand::random::<u64>()), /* salt */
                false,                                     /* unique */
            )
            .max_fee(max_fee);
        let address = deployment.deployed_address();

        let InvokeTransactionResult {
            transaction_hash, ..
        } = deployment.send().await.map_err(classify_account_error)?;
        trace!("Deploy transaction: {:#x}", transaction_hash);

        Ok(SubmittedDeployment {
            address,
            transaction_hash,
        })
    }

    async fn wait_for_acceptance(
        &self,
        transaction_hash: FieldElement,
    ) -> Result<TransactionStatus, ClientError> {
        loop {
            match self
                .account
                .provider()
                .get_transaction_receipt(transaction_hash)
                .await
            {
                Ok(MaybePendingTransactionReceipt::Receipt(receipt)) => {
                    trace!("Receipt: {:?}", receipt);
                    if let ExecutionResult::Reverted { reason } = receipt.execution_result() {
                        return Ok(TransactionStatus::Reverted(reason.clone()));
                    }

                    let finality = match receipt.finality_status() {
                        TransactionFinalityStatus::AcceptedOnL2 => Finality::AcceptedOnL2,
                        TransactionFinalityStatus::AcceptedOnL1 => Finality::AcceptedOnL1,
                    };
                    return Ok(TransactionStatus::Accepted(finality));
                }
                // Not in a block yet
                Ok(MaybePendingTransactionReceipt::PendingReceipt(_))
                | Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {}
                Err(e) => return Err(ClientError::Transport(e.to_string())),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn execute_batch(
        &self,
        calls: Vec<PreparedCall>,
        max_fee: FieldElement,
    ) -> Result<FieldElement, ClientError> {
        let calls: Vec<Call> = calls.into_iter().map(Call::from).collect();

        let InvokeTransactionResult {
            transaction_hash, ..
        } = self
            .account
            .execute(calls)
            .max_fee(max_fee)
            .send()
            .await
            .map_err(classify_account_error)?;
        trace!("Multicall transaction: {:#x}", transaction_hash);

        Ok(transaction_hash)
    }
}

#[cfg(test)]
mod tests {
    use starknet::core::{types::FieldElement, utils::get_selector_from_name};

    use crate::errors::TxFailure;

    use super::{prepare_call, ClientError};

    #[test]
    fn test_prepare_call_computes_selector() {
        let call = prepare_call(FieldElement::ONE, "add_option", vec![FieldElement::ZERO]).unwrap();

        assert_eq!(call.to, FieldElement::ONE);
        assert_eq!(call.selector, get_selector_from_name("add_option").unwrap());
        assert_eq!(call.calldata, vec![FieldElement::ZERO]);
    }

    #[test]
    fn test_client_error_kinds() {
        assert_eq!(
            TxFailure::from(ClientError::Rejected("fee".into())),
            TxFailure::Rejected("fee".into())
        );
        assert_eq!(
            TxFailure::from(ClientError::Transport("eof".into())),
            TxFailure::Network("eof".into())
        );
    }
}
