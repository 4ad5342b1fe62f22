//! Definitions of errors that can occur during the execution of the option deployment scripts

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    time::Duration,
};

use itertools::Itertools;

use crate::types::DeploymentResult;

/// The reason a transaction submitted by the scripts did not go through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxFailure {
    /// The network rejected or reverted the transaction
    Rejected(String),
    /// The network could not be reached
    Network(String),
    /// The transaction was not accepted within the configured time
    TimedOut(Duration),
}

impl Display for TxFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TxFailure::Rejected(s) => write!(f, "transaction rejected: {}", s),
            TxFailure::Network(s) => write!(f, "network failure: {}", s),
            TxFailure::TimedOut(d) => write!(f, "timed out after {:?}", d),
        }
    }
}

/// Errors that can occur during the execution of the option deployment scripts
#[derive(Debug)]
pub enum ScriptError {
    /// Invalid or missing configuration, including malformed ABI artifacts
    /// and missing LP token lookups
    Configuration(String),
    /// Error initializing the RPC client or the account
    ClientInitialization(String),
    /// A connectivity failure outside of any deployment or batch transaction
    Network(String),
    /// The option at `index` cannot be deployed or registered as configured,
    /// e.g. it has no LP token or the AMM ABI does not accept its `add_option`
    /// arguments. Nothing was sent for it.
    ///
    /// Tokens in `deployed` were deployed by earlier iterations and are left
    /// on-chain without being registered with the AMM.
    InvalidOption {
        /// Index of the option spec in flight
        index: usize,
        /// Why the option cannot be deployed
        reason: String,
        /// Tokens already deployed in this run
        deployed: Vec<DeploymentResult>,
    },
    /// The option token deployment for the spec at `index` failed.
    ///
    /// Tokens in `deployed` were deployed by earlier iterations and are left
    /// on-chain without being registered with the AMM.
    Deployment {
        /// Index of the option spec in flight
        index: usize,
        /// Why the deployment failed
        failure: TxFailure,
        /// Tokens already deployed in this run
        deployed: Vec<DeploymentResult>,
    },
    /// The final `add_option` multicall failed after every deployment succeeded.
    ///
    /// None of the tokens in `deployed` are registered with the AMM.
    BatchSubmission {
        /// Why the batch failed
        failure: TxFailure,
        /// Tokens deployed in this run
        deployed: Vec<DeploymentResult>,
    },
    /// Error writing the deployments file
    WriteDeployments(String),
}

impl ScriptError {
    /// Tokens deployed on-chain before the run aborted, if any
    pub fn deployed(&self) -> &[DeploymentResult] {
        match self {
            ScriptError::InvalidOption { deployed, .. }
            | ScriptError::Deployment { deployed, .. }
            | ScriptError::BatchSubmission { deployed, .. } => deployed,
            _ => &[],
        }
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Configuration(s) => write!(f, "configuration error: {}", s),
            ScriptError::ClientInitialization(s) => write!(f, "error initializing client: {}", s),
            ScriptError::Network(s) => write!(f, "network error: {}", s),
            ScriptError::InvalidOption {
                index,
                reason,
                deployed,
            } => {
                write!(f, "invalid option #{}: {}", index, reason)?;
                write_orphans(f, deployed)
            }
            ScriptError::Deployment {
                index,
                failure,
                deployed,
            } => {
                write!(f, "error deploying option #{}: {}", index, failure)?;
                write_orphans(f, deployed)
            }
            ScriptError::BatchSubmission { failure, deployed } => write!(
                f,
                "error submitting add_option multicall: {} ({} option tokens deployed, 0 registered)",
                failure,
                deployed.len()
            ),
            ScriptError::WriteDeployments(s) => write!(f, "error writing deployments: {}", s),
        }
    }
}

/// Appends the addresses of tokens left unregistered by an aborted run
fn write_orphans(f: &mut Formatter<'_>, deployed: &[DeploymentResult]) -> fmt::Result {
    if deployed.is_empty() {
        return Ok(());
    }

    write!(
        f,
        " (orphaned option tokens: {})",
        deployed.iter().map(|d| format!("{:#x}", d.address)).join(", ")
    )
}

impl Error for ScriptError {}
