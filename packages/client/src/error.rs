use alloy_primitives::{Address, Bytes};
use alloy_rpc_types_eth::TransactionReceipt;
use buddy_types::BindingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvmClientError {
    #[error("HD index must be zero when using a private key (use mnemonic instead)")]
    DerivationWithPrivateKey,

    #[error("Invalid private key: {0}")]
    PrivateKey(String),

    #[error("Unable to derive key from mnemonic: {0:#?}")]
    Mnemonic(anyhow::Error),

    #[error("Unable to parse endpoint: {0}")]
    ParseEndpoint(String),

    #[error("Unable to create web socket provider: {0:#?}")]
    WebSocketProvider(anyhow::Error),
}

/// Everything that can go wrong talking to a BuddyDeployer contract.
/// Nothing here is retried; each variant is surfaced to the caller as-is.
#[derive(Debug, Error)]
pub enum BuddyDeployerError {
    /// The arguments could not be encoded, detected before anything is sent
    #[error("Encoding error: {0}")]
    Encoding(BindingError),

    /// Return data or a log did not have the expected shape
    #[error("Decoding error: {0}")]
    Decoding(BindingError),

    #[error("Transport error: {0:#?}")]
    Transport(anyhow::Error),

    /// Execution reverted during a call, estimate, or submission
    #[error("Execution reverted: {}", reason.as_deref().unwrap_or("<no reason>"))]
    Revert {
        reason: Option<String>,
        data: Option<Bytes>,
    },

    /// The transaction was mined but failed
    #[error("Transaction reverted: {0:#?}")]
    Reverted(Box<TransactionReceipt>),

    #[error("Sending a transaction requires a signer, but this client is read-only")]
    ReadOnly,

    #[error("Address is not a contract: {0}")]
    NotContract(Address),

    #[error(transparent)]
    Client(#[from] EvmClientError),
}

impl From<alloy_contract::Error> for BuddyDeployerError {
    fn from(err: alloy_contract::Error) -> Self {
        match err.as_revert_data() {
            Some(data) => BuddyDeployerError::Revert {
                reason: alloy_sol_types::decode_revert_reason(&data),
                data: Some(data),
            },
            None => match err {
                alloy_contract::Error::AbiError(err) => {
                    BuddyDeployerError::Decoding(BindingError::ReturnData(err.to_string()))
                }
                alloy_contract::Error::PendingTransactionError(err) => err.into(),
                err => BuddyDeployerError::Transport(err.into()),
            },
        }
    }
}

impl From<alloy_transport::TransportError> for BuddyDeployerError {
    fn from(err: alloy_transport::TransportError) -> Self {
        match err.as_error_resp().and_then(|payload| payload.as_revert_data()) {
            Some(data) => BuddyDeployerError::Revert {
                reason: alloy_sol_types::decode_revert_reason(&data),
                data: Some(data),
            },
            None => BuddyDeployerError::Transport(err.into()),
        }
    }
}

impl From<alloy_provider::PendingTransactionError> for BuddyDeployerError {
    fn from(err: alloy_provider::PendingTransactionError) -> Self {
        match err {
            alloy_provider::PendingTransactionError::TransportError(err) => err.into(),
            err => BuddyDeployerError::Transport(err.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use alloy_provider::PendingTransactionError;
    use alloy_sol_types::{Revert, SolError};
    use alloy_transport::TransportError;

    use super::*;

    fn revert_data(reason: &str) -> Bytes {
        Revert {
            reason: reason.to_string(),
        }
        .abi_encode()
        .into()
    }

    // what a node answers to a reverting eth_call or eth_estimateGas
    fn error_response(message: &str, data: Option<&Bytes>) -> TransportError {
        let payload = match data {
            Some(data) => serde_json::json!({ "code": 3, "message": message, "data": data }),
            None => serde_json::json!({ "code": -32000, "message": message }),
        };
        // the payload keeps `data` as raw json, which only parses from text
        TransportError::ErrorResp(serde_json::from_str(&payload.to_string()).unwrap())
    }

    fn assert_revert(err: BuddyDeployerError, expected: &Bytes) {
        match err {
            BuddyDeployerError::Revert { reason, data } => {
                assert_eq!(reason.as_deref(), Some("revert: not enough funds"));
                assert_eq!(data.as_ref(), Some(expected));
            }
            err => panic!("expected a revert, got {err:?}"),
        }
    }

    #[test]
    fn revert_display() {
        let data = revert_data("not enough funds");
        let err = BuddyDeployerError::Revert {
            reason: alloy_sol_types::decode_revert_reason(&data),
            data: Some(data),
        };

        assert!(err.to_string().contains("not enough funds"));

        let err = BuddyDeployerError::Revert {
            reason: None,
            data: None,
        };
        assert_eq!(err.to_string(), "Execution reverted: <no reason>");
    }

    #[test]
    fn revert_from_error_response() {
        let data = revert_data("not enough funds");

        let err = error_response("execution reverted: not enough funds", Some(&data));
        assert_revert(err.into(), &data);
    }

    #[test]
    fn revert_through_contract_and_pending_errors() {
        let data = revert_data("not enough funds");

        let err = alloy_contract::Error::TransportError(error_response(
            "execution reverted",
            Some(&data),
        ));
        assert_revert(err.into(), &data);

        let err = PendingTransactionError::TransportError(error_response(
            "execution reverted",
            Some(&data),
        ));
        assert_revert(err.into(), &data);

        let err = alloy_contract::Error::PendingTransactionError(
            PendingTransactionError::TransportError(error_response(
                "execution reverted",
                Some(&data),
            )),
        );
        assert_revert(err.into(), &data);
    }

    #[test]
    fn custom_error_data_has_no_reason() {
        // selector of some custom error, not Error(string)
        let data = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);

        let err: BuddyDeployerError =
            error_response("execution reverted", Some(&data)).into();

        match err {
            BuddyDeployerError::Revert { reason, data: Some(raw) } => {
                assert!(reason.is_none());
                assert_eq!(raw, data);
            }
            err => panic!("expected a revert, got {err:?}"),
        }
    }

    #[test]
    fn other_failures_are_transport_errors() {
        let err: BuddyDeployerError = error_response("nonce too low", None).into();
        assert!(matches!(err, BuddyDeployerError::Transport(_)), "{err:?}");

        // revert data is only trusted on a revert message
        let data = revert_data("not enough funds");
        let err: BuddyDeployerError = error_response("insufficient funds", Some(&data)).into();
        assert!(matches!(err, BuddyDeployerError::Transport(_)), "{err:?}");

        let err: BuddyDeployerError =
            alloy_contract::Error::NotADeploymentTransaction.into();
        assert!(matches!(err, BuddyDeployerError::Transport(_)), "{err:?}");
    }
}
