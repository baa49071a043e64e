use std::collections::BTreeMap;

use alloy_json_abi::{Event, Function, JsonAbi};
use alloy_primitives::{Bytes, Log};
use alloy_sol_types::{SolCall, SolEvent};

use crate::{executeBuddyDeployCall, BindingError, BytesLike, Deployed, InitCode};

/// The ABI the bindings are generated from
pub const BUDDY_DEPLOYER_ABI_JSON: &str = include_str!("../abi/BuddyDeployer.json");

/// Runtime view of the contract ABI, keyed by canonical signature.
///
/// Construction checks the parsed descriptors against the types `sol!` generated
/// at compile time, so a stale ABI file is caught before any call is encoded.
#[derive(Debug, Clone)]
pub struct BuddyDeployerInterface {
    functions: BTreeMap<String, Function>,
    events: BTreeMap<String, Event>,
}

impl BuddyDeployerInterface {
    pub fn new() -> Result<Self, BindingError> {
        Self::from_json(BUDDY_DEPLOYER_ABI_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self, BindingError> {
        let abi: JsonAbi = serde_json::from_str(json)?;

        let interface = Self {
            functions: abi
                .functions()
                .map(|function| (function.signature(), function.clone()))
                .collect(),
            events: abi
                .events()
                .map(|event| (event.signature(), event.clone()))
                .collect(),
        };

        interface.verify()?;

        Ok(interface)
    }

    fn verify(&self) -> Result<(), BindingError> {
        if self.functions.len() != 1 || self.events.len() != 1 {
            return Err(BindingError::AbiMismatch(format!(
                "expected 1 function and 1 event, found {} functions and {} events",
                self.functions.len(),
                self.events.len()
            )));
        }

        let function = self
            .functions
            .get(executeBuddyDeployCall::SIGNATURE)
            .ok_or_else(|| {
                BindingError::AbiMismatch(format!(
                    "missing function {}",
                    executeBuddyDeployCall::SIGNATURE
                ))
            })?;

        if function.selector().0 != executeBuddyDeployCall::SELECTOR {
            return Err(BindingError::AbiMismatch(format!(
                "selector mismatch for {}",
                executeBuddyDeployCall::SIGNATURE
            )));
        }

        let event = self.events.get(Deployed::SIGNATURE).ok_or_else(|| {
            BindingError::AbiMismatch(format!("missing event {}", Deployed::SIGNATURE))
        })?;

        if event.selector() != Deployed::SIGNATURE_HASH {
            return Err(BindingError::AbiMismatch(format!(
                "topic mismatch for {}",
                Deployed::SIGNATURE
            )));
        }

        let indexed: Vec<bool> = event.inputs.iter().map(|input| input.indexed).collect();
        if event.anonymous || indexed != [true, true, true, false] {
            return Err(BindingError::AbiMismatch(format!(
                "unexpected indexed layout for {}: {indexed:?}",
                Deployed::SIGNATURE
            )));
        }

        Ok(())
    }

    /// Canonical signature -> function descriptor
    pub fn functions(&self) -> &BTreeMap<String, Function> {
        &self.functions
    }

    /// Canonical signature -> event descriptor
    pub fn events(&self) -> &BTreeMap<String, Event> {
        &self.events
    }

    /// Looks up by bare name, canonical signature, or `0x` prefixed selector
    pub fn get_function(&self, name_or_signature_or_selector: &str) -> Result<&Function, BindingError> {
        let key = name_or_signature_or_selector;

        let found = if key.starts_with("0x") {
            self.functions.values().find(|function| {
                const_hex::encode_prefixed(function.selector()).eq_ignore_ascii_case(key)
            })
        } else if key.contains('(') {
            self.functions.get(key)
        } else {
            self.functions.values().find(|function| function.name == key)
        };

        found.ok_or_else(|| BindingError::UnknownFunction(key.to_string()))
    }

    /// Looks up by bare name, canonical signature, or `0x` prefixed topic hash
    pub fn get_event(&self, name_or_signature_or_topic: &str) -> Result<&Event, BindingError> {
        let key = name_or_signature_or_topic;

        let found = if key.starts_with("0x") {
            self.events
                .values()
                .find(|event| const_hex::encode_prefixed(event.selector()).eq_ignore_ascii_case(key))
        } else if key.contains('(') {
            self.events.get(key)
        } else {
            self.events.values().find(|event| event.name == key)
        };

        found.ok_or_else(|| BindingError::UnknownEvent(key.to_string()))
    }

    /// Selector followed by the ABI encoded `bytes` argument
    pub fn encode_function_data(&self, init_code: impl BytesLike) -> Result<Bytes, BindingError> {
        let init_code = init_code.into_init_code()?;

        Ok(executeBuddyDeployCall {
            contractInitCode: init_code.into_bytes(),
        }
        .abi_encode()
        .into())
    }

    pub fn decode_function_data(&self, data: &[u8]) -> Result<InitCode, BindingError> {
        let call = executeBuddyDeployCall::abi_decode(data)?;
        Ok(InitCode::new(call.contractInitCode))
    }

    /// `executeBuddyDeploy` has no outputs, so this only checks the data decodes as such
    pub fn decode_function_result(&self, data: &[u8]) -> Result<(), BindingError> {
        executeBuddyDeployCall::abi_decode_returns(data)?;
        Ok(())
    }

    pub fn decode_event_log(&self, log: &Log) -> Result<Deployed, BindingError> {
        Ok(Deployed::decode_log(log)?.data)
    }
}

#[cfg(test)]
mod test {
    use alloy_primitives::{address, U256};

    use super::*;

    #[test]
    fn embedded_abi_matches_bindings() {
        let interface = BuddyDeployerInterface::new().unwrap();

        assert_eq!(
            interface.functions().keys().collect::<Vec<_>>(),
            ["executeBuddyDeploy(bytes)"]
        );
        assert_eq!(
            interface.events().keys().collect::<Vec<_>>(),
            ["Deployed(address,address,uint256,bool)"]
        );
    }

    #[test]
    fn lookups() {
        let interface = BuddyDeployerInterface::new().unwrap();

        let by_name = interface.get_function("executeBuddyDeploy").unwrap();
        let by_signature = interface.get_function("executeBuddyDeploy(bytes)").unwrap();
        let selector = const_hex::encode_prefixed(executeBuddyDeployCall::SELECTOR);
        let by_selector = interface.get_function(&selector).unwrap();
        assert_eq!(by_name, by_signature);
        assert_eq!(by_name, by_selector);
        assert_eq!(by_name.inputs[0].name, "contractInitCode");

        let topic = Deployed::SIGNATURE_HASH.to_string();
        assert_eq!(
            interface.get_event(&topic).unwrap(),
            interface.get_event("Deployed").unwrap()
        );

        assert!(matches!(
            interface.get_function("deploy"),
            Err(BindingError::UnknownFunction(_))
        ));
        assert!(matches!(
            interface.get_event("Deployed(address)"),
            Err(BindingError::UnknownEvent(_))
        ));
    }

    #[test]
    fn rejects_mismatched_abi() {
        let wrong_indexing = BUDDY_DEPLOYER_ABI_JSON.replacen("\"indexed\": false", "\"indexed\": true", 1);
        assert!(matches!(
            BuddyDeployerInterface::from_json(&wrong_indexing),
            Err(BindingError::AbiMismatch(_))
        ));

        let renamed = BUDDY_DEPLOYER_ABI_JSON.replace("executeBuddyDeploy", "executeDeploy");
        assert!(matches!(
            BuddyDeployerInterface::from_json(&renamed),
            Err(BindingError::AbiMismatch(_))
        ));

        assert!(matches!(
            BuddyDeployerInterface::from_json("not json"),
            Err(BindingError::AbiJson(_))
        ));
    }

    #[test]
    fn empty_init_code_encoding() {
        let interface = BuddyDeployerInterface::new().unwrap();
        let data = interface.encode_function_data(Vec::new()).unwrap();

        let mut expected = executeBuddyDeployCall::SELECTOR.to_vec();
        // offset of the dynamic argument
        expected.extend_from_slice(&U256::from(32).to_be_bytes::<32>());
        // length
        expected.extend_from_slice(&[0u8; 32]);

        assert_eq!(data.as_ref(), expected.as_slice());
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn call_data_round_trips() {
        let interface = BuddyDeployerInterface::new().unwrap();

        for init_code in [vec![], vec![0x60], vec![0xfe; 31], vec![0xab; 32], vec![0x01; 1000]] {
            let data = interface.encode_function_data(init_code.clone()).unwrap();
            let decoded = interface.decode_function_data(&data).unwrap();
            assert_eq!(decoded.as_slice(), init_code.as_slice());
        }
    }

    #[test]
    fn decode_rejects_wrong_selector() {
        let interface = BuddyDeployerInterface::new().unwrap();
        let mut data = interface.encode_function_data("0x6080").unwrap().to_vec();
        data[0] ^= 0xff;

        assert!(matches!(
            interface.decode_function_data(&data),
            Err(BindingError::Decode(_))
        ));
        assert!(matches!(
            interface.decode_function_data(&[0x01, 0x02]),
            Err(BindingError::Decode(_))
        ));
    }

    #[test]
    fn function_result_is_empty() {
        let interface = BuddyDeployerInterface::new().unwrap();
        interface.decode_function_result(&[]).unwrap();
    }

    #[test]
    fn event_log_decoding() {
        let interface = BuddyDeployerInterface::new().unwrap();
        let event = Deployed {
            _sender: address!("0x1111111111111111111111111111111111111111"),
            _contract: address!("0x2222222222222222222222222222222222222222"),
            withdrawalId: U256::from(42),
            _success: true,
        };

        let log = Log {
            address: address!("0x3333333333333333333333333333333333333333"),
            data: event.encode_log_data(),
        };

        assert_eq!(interface.decode_event_log(&log).unwrap(), event);

        // sender is stored left padded in topic1
        assert_eq!(log.data.topics()[1], event._sender.into_word());

        let truncated = Log {
            address: log.address,
            data: alloy_primitives::LogData::new_unchecked(
                vec![Deployed::SIGNATURE_HASH],
                log.data.data.clone(),
            ),
        };
        assert!(matches!(
            interface.decode_event_log(&truncated),
            Err(BindingError::Decode(_))
        ));
    }
}
