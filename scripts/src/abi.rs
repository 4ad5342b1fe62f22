//! Loading of contract ABIs and ABI-ordered calldata encoding

use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;
use starknet::core::types::FieldElement;

use crate::{
    constants::{ADD_OPTION_FN_NAME, CONSTRUCTOR_FN_NAME},
    errors::ScriptError,
    types::u128_to_felt,
};

/// Types serialized as a single felt
const FELT_TYPES: &[&str] = &[
    "felt",
    "felt252",
    "core::felt252",
    "ContractAddress",
    "core::starknet::contract_address::ContractAddress",
    "core::bool",
    "core::integer::u8",
    "core::integer::u16",
    "core::integer::u32",
    "core::integer::u64",
    "core::integer::u128",
];

/// Types serialized as a (low, high) pair of felts
const U256_TYPES: &[&str] = &["Uint256", "core::integer::u256"];

/// A single entry of a Starknet JSON ABI
#[derive(Debug, Clone, Deserialize)]
pub struct AbiEntry {
    /// The entry kind, e.g. `function`, `constructor`, `struct`, `interface`
    #[serde(rename = "type")]
    pub kind: String,
    /// The entry name
    #[serde(default)]
    pub name: String,
    /// The inputs of a function or constructor
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    /// The entries nested in a Cairo 1 interface
    #[serde(default)]
    pub items: Vec<AbiEntry>,
}

/// A named, typed ABI parameter
#[derive(Debug, Clone, Deserialize)]
pub struct AbiParam {
    /// The parameter name
    pub name: String,
    /// The Cairo type of the parameter
    #[serde(rename = "type")]
    pub ty: String,
}

/// The serialized shape of a call argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    /// One felt
    Felt,
    /// Two felts, low half first
    U256,
}

impl ArgKind {
    /// The shape of the Cairo type `ty`, if the scripts can serialize it
    fn of(ty: &str) -> Option<Self> {
        if FELT_TYPES.contains(&ty) {
            Some(ArgKind::Felt)
        } else if U256_TYPES.contains(&ty) {
            Some(ArgKind::U256)
        } else {
            None
        }
    }
}

/// A call argument value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallArg {
    /// A single felt
    Felt(FieldElement),
    /// A 256-bit integer, as its low and high 128-bit halves
    U256 {
        /// The low 128 bits
        low: u128,
        /// The high 128 bits
        high: u128,
    },
}

impl CallArg {
    /// The shape this value serializes to
    fn kind(&self) -> ArgKind {
        match self {
            CallArg::Felt(_) => ArgKind::Felt,
            CallArg::U256 { .. } => ArgKind::U256,
        }
    }

    /// Appends the value to `calldata`
    fn serialize_into(&self, calldata: &mut Vec<FieldElement>) {
        match self {
            CallArg::Felt(felt) => calldata.push(*felt),
            CallArg::U256 { low, high } => {
                calldata.push(u128_to_felt(*low));
                calldata.push(u128_to_felt(*high));
            }
        }
    }
}

/// A set of arguments keyed by ABI parameter name
#[derive(Debug, Clone, Default)]
pub struct CallArgs(
    /// The arguments, in insertion order
    Vec<(&'static str, CallArg)>,
);

impl CallArgs {
    /// An empty argument set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a felt argument
    pub fn felt(mut self, name: &'static str, value: FieldElement) -> Self {
        self.0.push((name, CallArg::Felt(value)));
        self
    }

    /// Adds a `u256` argument whose value fits in 128 bits
    pub fn u256(mut self, name: &'static str, value: u128) -> Self {
        self.0.push((name, CallArg::U256 { low: value, high: 0 }));
        self
    }

    /// The argument named `name`
    fn get(&self, name: &str) -> Option<&CallArg> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, arg)| arg)
    }
}

/// The ABI of a deployed or deployable contract
#[derive(Debug, Clone)]
pub struct ContractAbi {
    /// The top-level ABI entries
    entries: Vec<AbiEntry>,
}

impl ContractAbi {
    /// Reads an ABI from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ScriptError::Configuration(format!("cannot open ABI {}: {}", path.display(), e))
        })?;
        let entries = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ScriptError::Configuration(format!("malformed ABI {}: {}", path.display(), e))
        })?;

        Ok(Self { entries })
    }

    /// Parses an ABI from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        let entries = serde_json::from_str(json)
            .map_err(|e| ScriptError::Configuration(format!("malformed ABI: {}", e)))?;

        Ok(Self { entries })
    }

    /// Looks up a function, or the constructor if `name` is `constructor`
    pub fn function(&self, name: &str) -> Option<&AbiEntry> {
        let wanted_kinds: &[&str] = if name == CONSTRUCTOR_FN_NAME {
            &["constructor"]
        } else {
            &["function", "l1_handler"]
        };

        self.entries
            .iter()
            .flat_map(|entry| std::iter::once(entry).chain(entry.items.iter()))
            .find(|entry| wanted_kinds.contains(&entry.kind.as_str()) && entry.name == name)
    }

    /// Serializes `args` in the order the ABI declares the inputs of `function`
    pub fn encode_calldata(
        &self,
        function: &str,
        args: &CallArgs,
    ) -> Result<Vec<FieldElement>, ScriptError> {
        let entry = self.function(function).ok_or_else(|| {
            ScriptError::Configuration(format!("ABI has no function `{}`", function))
        })?;

        if let Some((unknown, _)) = args
            .0
            .iter()
            .find(|(name, _)| !entry.inputs.iter().any(|input| input.name == *name))
        {
            return Err(ScriptError::Configuration(format!(
                "`{}` has no input named `{}`",
                function, unknown
            )));
        }

        let mut calldata = Vec::with_capacity(entry.inputs.len());
        for input in &entry.inputs {
            let kind = ArgKind::of(&input.ty).ok_or_else(|| {
                ScriptError::Configuration(format!(
                    "unsupported type `{}` for input `{}` of `{}`",
                    input.ty, input.name, function
                ))
            })?;
            let arg = args.get(&input.name).ok_or_else(|| {
                ScriptError::Configuration(format!(
                    "missing input `{}` of `{}`",
                    input.name, function
                ))
            })?;
            if arg.kind() != kind {
                return Err(ScriptError::Configuration(format!(
                    "input `{}` of `{}` expects `{}`",
                    input.name, function, input.ty
                )));
            }

            arg.serialize_into(&mut calldata);
        }

        Ok(calldata)
    }
}

/// The ABIs of the contracts the scripts interact with
#[derive(Debug, Clone)]
pub struct ContractAbis {
    /// The AMM ABI
    pub amm: ContractAbi,
    /// The option token ABI
    pub option_token: ContractAbi,
}

impl ContractAbis {
    /// Bundles the two ABIs, checking they expose the entrypoints the scripts use
    pub fn new(amm: ContractAbi, option_token: ContractAbi) -> Result<Self, ScriptError> {
        if amm.function(ADD_OPTION_FN_NAME).is_none() {
            return Err(ScriptError::Configuration(format!(
                "AMM ABI does not expose `{}`",
                ADD_OPTION_FN_NAME
            )));
        }
        if option_token.function(CONSTRUCTOR_FN_NAME).is_none() {
            return Err(ScriptError::Configuration(
                "option token ABI has no constructor".to_string(),
            ));
        }

        Ok(Self { amm, option_token })
    }

    /// Reads both ABIs from disk
    pub fn load(
        amm_path: impl AsRef<Path>,
        option_token_path: impl AsRef<Path>,
    ) -> Result<Self, ScriptError> {
        Self::new(
            ContractAbi::load(amm_path)?,
            ContractAbi::load(option_token_path)?,
        )
    }
}
