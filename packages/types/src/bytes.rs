use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Deref,
    str::FromStr,
};

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};

use crate::BindingError;

/// The `contractInitCode` argument of `executeBuddyDeploy`.
/// Arbitrary length, serialized as a `0x` prefixed hex string.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InitCode(Bytes);

impl InitCode {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Strict hex parsing: must be `0x` prefixed, even length, and only hex digits.
    pub fn from_hex(s: &str) -> Result<Self, BindingError> {
        let stripped = s
            .strip_prefix("0x")
            .ok_or_else(|| BindingError::InvalidBytes(format!("missing 0x prefix: {s:?}")))?;

        if stripped.len() % 2 != 0 {
            return Err(BindingError::InvalidBytes(format!(
                "hex string has odd length: {s:?}"
            )));
        }

        const_hex::decode(stripped)
            .map(Self::new)
            .map_err(|e| BindingError::InvalidBytes(format!("{e}: {s:?}")))
    }
}

impl Deref for InitCode {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for InitCode {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<InitCode> for Bytes {
    fn from(init_code: InitCode) -> Self {
        init_code.0
    }
}

impl FromStr for InitCode {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Display for InitCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", const_hex::encode_prefixed(&self.0))
    }
}

impl Debug for InitCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Anything that can be passed where the contract expects `bytes`.
/// Raw byte containers convert infallibly, strings are parsed as hex.
pub trait BytesLike {
    fn into_init_code(self) -> Result<InitCode, BindingError>;
}

impl BytesLike for InitCode {
    fn into_init_code(self) -> Result<InitCode, BindingError> {
        Ok(self)
    }
}

impl BytesLike for &InitCode {
    fn into_init_code(self) -> Result<InitCode, BindingError> {
        Ok(self.clone())
    }
}

impl BytesLike for Bytes {
    fn into_init_code(self) -> Result<InitCode, BindingError> {
        Ok(InitCode(self))
    }
}

impl BytesLike for Vec<u8> {
    fn into_init_code(self) -> Result<InitCode, BindingError> {
        Ok(InitCode::new(self))
    }
}

impl BytesLike for &[u8] {
    fn into_init_code(self) -> Result<InitCode, BindingError> {
        Ok(InitCode::new(self.to_vec()))
    }
}

impl<const N: usize> BytesLike for [u8; N] {
    fn into_init_code(self) -> Result<InitCode, BindingError> {
        Ok(InitCode::new(self.to_vec()))
    }
}

impl BytesLike for &str {
    fn into_init_code(self) -> Result<InitCode, BindingError> {
        InitCode::from_hex(self)
    }
}

impl BytesLike for String {
    fn into_init_code(self) -> Result<InitCode, BindingError> {
        InitCode::from_hex(&self)
    }
}

impl BytesLike for &String {
    fn into_init_code(self) -> Result<InitCode, BindingError> {
        InitCode::from_hex(self)
    }
}
