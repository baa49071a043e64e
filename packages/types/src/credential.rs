use std::{ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A mnemonic or `0x` prefixed private key for the signing client.
/// Zeroized on drop and never printed.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(credential: impl Into<String>) -> Self {
        Self(credential.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_private_key(&self) -> bool {
        self.0.starts_with("0x")
    }
}

impl AsRef<str> for Credential {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Credential {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl FromStr for Credential {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
