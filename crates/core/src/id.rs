//! Strongly-typed identifiers used across the pipeline.
//!
//! Identifiers arrive as opaque strings minted by the upstream order
//! context. Construction goes through `parse`, which enforces the trimmed
//! minimum length; a value of one of these types is always valid.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::field;
use crate::outcome::Outcome;

/// Identifier of the order an allocation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

/// Stock-keeping unit identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

/// Identifier of the user who placed the order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

macro_rules! impl_key_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Parse an untrusted raw value (trimmed, min length enforced).
            pub fn parse(raw: &str) -> Outcome<Self> {
                field::text($name, raw).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = crate::outcome::Failure;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

impl_key_newtype!(OrderId, "orderId");
impl_key_newtype!(Sku, "sku");
impl_key_newtype!(UserId, "userId");
