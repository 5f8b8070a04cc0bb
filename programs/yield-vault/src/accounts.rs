//! `Pubkey`-keyed storage with a readable serialized form.
//!
//! Persisted deployments are JSON; map keys and key fields are written as
//! base-58 strings so state files can be inspected and diffed by hand.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use solana_sdk::hash::hash;
use solana_sdk::pubkey::Pubkey;

/// Stable identity for a human-readable label (`"owner"`, `"alice"`, ...).
pub fn named_key(label: &str) -> Pubkey {
    Pubkey::new_from_array(hash(label.as_bytes()).to_bytes())
}

/// Ordered map from account to per-account state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMap<V>(BTreeMap<Pubkey, V>);

impl<V> Default for AccountMap<V> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<V> Deref for AccountMap<V> {
    type Target = BTreeMap<Pubkey, V>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<V> DerefMut for AccountMap<V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<V: Copy + Default> AccountMap<V> {
    /// Value for `key`, or `V::default()` for accounts never touched.
    pub fn value(&self, key: &Pubkey) -> V {
        self.0.get(key).copied().unwrap_or_default()
    }
}

impl<V: Serialize> Serialize for AccountMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k.to_string(), v)))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for AccountMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, V>::deserialize(deserializer)?;
        let mut out = BTreeMap::new();
        for (key, value) in raw {
            let key = Pubkey::from_str(&key).map_err(de::Error::custom)?;
            out.insert(key, value);
        }
        Ok(Self(out))
    }
}

/// `#[serde(with = "pubkey_str")]` for single `Pubkey` fields.
pub mod pubkey_str {
    use super::*;

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pubkey::from_str(&raw).map_err(de::Error::custom)
    }
}
