// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of inkpot.
//
// inkpot is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// inkpot is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with inkpot.  If not,
// see <http://www.gnu.org/licenses/>.

//! # inkpot Signing Keys
//!
//! inkpot signs its login tokens (JWTs) with HMAC-SHA256. As with [peppers], the keys are read from
//! configuration & versioned so that they can be rotated:
//!
//! [peppers]: crate::peppers
//!
//! ```toml
//! [signing-keys]
//! "keyid:2025-02-12" = [1, 2, 3, 4, ..., 64] # Keys must be 64 octets in length
//! "keyid:2025-02-15" = [65, 66, 67,..., 128]
//! ```
//!
//! The lexicographically greatest key ID is current & is used to sign new tokens. Each token
//! carries the ID of the key that signed it in its header, so tokens signed with an older key
//! continue to verify until that key is removed from the configuration.

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use snafu::{Backtrace, Snafu, prelude::*};

use crate::util::Key;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to recognize {text} as a KeyId"))]
    KeyId { text: String, backtrace: Backtrace },
    #[snafu(display("No signing key available"))]
    NoKey { backtrace: Backtrace },
    #[snafu(display("Signing keys must be 64 octets in length; got {len}"))]
    SigningKey { len: usize, backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             KeyId                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref KEY_ID : Regex = Regex::new("^keyid:[-0-9a-zA-Z]+$").unwrap(/* known good */);
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(s: &str) -> Result<KeyId> {
        if KEY_ID.is_match(s) {
            Ok(KeyId(s.to_owned()))
        } else {
            KeyIdSnafu { text: s.to_owned() }.fail()
        }
    }
}

impl Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeyId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        KeyId::new(s)
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        KeyId::new(&s).map_err(serde::de::Error::custom)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           SigningKey                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A 64-octet HMAC key
#[derive(Clone, Debug)]
pub struct SigningKey(Key);

impl SigningKey {
    pub fn new(b: Vec<u8>) -> Result<SigningKey> {
        ensure!(b.len() == 64, SigningKeySnafu { len: b.len() });
        Ok(SigningKey(b.into()))
    }
}

impl Default for SigningKey {
    fn default() -> Self {
        use rand::RngCore;
        let mut bytes: Vec<u8> = vec![0; 64];
        argon2::password_hash::rand_core::OsRng.fill_bytes(&mut bytes);
        SigningKey(bytes.into())
    }
}

impl AsRef<Key> for SigningKey {
    fn as_ref(&self) -> &Key {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SigningKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let key = Key::deserialize(deserializer)?;
        if key.len() == 64 {
            Ok(SigningKey(key))
        } else {
            Err(serde::de::Error::custom(format!(
                "signing keys must be 64 octets in length; got {}",
                key.len()
            )))
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          SigningKeys                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct SigningKeys {
    keys: BTreeMap<KeyId, SigningKey>,
}

impl SigningKeys {
    /// Retrieve the current (i.e. the most recent) SigningKey
    pub fn current(&self) -> Result<(KeyId, SigningKey)> {
        let (key, value) = self.keys.last_key_value().context(NoKeySnafu)?;
        Ok((key.clone(), value.clone()))
    }
    /// Retrieve a signing key by ID
    pub fn find_by_version(&self, keyid: &KeyId) -> Result<SigningKey> {
        Ok(self.keys.get(keyid).context(NoKeySnafu)?.clone())
    }
}

/// One random key; tokens won't survive a restart
impl Default for SigningKeys {
    fn default() -> Self {
        SigningKeys {
            keys: BTreeMap::from([(
                KeyId(chrono::Utc::now().format("keyid:%Y%m%d").to_string()),
                SigningKey::default(),
            )]),
        }
    }
}

impl<const N: usize> From<[(KeyId, SigningKey); N]> for SigningKeys {
    fn from(value: [(KeyId, SigningKey); N]) -> Self {
        Self {
            keys: BTreeMap::from(value),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_ids() {
        assert!(KeyId::new("keyid:2025-02-12").is_ok());
        assert!(KeyId::new("key:2025").is_err());
        assert!(KeyId::new("keyid:").is_err());
    }

    #[test]
    fn rotation() {
        let text = format!(
            "\"keyid:a\" = [{}]\n\"keyid:b\" = [{}]\n",
            vec!["7"; 64].join(","),
            vec!["9"; 64].join(",")
        );
        let keys: SigningKeys = toml::from_str(&text).unwrap();
        assert_eq!(keys.current().unwrap().0, KeyId::new("keyid:b").unwrap());
        assert!(toml::from_str::<SigningKeys>("\"keyid:a\" = [1, 2]").is_err());
    }
}
