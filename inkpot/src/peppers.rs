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

//! # inkpot peppers
//!
//! inkpot salts and [peppers] passwords. Salts are generated per-user at signup time & stored
//! alongside the password hash. Peppers are stored *separately*, in configuration:
//!
//! [peppers]: https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html#peppering
//!
//! ```toml
//! [pepper]
//! "pepper-ver:2025-02-12" = [1, 2, 3, 4, ..., 32] # Peppers must be 32 octets in length
//! "pepper-ver:2025-06-01" = [33, 34, 35, ..., 64]
//! ```
//!
//! Rotation works by adding a new pepper with a later version (versions compare lexicographically).
//! New users get the current pepper; each user's pepper version is written down with their
//! password hash so that older users can still log in.

use std::{collections::BTreeMap, ops::Deref};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{Backtrace, prelude::*};
use tap::Pipe;

use crate::util::Key;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{text} is not a valid pepper version"))]
    BadVersion { text: String, backtrace: Backtrace },
    #[snafu(display("Peppers must be 32 octets in length; got {len}"))]
    BadPepperLength { len: usize, backtrace: Backtrace },
    #[snafu(display("No pepper available"))]
    NoPepper { backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        Pepper Versions                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref VERSION: Regex = Regex::new("^pepper-ver:[-a-zA-Z0-9]+$").unwrap(/* known good */);
}

/// Correct-by-construction pepper version; of the form "pepper-ver:[-a-zA-Z0-9]+"
///
/// These get written to the database along with password hashes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(text: &str) -> Result<Version> {
        VERSION
            .is_match(text)
            .then_some(Version(text.to_owned()))
            .context(BadVersionSnafu {
                text: text.to_owned(),
            })
    }
}

impl Deref for Version {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Version::new(&s).map_err(<D::Error as serde::de::Error>::custom)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Pepper                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [Pepper] is a 32-octet [Key]
#[derive(Clone, Debug)]
pub struct Pepper(Key);

impl Pepper {
    pub fn new(key: Key) -> Result<Pepper> {
        ensure!(key.len() == 32, BadPepperLengthSnafu { len: key.len() });
        Ok(Pepper(key))
    }
}

impl AsRef<Key> for Pepper {
    fn as_ref(&self) -> &Key {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Pepper {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Key::deserialize(deserializer)?
            .pipe(Pepper::new)
            .map_err(<D::Error as serde::de::Error>::custom)
    }
}

fn random_pepper() -> Pepper {
    use rand::RngCore;
    let mut bytes: Vec<u8> = vec![0; 32];
    argon2::password_hash::rand_core::OsRng.fill_bytes(&mut bytes);
    Pepper(bytes.into())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Peppers                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The set of peppers currently in play, by version
#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct Peppers {
    peppers: BTreeMap<Version, Pepper>,
}

/// A single, random, pepper-- fine for tests & development, but since it changes with each
/// process, no one will be able to log in after a restart.
impl Default for Peppers {
    fn default() -> Self {
        Peppers {
            peppers: BTreeMap::from([(
                Version(chrono::Utc::now().format("pepper-ver:%Y%m%d").to_string()),
                random_pepper(),
            )]),
        }
    }
}

impl Peppers {
    /// Retrieve the current (i.e. the most recent) Pepper
    pub fn current_pepper(&self) -> Result<(Version, Pepper)> {
        let (key, value) = self.peppers.last_key_value().context(NoPepperSnafu)?;
        Ok((key.clone(), value.clone()))
    }
    /// Retrieve a pepper by version
    pub fn find_by_version(&self, version: &Version) -> Result<Pepper> {
        Ok(self.peppers.get(version).context(NoPepperSnafu)?.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn versions() {
        assert!(Version::new("pepper-ver:2025-02-12").is_ok());
        assert!(Version::new("pepper:2025").is_err());
        assert!(Version::new("pepper-ver:").is_err());
    }

    #[test]
    fn current_is_latest() {
        let text = format!(
            r#"
"pepper-ver:a" = [{}]
"pepper-ver:b" = [{}]
"#,
            vec!["1"; 32].join(","),
            vec!["2"; 32].join(",")
        );
        let peppers: Peppers = toml::from_str(&text).unwrap();
        let (version, _) = peppers.current_pepper().unwrap();
        assert_eq!(&*version, "pepper-ver:b");
        assert!(
            peppers
                .find_by_version(&Version::new("pepper-ver:a").unwrap())
                .is_ok()
        );
        assert!(
            peppers
                .find_by_version(&Version::new("pepper-ver:c").unwrap())
                .is_err()
        );
    }

    #[test]
    fn short_peppers_rejected() {
        assert!(toml::from_str::<Peppers>(r#""pepper-ver:a" = [1, 2, 3]"#).is_err());
    }
}
