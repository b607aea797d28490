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

//! # util
//!
//! Odds & ends used by more than one module: splitting things in two, secret keys read from
//! configuration, and credentials given on the command line.

use std::{fmt::Display, ops::Deref};

use either::Either;
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use serde::{Deserialize, Deserializer};
use serde_bytes::ByteBuf;
use tap::{Conv, Pipe};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          exactly_two                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Returned by [exactly_two] when the iterator yields some number of items other than two
#[derive(Debug)]
pub struct ExactlyTwoError<T: std::iter::Iterator> {
    // None means zero items, Left one item, Right at least three
    #[allow(clippy::type_complexity)]
    found: Option<Either<T::Item, (T::Item, T::Item, T::Item)>>,
}

impl<T: std::iter::Iterator> Display for ExactlyTwoError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.found {
            None => write!(f, "expected two items, found none"),
            Some(Either::Left(_)) => write!(f, "expected two items, found one"),
            Some(Either::Right(_)) => write!(f, "expected two items, found three or more"),
        }
    }
}

/// Pull exactly two items out of `iter`, failing if it yields fewer or more
///
/// Handy for things like "Bearer xxx" or "user:password", where anything other than a pair is
/// malformed.
pub fn exactly_two<T>(mut iter: T) -> std::result::Result<(T::Item, T::Item), ExactlyTwoError<T>>
where
    T: std::iter::Iterator,
{
    let first = match iter.next() {
        Some(first) => first,
        None => return Err(ExactlyTwoError { found: None }),
    };
    let second = match iter.next() {
        Some(second) => second,
        None => {
            return Err(ExactlyTwoError {
                found: Some(Either::Left(first)),
            });
        }
    };
    match iter.next() {
        None => Ok((first, second)),
        Some(third) => Err(ExactlyTwoError {
            found: Some(Either::Right((first, second, third))),
        }),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              Key                                               //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Secret key material read from configuration (peppers & token signing keys)
///
/// In TOML, keys are given as arrays of integers in [0, 255].
#[derive(Clone, Debug)]
pub struct Key(SecretSlice<u8>);

impl Key {
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }
}

impl AsRef<SecretSlice<u8>> for Key {
    fn as_ref(&self) -> &SecretSlice<u8> {
        self.deref()
    }
}

impl Deref for Key {
    type Target = SecretSlice<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// `[u8]` isn't `DeserializeOwned`, so go through a `ByteBuf`
impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        <ByteBuf as serde::Deserialize>::deserialize(deserializer)?
            .into_vec()
            .conv::<SecretSlice<u8>>()
            .pipe(Key)
            .pipe(Ok)
    }
}

impl From<Vec<u8>> for Key {
    fn from(value: Vec<u8>) -> Self {
        Key(value.into())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Credentials                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An (id, secret) pair; AWS access keys, for instance
///
/// On the command line, give these as "id,secret".
#[derive(Clone, Debug, Deserialize)]
pub struct Credentials(pub (SecretString, SecretString));

impl Credentials {
    pub fn id(&self) -> &str {
        self.0.0.expose_secret()
    }
    pub fn secret(&self) -> &str {
        self.0.1.expose_secret()
    }
}

impl clap::builder::ValueParserFactory for Credentials {
    type Parser = CredentialsParser;

    fn value_parser() -> Self::Parser {
        CredentialsParser
    }
}

#[derive(Clone, Debug)]
pub struct CredentialsParser;

impl clap::builder::TypedValueParser for CredentialsParser {
    type Value = Credentials;

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> std::result::Result<Self::Value, clap::Error> {
        use clap::error::ErrorKind;
        value
            .to_str()
            .ok_or(clap::Error::new(ErrorKind::InvalidValue))?
            .split(',')
            .pipe(exactly_two)
            .map_err(|_| clap::Error::new(ErrorKind::WrongNumberOfValues))?
            .pipe(|(id, secret)| (id.into(), secret.into()))
            .pipe(Credentials)
            .pipe(Ok)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pairs() {
        assert_eq!(exactly_two("a:b".split(':')).unwrap(), ("a", "b"));
        assert!(exactly_two("a".split(':')).is_err());
        assert!(exactly_two("a:b:c".split(':')).is_err());
        assert!(exactly_two(std::iter::empty::<u8>()).is_err());
    }

    #[test]
    fn keys() {
        #[derive(Deserialize)]
        struct Holder {
            key: Key,
        }
        let h: Holder = toml::from_str("key = [1, 2, 3]").unwrap();
        assert_eq!(h.key.len(), 3);
        assert_eq!(h.key.expose_secret(), &[1u8, 2, 3]);
    }
}
