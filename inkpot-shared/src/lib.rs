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

//! # inkpot-shared
//!
//! Refined types shared between the inkpot server, its administrative tooling & its test suite.
//! Everything here is "correct by construction": the only way to get your hands on a [Username],
//! say, is through a constructor that validates its input, and that includes deserialization.

pub mod api;

use chrono::Duration;
use email_address::EmailAddress;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{Backtrace, prelude::*};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use std::{collections::HashSet, fmt::Display, ops::Deref, str::FromStr};

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module Error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{email} is not a valid e-mail address"))]
    BadEmail { email: String, backtrace: Backtrace },
    #[snafu(display("{text} is not a valid post status"))]
    BadPostStatus { text: String, backtrace: Backtrace },
    #[snafu(display("{name} is not a valid username"))]
    BadUsername { name: String, backtrace: Backtrace },
    #[snafu(display("{text} is not a valid post slug"))]
    PostSlug { text: String, backtrace: Backtrace },
    #[snafu(display("{text} is not a valid tag name"))]
    Tagname { text: String, backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

pub fn mk_serde_de_err<'de, D: serde::Deserializer<'de>>(err: impl std::error::Error) -> D::Error {
    <D::Error as serde::de::Error>::custom(format!("{}", err))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          Identifiers                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Declare a type intended to be used as an opaque identifier for some other sort of entity
///
/// Neither of our storage backends offers an auto-increment column, so we assign our own ids, and
/// they're UUIDs. I could just use [Uuid] directly, but I can't bring myself to use the same type
/// to identify both users & posts.
///
/// The generated type serializes transparently as a hyphenated UUID, which is also how it's stored
/// in DynamoDB.
#[macro_export]
macro_rules! define_id {
    ($type_name:ident) => {
        #[derive(
            Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
        )]
        #[serde(transparent)]
        pub struct $type_name(Uuid);
        impl $type_name {
            pub fn new() -> $type_name {
                $type_name(Uuid::new_v4())
            }
            pub fn from_raw_string(s: &str) -> StdResult<$type_name, uuid::Error> {
                Ok($type_name(Uuid::parse_str(s)?))
            }
        }
        impl Default for $type_name {
            fn default() -> Self {
                $type_name::new()
            }
        }
        impl Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.as_hyphenated())
            }
        }
        impl FromStr for $type_name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                $type_name::from_raw_string(s)
            }
        }
        impl Deref for $type_name {
            type Target = Uuid;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
        impl From<$type_name> for Uuid {
            fn from(value: $type_name) -> Self {
                value.0
            }
        }
        impl From<Uuid> for $type_name {
            fn from(value: Uuid) -> Self {
                $type_name(value)
            }
        }
    };
}

define_id!(UserId);
define_id!(PostId);

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Username                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

const MAX_USERNAME_LENGTH: usize = 150;

lazy_static! {
    static ref USERNAME: Regex = Regex::new(r"^[\w.@+-]+$").unwrap(/* known good */);
    // These would be shadowed by fixed routes under /api/v1/users
    static ref BANNED_USERNAMES: HashSet<&'static str> =
        HashSet::from(["follow", "login", "me", "profile", "signup"]);
}

fn check_username(s: &str) -> bool {
    let n = s.chars().count();
    n >= 1 && n <= MAX_USERNAME_LENGTH && USERNAME.is_match(s) && !BANNED_USERNAMES.contains(s)
}

/// A refined type representing an inkpot username
///
/// Usernames may be up to 150 characters in length, and may contain letters (in any script),
/// digits, and the characters `@`, `.`, `+`, `-` & `_`. They are case-sensitive.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Construct a [Username] from a `&str`; to *move* a [String] into a [Username] use
    /// [TryFrom::try_from()]
    pub fn new(name: &str) -> Result<Username> {
        check_username(name)
            .then_some(Username(name.to_owned()))
            .ok_or(
                BadUsernameSnafu {
                    name: name.to_owned(),
                }
                .build(),
            )
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for Username {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit `Username`
impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Username::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Username {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Username::new(s)
    }
}

impl TryFrom<String> for Username {
    type Error = Error;

    fn try_from(name: String) -> std::result::Result<Self, Self::Error> {
        if check_username(&name) {
            Ok(Username(name))
        } else {
            BadUsernameSnafu { name }.fail()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           UserEmail                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A refined type representing an e-mail address
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct UserEmail(String);

impl UserEmail {
    pub fn new(email: &str) -> Result<UserEmail> {
        EmailAddress::is_valid(email)
            .then_some(UserEmail(email.to_string()))
            .context(BadEmailSnafu {
                email: email.to_string(),
            })
    }
    /// The portion of the address preceding the '@'
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }
}

impl AsRef<str> for UserEmail {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for UserEmail {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UserEmail {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        UserEmail::new(&s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for UserEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            TagName                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

const MAX_TAGNAME_LENGTH: usize = 100;

fn check_tagname(s: &str) -> bool {
    [
        !s.is_empty(),
        UnicodeSegmentation::graphemes(s, true).count() <= MAX_TAGNAME_LENGTH,
        !s.starts_with(char::is_whitespace),
        !s.ends_with(char::is_whitespace),
        !s.contains(','),
    ]
    .into_iter()
    .all(|x| x)
}

/// A tag that may be attached to a post
///
/// Tags may be up to 100 graphemes in length. Unlike some bookmarking services, tags *may* contain
/// internal whitespace ("Best Practices" is a fine tag), but they may not begin or end with it, and
/// they may not contain commas (so that they can be given as a comma-separated list).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Tagname(String);

impl Tagname {
    /// Correct-by-construction [Tagname] constructor
    pub fn new(text: &str) -> Result<Tagname> {
        check_tagname(text)
            .then_some(Tagname(text.to_string()))
            .ok_or(
                TagnameSnafu {
                    text: text.to_string(),
                }
                .build(),
            )
    }
}

impl AsRef<str> for Tagname {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for Tagname {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Tagname> for String {
    fn from(value: Tagname) -> Self {
        value.0
    }
}

// Implement `Deserialize` by hand to fail if the serialized value isn't a legit `Tagname`
impl<'de> Deserialize<'de> for Tagname {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Tagname::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl std::fmt::Display for Tagname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Tagname {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Tagname::new(s)
    }
}

impl TryFrom<String> for Tagname {
    type Error = Error;

    fn try_from(name: String) -> std::result::Result<Self, Self::Error> {
        if check_tagname(&name) {
            Ok(Tagname(name))
        } else {
            TagnameSnafu { text: name }.fail()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            PostSlug                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref POST_SLUG: Regex = Regex::new(r"^[\w-]+$").unwrap(/* known good */);
}

fn check_post_slug(s: &str) -> bool {
    POST_SLUG.is_match(s) && !s.chars().any(char::is_uppercase)
}

/// The URL-friendly name of a post
///
/// Slugs are lower-case, and consist solely of alphanumerics (in any script), hyphens &
/// underscores. They're unique across all blogs.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PostSlug(String);

impl PostSlug {
    pub fn new(text: &str) -> Result<PostSlug> {
        check_post_slug(text)
            .then_some(PostSlug(text.to_owned()))
            .ok_or(
                PostSlugSnafu {
                    text: text.to_owned(),
                }
                .build(),
            )
    }
}

impl AsRef<str> for PostSlug {
    fn as_ref(&self) -> &str {
        self.deref()
    }
}

impl Deref for PostSlug {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PostSlug {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        PostSlug::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl Display for PostSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PostSlug {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PostSlug::new(s)
    }
}

impl TryFrom<String> for PostSlug {
    type Error = Error;

    fn try_from(text: String) -> std::result::Result<Self, Self::Error> {
        if check_post_slug(&text) {
            Ok(PostSlug(text))
        } else {
            PostSlugSnafu { text }.fail()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           PostStatus                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Publication status of a post; drafts are visible only to their authors
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn is_published(&self) -> bool {
        matches!(self, PostStatus::Published)
    }
}

impl Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostStatus::Draft => write!(f, "draft"),
            PostStatus::Published => write!(f, "published"),
        }
    }
}

impl FromStr for PostStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            _ => BadPostStatusSnafu {
                text: s.to_owned(),
            }
            .fail(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Period                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The window over which trending posts are computed
///
/// Parsing is deliberately lenient: a missing period means [Period::Day], and anything we don't
/// recognize means [Period::Year].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    pub fn parse_lenient(text: Option<&str>) -> Period {
        match text {
            None => Period::Day,
            Some("day") => Period::Day,
            Some("week") => Period::Week,
            Some("month") => Period::Month,
            Some(_) => Period::Year,
        }
    }
    /// The length of this period
    pub fn window(&self) -> Duration {
        match self {
            Period::Day => Duration::days(1),
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
            Period::Year => Duration::days(365),
        }
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Ok(Period::parse_lenient(Some(&s)))
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::Day => write!(f, "day"),
            Period::Week => write!(f, "week"),
            Period::Month => write!(f, "month"),
            Period::Year => write!(f, "year"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn usernames() {
        assert!(Username::new("").is_err());
        assert!(Username::new("has space").is_err());
        assert!(Username::new("login").is_err());
        assert!(Username::new(&"x".repeat(151)).is_err());
        assert!(Username::new(&"x".repeat(150)).is_ok());
        assert!(Username::new("jane.doe+blog@example").is_ok());
        assert!(Username::new("김철수").is_ok());
        assert!(serde_json::from_str::<Username>("\"a/b\"").is_err());
    }

    #[test]
    fn tagnames() {
        assert!(Tagname::new("").is_err());
        assert!(Tagname::new(" leading").is_err());
        assert!(Tagname::new("trailing ").is_err());
        assert!(Tagname::new("foo,bar").is_err());
        assert!(Tagname::new(&"가".repeat(101)).is_err());
        assert!(Tagname::new("Best Practices").is_ok());
        assert!(Tagname::new("Vue.js").is_ok());
        assert!(Tagname::new("파이썬").is_ok());
    }

    #[test]
    fn slugs() {
        assert!(PostSlug::new("hello-world").is_ok());
        assert!(PostSlug::new("안녕-하세요_2").is_ok());
        assert!(PostSlug::new("Hello").is_err());
        assert!(PostSlug::new("a b").is_err());
        assert!(PostSlug::new("").is_err());
    }

    #[test]
    fn periods() {
        assert_eq!(Period::parse_lenient(None), Period::Day);
        assert_eq!(Period::parse_lenient(Some("week")), Period::Week);
        assert_eq!(Period::parse_lenient(Some("month")), Period::Month);
        assert_eq!(Period::parse_lenient(Some("decade")), Period::Year);
        assert_eq!(Period::Week.window(), Duration::days(7));
        assert_eq!(
            serde_json::from_str::<Period>("\"fortnight\"").unwrap(),
            Period::Year
        );
    }

    #[test]
    fn statuses() {
        assert_eq!(PostStatus::default(), PostStatus::Draft);
        assert_eq!(
            serde_json::to_string(&PostStatus::Published).unwrap(),
            "\"published\""
        );
        assert!("archived".parse::<PostStatus>().is_err());
    }

    #[test]
    fn emails() {
        let email = UserEmail::new("jane@example.com").unwrap();
        assert_eq!(email.local_part(), "jane");
        assert!(UserEmail::new("not an email").is_err());
    }
}
