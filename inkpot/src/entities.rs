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

//! # inkpot entities
//!
//! The things we write down: users, their blogs, their posts & the relationships between them
//! (likes, reads & follows). The refined string types from which these are built live in
//! [inkpot_shared] since the API types need them, too.
//!
//! Every entity here is serde-enabled; that's all the DynamoDB backend needs (via
//! [serde_dynamo]) and the in-memory backend needs nothing at all.

use std::{collections::{BTreeSet, HashSet}, str::FromStr};

use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use password_hash::{PasswordHashString, SaltString, rand_core::OsRng};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{Backtrace, IntoError, prelude::*};
use tap::Pipe;
use url::Url;

use inkpot_shared::{
    PostId, PostSlug, PostStatus, Tagname, UserEmail, UserId, Username,
    api::{BlogRsp, PostRsp, SocialLinks},
    mk_serde_de_err,
};

use crate::peppers::{self, Pepper, Peppers, Version as PepperVersion};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Bios may be at most {MAX_BIO_LENGTH} characters"))]
    BadBio { backtrace: Backtrace },
    #[snafu(display("Blog titles must be between 1 & {MAX_TITLE_LENGTH} characters"))]
    BadBlogTitle { backtrace: Backtrace },
    #[snafu(display("Nicknames may be at most {MAX_NICKNAME_LENGTH} characters"))]
    BadNickname { backtrace: Backtrace },
    #[snafu(display("Incorrect password"))]
    BadPassword { backtrace: Backtrace },
    #[snafu(display("Post titles must be between 1 & {MAX_TITLE_LENGTH} characters"))]
    BadPostTitle { backtrace: Backtrace },
    #[snafu(display("{text} is not a valid URL: {source}"))]
    BadSocialUrl {
        text: String,
        source: url::ParseError,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to check the password for {username}: {source}"))]
    CheckPassword {
        username: Username,
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to hash password: {source}"))]
    HashPassword {
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Bad hash string: {source}"))]
    HashString {
        source: password_hash::errors::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to build an Argon2id password hasher: {source}"))]
    Hasher {
        source: argon2::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("No pepper found for user {username}: {source}"))]
    NoPepper {
        username: Username,
        source: peppers::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("This password is too common"))]
    PasswordCommon { backtrace: Backtrace },
    #[snafu(display("This password is entirely numeric"))]
    PasswordNumeric { backtrace: Backtrace },
    #[snafu(display("The password is too similar to the {attribute}"))]
    PasswordSimilar {
        attribute: String,
        backtrace: Backtrace,
    },
    #[snafu(display(
        "This password is too short; it must contain at least {MIN_PASSWORD_LENGTH} characters"
    ))]
    PasswordTooShort { backtrace: Backtrace },
    #[snafu(display("Passwords may not begin or end in whitespace"))]
    PasswordWhitespace { backtrace: Backtrace },
    #[snafu(display("Failed to form a slug: {source}"))]
    Slug {
        source: inkpot_shared::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

pub const MAX_NICKNAME_LENGTH: usize = 100;
pub const MAX_BIO_LENGTH: usize = 255;
pub const MAX_TITLE_LENGTH: usize = 100;
pub const MIN_PASSWORD_LENGTH: usize = 8;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Passwords                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref COMMON_PASSWORDS: HashSet<&'static str> = HashSet::from([
        "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
        "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
        "696969", "shadow", "master", "666666", "qwertyuiop", "123321", "mustang", "1234567890",
        "michael", "654321", "superman", "1qaz2wsx", "7777777", "121212", "000000", "qazwsx",
        "123qwe", "killer", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter",
        "buster", "soccer", "harley", "batman", "andrew", "tigger", "sunshine", "iloveyou",
        "2000", "charlie", "robert", "thomas", "hockey", "ranger", "daniel", "starwars",
        "klaster", "112233", "george", "computer", "michelle", "jessica", "pepper", "1111",
        "zxcvbn", "555555", "11111111", "131313", "freedom", "777777", "pass", "maggie",
        "159753", "aaaaaa", "ginger", "princess", "joshua", "cheese", "amanda", "summer",
        "love", "ashley", "nicole", "chelsea", "biteme", "matthew", "access", "yankees",
        "987654321", "dallas", "austin", "thunder", "taylor", "matrix", "password1",
        "password123", "welcome", "welcome1", "admin", "admin123", "login", "passw0rd",
        "qwerty123", "1q2w3e4r", "1q2w3e4r5t", "qwe123", "abcd1234", "asdfghjkl", "zaq12wsx",
        "changeme", "secret", "letmein1", "iloveyou1", "football1", "baseball1", "master1",
        "sunshine1", "princess1", "dragon1", "monkey1", "shadow1", "superman1", "blahblah",
        "whatever", "trustme", "hello123", "hellohello", "internet", "starwars1", "q1w2e3r4",
    ]);
}

/// Apply password validation rules
///
/// Passwords must:
///
/// - not begin or end with whitespace (almost certainly a mistake that will drive the user bonkers
///   at login time)
/// - be at least eight characters long
/// - not be entirely numeric
/// - not be one of a list of well-known, commonly-used passwords
/// - not contain any of `user_inputs` (the username & the local part of the e-mail address, say);
///   comparison is case-insensitive & inputs of fewer than three characters are ignored
pub fn validate_password(password: &SecretString, user_inputs: &[(&str, &str)]) -> Result<()> {
    let text = password.expose_secret();
    ensure!(
        !text.starts_with(char::is_whitespace) && !text.ends_with(char::is_whitespace),
        PasswordWhitespaceSnafu
    );
    ensure!(
        text.chars().count() >= MIN_PASSWORD_LENGTH,
        PasswordTooShortSnafu
    );
    ensure!(
        !text.chars().all(|c| c.is_ascii_digit()),
        PasswordNumericSnafu
    );
    let lowered = text.to_lowercase();
    ensure!(
        !COMMON_PASSWORDS.contains(lowered.as_str()),
        PasswordCommonSnafu
    );
    if let Some((attribute, _)) = user_inputs
        .iter()
        .find(|(_, input)| input.chars().count() >= 3 && lowered.contains(&input.to_lowercase()))
    {
        return PasswordSimilarSnafu {
            attribute: attribute.to_string(),
        }
        .fail();
    }
    Ok(())
}

/// Newtype idiom so we can serde a [PasswordHashString]
///
/// Deserialization will fail if the serialized value isn't a legit PHC string.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UserHashString(#[serde(serialize_with = "serialize_hash_string")] PasswordHashString);

fn serialize_hash_string<S: serde::Serializer>(
    hash_string: &PasswordHashString,
    ser: S,
) -> StdResult<S::Ok, S::Error> {
    ser.serialize_str(hash_string.as_str())
}

impl UserHashString {
    pub fn password_hash(&self) -> PasswordHash<'_> {
        self.0.password_hash()
    }
}

impl<'de> Deserialize<'de> for UserHashString {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        UserHashString::try_from(s).map_err(mk_serde_de_err::<'de, D>)
    }
}

impl TryFrom<String> for UserHashString {
    type Error = Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Ok(UserHashString(
            PasswordHashString::new(&s).context(HashStringSnafu)?,
        ))
    }
}

/// Create an inkpot password hasher
///
/// Argon2id with the default parameters (m=19456, t=2, p=1), which comport with the OWASP Password
/// Storage [Cheat Sheet]. The pepper is supplied as the Argon2 "secret".
///
/// [Cheat Sheet]: https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html#password-hashing-algorithms
fn create_password_hasher(pepper: &Pepper) -> Result<Argon2<'_>> {
    Argon2::new_with_secret(
        pepper.as_ref().expose_secret(),
        Algorithm::Argon2id,
        Version::default(),
        Params::default(),
    )
    .context(HasherSnafu)
}

fn hash_password(pepper: &Pepper, password: &SecretString) -> Result<PasswordHashString> {
    let salt = SaltString::generate(&mut OsRng);
    let hasher = create_password_hasher(pepper)?;
    Ok(hasher
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .context(HashPasswordSnafu)?
        .serialize())
}

/// Parse a social link; the empty string means "no link"
pub fn parse_social_url(text: &str) -> Result<Option<Url>> {
    let text = text.trim();
    if text.is_empty() {
        Ok(None)
    } else {
        Url::parse(text)
            .context(BadSocialUrlSnafu {
                text: text.to_owned(),
            })?
            .pipe(Some)
            .pipe(Ok)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              User                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Represents an inkpot user
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct User {
    id: UserId,
    username: Username,
    email: UserEmail,
    password_hash: UserHashString,
    pepper_version: PepperVersion,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    bio: String,
    #[serde(default)]
    social: SocialLinks,
    /// Object store key for this user's profile picture, if any
    #[serde(default)]
    profile_image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new [User]
    ///
    /// This validates the password & hashes it, but does *not* check username uniqueness; that's
    /// the storage layer's job.
    pub fn new(
        pepper_version: &PepperVersion,
        pepper: &Pepper,
        username: &Username,
        password: &SecretString,
        email: &UserEmail,
    ) -> Result<User> {
        validate_password(
            password,
            &[("username", username.as_ref()), ("email address", email.local_part())],
        )?;
        let password_hash = hash_password(pepper, password)?;
        let now = Utc::now();
        Ok(User {
            id: UserId::new(),
            username: username.clone(),
            email: email.clone(),
            password_hash: UserHashString(password_hash),
            pepper_version: pepper_version.clone(),
            nickname: String::new(),
            bio: String::new(),
            social: SocialLinks::default(),
            profile_image: None,
            created_at: now,
            updated_at: now,
        })
    }
    /// Validate a password
    pub fn check_password(&self, peppers: &Peppers, password: &SecretString) -> Result<()> {
        let pepper = peppers
            .find_by_version(&self.pepper_version)
            .context(NoPepperSnafu {
                username: self.username.clone(),
            })?;
        let hasher = create_password_hasher(&pepper)?;
        match hasher.verify_password(
            password.expose_secret().as_bytes(),
            &self.password_hash.password_hash(),
        ) {
            Ok(_) => Ok(()),
            Err(password_hash::errors::Error::Password) => BadPasswordSnafu.fail(),
            Err(err) => Err(CheckPasswordSnafu {
                username: self.username.clone(),
            }
            .into_error(err)),
        }
    }
    pub fn bio(&self) -> &str {
        &self.bio
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    pub fn email(&self) -> &UserEmail {
        &self.email
    }
    pub fn id(&self) -> UserId {
        self.id
    }
    pub fn nickname(&self) -> &str {
        &self.nickname
    }
    pub fn pepper_version(&self) -> &PepperVersion {
        &self.pepper_version
    }
    pub fn profile_image(&self) -> Option<&str> {
        self.profile_image.as_deref()
    }
    pub fn social(&self) -> &SocialLinks {
        &self.social
    }
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    pub fn username(&self) -> &Username {
        &self.username
    }
    pub fn set_bio(&mut self, bio: &str) -> Result<()> {
        ensure!(bio.chars().count() <= MAX_BIO_LENGTH, BadBioSnafu);
        self.bio = bio.to_owned();
        self.updated_at = Utc::now();
        Ok(())
    }
    pub fn set_nickname(&mut self, nickname: &str) -> Result<()> {
        ensure!(
            nickname.chars().count() <= MAX_NICKNAME_LENGTH,
            BadNicknameSnafu
        );
        self.nickname = nickname.to_owned();
        self.updated_at = Utc::now();
        Ok(())
    }
    /// Replace the profile image key, returning the old one (so the caller can remove the object)
    pub fn set_profile_image(&mut self, key: Option<String>) -> Option<String> {
        self.updated_at = Utc::now();
        std::mem::replace(&mut self.profile_image, key)
    }
    pub fn set_social(&mut self, social: SocialLinks) {
        self.social = social;
        self.updated_at = Utc::now();
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              Blog                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Every user has exactly one blog, created along with their account
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Blog {
    owner_id: UserId,
    owner: Username,
    title: String,
    #[serde(default)]
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Blog {
    /// A new, empty blog for `owner`, titled "{username}'s Blog"
    pub fn new(owner: &User) -> Blog {
        let title: String = format!("{}'s Blog", owner.username())
            .chars()
            .take(MAX_TITLE_LENGTH)
            .collect();
        let now = Utc::now();
        Blog {
            owner_id: owner.id(),
            owner: owner.username().clone(),
            title,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn owner(&self) -> &Username {
        &self.owner
    }
    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_owned();
        self.updated_at = Utc::now();
    }
    pub fn set_title(&mut self, title: &str) -> Result<()> {
        let n = title.chars().count();
        ensure!(n >= 1 && n <= MAX_TITLE_LENGTH, BadBlogTitleSnafu);
        self.title = title.to_owned();
        self.updated_at = Utc::now();
        Ok(())
    }
    pub fn to_rsp(&self) -> BlogRsp {
        BlogRsp {
            owner: self.owner.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Slugs                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

const DEFAULT_SLUG: &str = "post";

/// Turn a post title into a URL-friendly slug
///
/// Lower-case the title, drop anything that isn't alphanumeric (in any script), an underscore, a
/// hyphen or whitespace, collapse runs of whitespace & hyphens into a single hyphen, then strip
/// leading & trailing hyphens & underscores. Titles with nothing slug-worthy in them get "post".
pub fn slugify(title: &str) -> Result<PostSlug> {
    let mut slug = String::with_capacity(title.len());
    let mut in_run = false;
    for c in title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_' || *c == '-')
    {
        if c.is_whitespace() || c == '-' {
            if !in_run {
                slug.push('-');
                in_run = true;
            }
        } else {
            slug.push(c);
            in_run = false;
        }
    }
    let slug = slug.trim_matches(|c| c == '-' || c == '_');
    PostSlug::new(if slug.is_empty() { DEFAULT_SLUG } else { slug }).context(SlugSnafu)
}

/// The `n`th disambiguated variant of `base`: "base-n"
pub fn nth_slug(base: &PostSlug, n: usize) -> Result<PostSlug> {
    PostSlug::from_str(&format!("{}-{}", base, n)).context(SlugSnafu)
}

/// Slugs that would collide with the fixed routes alongside `/posts/{slug}`
const RESERVED_SLUGS: &[&str] = &["drafts", "images"];

pub fn is_reserved_slug(slug: &PostSlug) -> bool {
    RESERVED_SLUGS.contains(&slug.as_ref())
}

/// The slugs a post may take, in order of preference: `base`, then "base-1", "base-2" & so on up
/// to (but not including) "base-`limit`", skipping any that are reserved
pub fn slug_candidates(base: PostSlug, limit: usize) -> impl Iterator<Item = Result<PostSlug>> {
    std::iter::once(Ok(base.clone()))
        .chain((1..limit).map(move |n| nth_slug(&base, n)))
        .filter(|slug| !slug.as_ref().is_ok_and(is_reserved_slug))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              Post                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref IMG_SRC: Regex =
        Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap(/* known good */);
}

fn check_post_title(title: &str) -> Result<()> {
    let n = title.chars().count();
    ensure!(n >= 1 && n <= MAX_TITLE_LENGTH, BadPostTitleSnafu);
    Ok(())
}

/// A blog post
///
/// The author's username is denormalized onto the post since usernames are immutable & nearly
/// every rendering of a post wants it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Post {
    id: PostId,
    author_id: UserId,
    author: Username,
    title: String,
    slug: PostSlug,
    content: String,
    status: PostStatus,
    #[serde(default)]
    tags: BTreeSet<Tagname>,
    #[serde(default)]
    likes: u64,
    #[serde(default)]
    views: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Post {
    /// Create a new [Post]; the caller is responsible for ensuring `slug` is unique
    pub fn new(
        author: &User,
        title: &str,
        slug: PostSlug,
        content: &str,
        status: PostStatus,
        tags: impl IntoIterator<Item = Tagname>,
    ) -> Result<Post> {
        check_post_title(title)?;
        let now = Utc::now();
        Ok(Post {
            id: PostId::new(),
            author_id: author.id(),
            author: author.username().clone(),
            title: title.to_owned(),
            slug,
            content: content.to_owned(),
            status,
            tags: tags.into_iter().collect(),
            likes: 0,
            views: 0,
            created_at: now,
            updated_at: now,
        })
    }
    pub fn author(&self) -> &Username {
        &self.author
    }
    pub fn author_id(&self) -> UserId {
        self.author_id
    }
    pub fn content(&self) -> &str {
        &self.content
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    pub fn id(&self) -> PostId {
        self.id
    }
    pub fn is_published(&self) -> bool {
        self.status.is_published()
    }
    pub fn likes(&self) -> u64 {
        self.likes
    }
    pub fn slug(&self) -> &PostSlug {
        &self.slug
    }
    pub fn status(&self) -> PostStatus {
        self.status
    }
    pub fn tags(&self) -> &BTreeSet<Tagname> {
        &self.tags
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    pub fn views(&self) -> u64 {
        self.views
    }
    /// The `src` attribute of the first `<img>` tag in the post body, if any
    pub fn thumbnail(&self) -> Option<&str> {
        IMG_SRC
            .captures(&self.content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
    /// True if `viewer` may see this post at all
    pub fn visible_to(&self, viewer: Option<&User>) -> bool {
        self.is_published() || viewer.is_some_and(|u| u.id() == self.author_id)
    }
    pub fn set_content(&mut self, content: &str) {
        self.content = content.to_owned();
        self.updated_at = Utc::now();
    }
    pub fn set_slug(&mut self, slug: PostSlug) {
        self.slug = slug;
        self.updated_at = Utc::now();
    }
    pub fn set_status(&mut self, status: PostStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
    pub fn set_tags(&mut self, tags: impl IntoIterator<Item = Tagname>) {
        self.tags = tags.into_iter().collect();
        self.updated_at = Utc::now();
    }
    pub fn set_title(&mut self, title: &str) -> Result<()> {
        check_post_title(title)?;
        self.title = title.to_owned();
        self.updated_at = Utc::now();
        Ok(())
    }
    /// Counters are maintained by the storage layer; this just reflects the latest values back
    /// onto an in-hand copy
    pub fn set_counts(&mut self, likes: u64, views: u64) {
        self.likes = likes;
        self.views = views;
    }
    pub fn to_rsp(&self) -> PostRsp {
        PostRsp {
            id: self.id,
            slug: self.slug.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            status: self.status,
            tags: self.tags.iter().cloned().collect(),
            author: self.author.clone(),
            likes: self.likes,
            views: self.views,
            thumbnail: self.thumbnail().map(str::to_owned),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
    /// Backdate a post; used when generating test data
    pub fn set_created_at(&mut self, created_at: DateTime<Utc>) {
        self.created_at = created_at;
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                  Likes, Reads & Follows                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// `user_id` likes `post_id`; at most one per (user, post)
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PostLike {
    pub user_id: UserId,
    pub post_id: PostId,
    pub created_at: DateTime<Utc>,
}

impl PostLike {
    pub fn new(user_id: UserId, post_id: PostId) -> PostLike {
        PostLike {
            user_id,
            post_id,
            created_at: Utc::now(),
        }
    }
}

/// `user_id` has read `post_id`; re-reading bumps `updated_at`
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PostRead {
    pub user_id: UserId,
    pub post_id: PostId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostRead {
    pub fn new(user_id: UserId, post_id: PostId) -> PostRead {
        let now = Utc::now();
        PostRead {
            user_id,
            post_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `follower_id` follows `following_id`; never the same user
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Follow {
    pub follower_id: UserId,
    pub following_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Follow {
    pub fn new(follower_id: UserId, following_id: UserId) -> Follow {
        Follow {
            follower_id,
            following_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_owned())
    }

    fn test_user(name: &str) -> (Peppers, User) {
        let peppers = Peppers::default();
        let (version, pepper) = peppers.current_pepper().unwrap();
        let user = User::new(
            &version,
            &pepper,
            &Username::new(name).unwrap(),
            &secret("correct horse battery staple"),
            &UserEmail::new(&format!("{}@example.com", name)).unwrap(),
        )
        .unwrap();
        (peppers, user)
    }

    #[test]
    fn password_rules() {
        let inputs = [("username", "johndoe"), ("email address", "jd")];
        assert!(validate_password(&secret("correct horse battery staple"), &inputs).is_ok());
        assert!(matches!(
            validate_password(&secret(" leading space"), &inputs),
            Err(Error::PasswordWhitespace { .. })
        ));
        assert!(matches!(
            validate_password(&secret("short"), &inputs),
            Err(Error::PasswordTooShort { .. })
        ));
        assert!(matches!(
            validate_password(&secret("8675309123"), &inputs),
            Err(Error::PasswordNumeric { .. })
        ));
        assert!(matches!(
            validate_password(&secret("Password1"), &inputs),
            Err(Error::PasswordCommon { .. })
        ));
        assert!(matches!(
            validate_password(&secret("I am JohnDoe, really"), &inputs),
            Err(Error::PasswordSimilar { .. })
        ));
        // "jd" is too short to count
        assert!(validate_password(&secret("jdjdjdjdjdjd xyzzy"), &inputs).is_ok());
    }

    #[test]
    fn check_passwords() {
        let (peppers, user) = test_user("johndoe");
        assert!(
            user.check_password(&peppers, &secret("correct horse battery staple"))
                .is_ok()
        );
        assert!(matches!(
            user.check_password(&peppers, &secret("incorrect horse battery staple")),
            Err(Error::BadPassword { .. })
        ));
        // A user serialized & deserialized should still check out
        let round_tripped: User = serde_json::to_string(&user)
            .unwrap()
            .pipe(|s| serde_json::from_str(&s))
            .unwrap();
        assert!(
            round_tripped
                .check_password(&peppers, &secret("correct horse battery staple"))
                .is_ok()
        );
    }

    #[test]
    fn default_blog_titles() {
        let (_, user) = test_user("johndoe");
        let blog = Blog::new(&user);
        assert_eq!(blog.title(), "johndoe's Blog");
        assert_eq!(blog.owner_id(), user.id());
    }

    #[test]
    fn slugs() {
        assert_eq!(&*slugify("Hello, World!").unwrap(), "hello-world");
        assert_eq!(&*slugify("  Rust -- is __fun__  ").unwrap(), "rust-is-__fun");
        assert_eq!(&*slugify("안녕하세요 세계").unwrap(), "안녕하세요-세계");
        assert_eq!(&*slugify("!!!").unwrap(), "post");
        assert_eq!(&*slugify("").unwrap(), "post");
        let base = slugify("Hello").unwrap();
        assert_eq!(&*nth_slug(&base, 2).unwrap(), "hello-2");
    }

    #[test]
    fn reserved_slugs() {
        let candidates = |title: &str| {
            slug_candidates(slugify(title).unwrap(), 3)
                .map(|slug| slug.unwrap().to_string())
                .collect::<Vec<String>>()
        };
        assert_eq!(candidates("Hello"), vec!["hello", "hello-1", "hello-2"]);
        assert_eq!(candidates("Drafts"), vec!["drafts-1", "drafts-2"]);
        assert_eq!(candidates("images!"), vec!["images-1", "images-2"]);
        assert!(is_reserved_slug(&slugify("DRAFTS").unwrap()));
        assert!(!is_reserved_slug(&slugify("drafts-1").unwrap()));
    }

    #[test]
    fn thumbnails() {
        let (_, user) = test_user("johndoe");
        let mut post = Post::new(
            &user,
            "Pictures",
            slugify("Pictures").unwrap(),
            r#"<p>Look:</p><IMG class="x" src="/media/a.png"><img src='/media/b.png'>"#,
            PostStatus::Published,
            vec![],
        )
        .unwrap();
        assert_eq!(post.thumbnail(), Some("/media/a.png"));
        post.set_content("<p>No pictures here</p>");
        assert_eq!(post.thumbnail(), None);
    }

    #[test]
    fn titles() {
        let (_, user) = test_user("johndoe");
        assert!(
            Post::new(
                &user,
                "",
                slugify("").unwrap(),
                "",
                PostStatus::Draft,
                vec![]
            )
            .is_err()
        );
        let long = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(
            Post::new(
                &user,
                &long,
                slugify(&long).unwrap(),
                "",
                PostStatus::Draft,
                vec![]
            )
            .is_err()
        );
    }

    #[test]
    fn visibility() {
        let (_, user) = test_user("johndoe");
        let (_, other) = test_user("janedoe");
        let post = Post::new(
            &user,
            "Draft",
            slugify("Draft").unwrap(),
            "",
            PostStatus::Draft,
            vec![],
        )
        .unwrap();
        assert!(post.visible_to(Some(&user)));
        assert!(!post.visible_to(Some(&other)));
        assert!(!post.visible_to(None));
    }

    #[test]
    fn social_urls() {
        assert_eq!(parse_social_url("").unwrap(), None);
        assert!(parse_social_url("https://github.com/johndoe").unwrap().is_some());
        assert!(parse_social_url("not a url").is_err());
    }
}
