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

//! # inkpot Authentication Tokens
//!
//! Logging in yields a [JWT], signed with HMAC-SHA256 using the current [signing key]. The key ID
//! goes into the token header so that verification can find the right key after rotation.
//!
//! [JWT]: https://www.rfc-editor.org/rfc/rfc7519.html
//! [signing key]: crate::signing_keys

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{Header, SignWithKey, Token, VerifyWithKey};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use snafu::{Backtrace, prelude::*};

use inkpot_shared::Username;

use crate::signing_keys::{self, KeyId, SigningKey, SigningKeys};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Token expired at {expires}"))]
    Expired {
        expires: DateTime<Utc>,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to create an HMAC: {source}"))]
    Hmac {
        source: hmac::digest::InvalidLength,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to refine a string to a KeyId: {source}"))]
    KeyId {
        source: signing_keys::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("The Key ID was missing from the JWT"))]
    MissingKeyId { backtrace: Backtrace },
    #[snafu(display("No signing key matching {keyid}: {source}"))]
    NoKey {
        keyid: KeyId,
        source: signing_keys::Error,
    },
    #[snafu(display("Invalid token: not before {not_before}"))]
    NotBefore {
        not_before: DateTime<Utc>,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to parse JWT: {source}"))]
    Parse {
        source: jwt::error::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to sign JWT claims: {source}"))]
    Signature {
        source: jwt::error::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Unknown token audience {audience}"))]
    UnknownAudience {
        audience: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Unknown token issuer {issuer}"))]
    UnknownIssuer { issuer: String, backtrace: Backtrace },
    #[snafu(display("Verification failure: {source}"))]
    Verification {
        source: jwt::error::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// inkpot [JWT] claims
#[derive(Clone, Debug, Deserialize, Serialize)]
struct Claims {
    #[serde(rename = "iat")]
    issued_at: DateTime<Utc>,
    #[serde(rename = "iss")]
    issuer: String,
    #[serde(rename = "aud")]
    audience: String,
    #[serde(rename = "nbf")]
    not_before: DateTime<Utc>,
    #[serde(rename = "exp")]
    expires: DateTime<Utc>,
    #[serde(rename = "sub")]
    subject: Username,
}

fn hmac_for(signing_key: &SigningKey) -> Result<Hmac<Sha256>> {
    Hmac::new_from_slice(signing_key.as_ref().expose_secret()).context(HmacSnafu)
}

/// Mint a new JWT naming `username`, signed with `signing_key` (identified by `keyid`) and good for
/// `lifetime`. `issuer` is the host at which inkpot is publicly reachable; the audience will be
/// "api.{issuer}".
pub fn mint_token(
    username: &Username,
    keyid: &KeyId,
    signing_key: &SigningKey,
    issuer: &str,
    lifetime: &Duration,
) -> Result<String> {
    let key = hmac_for(signing_key)?;
    let header = Header {
        key_id: Some(keyid.to_string()),
        ..Default::default()
    };
    let now = Utc::now();
    let claims = Claims {
        issued_at: now,
        issuer: issuer.to_owned(),
        audience: format!("api.{}", issuer),
        not_before: now,
        expires: now + *lifetime,
        subject: username.clone(),
    };
    Ok(Token::new(header, claims)
        .sign_with_key(&key)
        .context(SignatureSnafu)?
        .as_str()
        .to_owned())
}

/// Verify a JWT's signature & claims, returning the [Username] it names
pub fn verify_token(token_string: &str, keys: &SigningKeys, issuer: &str) -> Result<Username> {
    let token: Token<Header, Claims, _> =
        Token::parse_unverified(token_string).context(ParseSnafu)?;
    let keyid = token
        .header()
        .key_id
        .clone()
        .context(MissingKeyIdSnafu)?;
    let keyid = KeyId::new(&keyid).context(KeyIdSnafu)?;
    let signing_key = keys.find_by_version(&keyid).context(NoKeySnafu { keyid })?;
    let key = hmac_for(&signing_key)?;
    let token: Token<Header, Claims, _> = token_string
        .verify_with_key(&key)
        .context(VerificationSnafu)?;
    let claims = token.claims();

    let now = Utc::now();
    ensure!(
        now >= claims.not_before,
        NotBeforeSnafu {
            not_before: claims.not_before
        }
    );
    ensure!(
        now <= claims.expires,
        ExpiredSnafu {
            expires: claims.expires
        }
    );
    ensure!(
        issuer == claims.issuer,
        UnknownIssuerSnafu {
            issuer: claims.issuer.clone()
        }
    );
    ensure!(
        format!("api.{}", issuer) == claims.audience,
        UnknownAudienceSnafu {
            audience: claims.audience.clone()
        }
    );

    Ok(claims.subject.clone())
}

#[cfg(test)]
mod test {
    use super::*;

    fn key() -> (KeyId, SigningKey) {
        (
            KeyId::new("keyid:20250817").unwrap(),
            // Sixty-four octets, exactly
            SigningKey::new(
                b"All that is gold does not glitter-- Not all who wander are lost.".to_vec(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn verify_minted_token() {
        let username = Username::new("johndoe").unwrap();
        let (key_id, signing_key) = key();

        let token = mint_token(
            &username,
            &key_id,
            &signing_key,
            "inkpot.example.com",
            &Duration::seconds(300),
        )
        .unwrap();

        let keys = SigningKeys::from([(key_id, signing_key)]);
        let verified = verify_token(&token, &keys, "inkpot.example.com").unwrap();
        assert_eq!(username, verified);

        assert!(matches!(
            verify_token(&token, &keys, "elsewhere.example.com"),
            Err(Error::UnknownIssuer { .. })
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let username = Username::new("johndoe").unwrap();
        let (key_id, signing_key) = key();
        let token = mint_token(
            &username,
            &key_id,
            &signing_key,
            "inkpot.example.com",
            &Duration::seconds(-1),
        )
        .unwrap();
        let keys = SigningKeys::from([(key_id, signing_key)]);
        assert!(matches!(
            verify_token(&token, &keys, "inkpot.example.com"),
            Err(Error::Expired { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let username = Username::new("johndoe").unwrap();
        let (key_id, signing_key) = key();
        let token = mint_token(
            &username,
            &key_id,
            &signing_key,
            "inkpot.example.com",
            &Duration::seconds(300),
        )
        .unwrap();
        let keys = SigningKeys::default();
        assert!(matches!(
            verify_token(&token, &keys, "inkpot.example.com"),
            Err(Error::NoKey { .. })
        ));
    }
}
