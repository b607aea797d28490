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

//! # User API
//!
//! Sign-up, login, profiles & the follow graph.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Multipart, Path, State, multipart::MultipartError, rejection::ExtensionRejection},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use snafu::{Backtrace, prelude::*};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{debug, error, info, instrument};

use inkpot_shared::{
    Username,
    api::{
        FollowRsp, LoginReq, LoginRsp, ProfileRsp, ProfileUpdateReq, PublicProfileRsp, SignupReq,
        SignupRsp, SocialLinks, SocialUpdateReq, UploadRsp,
    },
};

use crate::{
    authn::{self, authenticate, check_password},
    counter_add,
    entities::{self, Blog, User, parse_social_url},
    http::ErrorResponseBody,
    images::{self, next_upload, profile_image_key},
    inkpot::Inkpot,
    metrics::{self, Sort},
    peppers,
    signing_keys::{self, SigningKeys},
    storage,
    token::{self, mint_token},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to add user: {source}"))]
    AddUser { source: storage::Error },
    #[snafu(display("Invalid profile: {source}"))]
    BadProfile { source: entities::Error },
    #[snafu(display("Users may not follow themselves"))]
    CannotFollowSelf { backtrace: Backtrace },
    #[snafu(display("Invalid credentials: {source}"))]
    InvalidCredentials { source: authn::Error },
    #[snafu(display("Media store failure: {source}"))]
    Media { source: images::Error },
    #[snafu(display("Failed to read multipart body: {source}"))]
    Multipart { source: MultipartError },
    #[snafu(display("No blog found for {username}"))]
    NoBlog {
        username: Username,
        backtrace: Backtrace,
    },
    #[snafu(display("No file was uploaded"))]
    NoFile { backtrace: Backtrace },
    #[snafu(display("{username} has no profile image"))]
    NoProfileImage {
        username: Username,
        backtrace: Backtrace,
    },
    #[snafu(display("No signing keys available: {source}"))]
    NoKeys {
        source: signing_keys::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("{source}"))]
    NoPepper { source: peppers::Error },
    #[snafu(display("Uploads of type {content_type} are not accepted; please upload an image"))]
    NotAnImage {
        content_type: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Authentication required"))]
    NotAuthenticated { backtrace: Backtrace },
    #[snafu(display("Storage error: {source}"))]
    Storage { source: storage::Error },
    #[snafu(display("Failed to mint a token for user {username}: {source}"))]
    Token {
        username: Username,
        #[snafu(source(from(token::Error, Box::new)))]
        source: Box<token::Error>,
    },
    #[snafu(display("Unknown username {username}"))]
    UnknownUser {
        username: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to create user: {source}"))]
    UserSignup { source: entities::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            ////////////////////////////////////////////////////////////////////////////////////////
            // Broken requests-- tell the caller how to fix it
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::AddUser { source } if source.is_username_taken() => {
                (StatusCode::BAD_REQUEST, format!("{}; sorry", source))
            }
            Error::BadProfile { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            Error::CannotFollowSelf { .. } => (StatusCode::BAD_REQUEST, format!("{}", self)),
            Error::Multipart { source } => (source.status(), source.body_text()),
            Error::NoFile { .. } => (StatusCode::BAD_REQUEST, format!("{}", self)),
            Error::NoProfileImage { .. } => (StatusCode::BAD_REQUEST, format!("{}", self)),
            Error::NotAnImage { .. } => (StatusCode::BAD_REQUEST, format!("{}", self)),
            Error::UnknownUser { .. } => (StatusCode::NOT_FOUND, format!("{}", self)),
            Error::UserSignup { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            ////////////////////////////////////////////////////////////////////////////////////////
            // Authorization failure-- don't tell a potential attacker the way in which they failed
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::InvalidCredentials { source } => source.as_status_and_msg(),
            Error::NotAuthenticated { .. } => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            ////////////////////////////////////////////////////////////////////////////////////////
            // Internal failure-- own up to it:
            ////////////////////////////////////////////////////////////////////////////////////////
            Error::AddUser { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to add user: {source}"),
            ),
            Error::Media { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Media store failure: {source}"),
            ),
            Error::NoBlog { .. } => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", self)),
            Error::NoKeys { source, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "No signing keys found ({}); did you configure the program?",
                    source
                ),
            ),
            Error::NoPepper { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "No pepper available".to_string(),
            ),
            Error::Storage { source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Storage error: {source}"),
            ),
            Error::Token {
                username, source, ..
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to mint a token for {}: {}", username, source),
            ),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (code, msg) = self.as_status_and_msg();
        (code, Json(ErrorResponseBody { error: msg })).into_response()
    }
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

/// Resolve the `Extension<User>` extractor to the authenticated caller, or fail
fn caller(user: StdResult<Extension<User>, ExtensionRejection>) -> Result<User> {
    user.map(|Extension(user)| user)
        .map_err(|_| NotAuthenticatedSnafu.build())
}

async fn user_by_name(state: &Inkpot, username: &str) -> Result<User> {
    state
        .storage
        .user_for_name(username)
        .await
        .context(StorageSnafu)?
        .context(UnknownUserSnafu {
            username: username.to_owned(),
        })
}

async fn blog_for(state: &Inkpot, user: &User) -> Result<Blog> {
    state
        .storage
        .blog_for_owner(&user.id())
        .await
        .context(StorageSnafu)?
        .context(NoBlogSnafu {
            username: user.username().clone(),
        })
}

/// Resolve a user's profile picture key to an URL
fn profile_image_url(state: &Inkpot, user: &User) -> Result<Option<url::Url>> {
    user.profile_image()
        .map(|key| state.media.url(key))
        .transpose()
        .context(MediaSnafu)
}

async fn profile_rsp(state: &Inkpot, user: &User) -> Result<ProfileRsp> {
    let blog = blog_for(state, user).await?;
    Ok(ProfileRsp {
        username: user.username().clone(),
        email: user.email().clone(),
        nickname: user.nickname().to_owned(),
        bio: user.bio().to_owned(),
        profile_image: profile_image_url(state, user)?,
        social: user.social().clone(),
        blog: blog.to_rsp(),
        followers_count: state
            .storage
            .followers_count(&user.id())
            .await
            .context(StorageSnafu)?,
        following_count: state
            .storage
            .following(&user.id())
            .await
            .context(StorageSnafu)?
            .len() as u64,
    })
}

/// Render the outcome of a handler, bumping the success or failure counter as appropriate
fn respond<T: serde::Serialize>(
    state: &Inkpot,
    result: Result<T>,
    status: StatusCode,
    success: &str,
    failure: &str,
) -> axum::response::Response {
    match result {
        Ok(rsp) => {
            counter_add!(state.instruments, success, 1, &[]);
            (status, Json(rsp)).into_response()
        }
        Err(err) => {
            let (code, _) = err.as_status_and_msg();
            if code.is_server_error() {
                error!("{:#?}", err);
            } else {
                info!("{}", err);
            }
            counter_add!(state.instruments, failure, 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        `/users/signup`                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("user.signups.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("user.signups.failures", Sort::IntegralCounter) }

/// Sign-up as a new user
///
/// Parameters:
///
/// - username: up to 150 characters: letters, digits & `@.+-_`; must be unique
///
/// - password: at least eight characters, not entirely numeric, not a commonly used password & not
///   too similar to the username or e-mail address. inkpot will not store passwords (it stores an
///   Argon2id hash of the salted & peppered password)
///
/// - email: a contact e-mail for this user
///
/// The new user's blog is created along with their account. Unlike most endpoints in this API,
/// there is no authentication on this method.
#[instrument(level = "debug", skip(state, signup_req), fields(username = %signup_req.username))]
async fn signup(
    State(state): State<Arc<Inkpot>>,
    Json(signup_req): Json<SignupReq>,
) -> axum::response::Response {
    async fn signup1(state: &Inkpot, signup_req: SignupReq) -> Result<SignupRsp> {
        let (pepper_ver, pepper_key) = state.pepper.current_pepper().context(NoPepperSnafu)?;
        let password = SecretString::from(signup_req.password.expose_secret().0.clone());
        let user = User::new(
            &pepper_ver,
            &pepper_key,
            &signup_req.username,
            &password,
            &signup_req.email,
        )
        .context(UserSignupSnafu)?;
        state.storage.add_user(&user).await.context(AddUserSnafu)?;
        if let Err(err) = state.storage.add_blog(&Blog::new(&user)).await {
            // An account without a blog is useless; give the name back
            if let Err(cleanup) = state.storage.delete_user(&user).await {
                error!(
                    "Failed to remove {} after failing to create their blog: {}",
                    user.username(),
                    cleanup
                );
            }
            return Err(err).context(StorageSnafu);
        }
        info!("Created user {}", user.username());
        Ok(SignupRsp {
            greeting: format!("Welcome to inkpot, {}!", user.username()),
        })
    }

    respond(
        &state,
        signup1(&state, signup_req).await,
        StatusCode::CREATED,
        "user.signups.successful",
        "user.signups.failures",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         `/users/login`                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("user.logins.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("user.logins.failures", Sort::IntegralCounter) }

/// Login as an existing user
///
/// This endpoint will vend a time-limited JWT that can be supplied in the Authorization header
/// (with the bearer scheme) in subsequent requests.
#[instrument(level = "debug", skip(state, login_req), fields(username = %login_req.username))]
async fn login(
    State(state): State<Arc<Inkpot>>,
    Json(login_req): Json<LoginReq>,
) -> axum::response::Response {
    async fn login1(
        state: &Inkpot,
        token_lifetime: &Duration,
        signing_keys: &SigningKeys,
        login_req: LoginReq,
    ) -> Result<LoginRsp> {
        let password = SecretString::from(login_req.password.expose_secret().0.clone());
        let user = check_password(
            state.storage.as_ref(),
            &state.pepper,
            &login_req.username,
            &password,
        )
        .await
        .context(InvalidCredentialsSnafu)?;
        let (keyid, signing_key) = signing_keys.current().context(NoKeysSnafu)?;
        let token = mint_token(
            user.username(),
            &keyid,
            &signing_key,
            state.host(),
            token_lifetime,
        )
        .context(TokenSnafu {
            username: user.username().clone(),
        })?;
        info!("Logged-in user {}", user.username());
        Ok(LoginRsp { token })
    }

    respond(
        &state,
        login1(&state, &state.token_lifetime, &state.signing_keys, login_req).await,
        StatusCode::OK,
        "user.logins.successful",
        "user.logins.failures",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        `/users/profile`                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("user.profile.reads", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("user.profile.updates", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("user.profile.failures", Sort::IntegralCounter) }

/// Retrieve the caller's own profile
async fn get_profile(
    State(state): State<Arc<Inkpot>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn get_profile1(
        state: &Inkpot,
        user: StdResult<Extension<User>, ExtensionRejection>,
    ) -> Result<ProfileRsp> {
        let user = caller(user)?;
        profile_rsp(state, &user).await
    }

    respond(
        &state,
        get_profile1(&state, user).await,
        StatusCode::OK,
        "user.profile.reads",
        "user.profile.failures",
    )
}

/// Update the caller's blog description, nickname and/or bio
#[instrument(level = "debug", skip(state, user))]
async fn update_profile(
    State(state): State<Arc<Inkpot>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
    Json(req): Json<ProfileUpdateReq>,
) -> axum::response::Response {
    async fn update_profile1(
        state: &Inkpot,
        user: StdResult<Extension<User>, ExtensionRejection>,
        req: ProfileUpdateReq,
    ) -> Result<ProfileRsp> {
        let mut user = caller(user)?;
        if req.nickname.is_some() || req.bio.is_some() {
            if let Some(nickname) = req.nickname.as_deref() {
                user.set_nickname(nickname.trim()).context(BadProfileSnafu)?;
            }
            if let Some(bio) = req.bio.as_deref() {
                user.set_bio(bio.trim()).context(BadProfileSnafu)?;
            }
            state.storage.update_user(&user).await.context(StorageSnafu)?;
        }
        if let Some(description) = req.blog_description.as_deref() {
            let mut blog = blog_for(state, &user).await?;
            blog.set_description(description);
            state.storage.update_blog(&blog).await.context(StorageSnafu)?;
        }
        debug!("Updated profile for {}", user.username());
        profile_rsp(state, &user).await
    }

    respond(
        &state,
        update_profile1(&state, user, req).await,
        StatusCode::OK,
        "user.profile.updates",
        "user.profile.failures",
    )
}

/// Update the caller's social links; an empty string clears a link, an absent field leaves it be
#[instrument(level = "debug", skip(state, user))]
async fn update_social(
    State(state): State<Arc<Inkpot>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
    Json(req): Json<SocialUpdateReq>,
) -> axum::response::Response {
    async fn update_social1(
        state: &Inkpot,
        user: StdResult<Extension<User>, ExtensionRejection>,
        req: SocialUpdateReq,
    ) -> Result<ProfileRsp> {
        let mut user = caller(user)?;
        let current = user.social().clone();
        let pick = |update: Option<&str>, current: Option<url::Url>| -> Result<Option<url::Url>> {
            match update {
                Some(text) => parse_social_url(text).context(BadProfileSnafu),
                None => Ok(current),
            }
        };
        let social = SocialLinks {
            github: pick(req.github.as_deref(), current.github)?,
            twitter: pick(req.twitter.as_deref(), current.twitter)?,
            facebook: pick(req.facebook.as_deref(), current.facebook)?,
            homepage: pick(req.homepage.as_deref(), current.homepage)?,
        };
        user.set_social(social);
        state.storage.update_user(&user).await.context(StorageSnafu)?;
        profile_rsp(state, &user).await
    }

    respond(
        &state,
        update_social1(&state, user, req).await,
        StatusCode::OK,
        "user.profile.updates",
        "user.profile.failures",
    )
}

/// Upload a new profile picture (multipart field `profile_image`), replacing any existing one
#[instrument(level = "debug", skip_all)]
async fn upload_profile_image(
    State(state): State<Arc<Inkpot>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
    mut multipart: Multipart,
) -> axum::response::Response {
    async fn upload_profile_image1(
        state: &Inkpot,
        user: StdResult<Extension<User>, ExtensionRejection>,
        multipart: &mut Multipart,
    ) -> Result<UploadRsp> {
        let mut user = caller(user)?;
        let upload = next_upload(multipart, &["profile_image"])
            .await
            .context(MultipartSnafu)?
            .context(NoFileSnafu)?;
        ensure!(
            upload.is_image(),
            NotAnImageSnafu {
                content_type: upload.content_type.clone()
            }
        );
        let key = profile_image_key(&upload.extension());
        let location = state
            .media
            .put(&key, upload.bytes, &upload.content_type)
            .await
            .context(MediaSnafu)?;
        let previous = user.set_profile_image(Some(key));
        state.storage.update_user(&user).await.context(StorageSnafu)?;
        if let Some(previous) = previous {
            // The new image is in place; failing to clean-up the old one shouldn't fail the request
            if let Err(err) = state.media.delete(&previous).await {
                error!("Failed to remove old profile image {}: {}", previous, err);
            }
        }
        Ok(UploadRsp {
            location,
            success: true,
        })
    }

    respond(
        &state,
        upload_profile_image1(&state, user, &mut multipart).await,
        StatusCode::OK,
        "user.profile.updates",
        "user.profile.failures",
    )
}

/// Remove the caller's profile picture
async fn remove_profile_image(
    State(state): State<Arc<Inkpot>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn remove_profile_image1(
        state: &Inkpot,
        user: StdResult<Extension<User>, ExtensionRejection>,
    ) -> Result<ProfileRsp> {
        let mut user = caller(user)?;
        let key = user.set_profile_image(None).context(NoProfileImageSnafu {
            username: user.username().clone(),
        })?;
        state.storage.update_user(&user).await.context(StorageSnafu)?;
        state.media.delete(&key).await.context(MediaSnafu)?;
        profile_rsp(state, &user).await
    }

    respond(
        &state,
        remove_profile_image1(&state, user).await,
        StatusCode::OK,
        "user.profile.updates",
        "user.profile.failures",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                   `/users/follow/{username}`                                   //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("user.follows.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("user.follows.failures", Sort::IntegralCounter) }

/// Follow, or un-follow, `username`
#[instrument(level = "debug", skip(state, user))]
async fn follow(
    State(state): State<Arc<Inkpot>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
    Path(username): Path<String>,
) -> axum::response::Response {
    async fn follow1(
        state: &Inkpot,
        user: StdResult<Extension<User>, ExtensionRejection>,
        username: &str,
    ) -> Result<FollowRsp> {
        let user = caller(user)?;
        let target = user_by_name(state, username).await?;
        ensure!(user.id() != target.id(), CannotFollowSelfSnafu);
        let following = state
            .storage
            .toggle_follow(&user.id(), &target.id())
            .await
            .context(StorageSnafu)?;
        info!(
            "{} {} {}",
            user.username(),
            if following { "follows" } else { "un-followed" },
            target.username()
        );
        Ok(FollowRsp {
            following,
            followers_count: state
                .storage
                .followers_count(&target.id())
                .await
                .context(StorageSnafu)?,
        })
    }

    respond(
        &state,
        follow1(&state, user, &username).await,
        StatusCode::OK,
        "user.follows.successful",
        "user.follows.failures",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          `/users/me`                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("user.deletions.successful", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("user.deletions.failures", Sort::IntegralCounter) }

/// Delete the caller's account along with everything they own
#[instrument(level = "debug", skip_all)]
async fn delete_me(
    State(state): State<Arc<Inkpot>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
) -> axum::response::Response {
    async fn delete_me1(
        state: &Inkpot,
        user: StdResult<Extension<User>, ExtensionRejection>,
    ) -> Result<()> {
        let user = caller(user)?;
        state.storage.delete_user(&user).await.context(StorageSnafu)?;
        if let Some(key) = user.profile_image() {
            if let Err(err) = state.media.delete(key).await {
                error!("Failed to remove profile image {}: {}", key, err);
            }
        }
        info!("Deleted user {}", user.username());
        Ok(())
    }

    match delete_me1(&state, user).await {
        Ok(_) => {
            counter_add!(state.instruments, "user.deletions.successful", 1, &[]);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("{:#?}", err);
            counter_add!(state.instruments, "user.deletions.failures", 1, &[]);
            err.into_response()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      `/users/{username}`                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Retrieve somebody's public profile
async fn public_profile(
    State(state): State<Arc<Inkpot>>,
    user: StdResult<Extension<User>, ExtensionRejection>,
    Path(username): Path<String>,
) -> axum::response::Response {
    async fn public_profile1(
        state: &Inkpot,
        viewer: Option<User>,
        username: &str,
    ) -> Result<PublicProfileRsp> {
        let user = user_by_name(state, username).await?;
        let is_following = match viewer {
            Some(viewer) => state
                .storage
                .is_following(&viewer.id(), &user.id())
                .await
                .context(StorageSnafu)?,
            None => false,
        };
        let profile = profile_rsp(state, &user).await?;
        Ok(PublicProfileRsp {
            username: profile.username,
            nickname: profile.nickname,
            bio: profile.bio,
            profile_image: profile.profile_image,
            social: profile.social,
            blog: profile.blog,
            followers_count: profile.followers_count,
            following_count: profile.following_count,
            is_following,
        })
    }

    respond(
        &state,
        public_profile1(&state, user.ok().map(|Extension(u)| u), &username).await,
        StatusCode::OK,
        "user.profile.reads",
        "user.profile.failures",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the User API
///
/// The returned [Router] will presumably be merged with other routers & nested beneath `/api/v1`.
pub fn make_router(state: Arc<Inkpot>) -> Router<Arc<Inkpot>> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/profile", get(get_profile).post(update_profile))
        .route("/users/profile/social", post(update_social))
        .route("/users/profile/image", post(upload_profile_image))
        .route("/users/profile/image/remove", post(remove_profile_image))
        .route("/users/follow/{username}", post(follow))
        .route("/users/me", delete(delete_me))
        .route("/users/{username}", get(public_profile))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authenticate,
        ))
        // All responses are JSON; add the appropriate Content-Type header (but leave the existing
        // Content-Type header should a handler set it specially).
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
