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

//! Integration tests for the user API.

use libtest_mimic::Failed;
use reqwest::{Client, StatusCode, Url};
use serde_json::json;

use inkpot_shared::api::{FollowRsp, ProfileRsp, PublicProfileRsp};

use crate::{ErrorBody, PASSWORD, login, new_user, signup, with_auth};

/// Sign up, collide with an existing username, log in (well & badly)
pub async fn test_signup(url: Url) -> Result<(), Failed> {
    let client = Client::new();

    signup(&client, &url, "johndoe").await?;

    let rsp = client
        .post(url.join("/api/v1/users/signup")?)
        .json(&json!({"username": "johndoe", "password": PASSWORD, "email": "jdoe@example.com"}))
        .send()
        .await?;
    assert_eq!(StatusCode::BAD_REQUEST, rsp.status());
    let body = rsp.json::<ErrorBody>().await?;
    assert!(body.error.contains("johndoe"));

    // Too short
    let rsp = client
        .post(url.join("/api/v1/users/signup")?)
        .json(&json!({"username": "janedoe", "password": "f00", "email": "jane@example.com"}))
        .send()
        .await?;
    assert_eq!(StatusCode::BAD_REQUEST, rsp.status());

    login(&client, &url, "johndoe").await?;

    let rsp = client
        .post(url.join("/api/v1/users/login")?)
        .json(&json!({"username": "johndoe", "password": "not my password"}))
        .send()
        .await?;
    assert_eq!(StatusCode::UNAUTHORIZED, rsp.status());

    Ok(())
}

/// Read & update one's own profile; read someone else's
pub async fn test_profile(url: Url) -> Result<(), Failed> {
    let client = Client::new();
    let auth = new_user(&client, &url, "profiler").await?;

    let rsp = client
        .get(url.join("/api/v1/users/profile")?)
        .send()
        .await?;
    assert_eq!(StatusCode::UNAUTHORIZED, rsp.status());

    let rsp = with_auth(client.get(url.join("/api/v1/users/profile")?), &auth)
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let profile = rsp.json::<ProfileRsp>().await?;
    assert_eq!("profiler", profile.username.as_ref());
    assert_eq!("profiler's Blog", profile.blog.title);
    assert!(profile.profile_image.is_none());

    let rsp = with_auth(client.post(url.join("/api/v1/users/profile")?), &auth)
        .json(&json!({"blog_description": "Notes on profiling", "nickname": "Prof"}))
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let profile = rsp.json::<ProfileRsp>().await?;
    assert_eq!("Notes on profiling", profile.blog.description);
    assert_eq!("Prof", profile.nickname);

    let rsp = with_auth(
        client.post(url.join("/api/v1/users/profile/social")?),
        &auth,
    )
    .json(&json!({"github": "https://github.com/profiler"}))
    .send()
    .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let profile = rsp.json::<ProfileRsp>().await?;
    assert_eq!(
        Some("https://github.com/profiler"),
        profile.social.github.as_ref().map(|u| u.as_str())
    );

    let rsp = client
        .get(url.join("/api/v1/users/profiler")?)
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let public = rsp.json::<PublicProfileRsp>().await?;
    assert_eq!("Prof", public.nickname);
    assert!(!public.is_following);

    let rsp = client
        .get(url.join("/api/v1/users/nosuchuser")?)
        .send()
        .await?;
    assert_eq!(StatusCode::NOT_FOUND, rsp.status());

    Ok(())
}

/// Follow, un-follow & delete an account
pub async fn test_follow(url: Url) -> Result<(), Failed> {
    let client = Client::new();
    let fan = new_user(&client, &url, "fanatic").await?;
    let star = new_user(&client, &url, "celebrity").await?;

    let rsp = with_auth(
        client.post(url.join("/api/v1/users/follow/celebrity")?),
        &fan,
    )
    .send()
    .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let body = rsp.json::<FollowRsp>().await?;
    assert!(body.following);
    assert_eq!(1, body.followers_count);

    let rsp = with_auth(client.get(url.join("/api/v1/users/celebrity")?), &fan)
        .send()
        .await?;
    assert!(rsp.json::<PublicProfileRsp>().await?.is_following);

    let rsp = with_auth(
        client.post(url.join("/api/v1/users/follow/celebrity")?),
        &fan,
    )
    .send()
    .await?;
    let body = rsp.json::<FollowRsp>().await?;
    assert!(!body.following);
    assert_eq!(0, body.followers_count);

    let rsp = with_auth(
        client.post(url.join("/api/v1/users/follow/celebrity")?),
        &star,
    )
    .send()
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, rsp.status());

    let rsp = with_auth(client.delete(url.join("/api/v1/users/me")?), &star)
        .send()
        .await?;
    assert_eq!(StatusCode::NO_CONTENT, rsp.status());
    let rsp = client
        .get(url.join("/api/v1/users/celebrity")?)
        .send()
        .await?;
    assert_eq!(StatusCode::NOT_FOUND, rsp.status());

    Ok(())
}
