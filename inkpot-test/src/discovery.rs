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

//! Integration tests for the discovery feeds.
//!
//! Other trials are writing posts concurrently, so these assertions stick to what this trial's own
//! users can see: search results on words nobody else uses, the following feed & so on.

use libtest_mimic::Failed;
use reqwest::{Client, StatusCode, Url};
use serde_json::json;

use inkpot_shared::api::{
    BloggerRsp, FollowingFeedRsp, Page, PostRsp, RecentPostRsp, SearchRsp, TrendingRsp,
};

use crate::{new_user, with_auth};

async fn publish(
    client: &Client,
    url: &Url,
    auth: &str,
    username: &str,
    title: &str,
) -> Result<PostRsp, Failed> {
    let rsp = with_auth(
        client.post(url.join(&format!("/api/v1/blogs/{}/posts", username))?),
        auth,
    )
    .json(&json!({
        "title": title,
        "content": "<p>Quixotic zygomorphic xylophones.</p>",
        "status": "published",
    }))
    .send()
    .await?;
    assert_eq!(StatusCode::CREATED, rsp.status());
    Ok(rsp.json::<PostRsp>().await?)
}

pub async fn test_feeds(url: Url) -> Result<(), Failed> {
    let client = Client::new();
    let writer = new_user(&client, &url, "columnist").await?;
    let reader = new_user(&client, &url, "subscriber").await?;

    publish(&client, &url, &writer, "columnist", "Syzygy Monday").await?;
    let second = publish(&client, &url, &writer, "columnist", "Syzygy Tuesday").await?;

    // Search is a case-insensitive substring match over titles & content
    let rsp = client
        .get(url.join("/api/v1/discovery/search?q=SYZYGY")?)
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let body = rsp.json::<SearchRsp>().await?;
    assert_eq!("SYZYGY", body.query);
    assert_eq!(2, body.posts.count);
    assert_eq!("Syzygy Tuesday", body.posts.items[0].title);
    let rsp = client
        .get(url.join("/api/v1/discovery/search?q=")?)
        .send()
        .await?;
    assert_eq!(0, rsp.json::<SearchRsp>().await?.posts.count);

    // Following feed
    let feed = url.join("/api/v1/discovery/following")?;
    assert_eq!(
        StatusCode::UNAUTHORIZED,
        client.get(feed.clone()).send().await?.status()
    );
    let rsp = with_auth(client.get(feed.clone()), &reader).send().await?;
    let body = rsp.json::<FollowingFeedRsp>().await?;
    assert_eq!(0, body.following_count);
    assert_eq!(0, body.posts.count);
    with_auth(
        client.post(url.join("/api/v1/users/follow/columnist")?),
        &reader,
    )
    .send()
    .await?;
    let rsp = with_auth(client.get(feed), &reader).send().await?;
    let body = rsp.json::<FollowingFeedRsp>().await?;
    assert_eq!(1, body.following_count);
    assert_eq!(2, body.posts.count);

    // Liked & recently-read
    let slug = second.slug.to_string();
    with_auth(
        client.post(url.join(&format!("/api/v1/blogs/columnist/posts/{}/like", slug))?),
        &reader,
    )
    .send()
    .await?;
    with_auth(
        client.post(url.join(&format!("/api/v1/blogs/columnist/posts/{}/read", slug))?),
        &reader,
    )
    .send()
    .await?;
    let rsp = with_auth(client.get(url.join("/api/v1/discovery/liked")?), &reader)
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let liked = rsp.json::<Page<PostRsp>>().await?;
    assert_eq!(1, liked.count);
    assert_eq!(second.id, liked.items[0].id);
    let rsp = with_auth(
        client.get(url.join("/api/v1/discovery/recent-read")?),
        &reader,
    )
    .send()
    .await?;
    let read = rsp.json::<Page<PostRsp>>().await?;
    assert_eq!(1, read.count);

    // The liked post is in this week's trending posts
    let rsp = client
        .get(url.join("/api/v1/discovery/trending?period=week")?)
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let trending = rsp.json::<TrendingRsp>().await?;
    assert!(trending.posts.count >= 2);

    let rsp = client
        .get(url.join("/api/v1/discovery/recent")?)
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    assert!(rsp.json::<Page<PostRsp>>().await?.count >= 2);

    let rsp = client
        .get(url.join("/api/v1/discovery/bloggers/popular")?)
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let bloggers = rsp.json::<Page<BloggerRsp>>().await?;
    assert!(bloggers.count >= 2);

    let rsp = client.get(url.join("/api/v1/recent-posts")?).send().await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let recent = rsp.json::<Vec<RecentPostRsp>>().await?;
    assert!(recent.iter().any(|post| {
        post.title == "Syzygy Tuesday" && post.author.username.as_ref() == "columnist"
    }));

    Ok(())
}
