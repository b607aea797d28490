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

//! Integration tests for the blog API.

use libtest_mimic::Failed;
use reqwest::{
    Client, StatusCode, Url,
    multipart::{Form, Part},
};
use serde_json::json;

use inkpot_shared::api::{BlogPostsRsp, LikeRsp, Page, PostDetailRsp, PostRsp, UploadRsp};

use crate::{new_user, with_auth};

async fn create(
    client: &Client,
    url: &Url,
    auth: &str,
    username: &str,
    title: &str,
    status: &str,
    tags: &[&str],
) -> Result<PostRsp, Failed> {
    let rsp = with_auth(
        client.post(url.join(&format!("/api/v1/blogs/{}/posts", username))?),
        auth,
    )
    .json(&json!({
        "title": title,
        "content": "<p>It was a dark and stormy night.</p>",
        "status": status,
        "tags": tags,
    }))
    .send()
    .await?;
    assert_eq!(StatusCode::CREATED, rsp.status());
    Ok(rsp.json::<PostRsp>().await?)
}

/// Write, list, revise & delete posts
pub async fn test_authoring(url: Url) -> Result<(), Failed> {
    let client = Client::new();
    let author = new_user(&client, &url, "novelist").await?;
    let critic = new_user(&client, &url, "critic").await?;

    let post = create(
        &client,
        &url,
        &author,
        "novelist",
        "A Dark and Stormy Night",
        "published",
        &["fiction", "weather"],
    )
    .await?;
    assert_eq!("a-dark-and-stormy-night", post.slug.as_ref());
    create(
        &client,
        &url,
        &author,
        "novelist",
        "Chapter Two, Unfinished",
        "draft",
        &["fiction"],
    )
    .await?;

    let rsp = with_auth(
        client.post(url.join("/api/v1/blogs/novelist/posts")?),
        &critic,
    )
    .json(&json!({"title": "Vandalism", "content": "<p>Boo</p>"}))
    .send()
    .await?;
    assert_eq!(StatusCode::FORBIDDEN, rsp.status());

    // Anonymous readers see only what's been published
    let rsp = client
        .get(url.join("/api/v1/blogs/novelist/posts")?)
        .send()
        .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let listing = rsp.json::<BlogPostsRsp>().await?;
    assert_eq!(1, listing.posts.count);
    assert_eq!("novelist's Blog", listing.blog.title);

    let rsp = with_auth(
        client.get(url.join("/api/v1/blogs/novelist/posts?tag=fiction")?),
        &author,
    )
    .send()
    .await?;
    let listing = rsp.json::<BlogPostsRsp>().await?;
    assert_eq!(2, listing.posts.count);
    assert_eq!(
        Some("fiction"),
        listing.selected_tag.as_ref().map(|t| t.as_ref())
    );

    let rsp = with_auth(
        client.get(url.join("/api/v1/blogs/novelist/posts/drafts")?),
        &author,
    )
    .send()
    .await?;
    let drafts = rsp.json::<Page<PostRsp>>().await?;
    assert_eq!(1, drafts.count);
    assert_eq!("Chapter Two, Unfinished", drafts.items[0].title);

    let rsp = with_auth(
        client.put(url.join("/api/v1/blogs/novelist/posts/chapter-two-unfinished")?),
        &author,
    )
    .json(&json!({"title": "Chapter Two", "status": "published"}))
    .send()
    .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let revised = rsp.json::<PostRsp>().await?;
    assert_eq!("chapter-two", revised.slug.as_ref());

    let rsp = with_auth(
        client.delete(url.join("/api/v1/blogs/novelist/posts/chapter-two")?),
        &critic,
    )
    .send()
    .await?;
    assert_eq!(StatusCode::FORBIDDEN, rsp.status());
    let rsp = with_auth(
        client.delete(url.join("/api/v1/blogs/novelist/posts/chapter-two")?),
        &author,
    )
    .send()
    .await?;
    assert_eq!(StatusCode::NO_CONTENT, rsp.status());
    let rsp = client
        .get(url.join("/api/v1/blogs/novelist/posts/chapter-two")?)
        .send()
        .await?;
    assert_eq!(StatusCode::NOT_FOUND, rsp.status());

    Ok(())
}

/// Read & like somebody else's post
pub async fn test_reading(url: Url) -> Result<(), Failed> {
    let client = Client::new();
    let author = new_user(&client, &url, "essayist").await?;
    let reader = new_user(&client, &url, "bookworm").await?;

    create(
        &client,
        &url,
        &author,
        "essayist",
        "On the Pleasures of Reading",
        "published",
        &[],
    )
    .await?;
    let detail = url.join("/api/v1/blogs/essayist/posts/on-the-pleasures-of-reading")?;

    let rsp = with_auth(client.get(detail.clone()), &reader).send().await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let body = rsp.json::<PostDetailRsp>().await?;
    assert!(!body.is_owner);
    assert!(!body.has_liked);

    let rsp = with_auth(
        client.post(url.join("/api/v1/blogs/essayist/posts/on-the-pleasures-of-reading/read")?),
        &reader,
    )
    .send()
    .await?;
    assert_eq!(StatusCode::NO_CONTENT, rsp.status());

    let like = url.join("/api/v1/blogs/essayist/posts/on-the-pleasures-of-reading/like")?;
    let rsp = client.post(like.clone()).send().await?;
    assert_eq!(StatusCode::UNAUTHORIZED, rsp.status());
    let rsp = with_auth(client.post(like.clone()), &reader).send().await?;
    let body = rsp.json::<LikeRsp>().await?;
    assert!(body.has_liked);
    assert_eq!(1, body.likes_count);

    let rsp = with_auth(client.get(detail.clone()), &reader).send().await?;
    let body = rsp.json::<PostDetailRsp>().await?;
    assert!(body.has_liked);
    assert_eq!(1, body.post.likes);
    assert!(body.post.views >= 1);

    let rsp = with_auth(client.post(like), &reader).send().await?;
    let body = rsp.json::<LikeRsp>().await?;
    assert!(!body.has_liked);
    assert_eq!(0, body.likes_count);

    Ok(())
}

/// Upload an image for use in a post & fetch it back
pub async fn test_image_upload(url: Url) -> Result<(), Failed> {
    let client = Client::new();
    let author = new_user(&client, &url, "illustrator").await?;
    let bytes = b"\x89PNG\r\n\x1a\nnot really a PNG".to_vec();

    let form = Form::new().part(
        "images",
        Part::bytes(bytes.clone())
            .file_name("sketch.png")
            .mime_str("image/png")?,
    );
    let rsp = with_auth(
        client.post(url.join("/api/v1/blogs/illustrator/posts/images")?),
        &author,
    )
    .multipart(form)
    .send()
    .await?;
    assert_eq!(StatusCode::OK, rsp.status());
    let body = rsp.json::<UploadRsp>().await?;
    assert!(body.success);
    assert!(body.location.path().ends_with(".png"));

    let rsp = client.get(body.location).send().await?;
    assert_eq!(StatusCode::OK, rsp.status());
    assert_eq!(bytes, rsp.bytes().await?.to_vec());

    let form = Form::new().part(
        "images",
        Part::bytes(b"just text".to_vec())
            .file_name("notes.txt")
            .mime_str("text/plain")?,
    );
    let rsp = with_auth(
        client.post(url.join("/api/v1/blogs/illustrator/posts/images")?),
        &author,
    )
    .multipart(form)
    .send()
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, rsp.status());

    Ok(())
}
