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

//! # Blog API
//!
//! Everything beneath `/blogs/{username}/posts`: listing, authoring, liking & reading posts, along
//! with uploading images for inclusion in post bodies. The business logic lives in [posts]; this
//! module is concerned with HTTP.
//!
//! [posts]: crate::posts

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{
        Multipart, Path, Query, State, multipart::MultipartError, rejection::ExtensionRejection,
    },
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Serialize;
use snafu::{Backtrace, prelude::*};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{error, info, instrument};

use inkpot_shared::{
    Tagname,
    api::{
        BlogPostsReq, BlogPostsRsp, LikeRsp, Page, PageReq, PostCreateReq, PostDetailRsp, PostRsp,
        PostUpdateReq, UploadRsp,
    },
};

use crate::{
    authn::authenticate,
    counter_add,
    entities::User,
    http::ErrorResponseBody,
    images::{self, next_upload, post_image_key},
    inkpot::Inkpot,
    metrics::{self, Sort},
    pagination::{map_page, paginate},
    posts::{self, ensure_owner, user_by_name},
    storage,
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Media store failure: {source}"))]
    Media { source: images::Error },
    #[snafu(display("Failed to read multipart body: {source}"))]
    Multipart { source: MultipartError },
    #[snafu(display("No blog found for {username}"))]
    NoBlog {
        username: String,
        backtrace: Backtrace,
    },
    #[snafu(display("No file was uploaded"))]
    NoFile { backtrace: Backtrace },
    #[snafu(display("Uploads of type {content_type} are not accepted; please upload an image"))]
    NotAnImage {
        content_type: String,
        backtrace: Backtrace,
    },
    #[snafu(display("Authentication required"))]
    NotAuthenticated { backtrace: Backtrace },
    #[snafu(display("{source}"))]
    Posts { source: posts::Error },
    #[snafu(display("Storage error: {source}"))]
    Storage { source: storage::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::Multipart { source } => (source.status(), source.body_text()),
            Error::NoFile { .. } | Error::NotAnImage { .. } => {
                (StatusCode::BAD_REQUEST, format!("{}", self))
            }
            Error::NotAuthenticated { .. } => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Error::Posts { source } => source.as_status_and_msg(),
            Error::Media { .. } | Error::NoBlog { .. } | Error::Storage { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", self))
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (code, msg) = self.as_status_and_msg();
        (code, Json(ErrorResponseBody { error: msg })).into_response()
    }
}

impl From<posts::Error> for Error {
    fn from(source: posts::Error) -> Self {
        Error::Posts { source }
    }
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

type MaybeUser = StdResult<Extension<User>, ExtensionRejection>;

fn caller(user: MaybeUser) -> Result<User> {
    user.map(|Extension(user)| user)
        .map_err(|_| NotAuthenticatedSnafu.build())
}

fn viewer(user: MaybeUser) -> Option<User> {
    user.ok().map(|Extension(user)| user)
}

/// Render a handler's outcome; on success bump the counter `name`, on failure `blog.failures`
fn respond<T: Serialize>(
    state: &Inkpot,
    result: Result<T>,
    status: StatusCode,
    name: &str,
) -> axum::response::Response {
    match result {
        Ok(rsp) => {
            counter_add!(state.instruments, name, 1, &[]);
            (status, Json(rsp)).into_response()
        }
        Err(err) => failure(state, err),
    }
}

fn failure(state: &Inkpot, err: Error) -> axum::response::Response {
    let (code, _) = err.as_status_and_msg();
    if code.is_server_error() {
        error!("{:#?}", err);
    } else {
        info!("{}", err);
    }
    counter_add!(state.instruments, "blog.failures", 1, &[]);
    err.into_response()
}

fn no_content(state: &Inkpot, result: Result<()>, name: &str) -> axum::response::Response {
    match result {
        Ok(_) => {
            counter_add!(state.instruments, name, 1, &[]);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => failure(state, err),
    }
}

inventory::submit! { metrics::Registration::new("blog.failures", Sort::IntegralCounter) }

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                  `/blogs/{username}/posts`                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("blog.listings", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("blog.posts.created", Sort::IntegralCounter) }

/// List a blog's posts, along with its tag cloud
///
/// The owner sees their drafts along with their published posts. A `tag` that isn't a legal tag
/// name can't be on any post, so it yields an empty listing rather than an error.
async fn list_posts(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Path(username): Path<String>,
    Query(req): Query<BlogPostsReq>,
) -> axum::response::Response {
    async fn list_posts1(
        state: &Inkpot,
        viewer: Option<User>,
        username: &str,
        req: BlogPostsReq,
    ) -> Result<BlogPostsRsp> {
        let selected = req
            .tag
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(Tagname::new);
        let (author, posts) = match &selected {
            Some(Err(_)) => (user_by_name(state, username).await?, Vec::new()),
            Some(Ok(tag)) => posts::user_posts(state, username, viewer.as_ref(), Some(tag)).await?,
            None => posts::user_posts(state, username, viewer.as_ref(), None).await?,
        };
        let blog = state
            .storage
            .blog_for_owner(&author.id())
            .await
            .context(StorageSnafu)?
            .context(NoBlogSnafu { username })?;
        Ok(BlogPostsRsp {
            blog: blog.to_rsp(),
            tags: posts::tag_cloud(state, &author).await?,
            selected_tag: selected.and_then(|tag| tag.ok()),
            posts: map_page(
                paginate(posts, req.page.as_deref(), state.blog_page_size),
                |post| post.to_rsp(),
            ),
        })
    }

    respond(
        &state,
        list_posts1(&state, viewer(user), &username, req).await,
        StatusCode::OK,
        "blog.listings",
    )
}

/// Create a new post on the caller's blog
#[instrument(level = "debug", skip(state, user, req))]
async fn create_post(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Path(username): Path<String>,
    Json(req): Json<PostCreateReq>,
) -> axum::response::Response {
    async fn create_post1(
        state: &Inkpot,
        user: MaybeUser,
        username: &str,
        req: PostCreateReq,
    ) -> Result<PostRsp> {
        let user = caller(user)?;
        let post = posts::create_post(state, username, &user, req).await?;
        info!("{} created post {}", user.username(), post.slug());
        Ok(post.to_rsp())
    }

    respond(
        &state,
        create_post1(&state, user, &username, req).await,
        StatusCode::CREATED,
        "blog.posts.created",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                               `/blogs/{username}/posts/drafts`                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The caller's drafts
async fn list_drafts(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Path(username): Path<String>,
    Query(req): Query<PageReq>,
) -> axum::response::Response {
    async fn list_drafts1(
        state: &Inkpot,
        user: MaybeUser,
        username: &str,
        req: PageReq,
    ) -> Result<Page<PostRsp>> {
        let user = caller(user)?;
        let owner = user_by_name(state, username).await?;
        ensure_owner(&user, &owner)?;
        Ok(map_page(
            paginate(
                posts::drafts(state, &owner).await?,
                req.page.as_deref(),
                state.blog_page_size,
            ),
            |post| post.to_rsp(),
        ))
    }

    respond(
        &state,
        list_drafts1(&state, user, &username, req).await,
        StatusCode::OK,
        "blog.listings",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                               `/blogs/{username}/posts/images`                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("blog.images.uploaded", Sort::IntegralCounter) }

/// Upload an image for use in a post body (multipart field `images` or `file`)
#[instrument(level = "debug", skip(state, user, multipart))]
async fn upload_image(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Path(username): Path<String>,
    mut multipart: Multipart,
) -> axum::response::Response {
    async fn upload_image1(
        state: &Inkpot,
        user: MaybeUser,
        username: &str,
        multipart: &mut Multipart,
    ) -> Result<UploadRsp> {
        let user = caller(user)?;
        let owner = user_by_name(state, username).await?;
        ensure_owner(&user, &owner)?;
        let upload = next_upload(multipart, &["images", "file"])
            .await
            .context(MultipartSnafu)?
            .context(NoFileSnafu)?;
        ensure!(
            upload.is_image(),
            NotAnImageSnafu {
                content_type: upload.content_type.clone()
            }
        );
        let key = post_image_key(&Utc::now(), &upload.extension());
        let location = state
            .media
            .put(&key, upload.bytes, &upload.content_type)
            .await
            .context(MediaSnafu)?;
        info!("{} uploaded {}", user.username(), key);
        Ok(UploadRsp {
            location,
            success: true,
        })
    }

    respond(
        &state,
        upload_image1(&state, user, &username, &mut multipart).await,
        StatusCode::OK,
        "blog.images.uploaded",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                               `/blogs/{username}/posts/{slug}`                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("blog.posts.viewed", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("blog.posts.updated", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("blog.posts.deleted", Sort::IntegralCounter) }

async fn post_detail(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Path((username, slug)): Path<(String, String)>,
) -> axum::response::Response {
    async fn post_detail1(
        state: &Inkpot,
        viewer: Option<User>,
        username: &str,
        slug: &str,
    ) -> Result<PostDetailRsp> {
        Ok(posts::post_detail(state, username, slug, viewer.as_ref()).await?)
    }

    respond(
        &state,
        post_detail1(&state, viewer(user), &username, &slug).await,
        StatusCode::OK,
        "blog.posts.viewed",
    )
}

#[instrument(level = "debug", skip(state, user, req))]
async fn update_post(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Path((username, slug)): Path<(String, String)>,
    Json(req): Json<PostUpdateReq>,
) -> axum::response::Response {
    async fn update_post1(
        state: &Inkpot,
        user: MaybeUser,
        username: &str,
        slug: &str,
        req: PostUpdateReq,
    ) -> Result<PostRsp> {
        let user = caller(user)?;
        Ok(posts::update_post(state, username, slug, &user, req)
            .await?
            .to_rsp())
    }

    respond(
        &state,
        update_post1(&state, user, &username, &slug, req).await,
        StatusCode::OK,
        "blog.posts.updated",
    )
}

#[instrument(level = "debug", skip(state, user))]
async fn delete_post(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Path((username, slug)): Path<(String, String)>,
) -> axum::response::Response {
    async fn delete_post1(
        state: &Inkpot,
        user: MaybeUser,
        username: &str,
        slug: &str,
    ) -> Result<()> {
        let user = caller(user)?;
        posts::delete_post(state, username, slug, &user).await?;
        info!("{} deleted post {}", user.username(), slug);
        Ok(())
    }

    no_content(
        &state,
        delete_post1(&state, user, &username, &slug).await,
        "blog.posts.deleted",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                          `/blogs/{username}/posts/{slug}/{like,read}`                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

inventory::submit! { metrics::Registration::new("blog.posts.likes", Sort::IntegralCounter) }
inventory::submit! { metrics::Registration::new("blog.posts.reads", Sort::IntegralCounter) }

/// Like, or un-like, a post
async fn like_post(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Path((username, slug)): Path<(String, String)>,
) -> axum::response::Response {
    async fn like_post1(
        state: &Inkpot,
        user: MaybeUser,
        username: &str,
        slug: &str,
    ) -> Result<LikeRsp> {
        let user = caller(user)?;
        let (has_liked, likes_count) = posts::toggle_like(state, username, slug, &user).await?;
        Ok(LikeRsp {
            has_liked,
            likes_count,
        })
    }

    respond(
        &state,
        like_post1(&state, user, &username, &slug).await,
        StatusCode::OK,
        "blog.posts.likes",
    )
}

/// Note that the caller (who may be anonymous) has read a post
async fn read_post(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Path((username, slug)): Path<(String, String)>,
) -> axum::response::Response {
    no_content(
        &state,
        posts::record_read(&state, &username, &slug, viewer(user).as_ref())
            .await
            .map_err(Error::from),
        "blog.posts.reads",
    )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Blog API
pub fn make_router(state: Arc<Inkpot>) -> Router<Arc<Inkpot>> {
    Router::new()
        .route(
            "/blogs/{username}/posts",
            get(list_posts).post(create_post),
        )
        .route("/blogs/{username}/posts/drafts", get(list_drafts))
        .route("/blogs/{username}/posts/images", post(upload_image))
        .route(
            "/blogs/{username}/posts/{slug}",
            get(post_detail).put(update_post).delete(delete_post),
        )
        .route("/blogs/{username}/posts/{slug}/like", post(like_post))
        .route("/blogs/{username}/posts/{slug}/read", post(read_post))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authenticate,
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod test {
    use super::*;

    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    use inkpot_shared::PostStatus;

    use crate::inkpot::test_support::{add_user, basic_auth, state};

    async fn call<T: DeserializeOwned>(
        state: &Arc<Inkpot>,
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Option<T>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let rsp = make_router(state.clone())
            .with_state(state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = rsp.status();
        let body = to_bytes(rsp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice::<T>(&body).ok())
    }

    async fn new_post(
        state: &Arc<Inkpot>,
        auth: &str,
        title: &str,
        status: PostStatus,
        tags: &[&str],
    ) -> PostRsp {
        let (code, rsp) = call::<PostRsp>(
            state,
            Method::POST,
            "/blogs/johndoe/posts",
            Some(auth),
            Some(serde_json::json!({
                "title": title,
                "content": "<p>Lorem ipsum dolor sit amet</p>",
                "status": status,
                "tags": tags,
            })),
        )
        .await;
        assert_eq!(code, StatusCode::CREATED);
        rsp.unwrap()
    }

    #[tokio::test]
    async fn authoring() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        add_user(&state, "johndoe").await;
        add_user(&state, "janedoe").await;
        let john = basic_auth("johndoe");
        let jane = basic_auth("janedoe");

        let first = new_post(
            &state,
            &john,
            "First Post",
            PostStatus::Published,
            &["rust", "web"],
        )
        .await;
        assert_eq!(first.slug.as_ref(), "first-post");
        new_post(&state, &john, "Second Post", PostStatus::Published, &["rust"]).await;
        new_post(&state, &john, "Work in Progress", PostStatus::Draft, &[]).await;

        // Anonymous callers can't post, and nobody may post to somebody else's blog
        let (code, _) = call::<ErrorResponseBody>(
            &state,
            Method::POST,
            "/blogs/johndoe/posts",
            None,
            Some(serde_json::json!({"title": "Nope", "content": ""})),
        )
        .await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        let (code, _) = call::<ErrorResponseBody>(
            &state,
            Method::POST,
            "/blogs/johndoe/posts",
            Some(&jane),
            Some(serde_json::json!({"title": "Nope", "content": ""})),
        )
        .await;
        assert_eq!(code, StatusCode::FORBIDDEN);

        let (code, rsp) =
            call::<BlogPostsRsp>(&state, Method::GET, "/blogs/johndoe/posts", None, None).await;
        assert_eq!(code, StatusCode::OK);
        let rsp = rsp.unwrap();
        assert_eq!(rsp.posts.count, 2);
        assert_eq!(rsp.posts.items[0].title, "Second Post");
        assert_eq!(rsp.tags[0].name.as_ref(), "rust");
        assert_eq!(rsp.tags[0].count, 2);

        let (_, rsp) =
            call::<BlogPostsRsp>(&state, Method::GET, "/blogs/johndoe/posts", Some(&john), None)
                .await;
        assert_eq!(rsp.unwrap().posts.count, 3);

        let (_, rsp) = call::<BlogPostsRsp>(
            &state,
            Method::GET,
            "/blogs/johndoe/posts?tag=web&page=banana",
            None,
            None,
        )
        .await;
        let rsp = rsp.unwrap();
        assert_eq!(rsp.posts.count, 1);
        assert_eq!(rsp.posts.page, 1);
        assert_eq!(rsp.selected_tag.unwrap().as_ref(), "web");

        let (code, rsp) = call::<Page<PostRsp>>(
            &state,
            Method::GET,
            "/blogs/johndoe/posts/drafts",
            Some(&john),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(rsp.unwrap().items[0].title, "Work in Progress");
        let (code, _) = call::<ErrorResponseBody>(
            &state,
            Method::GET,
            "/blogs/johndoe/posts/drafts",
            Some(&jane),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::FORBIDDEN);

        let (code, rsp) = call::<PostRsp>(
            &state,
            Method::PUT,
            "/blogs/johndoe/posts/first-post",
            Some(&john),
            Some(serde_json::json!({"title": "First Post, Revised", "tags": []})),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        let rsp = rsp.unwrap();
        assert_eq!(rsp.slug.as_ref(), "first-post-revised");
        assert!(rsp.tags.is_empty());
        assert_eq!(rsp.content, "<p>Lorem ipsum dolor sit amet</p>");

        let (code, _) = call::<serde_json::Value>(
            &state,
            Method::DELETE,
            "/blogs/johndoe/posts/first-post-revised",
            Some(&jane),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::FORBIDDEN);
        let (code, _) = call::<serde_json::Value>(
            &state,
            Method::DELETE,
            "/blogs/johndoe/posts/first-post-revised",
            Some(&john),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::NO_CONTENT);
        let (code, _) = call::<ErrorResponseBody>(
            &state,
            Method::GET,
            "/blogs/johndoe/posts/first-post-revised",
            None,
            None,
        )
        .await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn posts_titled_like_routes() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        add_user(&state, "johndoe").await;
        let john = basic_auth("johndoe");

        let drafts = new_post(&state, &john, "Drafts", PostStatus::Published, &[]).await;
        assert_eq!(drafts.slug.as_ref(), "drafts-1");
        let images = new_post(&state, &john, "Images", PostStatus::Published, &[]).await;
        assert_eq!(images.slug.as_ref(), "images-1");

        for uri in ["/blogs/johndoe/posts/drafts-1", "/blogs/johndoe/posts/images-1"] {
            let (code, _) = call::<serde_json::Value>(&state, Method::GET, uri, None, None).await;
            assert_eq!(code, StatusCode::OK);
        }
        let (code, _) = call::<serde_json::Value>(
            &state,
            Method::DELETE,
            "/blogs/johndoe/posts/images-1",
            Some(&john),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::NO_CONTENT);
        let (code, _) = call::<serde_json::Value>(
            &state,
            Method::GET,
            "/blogs/johndoe/posts/drafts",
            Some(&john),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn reading_and_liking() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        add_user(&state, "johndoe").await;
        add_user(&state, "janedoe").await;
        let john = basic_auth("johndoe");
        let jane = basic_auth("janedoe");

        new_post(&state, &john, "Hello", PostStatus::Published, &[]).await;
        new_post(&state, &john, "Secret", PostStatus::Draft, &[]).await;

        // The author's own views don't count
        let (_, rsp) = call::<PostDetailRsp>(
            &state,
            Method::GET,
            "/blogs/johndoe/posts/hello",
            Some(&john),
            None,
        )
        .await;
        let rsp = rsp.unwrap();
        assert!(rsp.is_owner);
        assert_eq!(rsp.post.views, 0);

        let (_, rsp) =
            call::<PostDetailRsp>(&state, Method::GET, "/blogs/johndoe/posts/hello", None, None)
                .await;
        assert_eq!(rsp.unwrap().post.views, 1);

        let (code, _) = call::<serde_json::Value>(
            &state,
            Method::POST,
            "/blogs/johndoe/posts/hello/read",
            Some(&jane),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::NO_CONTENT);

        let (code, rsp) = call::<LikeRsp>(
            &state,
            Method::POST,
            "/blogs/johndoe/posts/hello/like",
            Some(&jane),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        let rsp = rsp.unwrap();
        assert!(rsp.has_liked);
        assert_eq!(rsp.likes_count, 1);

        let (_, rsp) = call::<PostDetailRsp>(
            &state,
            Method::GET,
            "/blogs/johndoe/posts/hello",
            Some(&jane),
            None,
        )
        .await;
        let rsp = rsp.unwrap();
        assert!(rsp.has_liked);
        assert!(!rsp.is_owner);
        assert_eq!(rsp.post.likes, 1);
        assert_eq!(rsp.post.views, 3);

        let (code, _) = call::<ErrorResponseBody>(
            &state,
            Method::POST,
            "/blogs/johndoe/posts/hello/like",
            None,
            None,
        )
        .await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);

        // Drafts are invisible to everyone but their author
        let (code, _) = call::<ErrorResponseBody>(
            &state,
            Method::GET,
            "/blogs/johndoe/posts/secret",
            Some(&jane),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        let (code, _) = call::<ErrorResponseBody>(
            &state,
            Method::POST,
            "/blogs/johndoe/posts/secret/like",
            Some(&jane),
            None,
        )
        .await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        // Posts are addressed through their author's blog
        let (code, _) = call::<ErrorResponseBody>(
            &state,
            Method::GET,
            "/blogs/janedoe/posts/hello",
            None,
            None,
        )
        .await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn images() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        add_user(&state, "johndoe").await;
        add_user(&state, "janedoe").await;

        let upload = |auth: String, field: &'static str, content_type: &'static str| {
            let boundary = "XyZzYbOuNdArY";
            let body = format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"pic.jpg\"\r\nContent-Type: {ct}\r\n\r\nnot really a jpeg\r\n--{b}--\r\n",
                b = boundary,
                f = field,
                ct = content_type
            );
            Request::builder()
                .method(Method::POST)
                .uri("/blogs/johndoe/posts/images")
                .header("authorization", auth)
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap()
        };
        let send = |request: Request<Body>| {
            let state = state.clone();
            async move {
                make_router(state.clone())
                    .with_state(state)
                    .oneshot(request)
                    .await
                    .unwrap()
            }
        };

        let rsp = send(upload(basic_auth("johndoe"), "images", "image/jpeg")).await;
        assert_eq!(rsp.status(), StatusCode::OK);
        let body = to_bytes(rsp.into_body(), usize::MAX).await.unwrap();
        let rsp = serde_json::from_slice::<UploadRsp>(&body).unwrap();
        assert!(rsp.success);
        assert!(rsp.location.path().starts_with("/media/blog/posts/images/"));
        assert!(rsp.location.path().ends_with(".jpg"));

        let rsp = send(upload(basic_auth("johndoe"), "file", "image/jpeg")).await;
        assert_eq!(rsp.status(), StatusCode::OK);

        let rsp = send(upload(basic_auth("janedoe"), "images", "image/jpeg")).await;
        assert_eq!(rsp.status(), StatusCode::FORBIDDEN);
        let rsp = send(upload(basic_auth("johndoe"), "images", "application/pdf")).await;
        assert_eq!(rsp.status(), StatusCode::BAD_REQUEST);
        let rsp = send(upload(basic_auth("johndoe"), "attachment", "image/jpeg")).await;
        assert_eq!(rsp.status(), StatusCode::BAD_REQUEST);
    }
}
