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

//! # Discovery API
//!
//! Feeds across all blogs: trending, recent, liked, recently read & followed posts, popular
//! bloggers and keyword search. Every feed carries published posts only.

use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension, Json, Router,
    extract::{Query, State, rejection::ExtensionRejection},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use itertools::Itertools;
use serde::Serialize;
use snafu::{Backtrace, prelude::*};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer};
use tracing::{debug, error, info};

use inkpot_shared::{
    Period, PostId, UserId,
    api::{
        AuthorRsp, BloggerRsp, FollowingFeedRsp, Page, PageReq, PostRsp, RecentPostRsp, SearchReq,
        SearchRsp, TrendingReq, TrendingRsp,
    },
};

use crate::{
    authn::authenticate,
    counter_add,
    entities::{Post, User},
    http::ErrorResponseBody,
    images,
    inkpot::Inkpot,
    metrics::{self, Sort},
    pagination::{map_page, paginate},
    posts::with_counts,
    storage,
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Media store failure: {source}"))]
    Media { source: images::Error },
    #[snafu(display("Authentication required"))]
    NotAuthenticated { backtrace: Backtrace },
    #[snafu(display("Storage error: {source}"))]
    Storage { source: storage::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::NotAuthenticated { .. } => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Error::Media { .. } | Error::Storage { .. } => {
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

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

type MaybeUser = StdResult<Extension<User>, ExtensionRejection>;

fn caller(user: MaybeUser) -> Result<User> {
    user.map(|Extension(user)| user)
        .map_err(|_| NotAuthenticatedSnafu.build())
}

inventory::submit! { metrics::Registration::with_labels("discovery.feeds", Sort::IntegralCounter, &["feed"]) }
inventory::submit! { metrics::Registration::new("discovery.failures", Sort::IntegralCounter) }

fn respond<T: Serialize>(
    state: &Inkpot,
    result: Result<T>,
    feed: &str,
) -> axum::response::Response {
    match result {
        Ok(rsp) => {
            counter_add!(state.instruments, "discovery.feeds", 1, &[feed]);
            (StatusCode::OK, Json(rsp)).into_response()
        }
        Err(err) => {
            match err.as_status_and_msg().0 {
                code if code.is_server_error() => error!("{:#?}", err),
                _ => info!("{}", err),
            }
            counter_add!(state.instruments, "discovery.failures", 1, &[]);
            err.into_response()
        }
    }
}

/// Resolve posts by id, keeping the order of `ids` & dropping anything that's since been deleted
/// or un-published
async fn published_by_id(
    state: &Inkpot,
    ids: impl IntoIterator<Item = PostId>,
) -> Result<Vec<Post>> {
    let mut posts = Vec::new();
    for id in ids {
        if let Some(post) = state.storage.post_by_id(&id).await.context(StorageSnafu)? {
            if post.is_published() {
                posts.push(post);
            }
        }
    }
    Ok(posts)
}

/// Page through `posts` (which must already be in order) at the discovery page size
async fn feed_page(state: &Inkpot, posts: Vec<Post>, page: Option<&str>) -> Page<PostRsp> {
    let page = paginate(posts, page, state.discovery_page_size);
    let items = with_counts(state, page.items).await;
    map_page(Page { items, ..page }, |post| post.to_rsp())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Handlers                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Published posts from the given period, most liked first; views break ties, then recency
async fn trending(
    State(state): State<Arc<Inkpot>>,
    Query(req): Query<TrendingReq>,
) -> axum::response::Response {
    async fn trending1(state: &Inkpot, req: TrendingReq) -> Result<TrendingRsp> {
        let period = Period::parse_lenient(req.period.as_deref());
        let since = Utc::now() - period.window();
        let posts = state
            .storage
            .published_posts()
            .await
            .context(StorageSnafu)?
            .into_iter()
            .filter(|post| post.created_at() >= since)
            .collect::<Vec<Post>>();
        // Rank on the freshest counts we have
        let posts = with_counts(state, posts)
            .await
            .into_iter()
            .sorted_by(|lhs, rhs| {
                rhs.likes()
                    .cmp(&lhs.likes())
                    .then_with(|| rhs.views().cmp(&lhs.views()))
                    .then_with(|| rhs.created_at().cmp(&lhs.created_at()))
            })
            .collect::<Vec<Post>>();
        debug!("{} trending posts over the last {}", posts.len(), period);
        Ok(TrendingRsp {
            period,
            posts: feed_page(state, posts, req.page.as_deref()).await,
        })
    }

    respond(&state, trending1(&state, req).await, "trending")
}

async fn recent(
    State(state): State<Arc<Inkpot>>,
    Query(req): Query<PageReq>,
) -> axum::response::Response {
    async fn recent1(state: &Inkpot, req: PageReq) -> Result<Page<PostRsp>> {
        let posts = state.storage.published_posts().await.context(StorageSnafu)?;
        Ok(feed_page(state, posts, req.page.as_deref()).await)
    }

    respond(&state, recent1(&state, req).await, "recent")
}

/// Posts the caller has liked, most recently liked first
async fn liked(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Query(req): Query<PageReq>,
) -> axum::response::Response {
    async fn liked1(state: &Inkpot, user: MaybeUser, req: PageReq) -> Result<Page<PostRsp>> {
        let user = caller(user)?;
        let likes = state
            .storage
            .likes_for_user(&user.id())
            .await
            .context(StorageSnafu)?
            .into_iter()
            .sorted_by(|lhs, rhs| rhs.created_at.cmp(&lhs.created_at))
            .map(|like| like.post_id);
        let posts = published_by_id(state, likes).await?;
        Ok(feed_page(state, posts, req.page.as_deref()).await)
    }

    respond(&state, liked1(&state, user, req).await, "liked")
}

/// Posts the caller has read, most recently read first
async fn recent_read(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Query(req): Query<PageReq>,
) -> axum::response::Response {
    async fn recent_read1(state: &Inkpot, user: MaybeUser, req: PageReq) -> Result<Page<PostRsp>> {
        let user = caller(user)?;
        let reads = state
            .storage
            .reads_for_user(&user.id())
            .await
            .context(StorageSnafu)?
            .into_iter()
            .sorted_by(|lhs, rhs| rhs.updated_at.cmp(&lhs.updated_at))
            .map(|read| read.post_id);
        let posts = published_by_id(state, reads).await?;
        Ok(feed_page(state, posts, req.page.as_deref()).await)
    }

    respond(&state, recent_read1(&state, user, req).await, "recent-read")
}

/// Posts by everyone the caller follows, newest first
async fn following(
    State(state): State<Arc<Inkpot>>,
    user: MaybeUser,
    Query(req): Query<PageReq>,
) -> axum::response::Response {
    async fn following1(state: &Inkpot, user: MaybeUser, req: PageReq) -> Result<FollowingFeedRsp> {
        let user = caller(user)?;
        let followed = state
            .storage
            .following(&user.id())
            .await
            .context(StorageSnafu)?;
        let mut posts = Vec::new();
        for author in &followed {
            posts.extend(
                state
                    .storage
                    .posts_for_author(author, false, None)
                    .await
                    .context(StorageSnafu)?,
            );
        }
        posts.sort_by(|lhs, rhs| rhs.created_at().cmp(&lhs.created_at()));
        Ok(FollowingFeedRsp {
            following_count: followed.len() as u64,
            posts: feed_page(state, posts, req.page.as_deref()).await,
        })
    }

    respond(&state, following1(&state, user, req).await, "following")
}

/// Bloggers ranked by number of published posts
async fn popular_bloggers(
    State(state): State<Arc<Inkpot>>,
    Query(req): Query<PageReq>,
) -> axum::response::Response {
    async fn popular_bloggers1(state: &Inkpot, req: PageReq) -> Result<Page<BloggerRsp>> {
        let mut post_counts: HashMap<UserId, usize> = HashMap::new();
        for post in state.storage.published_posts().await.context(StorageSnafu)? {
            *post_counts.entry(post.author_id()).or_default() += 1;
        }
        let users = state
            .storage
            .list_users()
            .await
            .context(StorageSnafu)?
            .into_iter()
            .map(|user| (post_counts.get(&user.id()).copied().unwrap_or(0), user))
            .sorted_by(|(lhs_count, lhs), (rhs_count, rhs)| {
                rhs_count
                    .cmp(lhs_count)
                    .then_with(|| lhs.username().cmp(rhs.username()))
            })
            .collect::<Vec<(usize, User)>>();

        let page = paginate(users, req.page.as_deref(), state.discovery_page_size);
        let mut items = Vec::with_capacity(page.items.len());
        for (post_count, user) in &page.items {
            let blog_title = state
                .storage
                .blog_for_owner(&user.id())
                .await
                .context(StorageSnafu)?
                .map(|blog| blog.title().to_owned())
                .unwrap_or_default();
            items.push(BloggerRsp {
                username: user.username().clone(),
                nickname: user.nickname().to_owned(),
                blog_title,
                post_count: *post_count,
                profile_image: user
                    .profile_image()
                    .map(|key| state.media.url(key))
                    .transpose()
                    .context(MediaSnafu)?,
            });
        }
        Ok(Page {
            items,
            page: page.page,
            num_pages: page.num_pages,
            count: page.count,
            has_next: page.has_next,
            has_previous: page.has_previous,
        })
    }

    respond(&state, popular_bloggers1(&state, req).await, "bloggers")
}

/// Case-insensitive substring search over titles & content
async fn search(
    State(state): State<Arc<Inkpot>>,
    Query(req): Query<SearchReq>,
) -> axum::response::Response {
    async fn search1(state: &Inkpot, req: SearchReq) -> Result<SearchRsp> {
        let query = req.q.as_deref().map(str::trim).unwrap_or_default().to_owned();
        let posts = if query.is_empty() {
            Vec::new()
        } else {
            let needle = query.to_lowercase();
            state
                .storage
                .published_posts()
                .await
                .context(StorageSnafu)?
                .into_iter()
                .filter(|post| {
                    post.title().to_lowercase().contains(&needle)
                        || post.content().to_lowercase().contains(&needle)
                })
                .collect()
        };
        Ok(SearchRsp {
            posts: feed_page(state, posts, req.page.as_deref()).await,
            query,
        })
    }

    respond(&state, search1(&state, req).await, "search")
}

/// A simple JSON list of every published post, newest first
async fn recent_posts(State(state): State<Arc<Inkpot>>) -> axum::response::Response {
    async fn recent_posts1(state: &Inkpot) -> Result<Vec<RecentPostRsp>> {
        Ok(state
            .storage
            .published_posts()
            .await
            .context(StorageSnafu)?
            .into_iter()
            .map(|post| RecentPostRsp {
                title: post.title().to_owned(),
                content: post.content().to_owned(),
                author: AuthorRsp {
                    pk: post.author_id(),
                    username: post.author().clone(),
                },
            })
            .collect())
    }

    respond(&state, recent_posts1(&state).await, "recent-posts")
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Public API                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Return a router for the Discovery API
pub fn make_router(state: Arc<Inkpot>) -> Router<Arc<Inkpot>> {
    Router::new()
        .route("/discovery/trending", get(trending))
        .route("/discovery/recent", get(recent))
        .route("/discovery/liked", get(liked))
        .route("/discovery/recent-read", get(recent_read))
        .route("/discovery/following", get(following))
        .route("/discovery/bloggers/popular", get(popular_bloggers))
        .route("/discovery/search", get(search))
        .route("/recent-posts", get(recent_posts))
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
    use chrono::Duration;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    use inkpot_shared::{PostSlug, PostStatus};

    use crate::inkpot::test_support::{add_user, basic_auth, state};

    async fn get_json<T: DeserializeOwned>(
        state: &Arc<Inkpot>,
        uri: &str,
        auth: Option<&str>,
    ) -> (StatusCode, Option<T>) {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        let rsp = make_router(state.clone())
            .with_state(state.clone())
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = rsp.status();
        let body = to_bytes(rsp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice::<T>(&body).ok())
    }

    async fn add_post(
        state: &Inkpot,
        author: &User,
        title: &str,
        status: PostStatus,
        age: Duration,
    ) -> Post {
        let mut post = Post::new(
            author,
            title,
            PostSlug::new(&title.to_lowercase().replace(' ', "-")).unwrap(),
            &format!("<p>All about {}</p>", title),
            status,
            Vec::new(),
        )
        .unwrap();
        post.set_created_at(Utc::now() - age);
        state.storage.add_post(&post).await.unwrap();
        post
    }

    #[tokio::test]
    async fn feeds() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let john = add_user(&state, "johndoe").await;
        let jane = add_user(&state, "janedoe").await;
        add_user(&state, "alice").await;

        let published = PostStatus::Published;
        let old = add_post(&state, &john, "Ancient History", published, Duration::days(40)).await;
        let fresh = add_post(&state, &john, "Fresh Rust", published, Duration::hours(1)).await;
        let liked = add_post(&state, &jane, "Liked Rust", published, Duration::hours(2)).await;
        add_post(&state, &jane, "Draft Rust", PostStatus::Draft, Duration::hours(3)).await;

        state.storage.toggle_like(&john.id(), &liked.id()).await.unwrap();
        state.storage.toggle_like(&john.id(), &old.id()).await.unwrap();
        state.storage.record_read(&john.id(), &fresh.id()).await.unwrap();
        state.storage.toggle_follow(&john.id(), &jane.id()).await.unwrap();

        let (code, rsp) =
            get_json::<TrendingRsp>(&state, "/discovery/trending?period=week", None).await;
        assert_eq!(code, StatusCode::OK);
        let rsp = rsp.unwrap();
        assert_eq!(rsp.period, Period::Week);
        assert_eq!(
            rsp.posts.items.iter().map(|p| p.title.as_str()).collect::<Vec<_>>(),
            vec!["Liked Rust", "Fresh Rust"]
        );
        // A year reaches back far enough to take in the old post, which ranks on its like
        let (_, rsp) =
            get_json::<TrendingRsp>(&state, "/discovery/trending?period=forever", None).await;
        let rsp = rsp.unwrap();
        assert_eq!(rsp.period, Period::Year);
        assert_eq!(rsp.posts.count, 3);
        assert_eq!(rsp.posts.items[2].title, "Fresh Rust");

        let (_, rsp) = get_json::<Page<PostRsp>>(&state, "/discovery/recent", None).await;
        let rsp = rsp.unwrap();
        assert_eq!(rsp.count, 3);
        assert_eq!(rsp.items[0].title, "Fresh Rust");

        let auth = basic_auth("johndoe");
        let (_, rsp) = get_json::<Page<PostRsp>>(&state, "/discovery/liked", Some(&auth)).await;
        assert_eq!(
            rsp.unwrap().items.iter().map(|p| p.title.as_str()).collect::<Vec<_>>(),
            vec!["Ancient History", "Liked Rust"]
        );
        let (code, _) = get_json::<ErrorResponseBody>(&state, "/discovery/liked", None).await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);

        let (_, rsp) =
            get_json::<Page<PostRsp>>(&state, "/discovery/recent-read", Some(&auth)).await;
        assert_eq!(rsp.unwrap().items[0].title, "Fresh Rust");

        let (_, rsp) =
            get_json::<FollowingFeedRsp>(&state, "/discovery/following", Some(&auth)).await;
        let rsp = rsp.unwrap();
        assert_eq!(rsp.following_count, 1);
        assert_eq!(rsp.posts.count, 1);
        assert_eq!(rsp.posts.items[0].title, "Liked Rust");

        let (_, rsp) =
            get_json::<Page<BloggerRsp>>(&state, "/discovery/bloggers/popular", None).await;
        let rsp = rsp.unwrap();
        assert_eq!(
            rsp.items.iter().map(|b| b.username.as_ref()).collect::<Vec<&str>>(),
            vec!["johndoe", "janedoe", "alice"]
        );
        assert_eq!(rsp.items[0].post_count, 2);
        assert_eq!(rsp.items[0].blog_title, "johndoe's Blog");

        let (_, rsp) = get_json::<SearchRsp>(&state, "/discovery/search?q=RUST", None).await;
        let rsp = rsp.unwrap();
        assert_eq!(rsp.query, "RUST");
        assert_eq!(rsp.posts.count, 2);
        let (_, rsp) = get_json::<SearchRsp>(&state, "/discovery/search?q=", None).await;
        assert_eq!(rsp.unwrap().posts.count, 0);
        let (_, rsp) = get_json::<SearchRsp>(&state, "/discovery/search", None).await;
        assert_eq!(rsp.unwrap().posts.count, 0);

        let (_, rsp) = get_json::<Vec<RecentPostRsp>>(&state, "/recent-posts", None).await;
        let rsp = rsp.unwrap();
        assert_eq!(rsp.len(), 3);
        assert_eq!(rsp[0].author.username.as_ref(), "johndoe");
        assert_eq!(rsp[0].author.pk, john.id());
    }

    #[tokio::test]
    async fn pages_of_nine() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let john = add_user(&state, "johndoe").await;
        for i in 0..20 {
            add_post(
                &state,
                &john,
                &format!("Post {}", i),
                PostStatus::Published,
                Duration::minutes(i),
            )
            .await;
        }
        let (_, rsp) = get_json::<Page<PostRsp>>(&state, "/discovery/recent?page=3", None).await;
        let rsp = rsp.unwrap();
        assert_eq!(rsp.num_pages, 3);
        assert_eq!(rsp.items.len(), 2);
        assert!(!rsp.has_next);
        let (_, rsp) = get_json::<Page<PostRsp>>(&state, "/discovery/recent?page=47", None).await;
        assert_eq!(rsp.unwrap().page, 3);
    }
}
