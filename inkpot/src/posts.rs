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

//! # posts
//!
//! Blog post business logic, independent of HTTP. The [blogs] & [discovery] APIs are thin layers
//! over these functions.
//!
//! [blogs]: crate::blogs
//! [discovery]: crate::discovery
//!
//! ## Who sees what
//!
//! Drafts are visible to their authors only; to anyone else a draft simply doesn't exist (so
//! asking for it yields "not found" rather than "forbidden").
//!
//! ## Counting views
//!
//! Viewing a post counts toward its views unless the viewer is the author. An authenticated reader
//! additionally gets a [PostRead] record (or has theirs refreshed), which drives their "recently
//! read" feed.
//!
//! [PostRead]: crate::entities::PostRead

use std::collections::{BTreeMap, BTreeSet};

use axum::http::StatusCode;
use snafu::{Backtrace, prelude::*};
use tracing::debug;

use inkpot_shared::{
    PostSlug, Tagname, Username,
    api::{PostCreateReq, PostDetailRsp, PostUpdateReq, TagCount},
};

use crate::{
    counters::{Counter, CounterCache},
    entities::{self, Post, User, slug_candidates, slugify},
    inkpot::Inkpot,
    storage,
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Invalid post: {source}"))]
    BadPost { source: entities::Error },
    #[snafu(display("Couldn't find a free slug for {base} after {attempts} attempts"))]
    SlugsExhausted {
        base: PostSlug,
        attempts: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("No post {slug} on {username}'s blog"))]
    NoSuchPost {
        username: Username,
        slug: String,
        backtrace: Backtrace,
    },
    #[snafu(display("No user {username}"))]
    NoSuchUser {
        username: String,
        backtrace: Backtrace,
    },
    #[snafu(display("{username} may not modify {owner}'s blog"))]
    NotOwner {
        username: Username,
        owner: Username,
        backtrace: Backtrace,
    },
    #[snafu(display("Storage error: {source}"))]
    Storage { source: storage::Error },
}

impl Error {
    pub fn as_status_and_msg(&self) -> (StatusCode, String) {
        match self {
            Error::BadPost { source } => (StatusCode::BAD_REQUEST, format!("{}", source)),
            Error::NoSuchPost { .. } => (StatusCode::NOT_FOUND, format!("{}", self)),
            Error::NoSuchUser { .. } => (StatusCode::NOT_FOUND, format!("{}", self)),
            Error::NotOwner { .. } => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            Error::SlugsExhausted { .. } | Error::Storage { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", self))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Give up on finding a unique slug after this many tries; a title would have to be reused this
/// many times over for us to get here
const MAX_SLUG_ATTEMPTS: usize = 10_000;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Helpers                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Look up a user by name, failing if they don't exist
pub async fn user_by_name(state: &Inkpot, username: &str) -> Result<User> {
    state
        .storage
        .user_for_name(username)
        .await
        .context(StorageSnafu)?
        .context(NoSuchUserSnafu {
            username: username.to_owned(),
        })
}

/// Fail unless `caller` is `owner`
pub fn ensure_owner(caller: &User, owner: &User) -> Result<()> {
    ensure!(
        caller.id() == owner.id(),
        NotOwnerSnafu {
            username: caller.username().clone(),
            owner: owner.username().clone(),
        }
    );
    Ok(())
}

/// Find a post by slug on `author`'s blog; a post on somebody else's blog is no post at all
async fn post_on_blog(state: &Inkpot, author: &User, slug: &str) -> Result<Post> {
    let not_found = || NoSuchPostSnafu {
        username: author.username().clone(),
        slug: slug.to_owned(),
    };
    let slug = match slug.parse::<PostSlug>() {
        Ok(slug) => slug,
        Err(_) => return not_found().fail(),
    };
    state
        .storage
        .post_by_slug(&slug)
        .await
        .context(StorageSnafu)?
        .filter(|post| post.author_id() == author.id())
        .with_context(not_found)
}

fn apply_counts(cache: &mut CounterCache, post: &mut Post) {
    let id = post.id();
    let likes = cache.get(&id, Counter::Likes).unwrap_or_else(|| {
        cache.put(&id, Counter::Likes, post.likes());
        post.likes()
    });
    let views = cache.get(&id, Counter::Views).unwrap_or_else(|| {
        cache.put(&id, Counter::Views, post.views());
        post.views()
    });
    post.set_counts(likes, views);
}

/// Replace the counts on `posts` with those from the counter cache, populating the cache from the
/// (storage-fresh) posts on a miss
pub async fn with_counts(state: &Inkpot, mut posts: Vec<Post>) -> Vec<Post> {
    let mut cache = state.counters.lock().await;
    for post in posts.iter_mut() {
        apply_counts(&mut cache, post);
    }
    posts
}

async fn with_count(state: &Inkpot, mut post: Post) -> Post {
    apply_counts(&mut *state.counters.lock().await, &mut post);
    post
}

/// Choose a slug for a post titled `title` that no *other* post is using
/// Write `post` to storage (adding it if `is_new`, updating it otherwise) under the first free
/// slug derived from `title`
///
/// Another writer may claim a slug between our looking it up & our writing; storage refuses the
/// write in that case & we move on to the next candidate.
async fn store_under_free_slug(
    state: &Inkpot,
    title: &str,
    post: &mut Post,
    is_new: bool,
) -> Result<()> {
    let base = slugify(title).context(BadPostSnafu)?;
    for candidate in slug_candidates(base.clone(), MAX_SLUG_ATTEMPTS) {
        let candidate = candidate.context(BadPostSnafu)?;
        if state
            .storage
            .slug_exists(&candidate, Some(&post.id()))
            .await
            .context(StorageSnafu)?
        {
            continue;
        }
        post.set_slug(candidate);
        let written = if is_new {
            state.storage.add_post(post).await
        } else {
            state.storage.update_post(post).await
        };
        match written {
            Ok(()) => return Ok(()),
            Err(err) if err.is_slug_taken() => {
                debug!("Lost {} to another post; trying the next slug", post.slug())
            }
            Err(err) => return Err(err).context(StorageSnafu),
        }
    }
    SlugsExhaustedSnafu {
        base,
        attempts: MAX_SLUG_ATTEMPTS,
    }
    .fail()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Listings                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// `username`'s posts, as seen by `viewer`: all of them for the owner, published posts only for
/// everyone else, newest first & optionally restricted to those tagged `tag`
pub async fn user_posts(
    state: &Inkpot,
    username: &str,
    viewer: Option<&User>,
    tag: Option<&Tagname>,
) -> Result<(User, Vec<Post>)> {
    let author = user_by_name(state, username).await?;
    let is_owner = viewer.is_some_and(|v| v.id() == author.id());
    let posts = state
        .storage
        .posts_for_author(&author.id(), is_owner, tag)
        .await
        .context(StorageSnafu)?;
    Ok((author, with_counts(state, posts).await))
}

/// The tags on `author`'s published posts along with the number of posts bearing each; most
/// popular first, ties broken alphabetically
pub async fn tag_cloud(state: &Inkpot, author: &User) -> Result<Vec<TagCount>> {
    let mut counts: BTreeMap<Tagname, usize> = BTreeMap::new();
    for post in state
        .storage
        .posts_for_author(&author.id(), false, None)
        .await
        .context(StorageSnafu)?
    {
        for tag in post.tags() {
            *counts.entry(tag.clone()).or_default() += 1;
        }
    }
    let mut cloud = counts
        .into_iter()
        .map(|(name, count)| TagCount { name, count })
        .collect::<Vec<TagCount>>();
    cloud.sort_by(|lhs, rhs| {
        rhs.count
            .cmp(&lhs.count)
            .then_with(|| lhs.name.cmp(&rhs.name))
    });
    Ok(cloud)
}

/// `owner`'s drafts, newest first
pub async fn drafts(state: &Inkpot, owner: &User) -> Result<Vec<Post>> {
    let posts = state
        .storage
        .posts_for_author(&owner.id(), true, None)
        .await
        .context(StorageSnafu)?
        .into_iter()
        .filter(|post| !post.is_published())
        .collect::<Vec<Post>>();
    Ok(with_counts(state, posts).await)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       Reading & liking                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Count a view of `post` by `viewer`; return the new view count (if anything was counted)
async fn count_view(state: &Inkpot, viewer: Option<&User>, post: &Post) -> Result<Option<u64>> {
    let views = match viewer {
        Some(viewer) if viewer.id() == post.author_id() => None,
        Some(viewer) => Some(
            state
                .storage
                .record_read(&viewer.id(), &post.id())
                .await
                .context(StorageSnafu)?,
        ),
        None => Some(
            state
                .storage
                .increment_views(&post.id())
                .await
                .context(StorageSnafu)?,
        ),
    };
    if let Some(views) = views {
        state
            .counters
            .lock()
            .await
            .put(&post.id(), Counter::Views, views);
    }
    Ok(views)
}

/// Retrieve a post for display, counting the view
pub async fn post_detail(
    state: &Inkpot,
    username: &str,
    slug: &str,
    viewer: Option<&User>,
) -> Result<PostDetailRsp> {
    let author = user_by_name(state, username).await?;
    let post = post_on_blog(state, &author, slug).await?;
    ensure!(
        post.visible_to(viewer),
        NoSuchPostSnafu {
            username: author.username().clone(),
            slug: slug.to_owned(),
        }
    );
    count_view(state, viewer, &post).await?;
    let post = with_count(state, post).await;

    let (is_owner, has_liked, is_following) = match viewer {
        Some(viewer) => (
            viewer.id() == author.id(),
            state
                .storage
                .has_liked(&viewer.id(), &post.id())
                .await
                .context(StorageSnafu)?,
            state
                .storage
                .is_following(&viewer.id(), &author.id())
                .await
                .context(StorageSnafu)?,
        ),
        None => (false, false, false),
    };

    Ok(PostDetailRsp {
        post: post.to_rsp(),
        is_owner,
        has_liked,
        is_following,
    })
}

/// Note that `viewer` has read a post, without retrieving it
pub async fn record_read(
    state: &Inkpot,
    username: &str,
    slug: &str,
    viewer: Option<&User>,
) -> Result<()> {
    let author = user_by_name(state, username).await?;
    let post = post_on_blog(state, &author, slug).await?;
    ensure!(
        post.visible_to(viewer),
        NoSuchPostSnafu {
            username: author.username().clone(),
            slug: slug.to_owned(),
        }
    );
    count_view(state, viewer, &post).await?;
    Ok(())
}

/// Like, or un-like, a post on behalf of `user`; return whether they now like it, along with the
/// new like count
pub async fn toggle_like(
    state: &Inkpot,
    username: &str,
    slug: &str,
    user: &User,
) -> Result<(bool, u64)> {
    let author = user_by_name(state, username).await?;
    let post = post_on_blog(state, &author, slug).await?;
    ensure!(
        post.visible_to(Some(user)),
        NoSuchPostSnafu {
            username: author.username().clone(),
            slug: slug.to_owned(),
        }
    );
    let (has_liked, likes) = state
        .storage
        .toggle_like(&user.id(), &post.id())
        .await
        .context(StorageSnafu)?;
    state
        .counters
        .lock()
        .await
        .put(&post.id(), Counter::Likes, likes);
    debug!(
        "{} {} {}",
        user.username(),
        if has_liked { "likes" } else { "no longer likes" },
        post.slug()
    );
    Ok((has_liked, likes))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Writing                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Create a new post on `caller`'s blog (which must be the blog belonging to `username`)
pub async fn create_post(
    state: &Inkpot,
    username: &str,
    caller: &User,
    req: PostCreateReq,
) -> Result<Post> {
    let owner = user_by_name(state, username).await?;
    ensure_owner(caller, &owner)?;
    let title = req.title.trim();
    let slug = slugify(title).context(BadPostSnafu)?;
    let mut post = Post::new(&owner, title, slug, &req.content, req.status, req.tags)
        .context(BadPostSnafu)?;
    store_under_free_slug(state, title, &mut post, true).await?;
    Ok(post)
}

/// Update a post; only fields present in `req` change. Retitling a post re-computes its slug.
pub async fn update_post(
    state: &Inkpot,
    username: &str,
    slug: &str,
    caller: &User,
    req: PostUpdateReq,
) -> Result<Post> {
    let owner = user_by_name(state, username).await?;
    ensure_owner(caller, &owner)?;
    let mut post = post_on_blog(state, &owner, slug).await?;

    let retitled = match req.title.as_deref().map(str::trim) {
        Some(title) if title != post.title() => {
            post.set_title(title).context(BadPostSnafu)?;
            true
        }
        _ => false,
    };
    if let Some(content) = req.content.as_deref() {
        post.set_content(content);
    }
    if let Some(status) = req.status {
        post.set_status(status);
    }
    if let Some(tags) = req.tags {
        post.set_tags(tags.into_iter().collect::<BTreeSet<Tagname>>());
    }

    if retitled {
        let title = post.title().to_owned();
        store_under_free_slug(state, &title, &mut post, false).await?;
    } else {
        state.storage.update_post(&post).await.context(StorageSnafu)?;
    }
    Ok(with_count(state, post).await)
}

/// Delete a post (along with its likes & reads)
pub async fn delete_post(state: &Inkpot, username: &str, slug: &str, caller: &User) -> Result<()> {
    let owner = user_by_name(state, username).await?;
    ensure_owner(caller, &owner)?;
    let post = post_on_blog(state, &owner, slug).await?;
    state.storage.delete_post(&post).await.context(StorageSnafu)?;
    state.counters.lock().await.invalidate(&post.id());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    use std::collections::HashSet;

    use inkpot_shared::PostStatus;

    use crate::inkpot::test_support::{add_user, state};

    fn create_req(title: &str, status: PostStatus, tags: &[&str]) -> PostCreateReq {
        PostCreateReq {
            title: title.to_owned(),
            content: "<p>Lorem ipsum</p>".to_owned(),
            status,
            tags: tags.iter().map(|t| Tagname::new(t).unwrap()).collect(),
        }
    }

    #[tokio::test]
    async fn slugs_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let john = add_user(&state, "johndoe").await;
        let jane = add_user(&state, "janedoe").await;

        let req = create_req("Hello, World!", PostStatus::Published, &[]);
        let p1 = create_post(&state, "johndoe", &john, req).await.unwrap();
        let req = create_req("Hello World", PostStatus::Published, &[]);
        let p2 = create_post(&state, "janedoe", &jane, req).await.unwrap();
        let req = create_req("hello world", PostStatus::Draft, &[]);
        let p3 = create_post(&state, "johndoe", &john, req).await.unwrap();
        assert_eq!(p1.slug().as_ref(), "hello-world");
        assert_eq!(p2.slug().as_ref(), "hello-world-1");
        assert_eq!(p3.slug().as_ref(), "hello-world-2");

        // Jane can't write to John's blog
        assert!(matches!(
            create_post(&state, "johndoe", &jane, create_req("Mine", PostStatus::Draft, &[])).await,
            Err(Error::NotOwner { .. })
        ));

        // Changing anything but the title leaves the slug alone...
        let p1 = update_post(
            &state,
            "johndoe",
            "hello-world",
            &john,
            PostUpdateReq {
                content: Some("<p>Updated</p>".to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(p1.slug().as_ref(), "hello-world");
        // ...but retitling re-computes it
        let p1 = update_post(
            &state,
            "johndoe",
            "hello-world",
            &john,
            PostUpdateReq {
                title: Some("Goodbye".to_owned()),
                tags: Some(vec![]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(p1.slug().as_ref(), "goodbye");
        assert!(p1.tags().is_empty());
        assert_eq!(p1.content(), "<p>Updated</p>");

        let p4 = create_post(&state, "johndoe", &john, create_req("!!!", PostStatus::Draft, &[]))
            .await
            .unwrap();
        assert_eq!(p4.slug().as_ref(), "post");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_posts_get_distinct_slugs() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let john = add_user(&state, "johndoe").await;
        for _ in 0..25 {
            let tasks = (0..4)
                .map(|_| {
                    let (state, john) = (state.clone(), john.clone());
                    tokio::spawn(async move {
                        let req = create_req("Same Title", PostStatus::Published, &[]);
                        create_post(&state, "johndoe", &john, req).await.unwrap()
                    })
                })
                .collect::<Vec<_>>();
            for task in tasks {
                task.await.unwrap();
            }
        }

        let posts = state
            .storage
            .posts_for_author(&john.id(), true, None)
            .await
            .unwrap();
        assert_eq!(posts.len(), 100);
        let slugs = posts
            .iter()
            .map(|post| post.slug().clone())
            .collect::<HashSet<PostSlug>>();
        assert_eq!(slugs.len(), 100);
        for post in &posts {
            let found = state.storage.post_by_slug(post.slug()).await.unwrap();
            assert_eq!(found.unwrap().id(), post.id());
        }
    }

    #[tokio::test]
    async fn route_names_are_not_slugs() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let john = add_user(&state, "johndoe").await;

        let drafts = create_req("Drafts", PostStatus::Published, &[]);
        let drafts = create_post(&state, "johndoe", &john, drafts).await.unwrap();
        assert_eq!(drafts.slug().as_ref(), "drafts-1");
        let images = create_req("Images!", PostStatus::Published, &[]);
        let images = create_post(&state, "johndoe", &john, images).await.unwrap();
        assert_eq!(images.slug().as_ref(), "images-1");

        let other = create_req("Other", PostStatus::Draft, &[]);
        create_post(&state, "johndoe", &john, other).await.unwrap();
        let retitled = update_post(
            &state,
            "johndoe",
            "other",
            &john,
            PostUpdateReq {
                title: Some("drafts".to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(retitled.slug().as_ref(), "drafts-2");
    }

    #[tokio::test]
    async fn drafts_and_views() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let john = add_user(&state, "johndoe").await;
        let jane = add_user(&state, "janedoe").await;

        create_post(&state, "johndoe", &john, create_req("Draft", PostStatus::Draft, &["rust"]))
            .await
            .unwrap();
        let req = create_req("Public", PostStatus::Published, &["rust", "web"]);
        create_post(&state, "johndoe", &john, req).await.unwrap();

        let (_, posts) = user_posts(&state, "johndoe", Some(&john), None).await.unwrap();
        assert_eq!(posts.len(), 2);
        let (_, posts) = user_posts(&state, "johndoe", Some(&jane), None).await.unwrap();
        assert_eq!(posts.len(), 1);
        let (_, posts) = user_posts(&state, "johndoe", None, Some(&Tagname::new("web").unwrap()))
            .await
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert!(matches!(
            user_posts(&state, "nobody", None, None).await,
            Err(Error::NoSuchUser { .. })
        ));

        assert_eq!(drafts(&state, &john).await.unwrap().len(), 1);
        assert!(matches!(
            post_detail(&state, "johndoe", "draft", Some(&jane)).await,
            Err(Error::NoSuchPost { .. })
        ));

        // Only published posts count toward the tag cloud
        let cloud = tag_cloud(&state, &john).await.unwrap();
        assert_eq!(
            cloud,
            vec![
                TagCount {
                    name: Tagname::new("rust").unwrap(),
                    count: 1
                },
                TagCount {
                    name: Tagname::new("web").unwrap(),
                    count: 1
                },
            ]
        );

        // The owner doesn't count...
        let detail = post_detail(&state, "johndoe", "public", Some(&john)).await.unwrap();
        assert!(detail.is_owner);
        assert_eq!(detail.post.views, 0);
        // ...anonymous readers do...
        let detail = post_detail(&state, "johndoe", "public", None).await.unwrap();
        assert_eq!(detail.post.views, 1);
        // ...as do authenticated readers, who also get a read recorded
        let detail = post_detail(&state, "johndoe", "public", Some(&jane)).await.unwrap();
        assert_eq!(detail.post.views, 2);
        assert!(!detail.is_owner);
        assert_eq!(state.storage.reads_for_user(&jane.id()).await.unwrap().len(), 1);
        record_read(&state, "johndoe", "public", Some(&jane)).await.unwrap();
        let detail = post_detail(&state, "johndoe", "public", None).await.unwrap();
        assert_eq!(detail.post.views, 4);

        // Wrong blog
        assert!(matches!(
            post_detail(&state, "janedoe", "public", None).await,
            Err(Error::NoSuchPost { .. })
        ));
    }

    #[tokio::test]
    async fn likes() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let john = add_user(&state, "johndoe").await;
        let jane = add_user(&state, "janedoe").await;
        create_post(&state, "johndoe", &john, create_req("Public", PostStatus::Published, &[]))
            .await
            .unwrap();
        create_post(&state, "johndoe", &john, create_req("Draft", PostStatus::Draft, &[]))
            .await
            .unwrap();

        assert_eq!(
            toggle_like(&state, "johndoe", "public", &jane).await.unwrap(),
            (true, 1)
        );
        let detail = post_detail(&state, "johndoe", "public", Some(&jane)).await.unwrap();
        assert!(detail.has_liked);
        assert_eq!(detail.post.likes, 1);
        assert_eq!(
            toggle_like(&state, "johndoe", "public", &jane).await.unwrap(),
            (false, 0)
        );
        // Jane can't see, & hence can't like, John's draft
        assert!(matches!(
            toggle_like(&state, "johndoe", "draft", &jane).await,
            Err(Error::NoSuchPost { .. })
        ));

        assert!(matches!(
            delete_post(&state, "johndoe", "public", &jane).await,
            Err(Error::NotOwner { .. })
        ));
        delete_post(&state, "johndoe", "public", &john).await.unwrap();
        assert!(matches!(
            post_detail(&state, "johndoe", "public", None).await,
            Err(Error::NoSuchPost { .. })
        ));
    }
}
