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

//! # storage
//!
//! Abstractions for the inkpot storage layer.
//!
//! Two implementations exist: [memory] (handy for tests & kicking the tires) and [dynamodb]
//! (DynamoDB proper, or any store speaking its wire protocol, such as ScyllaDB's Alternator).
//! Handlers only ever see a `dyn Backend + Send + Sync`.
//!
//! [memory]: crate::memory
//! [dynamodb]: crate::dynamodb
//!
//! The trait is deliberately key-value shaped; things like keyword search or "trending over the
//! last week" are computed by the callers from [Backend::published_posts].

use async_trait::async_trait;
use snafu::{Backtrace, Snafu};

use inkpot_shared::{PostId, PostSlug, Tagname, UserId, Username};

use crate::entities::{Blog, Post, PostLike, PostRead, User};

/// The storage error type
///
/// Each backend has its own, richer, error type; they get boxed up here. The failures callers need
/// to tell apart are attempts to claim a username or a post slug that's already in use.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Username {username} is already taken"))]
    UsernameTaken {
        username: Username,
        backtrace: Backtrace,
    },
    #[snafu(display("Slug {slug} belongs to another post"))]
    SlugTaken { slug: PostSlug, backtrace: Backtrace },
    #[snafu(display("{source}"))]
    Backend {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::Backend {
            source: Box::new(err),
        }
    }
    pub fn is_username_taken(&self) -> bool {
        matches!(self, Error::UsernameTaken { .. })
    }
    pub fn is_slug_taken(&self) -> bool {
        matches!(self, Error::SlugTaken { .. })
    }
}

#[async_trait]
pub trait Backend {
    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Users
    ////////////////////////////////////////////////////////////////////////////////////////////////
    /// Add a new [User]; fail with [Error::UsernameTaken] if the username is already claimed
    async fn add_user(&self, user: &User) -> Result<(), Error>;
    /// Remove a user along with everything they own: their blog, their posts (& the likes & reads
    /// thereof), their own likes & reads, and every follow relationship in which they take part.
    /// Removing a like decrements the like count on the liked post.
    async fn delete_user(&self, user: &User) -> Result<(), Error>;
    /// All users, in no particular order
    async fn list_users(&self) -> Result<Vec<User>, Error>;
    /// Overwrite an existing [User]
    async fn update_user(&self, user: &User) -> Result<(), Error>;
    async fn user_for_id(&self, id: &UserId) -> Result<Option<User>, Error>;
    /// Retrieve a [User] given a textual username. None means there is no user by that name.
    async fn user_for_name(&self, name: &str) -> Result<Option<User>, Error>;

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Blogs
    ////////////////////////////////////////////////////////////////////////////////////////////////
    async fn add_blog(&self, blog: &Blog) -> Result<(), Error>;
    async fn blog_for_owner(&self, owner: &UserId) -> Result<Option<Blog>, Error>;
    async fn update_blog(&self, blog: &Blog) -> Result<(), Error>;

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Posts
    ////////////////////////////////////////////////////////////////////////////////////////////////
    /// Add a new [Post]; fail with [Error::SlugTaken] if another post already has its slug
    async fn add_post(&self, post: &Post) -> Result<(), Error>;
    /// Remove a [Post] along with all likes & reads thereof
    async fn delete_post(&self, post: &Post) -> Result<(), Error>;
    async fn post_by_id(&self, id: &PostId) -> Result<Option<Post>, Error>;
    async fn post_by_slug(&self, slug: &PostSlug) -> Result<Option<Post>, Error>;
    /// A given author's posts, newest first; drafts are included only if asked for, and the listing
    /// may be restricted to posts bearing a given tag
    async fn posts_for_author(
        &self,
        author: &UserId,
        include_drafts: bool,
        tag: Option<&Tagname>,
    ) -> Result<Vec<Post>, Error>;
    /// Every published post, newest first
    async fn published_posts(&self) -> Result<Vec<Post>, Error>;
    /// True if some post *other than* `excluding` is using `slug`
    async fn slug_exists(&self, slug: &PostSlug, excluding: Option<&PostId>)
    -> Result<bool, Error>;
    /// Write the title, slug, content, status & tags of an existing post; like & view counts are
    /// owned by the storage layer & are left untouched. Fail with [Error::SlugTaken] if the new
    /// slug belongs to another post.
    async fn update_post(&self, post: &Post) -> Result<(), Error>;

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Likes
    ////////////////////////////////////////////////////////////////////////////////////////////////
    async fn has_liked(&self, user: &UserId, post: &PostId) -> Result<bool, Error>;
    /// Everything `user` has liked, most recent first
    async fn likes_for_user(&self, user: &UserId) -> Result<Vec<PostLike>, Error>;
    /// If `user` likes `post`, unlike it; else like it. Return whether the user now likes the post,
    /// along with the post's new like count.
    async fn toggle_like(&self, user: &UserId, post: &PostId) -> Result<(bool, u64), Error>;

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Reads & views
    ////////////////////////////////////////////////////////////////////////////////////////////////
    async fn has_read(&self, user: &UserId, post: &PostId) -> Result<bool, Error>;
    /// Count an anonymous view; return the new view count
    async fn increment_views(&self, post: &PostId) -> Result<u64, Error>;
    /// Everything `user` has read, most recently (re-)read first
    async fn reads_for_user(&self, user: &UserId) -> Result<Vec<PostRead>, Error>;
    /// Note that `user` has read `post` (creating the record, or bumping its `updated_at`) & count
    /// a view; return the new view count
    async fn record_read(&self, user: &UserId, post: &PostId) -> Result<u64, Error>;

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Follows
    ////////////////////////////////////////////////////////////////////////////////////////////////
    async fn followers_count(&self, user: &UserId) -> Result<u64, Error>;
    /// Everyone `user` follows
    async fn following(&self, user: &UserId) -> Result<Vec<UserId>, Error>;
    async fn is_following(&self, follower: &UserId, following: &UserId) -> Result<bool, Error>;
    /// Follow or un-follow; return true if `follower` now follows `following`
    async fn toggle_follow(&self, follower: &UserId, following: &UserId) -> Result<bool, Error>;
}

#[cfg(test)]
pub mod contract {
    //! Behavior every [Backend] owes its callers under concurrent use, written once so that each
    //! implementation can be run against it. Names are randomized so these can run against tables
    //! that already hold data.

    use std::sync::Arc;

    use secrecy::SecretString;
    use uuid::Uuid;

    use inkpot_shared::{PostStatus, UserEmail, Username};

    use super::Backend;
    use crate::{
        entities::{Blog, Post, User, slugify},
        peppers::Peppers,
    };

    pub type Storage = Arc<dyn Backend + Send + Sync>;

    async fn fresh_user(storage: &Storage, prefix: &str) -> User {
        let (version, pepper) = Peppers::default().current_pepper().unwrap();
        let name = format!("{}-{}", prefix, Uuid::new_v4().simple());
        let user = User::new(
            &version,
            &pepper,
            &Username::new(&name).unwrap(),
            &SecretString::from("correct horse battery staple".to_owned()),
            &UserEmail::new(&format!("{}@example.com", name)).unwrap(),
        )
        .unwrap();
        storage.add_user(&user).await.unwrap();
        storage.add_blog(&Blog::new(&user)).await.unwrap();
        user
    }

    fn new_post(author: &User, title: &str) -> Post {
        Post::new(
            author,
            title,
            slugify(title).unwrap(),
            "<p>Hello</p>",
            PostStatus::Published,
            vec![],
        )
        .unwrap()
    }

    async fn fresh_post(storage: &Storage, author: &User) -> Post {
        let post = new_post(author, &format!("Post {}", Uuid::new_v4().simple()));
        storage.add_post(&post).await.unwrap();
        post
    }

    /// Four fans each toggle their like three times, all at once; each must end up liking the post
    /// exactly once, and the count must agree with the like records
    pub async fn concurrent_like_toggles(storage: Storage) {
        let author = fresh_user(&storage, "author").await;
        let post = fresh_post(&storage, &author).await;
        let mut fans = Vec::new();
        for _ in 0..4 {
            fans.push(fresh_user(&storage, "fan").await);
        }

        let tasks = fans
            .iter()
            .flat_map(|fan| std::iter::repeat_n(fan.id(), 3))
            .map(|fan| {
                let storage = storage.clone();
                let post = post.id();
                tokio::spawn(async move { storage.toggle_like(&fan, &post).await.unwrap() })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap();
        }

        for fan in &fans {
            assert!(storage.has_liked(&fan.id(), &post.id()).await.unwrap());
            assert_eq!(storage.likes_for_user(&fan.id()).await.unwrap().len(), 1);
        }
        let post = storage.post_by_id(&post.id()).await.unwrap().unwrap();
        assert_eq!(post.likes(), 4);

        // One more round takes every like back off
        for fan in &fans {
            assert!(!storage.toggle_like(&fan.id(), &post.id()).await.unwrap().0);
        }
        let post = storage.post_by_id(&post.id()).await.unwrap().unwrap();
        assert_eq!(post.likes(), 0);
    }

    /// A reader hammering a post yields one read record & a view per read
    pub async fn concurrent_reads(storage: Storage) {
        let author = fresh_user(&storage, "author").await;
        let reader = fresh_user(&storage, "reader").await;
        let post = fresh_post(&storage, &author).await;

        let tasks = (0..8)
            .map(|_| {
                let storage = storage.clone();
                let (reader, post) = (reader.id(), post.id());
                tokio::spawn(async move { storage.record_read(&reader, &post).await.unwrap() })
            })
            .collect::<Vec<_>>();
        let mut views = Vec::new();
        for task in tasks {
            views.push(task.await.unwrap());
        }
        views.sort();
        assert_eq!(views, (1..=8).collect::<Vec<u64>>());
        assert_eq!(storage.reads_for_user(&reader.id()).await.unwrap().len(), 1);
        let post = storage.post_by_id(&post.id()).await.unwrap().unwrap();
        assert_eq!(post.views(), 8);
    }

    /// Of several posts racing for one slug, exactly one gets it; the rest are told the slug is
    /// taken, and nobody can retitle their way onto it afterward
    pub async fn slug_races(storage: Storage) {
        let author = fresh_user(&storage, "author").await;
        let title = format!("Race {}", Uuid::new_v4().simple());
        let slug = slugify(&title).unwrap();

        let tasks = (0..4)
            .map(|_| {
                let storage = storage.clone();
                let post = new_post(&author, &title);
                tokio::spawn(async move { storage.add_post(&post).await })
            })
            .collect::<Vec<_>>();
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        assert_eq!(results.iter().filter(|res| res.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|res| res.as_ref().err())
                .all(super::Error::is_slug_taken)
        );
        let winner = storage.post_by_slug(&slug).await.unwrap().unwrap();
        assert_eq!(
            storage
                .posts_for_author(&author.id(), true, None)
                .await
                .unwrap()
                .len(),
            1
        );

        let other = fresh_post(&storage, &author).await;
        let mut moved = other.clone();
        moved.set_slug(slug.clone());
        assert!(storage.update_post(&moved).await.unwrap_err().is_slug_taken());
        assert_eq!(
            storage.post_by_slug(&slug).await.unwrap().unwrap().id(),
            winner.id()
        );
        assert_eq!(
            storage.post_by_slug(other.slug()).await.unwrap().unwrap().id(),
            other.id()
        );
    }
}
