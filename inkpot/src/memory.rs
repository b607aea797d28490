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

//! # memory
//!
//! [Storage] implementation that keeps everything in process memory. Nothing survives a restart,
//! which makes it just the thing for unit tests, the in-process integration tests & kicking the
//! tires.
//!
//! [Storage]: crate::storage
//!
//! Every table lives behind a single [RwLock], so each operation is atomic with respect to every
//! other.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use snafu::{Backtrace, OptionExt, Snafu};
use tokio::sync::RwLock;
use tracing::debug;

use inkpot_shared::{PostId, PostSlug, Tagname, UserId, Username};

use crate::{
    entities::{Blog, Follow, Post, PostLike, PostRead, User},
    storage::{self, SlugTakenSnafu, UsernameTakenSnafu},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("No blog for user {id}"))]
    NoSuchBlog { id: UserId, backtrace: Backtrace },
    #[snafu(display("No post with id {id}"))]
    NoSuchPost { id: PostId, backtrace: Backtrace },
    #[snafu(display("No user with id {id}"))]
    NoSuchUser { id: UserId, backtrace: Backtrace },
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    usernames: HashMap<Username, UserId>,
    blogs: HashMap<UserId, Blog>,
    posts: HashMap<PostId, Post>,
    slugs: HashMap<PostSlug, PostId>,
    likes: BTreeMap<(UserId, PostId), PostLike>,
    reads: BTreeMap<(UserId, PostId), PostRead>,
    follows: BTreeMap<(UserId, UserId), Follow>,
}

impl Tables {
    fn post_mut(&mut self, id: &PostId) -> Result<&mut Post, storage::Error> {
        self.posts
            .get_mut(id)
            .context(NoSuchPostSnafu { id: *id })
            .map_err(storage::Error::new)
    }
    /// Fail if `post`'s slug is held by some other post
    fn check_slug(&self, post: &Post) -> Result<(), storage::Error> {
        match self.slugs.get(post.slug()) {
            Some(id) if *id != post.id() => SlugTakenSnafu {
                slug: post.slug().clone(),
            }
            .fail(),
            _ => Ok(()),
        }
    }
    /// Remove the post & everything hanging off it
    fn remove_post(&mut self, id: &PostId) {
        if let Some(post) = self.posts.remove(id) {
            self.slugs.remove(post.slug());
        }
        self.likes.retain(|(_, post_id), _| post_id != id);
        self.reads.retain(|(_, post_id), _| post_id != id);
    }
}

fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|lhs, rhs| rhs.created_at().cmp(&lhs.created_at()));
    posts
}

#[derive(Debug, Default)]
pub struct Storage {
    tables: RwLock<Tables>,
    #[cfg(test)]
    refuse_blogs: std::sync::atomic::AtomicBool,
}

impl Storage {
    pub fn new() -> Storage {
        Storage::default()
    }
    /// Make [add_blog](storage::Backend::add_blog) fail (or stop failing)
    #[cfg(test)]
    pub fn refuse_blogs(&self, refuse: bool) {
        self.refuse_blogs
            .store(refuse, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl storage::Backend for Storage {
    async fn add_user(&self, user: &User) -> Result<(), storage::Error> {
        let mut tables = self.tables.write().await;
        if tables.usernames.contains_key(user.username()) {
            return UsernameTakenSnafu {
                username: user.username().clone(),
            }
            .fail();
        }
        tables
            .usernames
            .insert(user.username().clone(), user.id());
        tables.users.insert(user.id(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, user: &User) -> Result<(), storage::Error> {
        let mut tables = self.tables.write().await;
        let id = user.id();
        // Un-like everything this user liked, first, so the counts on other people's posts are
        // right
        let liked = tables
            .likes
            .keys()
            .filter(|(user_id, _)| *user_id == id)
            .copied()
            .collect::<Vec<_>>();
        for key @ (_, post_id) in liked {
            tables.likes.remove(&key);
            if let Some(post) = tables.posts.get_mut(&post_id) {
                post.set_counts(post.likes().saturating_sub(1), post.views());
            }
        }
        tables.reads.retain(|(user_id, _), _| *user_id != id);
        let authored = tables
            .posts
            .values()
            .filter(|post| post.author_id() == id)
            .map(|post| post.id())
            .collect::<Vec<_>>();
        for post_id in authored {
            tables.remove_post(&post_id);
        }
        tables
            .follows
            .retain(|(follower, following), _| *follower != id && *following != id);
        tables.blogs.remove(&id);
        tables.usernames.remove(user.username());
        tables.users.remove(&id);
        debug!("Removed user {} & all their stuff", user.username());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, storage::Error> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn update_user(&self, user: &User) -> Result<(), storage::Error> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .users
            .get_mut(&user.id())
            .context(NoSuchUserSnafu { id: user.id() })
            .map_err(storage::Error::new)?;
        *slot = user.clone();
        Ok(())
    }

    async fn user_for_id(&self, id: &UserId) -> Result<Option<User>, storage::Error> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn user_for_name(&self, name: &str) -> Result<Option<User>, storage::Error> {
        // A name that isn't a legal username can't belong to anyone
        let Ok(name) = Username::new(name) else {
            return Ok(None);
        };
        let tables = self.tables.read().await;
        Ok(tables
            .usernames
            .get(&name)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn add_blog(&self, blog: &Blog) -> Result<(), storage::Error> {
        #[cfg(test)]
        if self.refuse_blogs.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(storage::Error::new(std::io::Error::other(
                "refusing to add a blog",
            )));
        }
        self.tables
            .write()
            .await
            .blogs
            .insert(blog.owner_id(), blog.clone());
        Ok(())
    }

    async fn blog_for_owner(&self, owner: &UserId) -> Result<Option<Blog>, storage::Error> {
        Ok(self.tables.read().await.blogs.get(owner).cloned())
    }

    async fn update_blog(&self, blog: &Blog) -> Result<(), storage::Error> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .blogs
            .get_mut(&blog.owner_id())
            .context(NoSuchBlogSnafu {
                id: blog.owner_id(),
            })
            .map_err(storage::Error::new)?;
        *slot = blog.clone();
        Ok(())
    }

    async fn add_post(&self, post: &Post) -> Result<(), storage::Error> {
        let mut tables = self.tables.write().await;
        tables.check_slug(post)?;
        tables.slugs.insert(post.slug().clone(), post.id());
        tables.posts.insert(post.id(), post.clone());
        Ok(())
    }

    async fn delete_post(&self, post: &Post) -> Result<(), storage::Error> {
        self.tables.write().await.remove_post(&post.id());
        Ok(())
    }

    async fn post_by_id(&self, id: &PostId) -> Result<Option<Post>, storage::Error> {
        Ok(self.tables.read().await.posts.get(id).cloned())
    }

    async fn post_by_slug(&self, slug: &PostSlug) -> Result<Option<Post>, storage::Error> {
        let tables = self.tables.read().await;
        Ok(tables
            .slugs
            .get(slug)
            .and_then(|id| tables.posts.get(id))
            .cloned())
    }

    async fn posts_for_author(
        &self,
        author: &UserId,
        include_drafts: bool,
        tag: Option<&Tagname>,
    ) -> Result<Vec<Post>, storage::Error> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .posts
                .values()
                .filter(|post| post.author_id() == *author)
                .filter(|post| include_drafts || post.is_published())
                .filter(|post| tag.is_none_or(|tag| post.tags().contains(tag)))
                .cloned()
                .collect(),
        ))
    }

    async fn published_posts(&self) -> Result<Vec<Post>, storage::Error> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .posts
                .values()
                .filter(|post| post.is_published())
                .cloned()
                .collect(),
        ))
    }

    async fn slug_exists(
        &self,
        slug: &PostSlug,
        excluding: Option<&PostId>,
    ) -> Result<bool, storage::Error> {
        Ok(self
            .tables
            .read()
            .await
            .slugs
            .get(slug)
            .is_some_and(|id| Some(id) != excluding))
    }

    async fn update_post(&self, post: &Post) -> Result<(), storage::Error> {
        let mut tables = self.tables.write().await;
        tables.check_slug(post)?;
        let existing = tables.post_mut(&post.id())?;
        let old_slug = existing.slug().clone();
        let (likes, views) = (existing.likes(), existing.views());
        *existing = post.clone();
        existing.set_counts(likes, views);
        if old_slug != *post.slug() {
            tables.slugs.remove(&old_slug);
            tables.slugs.insert(post.slug().clone(), post.id());
        }
        Ok(())
    }

    async fn has_liked(&self, user: &UserId, post: &PostId) -> Result<bool, storage::Error> {
        Ok(self
            .tables
            .read()
            .await
            .likes
            .contains_key(&(*user, *post)))
    }

    async fn likes_for_user(&self, user: &UserId) -> Result<Vec<PostLike>, storage::Error> {
        let tables = self.tables.read().await;
        let mut likes = tables
            .likes
            .values()
            .filter(|like| like.user_id == *user)
            .cloned()
            .collect::<Vec<_>>();
        likes.sort_by(|lhs, rhs| rhs.created_at.cmp(&lhs.created_at));
        Ok(likes)
    }

    async fn toggle_like(
        &self,
        user: &UserId,
        post: &PostId,
    ) -> Result<(bool, u64), storage::Error> {
        let mut tables = self.tables.write().await;
        let key = (*user, *post);
        let liked = !tables.likes.contains_key(&key);
        let likes = {
            let post = tables.post_mut(post)?;
            let likes = if liked {
                post.likes() + 1
            } else {
                post.likes().saturating_sub(1)
            };
            post.set_counts(likes, post.views());
            likes
        };
        if liked {
            tables.likes.insert(key, PostLike::new(*user, *post));
        } else {
            tables.likes.remove(&key);
        }
        Ok((liked, likes))
    }

    async fn has_read(&self, user: &UserId, post: &PostId) -> Result<bool, storage::Error> {
        Ok(self
            .tables
            .read()
            .await
            .reads
            .contains_key(&(*user, *post)))
    }

    async fn increment_views(&self, post: &PostId) -> Result<u64, storage::Error> {
        let mut tables = self.tables.write().await;
        let post = tables.post_mut(post)?;
        let views = post.views() + 1;
        post.set_counts(post.likes(), views);
        Ok(views)
    }

    async fn reads_for_user(&self, user: &UserId) -> Result<Vec<PostRead>, storage::Error> {
        let tables = self.tables.read().await;
        let mut reads = tables
            .reads
            .values()
            .filter(|read| read.user_id == *user)
            .cloned()
            .collect::<Vec<_>>();
        reads.sort_by(|lhs, rhs| rhs.updated_at.cmp(&lhs.updated_at));
        Ok(reads)
    }

    async fn record_read(&self, user: &UserId, post: &PostId) -> Result<u64, storage::Error> {
        let mut tables = self.tables.write().await;
        let views = {
            let post = tables.post_mut(post)?;
            let views = post.views() + 1;
            post.set_counts(post.likes(), views);
            views
        };
        tables
            .reads
            .entry((*user, *post))
            .and_modify(|read| read.updated_at = Utc::now())
            .or_insert_with(|| PostRead::new(*user, *post));
        Ok(views)
    }

    async fn followers_count(&self, user: &UserId) -> Result<u64, storage::Error> {
        Ok(self
            .tables
            .read()
            .await
            .follows
            .keys()
            .filter(|(_, following)| following == user)
            .count() as u64)
    }

    async fn following(&self, user: &UserId) -> Result<Vec<UserId>, storage::Error> {
        Ok(self
            .tables
            .read()
            .await
            .follows
            .keys()
            .filter(|(follower, _)| follower == user)
            .map(|(_, following)| *following)
            .collect())
    }

    async fn is_following(
        &self,
        follower: &UserId,
        following: &UserId,
    ) -> Result<bool, storage::Error> {
        Ok(self
            .tables
            .read()
            .await
            .follows
            .contains_key(&(*follower, *following)))
    }

    async fn toggle_follow(
        &self,
        follower: &UserId,
        following: &UserId,
    ) -> Result<bool, storage::Error> {
        let mut tables = self.tables.write().await;
        let key = (*follower, *following);
        if tables.follows.remove(&key).is_some() {
            Ok(false)
        } else {
            tables.follows.insert(key, Follow::new(*follower, *following));
            Ok(true)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::Arc;

    use inkpot_shared::{PostStatus, UserEmail};
    use secrecy::SecretString;

    use crate::{entities::slugify, peppers::Peppers, storage::Backend};

    fn user(name: &str) -> User {
        let (version, pepper) = Peppers::default().current_pepper().unwrap();
        User::new(
            &version,
            &pepper,
            &Username::new(name).unwrap(),
            &SecretString::from("correct horse battery staple".to_owned()),
            &UserEmail::new(&format!("{}@example.com", name)).unwrap(),
        )
        .unwrap()
    }

    fn post(author: &User, title: &str, status: PostStatus) -> Post {
        Post::new(
            author,
            title,
            slugify(title).unwrap(),
            "<p>Hello</p>",
            status,
            vec![Tagname::new("rust").unwrap()],
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_like_toggles() {
        storage::contract::concurrent_like_toggles(Arc::new(Storage::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reads() {
        storage::contract::concurrent_reads(Arc::new(Storage::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slug_races() {
        storage::contract::slug_races(Arc::new(Storage::new())).await;
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let storage = Storage::new();
        storage.add_user(&user("johndoe")).await.unwrap();
        let err = storage.add_user(&user("johndoe")).await.unwrap_err();
        assert!(err.is_username_taken());
        assert!(storage.user_for_name("johndoe").await.unwrap().is_some());
        assert!(storage.user_for_name("janedoe").await.unwrap().is_none());
        assert!(storage.user_for_name("not a username!").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn likes_and_reads() {
        let storage = Storage::new();
        let author = user("johndoe");
        let reader = user("janedoe");
        storage.add_user(&author).await.unwrap();
        storage.add_user(&reader).await.unwrap();
        let p = post(&author, "Hello", PostStatus::Published);
        storage.add_post(&p).await.unwrap();

        assert_eq!(
            storage.toggle_like(&reader.id(), &p.id()).await.unwrap(),
            (true, 1)
        );
        assert!(storage.has_liked(&reader.id(), &p.id()).await.unwrap());
        assert_eq!(
            storage.toggle_like(&reader.id(), &p.id()).await.unwrap(),
            (false, 0)
        );

        assert_eq!(storage.record_read(&reader.id(), &p.id()).await.unwrap(), 1);
        assert_eq!(storage.record_read(&reader.id(), &p.id()).await.unwrap(), 2);
        assert_eq!(storage.increment_views(&p.id()).await.unwrap(), 3);
        assert_eq!(storage.reads_for_user(&reader.id()).await.unwrap().len(), 1);

        // Updating the post mustn't clobber the counters
        let mut updated = p.clone();
        updated.set_content("<p>Goodbye</p>");
        storage.update_post(&updated).await.unwrap();
        let fetched = storage.post_by_id(&p.id()).await.unwrap().unwrap();
        assert_eq!(fetched.views(), 3);
        assert_eq!(fetched.content(), "<p>Goodbye</p>");
    }

    #[tokio::test]
    async fn drafts_and_tags() {
        let storage = Storage::new();
        let author = user("johndoe");
        storage.add_user(&author).await.unwrap();
        storage
            .add_post(&post(&author, "Draft", PostStatus::Draft))
            .await
            .unwrap();
        storage
            .add_post(&post(&author, "Published", PostStatus::Published))
            .await
            .unwrap();
        assert_eq!(
            storage
                .posts_for_author(&author.id(), true, None)
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            storage
                .posts_for_author(&author.id(), false, None)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(
            storage
                .posts_for_author(&author.id(), true, Some(&Tagname::new("go").unwrap()))
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(storage.published_posts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_users_cascades() {
        let storage = Storage::new();
        let author = user("johndoe");
        let fan = user("janedoe");
        storage.add_user(&author).await.unwrap();
        storage.add_user(&fan).await.unwrap();
        storage.add_blog(&Blog::new(&author)).await.unwrap();
        storage.add_blog(&Blog::new(&fan)).await.unwrap();
        let authors_post = post(&author, "Mine", PostStatus::Published);
        let fans_post = post(&fan, "Theirs", PostStatus::Published);
        storage.add_post(&authors_post).await.unwrap();
        storage.add_post(&fans_post).await.unwrap();
        storage
            .toggle_like(&author.id(), &fans_post.id())
            .await
            .unwrap();
        storage
            .toggle_like(&fan.id(), &authors_post.id())
            .await
            .unwrap();
        storage
            .toggle_follow(&fan.id(), &author.id())
            .await
            .unwrap();

        storage.delete_user(&author).await.unwrap();

        assert!(storage.user_for_id(&author.id()).await.unwrap().is_none());
        assert!(storage.blog_for_owner(&author.id()).await.unwrap().is_none());
        assert!(
            storage
                .post_by_slug(authors_post.slug())
                .await
                .unwrap()
                .is_none()
        );
        assert!(storage.likes_for_user(&fan.id()).await.unwrap().is_empty());
        assert!(storage.following(&fan.id()).await.unwrap().is_empty());
        let theirs = storage.post_by_id(&fans_post.id()).await.unwrap().unwrap();
        assert_eq!(theirs.likes(), 0);
        // The name may now be reclaimed
        storage.add_user(&user("johndoe")).await.unwrap();
    }

    #[tokio::test]
    async fn follows() {
        let storage = Storage::new();
        let a = user("alice");
        let b = user("bobby");
        assert!(storage.toggle_follow(&a.id(), &b.id()).await.unwrap());
        assert!(storage.is_following(&a.id(), &b.id()).await.unwrap());
        assert_eq!(storage.followers_count(&b.id()).await.unwrap(), 1);
        assert_eq!(storage.following(&a.id()).await.unwrap(), vec![b.id()]);
        assert!(!storage.toggle_follow(&a.id(), &b.id()).await.unwrap());
        assert_eq!(storage.followers_count(&b.id()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn slugs() {
        let storage = Storage::new();
        let author = user("johndoe");
        let p = post(&author, "Hello", PostStatus::Draft);
        storage.add_post(&p).await.unwrap();
        assert!(storage.slug_exists(p.slug(), None).await.unwrap());
        assert!(!storage.slug_exists(p.slug(), Some(&p.id())).await.unwrap());
    }
}
