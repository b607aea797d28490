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

//! # test-data
//!
//! Populate a store with random users, posts, likes & reads; handy for exercising the discovery
//! feeds against something other than an empty database.

use chrono::{Duration, Utc};
use rand::{Rng, seq::SliceRandom};
use secrecy::SecretString;
use snafu::{Backtrace, prelude::*};
use tracing::{debug, info};

use inkpot_shared::{PostId, PostSlug, PostStatus, Tagname, UserEmail, UserId, Username};

use crate::{
    entities::{self, Blog, Post, User, slug_candidates, slugify},
    peppers::{self, Peppers},
    storage::{self, Backend},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to build a test entity: {source}"))]
    Entity { source: entities::Error },
    #[snafu(display("Bad generated name {text}: {source}"))]
    Name {
        text: String,
        source: inkpot_shared::Error,
    },
    #[snafu(display("No free slug for {base}"))]
    NoSlug { base: PostSlug, backtrace: Backtrace },
    #[snafu(display("{source}"))]
    Pepper { source: peppers::Error },
    #[snafu(display("Storage error: {source}"))]
    Storage { source: storage::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Size of the tag vocabulary from which posts draw their tags
pub const NUM_TAGS: usize = 100;

const WORDS: &[&str] = &[
    "async", "borrow", "cache", "delta", "echo", "fable", "garden", "harbor", "island", "journey",
    "kernel", "lantern", "meadow", "nebula", "orchard", "pixel", "quartz", "river", "signal",
    "thicket", "umbra", "velvet", "willow", "xenon", "yonder", "zephyr",
];

/// What [generate_test_data] produced
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub users: usize,
    pub posts: usize,
    pub likes: usize,
    pub reads: usize,
}

fn words(rng: &mut impl Rng, n: usize) -> Vec<&'static str> {
    (0..n)
        .filter_map(|_| WORDS.choose(rng).copied())
        .collect()
}

fn title(rng: &mut impl Rng) -> String {
    let n = rng.gen_range(2..=6);
    let mut words = words(rng, n);
    if let Some(first) = words.first_mut() {
        let mut s = first.to_string();
        s[..1].make_ascii_uppercase();
        return format!("{} {}", s, words.split_off(1).join(" "));
    }
    "Untitled".to_owned()
}

fn content(rng: &mut impl Rng) -> String {
    (0..rng.gen_range(1..=4))
        .map(|_| {
            let n = rng.gen_range(20..=80);
            format!("<p>{}.</p>", words(rng, n).join(" "))
        })
        .collect::<Vec<String>>()
        .join("\n")
}

async fn free_slug(storage: &(dyn Backend + Send + Sync), title: &str) -> Result<PostSlug> {
    let base = slugify(title).context(EntitySnafu)?;
    for candidate in slug_candidates(base.clone(), 10_000) {
        let candidate = candidate.context(EntitySnafu)?;
        if !storage
            .slug_exists(&candidate, None)
            .await
            .context(StorageSnafu)?
        {
            return Ok(candidate);
        }
    }
    NoSlugSnafu { base }.fail()
}

/// Add `num_users` random users to `storage`, each with a blog, 10 to 100 published posts (each
/// tagged with up to five tags out of [NUM_TAGS]), 10 to 30 likes of other people's posts & 20 to
/// 50 reads. Every user's password is `password`.
pub async fn generate_test_data<R: Rng + Send>(
    storage: &(dyn Backend + Send + Sync),
    peppers: &Peppers,
    password: &SecretString,
    num_users: usize,
    rng: &mut R,
) -> Result<Summary> {
    let (pepper_version, pepper) = peppers.current_pepper().context(PepperSnafu)?;
    let vocabulary = (0..NUM_TAGS)
        .map(|n| {
            let text = format!("tag{:02}", n);
            Tagname::new(&text).context(NameSnafu { text })
        })
        .collect::<Result<Vec<Tagname>>>()?;

    let mut summary = Summary::default();
    let mut users: Vec<User> = Vec::with_capacity(num_users);
    let mut posts: Vec<(PostId, UserId)> = Vec::new();

    for _ in 0..num_users {
        let word = WORDS.choose(rng).copied().unwrap_or("user");
        let text = format!("{}{:05}", word, rng.gen_range(0..100_000));
        let username = Username::new(&text).context(NameSnafu { text: text.clone() })?;
        let email_text = format!("{}@example.com", text);
        let email = UserEmail::new(&email_text).context(NameSnafu { text: email_text })?;
        let user = User::new(&pepper_version, &pepper, &username, password, &email)
            .context(EntitySnafu)?;
        match storage.add_user(&user).await {
            Ok(_) => (),
            Err(err) if err.is_username_taken() => {
                debug!("{} is taken; skipping", username);
                continue;
            }
            Err(err) => return Err(err).context(StorageSnafu),
        }
        storage
            .add_blog(&Blog::new(&user))
            .await
            .context(StorageSnafu)?;

        for _ in 0..rng.gen_range(10..=100) {
            let title = title(rng);
            let slug = free_slug(storage, &title).await?;
            let num_tags = rng.gen_range(0..=5);
            let tags = vocabulary
                .choose_multiple(rng, num_tags)
                .cloned()
                .collect::<Vec<Tagname>>();
            let mut post = Post::new(
                &user,
                &title,
                slug,
                &content(rng),
                PostStatus::Published,
                tags,
            )
            .context(EntitySnafu)?;
            post.set_created_at(Utc::now() - Duration::minutes(rng.gen_range(0..525_600)));
            storage.add_post(&post).await.context(StorageSnafu)?;
            posts.push((post.id(), user.id()));
            summary.posts += 1;
        }

        info!("Created test user {}", username);
        users.push(user);
        summary.users += 1;
    }

    for user in &users {
        let candidates = posts
            .iter()
            .filter(|(_, author)| *author != user.id())
            .map(|(id, _)| *id)
            .collect::<Vec<PostId>>();
        let num_likes = rng.gen_range(10..=30);
        for post in candidates.choose_multiple(rng, num_likes) {
            if !storage
                .has_liked(&user.id(), post)
                .await
                .context(StorageSnafu)?
            {
                storage
                    .toggle_like(&user.id(), post)
                    .await
                    .context(StorageSnafu)?;
                summary.likes += 1;
            }
        }
        let num_reads = rng.gen_range(20..=50);
        for post in candidates.choose_multiple(rng, num_reads) {
            storage
                .record_read(&user.id(), post)
                .await
                .context(StorageSnafu)?;
            summary.reads += 1;
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;

    use rand::{SeedableRng, rngs::StdRng};

    use crate::memory;

    #[tokio::test]
    async fn populates() {
        let storage = memory::Storage::new();
        let mut rng = StdRng::seed_from_u64(11);
        let summary = generate_test_data(
            &storage,
            &Peppers::default(),
            &SecretString::from("correct horse battery staple".to_owned()),
            3,
            &mut rng,
        )
        .await
        .unwrap();
        assert_eq!(summary.users, 3);
        assert!(summary.posts >= 30 && summary.posts <= 300);
        assert!(summary.likes >= 30);
        assert!(summary.reads >= 60);

        let users = storage.list_users().await.unwrap();
        assert_eq!(users.len(), 3);
        for user in &users {
            assert!(storage.blog_for_owner(&user.id()).await.unwrap().is_some());
            for like in storage.likes_for_user(&user.id()).await.unwrap() {
                let post = storage.post_by_id(&like.post_id).await.unwrap().unwrap();
                assert_ne!(post.author_id(), user.id());
            }
        }
        assert_eq!(storage.published_posts().await.unwrap().len(), summary.posts);
    }
}
