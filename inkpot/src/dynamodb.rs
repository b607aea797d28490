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

//! # dynamodb
//!
//! [Storage] implementation for DynamoDB (or anything speaking its protocol, such as ScyllaDB's
//! Alternator). The table layout is described in [dynamodb_schemas].
//!
//! [Storage]: crate::storage
//! [dynamodb_schemas]: crate::dynamodb_schemas
//!
//! There are no multi-item transactions here. Like & view counts live on the post items & are
//! adjusted with atomic `UpdateItem` expressions; the like & read records themselves are written
//! separately. A like is recorded (or removed) with a conditional write first, and the count moves
//! only if that write took effect, so racing toggles can't double-count. A crash between the two
//! leaves a count off by one, which we can live with.
//!
//! Usernames & post slugs are kept unique by conditional puts into `unique_usernames` &
//! `unique_slugs`, since DynamoDB can't enforce uniqueness on a secondary index.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, meta::region::RegionProviderChain};
use aws_sdk_dynamodb::{
    config::{Credentials as DynamoCredentials, http::HttpResponse},
    error::SdkError,
    operation::{
        delete_item::DeleteItemError, put_item::PutItemError, update_item::UpdateItemError,
    },
    types::{AttributeValue, ReturnValue},
};
use chrono::Utc;
use either::Either;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, from_items, to_attribute_value, to_item};
use snafu::{Backtrace, OptionExt, Snafu};
use tap::Pipe;
use tracing::debug;
use url::Url;

use inkpot_shared::{PostId, PostSlug, Tagname, UserId};

use crate::{
    entities::{Blog, Follow, Post, PostLike, PostRead, User},
    storage::{self, SlugTakenSnafu, UsernameTakenSnafu},
    util::Credentials,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Expected a numeric {attr} attribute in the UpdateItem output"))]
    BadCount { attr: String, backtrace: Backtrace },
    #[snafu(display("Gave up toggling {user}'s like of {post} after {attempts} attempts"))]
    LikeContention {
        user: UserId,
        post: PostId,
        attempts: usize,
        backtrace: Backtrace,
    },
    #[snafu(display("No endpoint URLs specified"))]
    NoEndpoints { backtrace: Backtrace },
    #[snafu(display("No post with id {id}"))]
    NoSuchPost { id: PostId, backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

type StorageResult<T> = std::result::Result<T, storage::Error>;

/// How many times to re-examine a like that keeps changing underneath us
const MAX_TOGGLE_ATTEMPTS: usize = 8;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                finding DynamoDB on the network                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Where to find DynamoDB: either an AWS region, or a list of endpoint URLs
///
/// In configuration this is either a string (`location = "us-west-2"`) or an array of URLs
/// (`location = ["http://localhost:8043"]`). On the command line, give a region or a
/// comma-separated list of URLs.
#[derive(Clone, Debug)]
pub struct Location(pub Either<String, Vec<Url>>);

impl Default for Location {
    fn default() -> Self {
        Location(Either::Left("us-west-2".to_owned()))
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Region(String),
            Endpoints(Vec<Url>),
        }
        Ok(Location(match Repr::deserialize(deserializer)? {
            Repr::Region(region) => Either::Left(region),
            Repr::Endpoints(urls) => Either::Right(urls),
        }))
    }
}

impl clap::builder::ValueParserFactory for Location {
    type Parser = LocationParser;

    fn value_parser() -> Self::Parser {
        LocationParser
    }
}

#[derive(Clone, Debug)]
pub struct LocationParser;

impl clap::builder::TypedValueParser for LocationParser {
    type Value = Location;

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> std::result::Result<Self::Value, clap::Error> {
        use clap::error::ErrorKind;
        let vals = value
            .to_str()
            .ok_or(clap::Error::new(ErrorKind::InvalidValue))?
            .split(',')
            .collect::<Vec<&str>>();
        match vals.iter().exactly_one() {
            Ok(s) => Ok(Location(match Url::parse(s) {
                Ok(url) => Either::Right(vec![url]),
                Err(_) => Either::Left(s.to_string()),
            })),
            Err(_) => vals
                .iter()
                .map(|s| Url::parse(s))
                .collect::<std::result::Result<Vec<Url>, _>>()
                .map_err(|_| clap::Error::new(ErrorKind::InvalidValue))?
                .pipe(|urls| Ok(Location(Either::Right(urls)))),
        }
    }
}

/// Build a raw DynamoDB client
pub async fn sdk_client(
    location: &Location,
    credentials: Option<&Credentials>,
) -> Result<::aws_sdk_dynamodb::Client> {
    let creds = credentials.map(|creds| {
        DynamoCredentials::new(creds.id(), creds.secret(), None, None, "inkpot")
    });

    let config = match &location.0 {
        Either::Left(region) => {
            let region_provider = RegionProviderChain::first_try(Some(Region::new(region.clone())))
                .or_default_provider()
                .or_else(Region::new("us-west-2"));
            let mut loader = aws_config::from_env().region(region_provider);
            if let Some(creds) = creds {
                loader = loader.credentials_provider(creds);
            }
            loader.load().await
        }
        Either::Right(endpoints) => {
            let ep_url = endpoints.first().context(NoEndpointsSnafu)?;
            let mut loader =
                aws_config::defaults(BehaviorVersion::latest()).endpoint_url(ep_url.as_str());
            if let Some(creds) = creds {
                loader = loader.credentials_provider(creds);
            }
            loader.load().await
        }
    };
    Ok(::aws_sdk_dynamodb::Client::new(&config))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Client                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn key(pairs: &[(&str, String)]) -> HashMap<String, AttributeValue> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), AttributeValue::S(value.clone())))
        .collect()
}

fn put_conflict(err: &SdkError<PutItemError, HttpResponse>) -> bool {
    match err {
        SdkError::ServiceError(inner) => {
            matches!(inner.err(), PutItemError::ConditionalCheckFailedException(_))
        }
        _ => false,
    }
}

fn delete_conflict(err: &SdkError<DeleteItemError, HttpResponse>) -> bool {
    match err {
        SdkError::ServiceError(inner) => {
            matches!(inner.err(), DeleteItemError::ConditionalCheckFailedException(_))
        }
        _ => false,
    }
}

fn update_conflict(err: &SdkError<UpdateItemError, HttpResponse>) -> bool {
    match err {
        SdkError::ServiceError(inner) => {
            matches!(inner.err(), UpdateItemError::ConditionalCheckFailedException(_))
        }
        _ => false,
    }
}

pub struct Client {
    client: ::aws_sdk_dynamodb::Client,
}

impl Client {
    pub async fn new(location: &Location, credentials: Option<&Credentials>) -> Result<Client> {
        Ok(Client {
            client: sdk_client(location, credentials).await?,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        pairs: &[(&str, String)],
    ) -> StorageResult<Option<T>> {
        self.client
            .get_item()
            .table_name(table)
            .set_key(Some(key(pairs)))
            .send()
            .await
            .map_err(storage::Error::new)?
            .item
            .map(|item| from_item(item).map_err(storage::Error::new))
            .transpose()
    }

    async fn put<T: serde::Serialize>(&self, table: &str, value: &T) -> StorageResult<()> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_item(value).map_err(storage::Error::new)?))
            .send()
            .await
            .map_err(storage::Error::new)?;
        Ok(())
    }

    /// Write `value` unless an item with the same key is already present (`key_attr` naming any
    /// attribute of the key); false means one was
    async fn put_new<T: serde::Serialize>(
        &self,
        table: &str,
        key_attr: &str,
        value: &T,
    ) -> StorageResult<bool> {
        match self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(to_item(value).map_err(storage::Error::new)?))
            .condition_expression("attribute_not_exists(#k)")
            .expression_attribute_names("#k", key_attr)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if put_conflict(&err) => Ok(false),
            Err(err) => Err(storage::Error::new(err)),
        }
    }

    /// Delete the item at `pairs` if it's there (`key_attr` naming any attribute of the key);
    /// false means it wasn't
    async fn delete_existing(
        &self,
        table: &str,
        key_attr: &str,
        pairs: &[(&str, String)],
    ) -> StorageResult<bool> {
        match self
            .client
            .delete_item()
            .table_name(table)
            .set_key(Some(key(pairs)))
            .condition_expression("attribute_exists(#k)")
            .expression_attribute_names("#k", key_attr)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if delete_conflict(&err) => Ok(false),
            Err(err) => Err(storage::Error::new(err)),
        }
    }

    /// Record `owner` as the holder of `value` in the uniqueness table `table`, whose key is
    /// `attr`; false means somebody else holds it. Claiming something one already holds succeeds.
    async fn claim(
        &self,
        table: &str,
        attr: &str,
        value: String,
        owner: String,
    ) -> StorageResult<bool> {
        match self
            .client
            .put_item()
            .table_name(table)
            .item(attr, AttributeValue::S(value))
            .item("id", AttributeValue::S(owner.clone()))
            .condition_expression("attribute_not_exists(#k) OR id = :owner")
            .expression_attribute_names("#k", attr)
            .expression_attribute_values(":owner", AttributeValue::S(owner))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if put_conflict(&err) => Ok(false),
            Err(err) => Err(storage::Error::new(err)),
        }
    }

    async fn delete(&self, table: &str, pairs: &[(&str, String)]) -> StorageResult<()> {
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(key(pairs)))
            .send()
            .await
            .map_err(storage::Error::new)?;
        Ok(())
    }

    /// All items in `table` (or `index`) whose `attr` is `value`, across all result pages
    async fn query<T: DeserializeOwned>(
        &self,
        table: &str,
        index: Option<&str>,
        attr: &str,
        value: String,
    ) -> StorageResult<Vec<T>> {
        let items = self
            .client
            .query()
            .table_name(table)
            .set_index_name(index.map(str::to_owned))
            .key_condition_expression("#k = :val")
            .expression_attribute_names("#k", attr)
            .expression_attribute_values(":val", AttributeValue::S(value))
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(storage::Error::new)?;
        from_items(items).map_err(storage::Error::new)
    }

    async fn scan<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: Option<(&str, &str, AttributeValue)>,
    ) -> StorageResult<Vec<T>> {
        let mut builder = self.client.scan().table_name(table);
        if let Some((attr, op, value)) = filter {
            builder = builder
                .filter_expression(format!("#f {} :val", op))
                .expression_attribute_names("#f", attr)
                .expression_attribute_values(":val", value);
        }
        let items = builder
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(storage::Error::new)?;
        from_items(items).map_err(storage::Error::new)
    }

    /// Atomically add `delta` to the counter `attr` on a post; None means there is no such post
    async fn bump(&self, post: &PostId, attr: &str, delta: i64) -> StorageResult<Option<u64>> {
        let out = match self
            .client
            .update_item()
            .table_name("posts")
            .key("id", AttributeValue::S(post.to_string()))
            .update_expression("SET #c = if_not_exists(#c, :zero) + :delta")
            .condition_expression("attribute_exists(id)")
            .expression_attribute_names("#c", attr)
            .expression_attribute_values(":zero", AttributeValue::N("0".to_owned()))
            .expression_attribute_values(":delta", AttributeValue::N(delta.to_string()))
            .return_values(ReturnValue::UpdatedNew)
            .send()
            .await
        {
            Ok(out) => out,
            Err(err) if update_conflict(&err) => return Ok(None),
            Err(err) => return Err(storage::Error::new(err)),
        };
        match out.attributes().and_then(|attrs| attrs.get(attr)) {
            Some(AttributeValue::N(n)) => n
                .parse::<i64>()
                .map(|n| Some(n.max(0) as u64))
                .map_err(|_| storage::Error::new(BadCountSnafu { attr }.build())),
            _ => Err(storage::Error::new(BadCountSnafu { attr }.build())),
        }
    }

    async fn bump_existing(&self, post: &PostId, attr: &str, delta: i64) -> StorageResult<u64> {
        self.bump(post, attr, delta)
            .await?
            .context(NoSuchPostSnafu { id: *post })
            .map_err(storage::Error::new)
    }

    async fn delete_post_and_children(&self, post: &Post) -> StorageResult<()> {
        let id = &post.id();
        for like in self
            .query::<PostLike>("likes", Some("likes_by_post"), "post_id", id.to_string())
            .await?
        {
            self.delete(
                "likes",
                &[("user_id", like.user_id.to_string()), ("post_id", id.to_string())],
            )
            .await?;
        }
        for read in self
            .query::<PostRead>("reads", Some("reads_by_post"), "post_id", id.to_string())
            .await?
        {
            self.delete(
                "reads",
                &[("user_id", read.user_id.to_string()), ("post_id", id.to_string())],
            )
            .await?;
        }
        self.delete("posts", &[("id", id.to_string())]).await?;
        self.delete("unique_slugs", &[("slug", post.slug().to_string())])
            .await
    }
}

fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|lhs, rhs| rhs.created_at().cmp(&lhs.created_at()));
    posts
}

#[async_trait]
impl storage::Backend for Client {
    async fn add_user(&self, user: &User) -> StorageResult<()> {
        if !self
            .claim(
                "unique_usernames",
                "username",
                user.username().to_string(),
                user.id().to_string(),
            )
            .await?
        {
            return UsernameTakenSnafu {
                username: user.username().clone(),
            }
            .fail();
        }
        self.put("users", user).await
    }

    async fn delete_user(&self, user: &User) -> StorageResult<()> {
        let id = user.id();
        for like in self.likes_for_user(&id).await? {
            self.delete(
                "likes",
                &[("user_id", id.to_string()), ("post_id", like.post_id.to_string())],
            )
            .await?;
            self.bump(&like.post_id, "likes", -1).await?;
        }
        for read in self.reads_for_user(&id).await? {
            self.delete(
                "reads",
                &[("user_id", id.to_string()), ("post_id", read.post_id.to_string())],
            )
            .await?;
        }
        for post in self
            .query::<Post>("posts", Some("posts_by_author"), "author_id", id.to_string())
            .await?
        {
            self.delete_post_and_children(&post).await?;
        }
        for follow in self
            .query::<Follow>("follows", None, "follower_id", id.to_string())
            .await?
            .into_iter()
            .chain(
                self.query::<Follow>(
                    "follows",
                    Some("follows_by_following"),
                    "following_id",
                    id.to_string(),
                )
                .await?,
            )
        {
            self.delete(
                "follows",
                &[
                    ("follower_id", follow.follower_id.to_string()),
                    ("following_id", follow.following_id.to_string()),
                ],
            )
            .await?;
        }
        self.delete("blogs", &[("owner_id", id.to_string())]).await?;
        self.delete("users", &[("id", id.to_string())]).await?;
        self.delete("unique_usernames", &[("username", user.username().to_string())])
            .await?;
        debug!("Removed user {} & all their stuff", user.username());
        Ok(())
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        self.scan("users", None).await
    }

    async fn update_user(&self, user: &User) -> StorageResult<()> {
        self.put("users", user).await
    }

    async fn user_for_id(&self, id: &UserId) -> StorageResult<Option<User>> {
        self.get("users", &[("id", id.to_string())]).await
    }

    async fn user_for_name(&self, name: &str) -> StorageResult<Option<User>> {
        self.query::<User>("users", Some("users_by_username"), "username", name.to_owned())
            .await?
            .into_iter()
            .at_most_one()
            .map_err(storage::Error::new)
    }

    async fn add_blog(&self, blog: &Blog) -> StorageResult<()> {
        self.put("blogs", blog).await
    }

    async fn blog_for_owner(&self, owner: &UserId) -> StorageResult<Option<Blog>> {
        self.get("blogs", &[("owner_id", owner.to_string())]).await
    }

    async fn update_blog(&self, blog: &Blog) -> StorageResult<()> {
        self.put("blogs", blog).await
    }

    async fn add_post(&self, post: &Post) -> StorageResult<()> {
        if !self
            .claim(
                "unique_slugs",
                "slug",
                post.slug().to_string(),
                post.id().to_string(),
            )
            .await?
        {
            return SlugTakenSnafu {
                slug: post.slug().clone(),
            }
            .fail();
        }
        self.put("posts", post).await
    }

    async fn delete_post(&self, post: &Post) -> StorageResult<()> {
        self.delete_post_and_children(post).await
    }

    async fn post_by_id(&self, id: &PostId) -> StorageResult<Option<Post>> {
        self.get("posts", &[("id", id.to_string())]).await
    }

    async fn post_by_slug(&self, slug: &PostSlug) -> StorageResult<Option<Post>> {
        self.query::<Post>("posts", Some("posts_by_slug"), "slug", slug.to_string())
            .await?
            .into_iter()
            .at_most_one()
            .map_err(storage::Error::new)
    }

    async fn posts_for_author(
        &self,
        author: &UserId,
        include_drafts: bool,
        tag: Option<&Tagname>,
    ) -> StorageResult<Vec<Post>> {
        self.query::<Post>("posts", Some("posts_by_author"), "author_id", author.to_string())
            .await?
            .into_iter()
            .filter(|post| include_drafts || post.is_published())
            .filter(|post| tag.is_none_or(|tag| post.tags().contains(tag)))
            .collect::<Vec<Post>>()
            .pipe(newest_first)
            .pipe(Ok)
    }

    async fn published_posts(&self) -> StorageResult<Vec<Post>> {
        self.scan::<Post>(
            "posts",
            Some(("status", "=", AttributeValue::S("published".to_owned()))),
        )
        .await?
        .pipe(newest_first)
        .pipe(Ok)
    }

    async fn slug_exists(
        &self,
        slug: &PostSlug,
        excluding: Option<&PostId>,
    ) -> StorageResult<bool> {
        Ok(self
            .query::<Post>("posts", Some("posts_by_slug"), "slug", slug.to_string())
            .await?
            .iter()
            .any(|post| Some(&post.id()) != excluding))
    }

    async fn update_post(&self, post: &Post) -> StorageResult<()> {
        let old_slug = self
            .post_by_id(&post.id())
            .await?
            .context(NoSuchPostSnafu { id: post.id() })
            .map_err(storage::Error::new)?
            .slug()
            .clone();
        let retitled = old_slug != *post.slug();
        if retitled
            && !self
                .claim(
                    "unique_slugs",
                    "slug",
                    post.slug().to_string(),
                    post.id().to_string(),
                )
                .await?
        {
            return SlugTakenSnafu {
                slug: post.slug().clone(),
            }
            .fail();
        }
        let status = to_attribute_value(post.status()).map_err(storage::Error::new)?;
        let tags = to_attribute_value(post.tags()).map_err(storage::Error::new)?;
        let updated_at = to_attribute_value(post.updated_at()).map_err(storage::Error::new)?;
        self.client
            .update_item()
            .table_name("posts")
            .key("id", AttributeValue::S(post.id().to_string()))
            .update_expression(
                "SET title = :title, slug = :slug, content = :content, #status = :status, \
                 tags = :tags, updated_at = :updated_at",
            )
            .condition_expression("attribute_exists(id)")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":title", AttributeValue::S(post.title().to_owned()))
            .expression_attribute_values(":slug", AttributeValue::S(post.slug().to_string()))
            .expression_attribute_values(":content", AttributeValue::S(post.content().to_owned()))
            .expression_attribute_values(":status", status)
            .expression_attribute_values(":tags", tags)
            .expression_attribute_values(":updated_at", updated_at)
            .send()
            .await
            .map_err(storage::Error::new)?;
        if retitled {
            self.delete("unique_slugs", &[("slug", old_slug.to_string())])
                .await?;
        }
        Ok(())
    }

    async fn has_liked(&self, user: &UserId, post: &PostId) -> StorageResult<bool> {
        Ok(self
            .get::<PostLike>(
                "likes",
                &[("user_id", user.to_string()), ("post_id", post.to_string())],
            )
            .await?
            .is_some())
    }

    async fn likes_for_user(&self, user: &UserId) -> StorageResult<Vec<PostLike>> {
        let mut likes = self
            .query::<PostLike>("likes", None, "user_id", user.to_string())
            .await?;
        likes.sort_by(|lhs, rhs| rhs.created_at.cmp(&lhs.created_at));
        Ok(likes)
    }

    async fn toggle_like(&self, user: &UserId, post: &PostId) -> StorageResult<(bool, u64)> {
        let pairs = [("user_id", user.to_string()), ("post_id", post.to_string())];
        // The count only moves once the like record has actually changed; if another request
        // toggled the same like between our look & our write, look again.
        for _ in 0..MAX_TOGGLE_ATTEMPTS {
            if self.has_liked(user, post).await? {
                if self.delete_existing("likes", "user_id", &pairs).await? {
                    return Ok((false, self.bump_existing(post, "likes", -1).await?));
                }
            } else {
                if self.post_by_id(post).await?.is_none() {
                    return Err(storage::Error::new(NoSuchPostSnafu { id: *post }.build()));
                }
                if self
                    .put_new("likes", "user_id", &PostLike::new(*user, *post))
                    .await?
                {
                    return Ok((true, self.bump_existing(post, "likes", 1).await?));
                }
            }
            debug!("{}'s like of {} changed underneath us; retrying", user, post);
        }
        Err(storage::Error::new(
            LikeContentionSnafu {
                user: *user,
                post: *post,
                attempts: MAX_TOGGLE_ATTEMPTS,
            }
            .build(),
        ))
    }

    async fn has_read(&self, user: &UserId, post: &PostId) -> StorageResult<bool> {
        Ok(self
            .get::<PostRead>(
                "reads",
                &[("user_id", user.to_string()), ("post_id", post.to_string())],
            )
            .await?
            .is_some())
    }

    async fn increment_views(&self, post: &PostId) -> StorageResult<u64> {
        self.bump_existing(post, "views", 1).await
    }

    async fn reads_for_user(&self, user: &UserId) -> StorageResult<Vec<PostRead>> {
        let mut reads = self
            .query::<PostRead>("reads", None, "user_id", user.to_string())
            .await?;
        reads.sort_by(|lhs, rhs| rhs.updated_at.cmp(&lhs.updated_at));
        Ok(reads)
    }

    async fn record_read(&self, user: &UserId, post: &PostId) -> StorageResult<u64> {
        let views = self.bump_existing(post, "views", 1).await?;
        let now = to_attribute_value(Utc::now()).map_err(storage::Error::new)?;
        self.client
            .update_item()
            .table_name("reads")
            .set_key(Some(key(&[
                ("user_id", user.to_string()),
                ("post_id", post.to_string()),
            ])))
            .update_expression(
                "SET updated_at = :now, created_at = if_not_exists(created_at, :now)",
            )
            .expression_attribute_values(":now", now)
            .send()
            .await
            .map_err(storage::Error::new)?;
        Ok(views)
    }

    async fn followers_count(&self, user: &UserId) -> StorageResult<u64> {
        Ok(self
            .query::<Follow>(
                "follows",
                Some("follows_by_following"),
                "following_id",
                user.to_string(),
            )
            .await?
            .len() as u64)
    }

    async fn following(&self, user: &UserId) -> StorageResult<Vec<UserId>> {
        Ok(self
            .query::<Follow>("follows", None, "follower_id", user.to_string())
            .await?
            .into_iter()
            .map(|follow| follow.following_id)
            .collect())
    }

    async fn is_following(&self, follower: &UserId, following: &UserId) -> StorageResult<bool> {
        Ok(self
            .get::<Follow>(
                "follows",
                &[
                    ("follower_id", follower.to_string()),
                    ("following_id", following.to_string()),
                ],
            )
            .await?
            .is_some())
    }

    async fn toggle_follow(&self, follower: &UserId, following: &UserId) -> StorageResult<bool> {
        if self.is_following(follower, following).await? {
            self.delete(
                "follows",
                &[
                    ("follower_id", follower.to_string()),
                    ("following_id", following.to_string()),
                ],
            )
            .await?;
            Ok(false)
        } else {
            self.put("follows", &Follow::new(*follower, *following))
                .await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn locations() {
        #[derive(Deserialize)]
        struct Holder {
            location: Location,
        }
        let holder: Holder = toml::from_str(r#"location = "us-east-1""#).unwrap();
        assert!(matches!(holder.location.0, Either::Left(ref r) if r == "us-east-1"));
        let holder: Holder =
            toml::from_str(r#"location = ["http://localhost:8043", "http://localhost:8044"]"#)
                .unwrap();
        assert!(matches!(holder.location.0, Either::Right(ref urls) if urls.len() == 2));

        use clap::builder::TypedValueParser;
        let cmd = clap::Command::new("test");
        let loc = LocationParser
            .parse_ref(&cmd, None, std::ffi::OsStr::new("http://localhost:8043"))
            .unwrap();
        assert!(matches!(loc.0, Either::Right(ref urls) if urls.len() == 1));
        let loc = LocationParser
            .parse_ref(&cmd, None, std::ffi::OsStr::new("eu-west-1"))
            .unwrap();
        assert!(matches!(loc.0, Either::Left(_)));
        assert!(
            LocationParser
                .parse_ref(&cmd, None, std::ffi::OsStr::new("http://a:1,not a url"))
                .is_err()
        );
    }

    /// The DynamoDB named by `INKPOT_TEST_DYNAMODB` (a region, or endpoint URLs), which must
    /// already carry the inkpot schema; credentials, if needed, go in `INKPOT_TEST_DYNAMODB_CREDS`
    /// as "key-id,secret"
    async fn live_storage() -> storage::contract::Storage {
        use clap::builder::TypedValueParser;
        let cmd = clap::Command::new("test");
        let location = std::env::var("INKPOT_TEST_DYNAMODB").unwrap();
        let location = LocationParser
            .parse_ref(&cmd, None, std::ffi::OsStr::new(&location))
            .unwrap();
        let creds = std::env::var("INKPOT_TEST_DYNAMODB_CREDS").ok().map(|creds| {
            crate::util::CredentialsParser
                .parse_ref(&cmd, None, std::ffi::OsStr::new(&creds))
                .unwrap()
        });
        std::sync::Arc::new(Client::new(&location, creds.as_ref()).await.unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs a live DynamoDB; set INKPOT_TEST_DYNAMODB"]
    async fn concurrent_like_toggles() {
        storage::contract::concurrent_like_toggles(live_storage().await).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs a live DynamoDB; set INKPOT_TEST_DYNAMODB"]
    async fn concurrent_reads() {
        storage::contract::concurrent_reads(live_storage().await).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs a live DynamoDB; set INKPOT_TEST_DYNAMODB"]
    async fn slug_races() {
        storage::contract::slug_races(live_storage().await).await;
    }

    #[test]
    fn keys() {
        let k = key(&[("user_id", "a".to_owned()), ("post_id", "b".to_owned())]);
        assert_eq!(k.len(), 2);
        assert_eq!(k.get("post_id"), Some(&AttributeValue::S("b".to_owned())));
    }
}
