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

//! # DynamoDB Schema Management
//!
//! | table              | partition key | sort key       | global secondary indexes          |
//! |--------------------|---------------|----------------|-----------------------------------|
//! | `users`            | `id`          |                | `users_by_username` (`username`)  |
//! | `unique_usernames` | `username`    |                |                                   |
//! | `unique_slugs`     | `slug`        |                |                                   |
//! | `blogs`            | `owner_id`    |                |                                   |
//! | `posts`            | `id`          |                | `posts_by_slug` (`slug`),         |
//! |                    |               |                | `posts_by_author` (`author_id`)   |
//! | `likes`            | `user_id`     | `post_id`      | `likes_by_post` (`post_id`)       |
//! | `reads`            | `user_id`     | `post_id`      | `reads_by_post` (`post_id`)       |
//! | `follows`          | `follower_id` | `following_id` | `follows_by_following`            |
//! | `schema_migrations`| `version`     |                |                                   |

use aws_sdk_dynamodb::{
    Client,
    config::http::HttpResponse,
    error::SdkError,
    operation::{create_table::CreateTableError, put_item::PutItemError},
    types::{
        AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex, KeySchemaElement,
        KeyType, Projection, ProjectionType, ScalarAttributeType,
    },
};
use chrono::Utc;
use snafu::{Backtrace, ResultExt, Snafu};
use tracing::info;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module Error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to create table {table}: {source}"))]
    CreateTable {
        table: String,
        #[snafu(source(from(SdkError<CreateTableError, HttpResponse>, Box::new)))]
        source: Box<SdkError<CreateTableError, HttpResponse>>,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to build {name}: {source}"))]
    GenericBuildFailure {
        name: String,
        source: aws_sdk_dynamodb::error::BuildError,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to write the schema version to the database: {source}"))]
    SchemaVersion {
        #[snafu(source(from(SdkError<PutItemError, HttpResponse>, Box::new)))]
        source: Box<SdkError<PutItemError, HttpResponse>>,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The schema version written by [create_schema]
pub const SCHEMA_VERSION: u32 = 0;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         initial schema                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

macro_rules! table_attr {
    ($col_name:expr, $ty:ident) => {
        AttributeDefinition::builder()
            .attribute_name($col_name)
            .attribute_type(ScalarAttributeType::$ty)
            .build()
            .context(GenericBuildFailureSnafu {
                name: $col_name.to_string(),
            })?
    };
}

macro_rules! key_elem {
    ($col_name:expr, $key_type:ident) => {
        KeySchemaElement::builder()
            .attribute_name($col_name)
            .key_type(KeyType::$key_type)
            .build()
            .context(GenericBuildFailureSnafu {
                name: $col_name.to_string(),
            })?
    };
}

/// A global secondary index keyed on the single attribute `col_name`, projecting everything
fn gsi(index_name: &str, col_name: &str) -> Result<GlobalSecondaryIndex> {
    GlobalSecondaryIndex::builder()
        .index_name(index_name)
        .key_schema(key_elem!(col_name, Hash))
        .projection(
            Projection::builder()
                .projection_type(ProjectionType::All)
                .build(),
        )
        .build()
        .context(GenericBuildFailureSnafu {
            name: index_name.to_string(),
        })
}

/// Create a single table
///
/// `attrs` must name every attribute appearing in a key, whether of the table or of an index.
async fn create_table(
    client: &Client,
    name: &str,
    attrs: Vec<AttributeDefinition>,
    keys: Vec<KeySchemaElement>,
    indexes: Vec<GlobalSecondaryIndex>,
) -> Result<()> {
    let indexes = if indexes.is_empty() {
        None
    } else {
        Some(indexes)
    };
    client
        .create_table()
        .table_name(name)
        .billing_mode(BillingMode::PayPerRequest)
        .set_attribute_definitions(Some(attrs))
        .set_key_schema(Some(keys))
        .set_global_secondary_indexes(indexes)
        .send()
        .await
        .context(CreateTableSnafu {
            table: name.to_string(),
        })?;
    info!("Created table {}", name);
    Ok(())
}

async fn create_users(client: &Client) -> Result<()> {
    create_table(
        client,
        "users",
        vec![table_attr!("id", S), table_attr!("username", S)],
        vec![key_elem!("id", Hash)],
        vec![gsi("users_by_username", "username")?],
    )
    .await?;
    // Conditional puts against this table are how we guarantee username uniqueness; DynamoDB
    // can't enforce uniqueness on a GSI
    create_table(
        client,
        "unique_usernames",
        vec![table_attr!("username", S)],
        vec![key_elem!("username", Hash)],
        vec![],
    )
    .await
}

async fn create_blogs(client: &Client) -> Result<()> {
    create_table(
        client,
        "blogs",
        vec![table_attr!("owner_id", S)],
        vec![key_elem!("owner_id", Hash)],
        vec![],
    )
    .await
}

async fn create_posts(client: &Client) -> Result<()> {
    create_table(
        client,
        "posts",
        vec![
            table_attr!("id", S),
            table_attr!("slug", S),
            table_attr!("author_id", S),
        ],
        vec![key_elem!("id", Hash)],
        vec![
            gsi("posts_by_slug", "slug")?,
            gsi("posts_by_author", "author_id")?,
        ],
    )
    .await
}

/// Likes & reads share a shape: (user, post) pairs, reachable from either side
async fn create_unique_slugs(client: &Client) -> Result<()> {
    // As with usernames, slug uniqueness rests on conditional puts here
    create_table(
        client,
        "unique_slugs",
        vec![table_attr!("slug", S)],
        vec![key_elem!("slug", Hash)],
        vec![],
    )
    .await
}

async fn create_user_post_table(client: &Client, name: &str) -> Result<()> {
    create_table(
        client,
        name,
        vec![table_attr!("user_id", S), table_attr!("post_id", S)],
        vec![key_elem!("user_id", Hash), key_elem!("post_id", Range)],
        vec![gsi(&format!("{}_by_post", name), "post_id")?],
    )
    .await
}

async fn create_follows(client: &Client) -> Result<()> {
    create_table(
        client,
        "follows",
        vec![
            table_attr!("follower_id", S),
            table_attr!("following_id", S),
        ],
        vec![
            key_elem!("follower_id", Hash),
            key_elem!("following_id", Range),
        ],
        vec![gsi("follows_by_following", "following_id")?],
    )
    .await
}

async fn create_schema_migrations(client: &Client) -> Result<()> {
    create_table(
        client,
        "schema_migrations",
        vec![table_attr!("version", N)],
        vec![key_elem!("version", Hash)],
        vec![],
    )
    .await
}

async fn create_tables(client: &Client) -> Result<()> {
    create_users(client).await?;
    create_blogs(client).await?;
    create_posts(client).await?;
    create_unique_slugs(client).await?;
    create_user_post_table(client, "likes").await?;
    create_user_post_table(client, "reads").await?;
    create_follows(client).await?;
    create_schema_migrations(client).await?;
    Ok(())
}

/// Create every table inkpot needs & record the schema version
pub async fn create_schema(client: Client) -> Result<()> {
    create_tables(&client).await?;

    client
        .put_item()
        .table_name("schema_migrations")
        .item(
            "version".to_owned(),
            AttributeValue::N(SCHEMA_VERSION.to_string()),
        )
        .item(
            "applied".to_owned(),
            AttributeValue::S(format!("{}", Utc::now().timestamp())),
        )
        .send()
        .await
        .context(SchemaVersionSnafu)
        .map(|_| ())
}
