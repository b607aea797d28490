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

//! # images
//!
//! Uploaded images (illustrations for posts & profile pictures) are written to an object store,
//! under keys of our choosing, & handed back to the client as URLs. Two implementations:
//!
//! - [S3Store]: any S3-compatible store (AWS S3 proper, MinIO, Ceph...)
//! - [LocalStore]: a directory on the local filesystem; `inkpotd` serves it under `/media`
//!
//! Keys are always generated by inkpot, never taken from the client.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use axum::extract::{Multipart, multipart::MultipartError};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{config::Credentials as S3Credentials, primitives::ByteStream};
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use snafu::{Backtrace, prelude::*};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::util::Credentials;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to form an URL for {key} against {base}: {source}"))]
    BadUrl {
        key: String,
        base: Url,
        source: url::ParseError,
        backtrace: Backtrace,
    },
    #[snafu(display("{key} is not a legal object key"))]
    BadKey { key: String, backtrace: Backtrace },
    #[snafu(display("Failed to create directory {pth:?}: {source}"))]
    CreateDir {
        pth: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to remove {pth:?}: {source}"))]
    Remove {
        pth: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("S3 request for {key} failed: {source}"))]
    S3 {
        key: String,
        #[snafu(source(from(aws_sdk_s3::Error, Box::new)))]
        source: Box<aws_sdk_s3::Error>,
    },
    #[snafu(display("Failed to write {pth:?}: {source}"))]
    Write {
        pth: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Somewhere to put uploaded images
#[async_trait]
pub trait ObjectStore {
    /// Write `bytes` under `key`; return the URL at which the object can be retrieved
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<Url>;
    /// Remove the object at `key`; removing a non-existent object is not an error
    async fn delete(&self, key: &str) -> Result<()>;
    /// The URL at which the object named by `key` may be retrieved
    fn url(&self, key: &str) -> Result<Url>;
}

/// Media configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaConfig {
    S3 {
        bucket: String,
        /// Region; defaults to us-east-1
        region: Option<String>,
        /// Endpoint for S3-compatible stores other than AWS
        endpoint: Option<Url>,
        credentials: Option<Credentials>,
        /// Public URL corresponding to the root of the bucket
        #[serde(rename = "url-base")]
        url_base: Url,
    },
    Local {
        root: PathBuf,
        /// Public URL corresponding to `root`
        #[serde(rename = "url-base")]
        url_base: Url,
    },
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig::Local {
            root: PathBuf::from("/var/lib/inkpot/media"),
            url_base: Url::parse("http://localhost:20679/media/").unwrap(/* known good */),
        }
    }
}

fn join_url(base: &Url, key: &str) -> Result<Url> {
    // `Url::join` replaces the last path segment unless the base ends in a slash
    let base = if base.path().ends_with('/') {
        base.clone()
    } else {
        let mut base = base.clone();
        base.set_path(&format!("{}/", base.path()));
        base
    };
    base.join(key).context(BadUrlSnafu {
        key: key.to_owned(),
        base: base.clone(),
    })
}

/// The key for an image embedded in a post: `blog/posts/images/{YYYY}/{MM}/{uuid}.{ext}`
pub fn post_image_key(now: &DateTime<Utc>, ext: &str) -> String {
    format!(
        "blog/posts/images/{:04}/{:02}/{}.{}",
        now.year(),
        now.month(),
        Uuid::new_v4(),
        ext
    )
}

/// The key for a profile picture: `profile_images/{uuid}.{ext}`
pub fn profile_image_key(ext: &str) -> String {
    format!("profile_images/{}.{}", Uuid::new_v4(), ext)
}

/// Choose a file extension for an upload, preferring the one on the client-supplied filename &
/// falling back to the MIME subtype
pub fn extension_for(filename: Option<&str>, content_type: &str) -> String {
    filename
        .and_then(|f| Path::new(f).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| {
            match content_type
                .split_once('/')
                .map(|(_, sub)| sub.split(['+', ';']).next().unwrap_or(sub))
            {
                Some("jpeg") => "jpg".to_owned(),
                Some(sub) if !sub.is_empty() => sub.to_ascii_lowercase(),
                _ => "bin".to_owned(),
            }
        })
}

/// A file uploaded in a `multipart/form-data` request body
#[derive(Clone, Debug)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
    pub fn extension(&self) -> String {
        extension_for(self.filename.as_deref(), &self.content_type)
    }
}

/// Pull the first file named by any of `names` out of a multipart body; an empty field (which is
/// what browsers send when no file was chosen) counts as no file at all.
pub async fn next_upload(
    multipart: &mut Multipart,
    names: &[&str],
) -> std::result::Result<Option<Upload>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if !field.name().is_some_and(|name| names.contains(&name)) {
            continue;
        }
        let filename = field.file_name().map(str::to_owned);
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let bytes = field.bytes().await?.to_vec();
        if bytes.is_empty() {
            continue;
        }
        return Ok(Some(Upload {
            filename,
            content_type,
            bytes,
        }));
    }
    Ok(None)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           LocalStore                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Objects as files beneath a root directory
pub struct LocalStore {
    root: PathBuf,
    url_base: Url,
}

impl LocalStore {
    pub fn new(root: PathBuf, url_base: Url) -> LocalStore {
        LocalStore { root, url_base }
    }
    pub fn root(&self) -> &Path {
        &self.root
    }
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        ensure!(
            !key.is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_))),
            BadKeySnafu {
                key: key.to_owned()
            }
        );
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<Url> {
        let pth = self.path_for(key)?;
        if let Some(parent) = pth.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(CreateDirSnafu {
                    pth: parent.to_owned(),
                })?;
        }
        tokio::fs::write(&pth, bytes)
            .await
            .context(WriteSnafu { pth: pth.clone() })?;
        debug!("Wrote {:?}", pth);
        self.url(key)
    }
    async fn delete(&self, key: &str) -> Result<()> {
        let pth = self.path_for(key)?;
        match tokio::fs::remove_file(&pth).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context(RemoveSnafu { pth }),
        }
    }
    fn url(&self, key: &str) -> Result<Url> {
        join_url(&self.url_base, key)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            S3Store                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Objects in an S3 bucket
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    url_base: Url,
}

impl S3Store {
    pub async fn new(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&Url>,
        credentials: Option<&Credentials>,
        url_base: Url,
    ) -> S3Store {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.unwrap_or("us-east-1").to_owned()));
        if let Some(creds) = credentials {
            loader = loader.credentials_provider(S3Credentials::new(
                creds.id(),
                creds.secret(),
                None,
                None,
                "inkpot",
            ));
        }
        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(true);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint.as_str());
        }
        S3Store {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: bucket.to_owned(),
            url_base,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<Url> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)
            .context(S3Snafu {
                key: key.to_owned(),
            })?;
        self.url(key)
    }
    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)
            .context(S3Snafu {
                key: key.to_owned(),
            })?;
        Ok(())
    }
    fn url(&self, key: &str) -> Result<Url> {
        join_url(&self.url_base, key)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keys() {
        let now = DateTime::parse_from_rfc3339("2025-03-07T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let key = post_image_key(&now, "png");
        assert!(key.starts_with("blog/posts/images/2025/03/"));
        assert!(key.ends_with(".png"));
        assert!(profile_image_key("jpg").starts_with("profile_images/"));
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for(Some("cat.PNG"), "image/png"), "png");
        assert_eq!(extension_for(Some("cat"), "image/jpeg"), "jpg");
        assert_eq!(extension_for(None, "image/svg+xml"), "svg");
        assert_eq!(extension_for(Some("../x."), "image/gif"), "gif");
    }

    #[tokio::test]
    async fn local_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(
            dir.path().to_owned(),
            Url::parse("http://localhost:20679/media").unwrap(),
        );
        let url = store
            .put("profile_images/abc.png", b"not really a png".to_vec(), "image/png")
            .await
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:20679/media/profile_images/abc.png"
        );
        assert!(dir.path().join("profile_images/abc.png").exists());
        store.delete("profile_images/abc.png").await.unwrap();
        assert!(!dir.path().join("profile_images/abc.png").exists());
        // Deleting twice is fine
        store.delete("profile_images/abc.png").await.unwrap();
        assert!(store.put("../escape", vec![], "image/png").await.is_err());
    }
}
