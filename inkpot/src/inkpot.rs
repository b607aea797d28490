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

//! # inkpot application state

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use url::Url;

use crate::{
    counters::CounterCache, images::ObjectStore, metrics::Instruments, peppers::Peppers,
    signing_keys::SigningKeys, storage::Backend as StorageBackend,
};

/// State shared by every request handler
pub struct Inkpot {
    /// The origin at which this instance is reachable from the public internet
    pub origin: Url,
    pub storage: Arc<dyn StorageBackend + Send + Sync>,
    pub instruments: Arc<Instruments>,
    pub pepper: Peppers,
    pub token_lifetime: Duration,
    pub signing_keys: SigningKeys,
    pub counters: Mutex<CounterCache>,
    pub media: Arc<dyn ObjectStore + Send + Sync>,
    pub blog_page_size: usize,
    pub discovery_page_size: usize,
}

impl Inkpot {
    /// The host portion of our public origin; tokens are issued by, & for, this host
    pub fn host(&self) -> &str {
        self.origin.host_str().unwrap_or("localhost")
    }
}

#[cfg(test)]
pub mod test_support {
    //! Shared fixtures for the router-level tests

    use std::num::NonZeroUsize;

    use secrecy::SecretString;

    use inkpot_shared::{UserEmail, Username};

    use super::*;
    use crate::{
        entities::{Blog, User},
        images::LocalStore,
        memory,
    };

    pub const PASSWORD: &str = "correct horse battery staple";

    /// An [Inkpot] over an empty in-memory store, writing media beneath `media_root`
    pub fn state(media_root: &std::path::Path) -> Arc<Inkpot> {
        state_over(media_root, Arc::new(memory::Storage::new()))
    }

    /// An [Inkpot] over `storage`, for tests that need to get at the store directly
    pub fn state_over(
        media_root: &std::path::Path,
        storage: Arc<memory::Storage>,
    ) -> Arc<Inkpot> {
        Arc::new(Inkpot {
            origin: Url::parse("http://inkpot.example.com").unwrap(),
            storage,
            instruments: Arc::new(Instruments::new("inkpot").unwrap()),
            pepper: Peppers::default(),
            token_lifetime: Duration::minutes(5),
            signing_keys: SigningKeys::default(),
            counters: Mutex::new(CounterCache::new(
                NonZeroUsize::new(64).unwrap(),
                std::time::Duration::from_secs(300),
                std::time::Duration::from_secs(300),
            )),
            media: Arc::new(LocalStore::new(
                media_root.to_owned(),
                Url::parse("http://inkpot.example.com/media/").unwrap(),
            )),
            blog_page_size: 10,
            discovery_page_size: 9,
        })
    }

    /// Create a user (& their blog) directly in storage
    pub async fn add_user(state: &Inkpot, name: &str) -> User {
        let (version, pepper) = state.pepper.current_pepper().unwrap();
        let user = User::new(
            &version,
            &pepper,
            &Username::new(name).unwrap(),
            &SecretString::from(PASSWORD.to_owned()),
            &UserEmail::new(&format!("{}@example.com", name)).unwrap(),
        )
        .unwrap();
        state.storage.add_user(&user).await.unwrap();
        state.storage.add_blog(&Blog::new(&user)).await.unwrap();
        user
    }

    /// A value for the Authorization header authenticating `name` by password
    pub fn basic_auth(name: &str) -> String {
        use base64::{Engine, prelude::BASE64_STANDARD};
        format!(
            "Basic {}",
            BASE64_STANDARD.encode(format!("{}:{}", name, PASSWORD))
        )
    }
}
