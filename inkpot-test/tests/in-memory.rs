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

//! # The in-memory Integration Tests
//!
//! The fixture here is an inkpot instance running in this process, over in-memory storage, with
//! media written to a temporary directory. It listens on an ephemeral port on localhost & is
//! driven over HTTP just as `inkpotd` would be.

use std::{num::NonZeroUsize, sync::Arc, thread};

use libtest_mimic::{Arguments, Trial};
use snafu::{Backtrace, prelude::*};
use tokio::sync::{Mutex, oneshot};
use url::Url;

use inkpot::{
    counters::CounterCache,
    http::make_router,
    images::LocalStore,
    inkpot::Inkpot,
    memory,
    metrics::{Instruments, check_metric_registrations},
    peppers::Peppers,
    signing_keys::SigningKeys,
};

use common::{Test, block_on};

mod common;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Failed to bind a local port: {source}"))]
    Bind {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("The server thread exited before it started listening"))]
    Startup { backtrace: Backtrace },
    #[snafu(display("Failed to create a temporary directory: {source}"))]
    TempDir { source: std::io::Error },
}

type Result<T> = std::result::Result<T, Error>;

/// Spin-up inkpot on its own thread (with its own runtime); return the URL at which it's listening
fn serve(media_root: std::path::PathBuf) -> Result<Url> {
    let (tx, rx) = oneshot::channel::<std::io::Result<Url>>();
    thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(err) => {
                let _ = tx.send(Err(err));
                return;
            }
        };
        rt.block_on(async move {
            let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
                Ok(listener) => listener,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return;
                }
            };
            let addr = listener.local_addr().unwrap();
            let origin = Url::parse(&format!("http://{}", addr)).unwrap();
            let state = Arc::new(Inkpot {
                origin: origin.clone(),
                storage: Arc::new(memory::Storage::new()),
                instruments: Arc::new(Instruments::new("inkpot").unwrap()),
                pepper: Peppers::default(),
                token_lifetime: chrono::Duration::minutes(10),
                signing_keys: SigningKeys::default(),
                counters: Mutex::new(CounterCache::new(
                    NonZeroUsize::new(256).unwrap(),
                    std::time::Duration::from_secs(1),
                    std::time::Duration::from_secs(1),
                )),
                media: Arc::new(LocalStore::new(
                    media_root.clone(),
                    origin.join("/media/").unwrap(),
                )),
                blog_page_size: 10,
                discovery_page_size: 9,
            });
            let _ = tx.send(Ok(origin));
            axum::serve(
                listener,
                make_router(state, Some(media_root), 1024 * 1024),
            )
            .await
            .unwrap();
        });
    });
    rx.blocking_recv()
        .map_err(|_| StartupSnafu.build())?
        .context(BindSnafu)
}

fn test_healthcheck(url: Url) -> std::result::Result<(), libtest_mimic::Failed> {
    block_on(inkpot_test::test_healthcheck(url))
}

inventory::submit!(Test {
    name: "000test_healthcheck",
    test_fn: test_healthcheck,
});

inventory::submit!(Test {
    name: "001test_metrics",
    test_fn: |url| block_on(inkpot_test::test_metrics(url)),
});

inventory::submit!(Test {
    name: "010test_signup",
    test_fn: |url| block_on(inkpot_test::users::test_signup(url)),
});

inventory::submit!(Test {
    name: "011test_profile",
    test_fn: |url| block_on(inkpot_test::users::test_profile(url)),
});

inventory::submit!(Test {
    name: "012test_follow",
    test_fn: |url| block_on(inkpot_test::users::test_follow(url)),
});

inventory::submit!(Test {
    name: "020test_authoring",
    test_fn: |url| block_on(inkpot_test::blogs::test_authoring(url)),
});

inventory::submit!(Test {
    name: "021test_reading",
    test_fn: |url| block_on(inkpot_test::blogs::test_reading(url)),
});

inventory::submit!(Test {
    name: "022test_image_upload",
    test_fn: |url| block_on(inkpot_test::blogs::test_image_upload(url)),
});

inventory::submit!(Test {
    name: "030test_feeds",
    test_fn: |url| block_on(inkpot_test::discovery::test_feeds(url)),
});

fn main() -> Result<()> {
    let args = Arguments::from_args();

    check_metric_registrations().unwrap();
    let media = tempfile::tempdir().context(TempDirSnafu)?;
    let url = serve(media.path().to_owned())?;

    let conclusion = libtest_mimic::run(
        &args,
        inventory::iter::<Test>
            .into_iter()
            .map(|test| {
                let url = url.clone();
                let test_fn = test.test_fn;
                Trial::test(test.name, move || test_fn(url))
            })
            .collect(),
    );

    drop(media);
    conclusion.exit();
}
