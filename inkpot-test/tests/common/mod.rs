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

use std::future::Future;

use libtest_mimic::Failed;
use url::Url;

/// One integration test; `test_fn` is handed the base URL of the inkpot instance under test
#[derive(Debug)]
pub struct Test {
    pub name: &'static str,
    pub test_fn: fn(url: Url) -> Result<(), Failed>,
}

inventory::collect!(Test);

/// Trials run on libtest-mimic's worker threads, outside any async runtime; give each its own
pub fn block_on<F: Future<Output = Result<(), Failed>>>(f: F) -> Result<(), Failed> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(f)
}
