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

//! # inkpot
//!
//! A multi-user blogging service. The library crate holds everything; `inkpotd` & `inkpot-admin`
//! are thin wrappers around it.
pub mod authn;
pub mod blogs;
pub mod counters;
pub mod discovery;
pub mod dynamodb;
#[path = "dynamodb-schemas.rs"]
pub mod dynamodb_schemas;
pub mod entities;
pub mod http;
pub mod images;
pub mod inkpot;
pub mod memory;
pub mod metrics;
pub mod pagination;
pub mod peppers;
pub mod posts;
#[path = "signing-keys.rs"]
pub mod signing_keys;
pub mod storage;
#[path = "test-data.rs"]
pub mod test_data;
pub mod token;
pub mod users;
pub mod util;
