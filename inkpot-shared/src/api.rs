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

//! # inkpot API types
//!
//! Request & response bodies for the inkpot REST API. The server deserializes requests & serializes
//! responses; the test suite does the opposite.

use chrono::{DateTime, Utc};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Period, PostId, PostSlug, PostStatus, Tagname, UserEmail, UserId, Username};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Passwords                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Password(pub String);

impl Zeroize for Password {
    fn zeroize(&mut self) {
        self.0.zeroize()
    }
}

impl CloneableSecret for Password {}

impl SerializableSecret for Password {}

pub type SecretPassword = SecretBox<Password>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        Users & profiles                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SignupReq {
    pub username: Username,
    pub password: SecretPassword,
    pub email: UserEmail,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRsp {
    pub greeting: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoginReq {
    pub username: Username,
    pub password: SecretPassword,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRsp {
    pub token: String,
}

/// Update the caller's profile; absent fields are left untouched
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdateReq {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Update the caller's social links; an empty string clears the corresponding link
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SocialUpdateReq {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SocialLinks {
    pub github: Option<Url>,
    pub twitter: Option<Url>,
    pub facebook: Option<Url>,
    pub homepage: Option<Url>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BlogRsp {
    pub owner: Username,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The caller's own profile
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProfileRsp {
    pub username: Username,
    pub email: UserEmail,
    pub nickname: String,
    pub bio: String,
    pub profile_image: Option<Url>,
    pub social: SocialLinks,
    pub blog: BlogRsp,
    pub followers_count: u64,
    pub following_count: u64,
}

/// Someone else's profile
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PublicProfileRsp {
    pub username: Username,
    pub nickname: String,
    pub bio: String,
    pub profile_image: Option<Url>,
    pub social: SocialLinks,
    pub blog: BlogRsp,
    pub followers_count: u64,
    pub following_count: u64,
    pub is_following: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FollowRsp {
    pub following: bool,
    pub followers_count: u64,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                             Posts                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PostCreateReq {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default)]
    pub tags: Vec<Tagname>,
}

/// Modify a post; absent fields are left untouched, but note that an empty list of tags *will*
/// clear the post's tags
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PostUpdateReq {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tagname>>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PostRsp {
    pub id: PostId,
    pub slug: PostSlug,
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    pub tags: Vec<Tagname>,
    pub author: Username,
    pub likes: u64,
    pub views: u64,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PostDetailRsp {
    pub post: PostRsp,
    pub is_owner: bool,
    pub has_liked: bool,
    pub is_following: bool,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TagCount {
    pub name: Tagname,
    pub count: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BlogPostsRsp {
    pub blog: BlogRsp,
    pub tags: Vec<TagCount>,
    pub selected_tag: Option<Tagname>,
    pub posts: Page<PostRsp>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LikeRsp {
    pub has_liked: bool,
    pub likes_count: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UploadRsp {
    pub location: Url,
    pub success: bool,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Discovery                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FollowingFeedRsp {
    pub following_count: u64,
    pub posts: Page<PostRsp>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TrendingRsp {
    pub period: Period,
    pub posts: Page<PostRsp>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SearchRsp {
    pub query: String,
    pub posts: Page<PostRsp>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BloggerRsp {
    pub username: Username,
    pub nickname: String,
    pub blog_title: String,
    pub post_count: usize,
    pub profile_image: Option<Url>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthorRsp {
    pub pk: UserId,
    pub username: Username,
}

/// One element of the "recent posts" JSON feed
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RecentPostRsp {
    pub title: String,
    pub content: String,
    pub author: AuthorRsp,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Pagination                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One page of a listing
///
/// `page` is one-based; `num_pages` is never zero (an empty listing has one, empty, page).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub num_pages: usize,
    pub count: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Query parameters common to paginated listings
///
/// `page` is taken as a string since anything that doesn't parse as a positive integer is
/// quietly mapped to a legitimate page rather than rejected.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PageReq {
    pub page: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BlogPostsReq {
    pub tag: Option<String>,
    pub page: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TrendingReq {
    pub period: Option<String>,
    pub page: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SearchReq {
    pub q: Option<String>,
    pub page: Option<String>,
}
