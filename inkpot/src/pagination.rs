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

//! # pagination
//!
//! Forgiving pagination: callers never get an error for a bad page number. Anything that isn't a
//! positive integer is page one, and a page past the end is the last page.

use inkpot_shared::api::Page;

/// Resolve the `page` query parameter against a listing of `count` items, `per_page` at a time.
/// Return the one-based page number & the total number of pages (which is never zero).
pub fn resolve_page(page: Option<&str>, count: usize, per_page: usize) -> (usize, usize) {
    let per_page = per_page.max(1);
    let num_pages = count.div_ceil(per_page).max(1);
    let page = match page.map(|s| s.trim().parse::<i64>()) {
        None | Some(Err(_)) => 1,
        Some(Ok(n)) if n < 1 || n as u64 > num_pages as u64 => num_pages,
        Some(Ok(n)) => n as usize,
    };
    (page, num_pages)
}

/// Select one page out of `items`
pub fn paginate<T>(items: Vec<T>, page: Option<&str>, per_page: usize) -> Page<T> {
    let count = items.len();
    let (page, num_pages) = resolve_page(page, count, per_page);
    let per_page = per_page.max(1);
    let items = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();
    Page {
        items,
        page,
        num_pages,
        count,
        has_next: page < num_pages,
        has_previous: page > 1,
    }
}

/// Transform the items on a page, leaving the bookkeeping untouched
pub fn map_page<T, U>(page: Page<T>, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
        items: page.items.into_iter().map(f).collect(),
        page: page.page,
        num_pages: page.num_pages,
        count: page.count,
        has_next: page.has_next,
        has_previous: page.has_previous,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn forgiving_pages() {
        assert_eq!(resolve_page(None, 25, 10), (1, 3));
        assert_eq!(resolve_page(Some("abc"), 25, 10), (1, 3));
        assert_eq!(resolve_page(Some("2"), 25, 10), (2, 3));
        assert_eq!(resolve_page(Some("99"), 25, 10), (3, 3));
        assert_eq!(resolve_page(Some("0"), 25, 10), (3, 3));
        assert_eq!(resolve_page(Some("-4"), 25, 10), (3, 3));
        assert_eq!(resolve_page(None, 0, 9), (1, 1));
    }

    #[test]
    fn pages() {
        let page = paginate((0..25).collect::<Vec<_>>(), Some("3"), 10);
        assert_eq!(page.items, vec![20, 21, 22, 23, 24]);
        assert_eq!(page.count, 25);
        assert!(!page.has_next);
        assert!(page.has_previous);

        let page = paginate(Vec::<u8>::new(), None, 9);
        assert!(page.items.is_empty());
        assert_eq!(page.num_pages, 1);
        assert!(!page.has_next && !page.has_previous);

        let page = map_page(paginate(vec![1, 2, 3], Some("1"), 2), |n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert!(page.has_next);
    }
}
