//! crates/medintake_core/src/pagination.rs
//!
//! Limit/offset pagination with clamping. Callers supply raw values from
//! query strings; out-of-range values are clamped, never rejected.

use crate::domain::Document;

/// Hard upper bound on page size, to bound response payloads.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Page size applied when the caller does not supply one.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// A clamped limit/offset pair. Construct via [`PageRequest::new`]; the raw
/// values are not reachable, so every consumer sees clamped numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    limit: i64,
    offset: i64,
}

impl PageRequest {
    /// Clamps `limit` to `0..=MAX_PAGE_LIMIT` and `offset` to non-negative.
    /// A limit above the cap gets the cap, not an error.
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(0, MAX_PAGE_LIMIT),
            offset: offset.max(0),
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// One page of documents plus a look-ahead flag.
///
/// `has_more` is true iff at least one row exists beyond `offset + limit`.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub has_more: bool,
}
