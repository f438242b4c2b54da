//! # Release Backend API
//!
//! [`ApiClient`] carries the request pipeline; endpoint wrappers live in
//! the submodules as further `impl ApiClient` blocks.

pub mod client;
pub mod merge_automation;
pub mod releases;

pub use client::{ApiClient, RequestOptions};
pub use merge_automation::RevisionLookup;
pub use releases::{DEFAULT_RECENT_LIMIT, TAKEN_BUILD_STATUSES, XpiSource};
