//! Assertion runtime for scripts
//!
//! Scripts check a completed response with fluent chains such as
//! `expect_response(&r).to().have().status(200)`. Every terminal check
//! returns an [`AssertionError`](crate::error::AssertionError) on mismatch;
//! the scripting host decides whether a run continues.

mod expect;
mod pattern;

pub use expect::{expect, expect_response, Expectation};
pub use pattern::{normalize_pattern, Pattern};
