//! Search engine: index extraction on write, query evaluation on read.

pub mod extractor;
pub mod query;

pub use extractor::extract;
pub use query::search;
