mod citation;
mod retrieved;

pub use citation::{Citation, CitationSet};
pub use retrieved::{Match, MatchMetadata};
