//! Memory profile interpretation
//!
//! Turns the annotated source listing pprof renders for a memory profile
//! into [`AllocationRecord`](crate::domain::AllocationRecord)s.

pub mod listing;

pub use listing::{
    parse_listing, short_function_name, ListingParser, ParseOutcome, LISTING_FORMAT_VERSION,
    NO_MATCHES_DIAGNOSTIC,
};
