mod listing;
mod resolver;

pub use listing::{list_entries, ListingEntry, ListingRenderer};
pub use resolver::{normalize_key, resolve, split_query, Resolved};
