//! Bounded LRU cache engine.
//!
//! A concurrent byte-bounded key/value store with recency ordering,
//! lazy expiration, and a two-phase eviction policy. The engine guards
//! all of its state with a single mutex held for the duration of each
//! operation; values returned from reads are copies, so callers never
//! alias engine memory.

mod cache;
mod clock;
mod error;
mod item;
mod list;

pub use cache::{Builder, LruCache};
pub use clock::{Clock, SystemClock};
pub use error::CacheError;
pub use item::Item;
