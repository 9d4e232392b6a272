//! Pagemark cache library
//!
//! Bounded LRU caching for composited page renders, with per-page dirty
//! tracking so edits invalidate exactly the pages they touch.

pub mod lru;
pub mod page;

pub use lru::{CacheStats, LruCache};
pub use page::{PageRenderCache, RenderKey};
