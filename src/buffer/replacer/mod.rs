//! Eviction policy implementations (replacers).
//!
//! - [`LruKReplacer`] - K-distance based replacement

mod lru_k;

pub use lru_k::LruKReplacer;
