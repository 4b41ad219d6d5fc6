//! Context assembly for the Stagehand pipeline.
//!
//! Three collaborators build the prompt context a model call receives:
//!
//! 1. The **optimizer** selects and orders sections from a catalog by
//!    topic, priority, and first-vs-follow-up policy, appends tone text,
//!    and reports token estimates.
//! 2. The **TTL cache** keeps externally loaded catalogs warm, coalescing
//!    concurrent misses into a single load.
//! 3. The **dynamic engine** wires a [`stagehand_core::ContextLoader`]
//!    through the cache and the optimizer's selection algorithm, with a
//!    static fallback when the source is down.

pub mod cache;
pub mod dynamic;
pub mod optimizer;
pub mod token;

pub use cache::{CacheError, TtlCache};
pub use dynamic::{DynamicContextEngine, DynamicContextEngineBuilder, Extractors, StaticCatalogLoader};
pub use optimizer::{ContextOptimizer, ContextPolicy, SelectionMode, SelectionQuery};
