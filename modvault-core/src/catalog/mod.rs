//! Catalog resolution: which products a user owns.
//!
//! Purchases are joined against the product catalog through a chunked,
//! cache-backed batch lookup and presented as an [`EntitlementView`].

pub mod batch;
pub mod cache;
pub mod merge;
pub mod resolver;
pub mod types;

pub use batch::{BatchStats, BatchedResolver, Keyed};
pub use cache::{InMemoryResolutionCache, ResolutionCache};
pub use merge::MergePolicy;
pub use resolver::{CatalogResolver, ProductCache};
pub use types::{EntitlementView, GameGroup, OwnedProduct, Product, ProductId, Purchase, UserId};
