//! # Shelf Harvest Core
//!
//! Runtime-agnostic logic for shelf-harvest: item models, the store
//! abstraction, reference and author deduplication, screening policy, and
//! the incremental acquisition controller.
//!
//! Nothing here touches the filesystem, the network, or a database. The
//! concrete page sources and storage backends live in the `shelf-harvest`
//! crate and plug in through the traits in [`source`] and [`store`].
//!
//! ```text
//!  PageSource ──► ReferenceFilter ──► ItemExtractor ──► HarvestPolicy::screen
//!                                                             │
//!                 ItemStore ◄── MirroredStore ◄── collect_feedback
//! ```

pub mod acquire;
pub mod dedup;
pub mod error;
pub mod feedback;
pub mod models;
pub mod policy;
pub mod progress;
pub mod source;
pub mod store;

pub use acquire::{AcquireStats, Acquisition, Harvester};
pub use error::{HarvestError, Result};
pub use models::{FeedbackEntry, Item, ItemRecord};
pub use policy::{HarvestPolicy, SkipReason};
pub use store::mirrored::MirroredStore;
pub use store::ItemStore;
