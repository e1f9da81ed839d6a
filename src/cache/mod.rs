pub mod bus;
pub mod directory;
pub mod epoch;
pub mod stats;

pub use bus::{CacheListener, InvalidationBus, TriggerReport};
pub use directory::TagDirectory;
pub use epoch::Epoch;
pub use stats::{CatalogStats, StatsCache};
