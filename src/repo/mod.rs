/// Repository layer: forecast cache and the user record store
mod cache;
mod memory;
mod postgres;
mod store;

pub use cache::ForecastCache;
pub use memory::MemoryEventStore;
pub use postgres::{init_db, PgEventStore};
pub use store::EventStore;
