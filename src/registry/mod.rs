//! Vehicle registry: last-known state per vehicle id.
//!
//! The trait defines the contract; [`InMemoryRegistry`] is the
//! implementation used by the pipeline and the server.

mod memory;
mod traits;

pub use memory::InMemoryRegistry;
pub use traits::{ClassifyFn, Reclassified, VehicleStore};
