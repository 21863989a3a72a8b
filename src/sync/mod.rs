/// Catalog synchronization: the sync engine and the update cooldown.
pub mod engine;
pub mod gate;

pub use engine::{PassFailure, SyncEngine, SyncMode, SyncReport};
pub use gate::{OnCooldown, UpdateGate};
