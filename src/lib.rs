// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod fetch;
pub mod item;
pub mod lanes;
pub mod pool;
pub mod rotation;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::item::Item;
pub use crate::lanes::{DisplayPayload, MultiLanePool};
pub use crate::pool::ContentPool;
