//! Job and item model.
//!
//! Records are owned by the [`crate::store::JobStore`]; callers only ever see
//! the snapshot types defined here.

mod status;
mod types;

pub use status::{derive_status, ItemTally, StatusFlags};
pub use types::*;
