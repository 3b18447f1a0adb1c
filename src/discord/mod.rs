//! Discord adapter: REST client, gateway client, and wire types.
//!
//! This is the production backend for [`crate::platform::Platform`]. The
//! core flows never import from here directly except for the types module.

pub mod api;
pub mod gateway;
pub mod types;

pub use api::Rest;
pub use gateway::{Event, Gateway};
