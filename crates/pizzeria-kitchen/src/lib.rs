//! Kitchen-side scheduling: a cook pool fed from the kitchen inbox.

pub mod scheduler;

pub use scheduler::{Kitchen, KitchenConfig};
