//! Domain types for chatpace

mod priority;
pub mod resource;

pub use priority::Priority;
