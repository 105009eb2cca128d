//! Local implementations of the external collaborator traits.

pub mod datasets;
pub mod memory;
pub mod models;

pub use datasets::*;
pub use memory::*;
pub use models::*;
