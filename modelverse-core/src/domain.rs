pub mod ids;
pub mod config;
pub mod task;
pub mod dataset;
pub mod evaluation;
pub mod events;
pub mod generation;

pub use ids::*;
pub use config::*;
pub use task::*;
pub use dataset::*;
pub use evaluation::*;
pub use events::*;
pub use generation::*;
