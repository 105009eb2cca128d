//! Task lifecycle orchestration: serving-process supervision, benchmark
//! evaluation runs, and the adapters they talk to.

pub mod adapters;
pub mod backend;
pub mod engine;
pub mod events;
pub mod executor;
pub mod lifecycle;
pub mod ports;
pub mod registry;
pub mod supervisor;
pub mod tasks;

pub use adapters::*;
pub use backend::*;
pub use engine::*;
pub use events::*;
pub use executor::*;
pub use lifecycle::*;
pub use ports::*;
pub use registry::*;
pub use supervisor::*;
pub use tasks::*;
