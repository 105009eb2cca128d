pub mod accuracy;
pub mod latency;

pub use accuracy::*;
pub use latency::*;
