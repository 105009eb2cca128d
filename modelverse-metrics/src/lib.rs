pub mod extraction;
pub mod calculators;
pub mod aggregators;

pub use extraction::*;
pub use calculators::*;
pub use aggregators::*;
