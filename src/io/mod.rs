//! Input/output: trajectory export.

pub mod trajectory;

pub use trajectory::write_trajectory;
