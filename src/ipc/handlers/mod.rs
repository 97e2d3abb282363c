pub mod catalog;
pub mod core;
pub mod enrollments;
pub mod fees;
pub mod setup;
pub mod wizard;
