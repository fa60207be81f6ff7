pub mod scheduler;
pub mod sweep;
