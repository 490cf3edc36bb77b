pub mod aircraft;
pub mod airport;
pub mod performance;
