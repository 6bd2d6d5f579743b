pub mod clock;
pub mod models;
pub mod partition;
pub mod store;
