pub mod auth_client;
pub mod config;
pub mod error;
pub mod local_cache;
pub mod remote_client;
pub mod session_store;
pub mod storage;
pub mod task_row;
pub mod window;
