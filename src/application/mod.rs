pub mod auth;
pub mod bootstrap;
pub mod commands;
pub mod focus_session;
pub mod selection;
pub mod sync;
pub mod ticker;
