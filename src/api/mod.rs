pub mod analysis;
pub mod error;
pub mod handler_utils;
pub mod selection;
pub mod server;
