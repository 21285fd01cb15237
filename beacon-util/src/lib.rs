pub mod config;
pub mod crypto;
pub mod dirs;
pub mod fs;
pub mod http;
pub mod interrupt;
pub mod json;
pub mod store;
pub mod types;
