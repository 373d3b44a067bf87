pub mod api;
pub mod config;
pub mod db;
pub mod emulator;
pub mod sensors;
pub mod shutdown;
pub mod store;
pub mod upload;
