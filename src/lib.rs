pub mod access;
pub mod bot;
pub mod config;
pub mod db;
pub mod force_join;
pub mod http_server;
pub mod models;
pub mod registry;
pub mod schema;
pub mod store;
