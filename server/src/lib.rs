pub mod auth;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
