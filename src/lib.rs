pub mod api;
pub mod availability;
pub mod cart;
pub mod core;
pub mod models;
pub mod routes;
pub mod schema;
