pub mod connection;
pub mod schema;
pub mod models;
pub mod queries;
pub mod store;
pub mod db_manager;
