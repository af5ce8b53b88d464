pub mod bus;
pub mod cache;
pub mod config;
pub mod database;
pub mod embedding_client;
pub mod processor;
pub mod utils;
pub mod vector_index;

pub use config::Settings;
