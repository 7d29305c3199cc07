pub mod db;
pub mod error;
pub mod handler;
pub mod pagination;
pub mod post;
pub mod schema;
pub mod settings;
pub mod sink;
pub mod trends;
pub mod utils;
