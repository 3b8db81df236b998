pub mod assistant;
pub mod chat;
pub mod config;
pub mod desk;
pub mod error;
pub mod issue;
pub mod migrate;
pub mod route;
pub mod space;
