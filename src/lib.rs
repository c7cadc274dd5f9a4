pub mod activity;
pub mod auth;
pub mod config;
pub mod drive;
pub mod dtos;
pub mod email;
pub mod error;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod portal;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::AppState;
