pub mod access;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod services;
pub mod store;
pub mod version;

pub use error::{CoreError, Resource};
