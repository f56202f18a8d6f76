pub mod error;
pub mod routes;
pub mod service;

pub use error::ApiError;
pub use routes::router;
pub use service::{ContactResponse, RetrievalService};
