pub mod http;
pub mod ws;

pub use http::{AppError, AppResult, AppState};
