mod error;
mod form;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;

pub use error::ApiError;
pub use server::{open_coordinator, router, run};
pub use state::AppState;
