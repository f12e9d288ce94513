pub mod config;
pub mod error;
pub mod limiter;
pub mod models;
pub mod provider;
pub mod signals;

pub use config::AppConfig;
pub use error::IngestError;
pub use models::*;
pub use provider::{RatingEvent, RatingsPage, StockDataProvider};
