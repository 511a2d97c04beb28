pub mod quote;
pub mod alpha_vantage_client;
pub mod fan_out;

pub use quote::{FetchError, MarketDataProvider, Quote};
