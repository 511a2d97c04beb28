pub mod checkpoint;
pub mod config;
pub mod db;
pub mod initiation;
pub mod logging;
pub mod market_data;
pub mod picks;
pub mod retry;
pub mod return_calculation_utils;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;
