pub mod client;

pub use client::{RateProviderClient, RateProviderError, RatesResponse};
