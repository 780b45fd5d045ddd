//! Pre-built limiter configurations for major cryptocurrency exchanges
//!
//! Each module maps an exchange's REST surface onto the four resource
//! groups and sets budgets matching the exchange's published rate limits,
//! with conservative variants where headroom matters more than throughput.
//!
//! # Supported Exchanges
//!
//! - **Binance**: weight-per-minute plus order-count limits
//! - **Bybit**: per-endpoint-category limits
//! - **Coinbase**: public and authenticated limits
//! - **Kraken**: decaying call-counter limits

pub mod binance;
pub mod bybit;
pub mod coinbase;
pub mod kraken;
