//! Browser automation for JavaScript-heavy portals.
//!
//! Provides a [`PageDriver`] abstraction over a headless Chromium tab,
//! chainable [`Locator`]s that are re-resolved on every call, and a
//! [`NetworkTap`] that turns the page's network traffic into signals
//! other crates can wait on.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod locator;
pub mod network;

pub use actions::PageDriver;
pub use engine::{BrowserEngine, ChromiumPage};
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
pub use locator::{Locator, Step};
pub use network::{
    Exchange, ExchangeMatcher, ExchangePhase, ExchangeWatch, NetworkTap, SignalSnapshot,
};
