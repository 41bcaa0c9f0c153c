//! Shared types and models for the IEEP ERP platform
//!
//! This crate holds the stock accounting, reorder and BOM costing rules as
//! pure functions so the backend, the browser (via WASM) and the tests all
//! evaluate them the same way.

pub mod clock;
pub mod models;
pub mod types;
pub mod validation;

pub use clock::*;
pub use models::*;
pub use types::*;
pub use validation::*;
