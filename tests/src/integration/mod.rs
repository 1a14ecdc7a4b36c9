//! # Integration Tests
//!
//! Cross-crate choreography over one shared in-memory broker.

pub mod e2e_choreography;
pub mod flows;
