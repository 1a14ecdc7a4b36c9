//! # Courier Test Suite
//!
//! Unified test crate containing cross-crate integration flows.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs             # Pairwise cross-crate flows
//!     └── e2e_choreography.rs  # Full multi-instance scenarios
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p courier-tests
//!
//! # By category
//! cargo test -p courier-tests integration::
//! ```

pub mod integration;

/// Route test logs through tracing. Safe to call from every test; only
/// the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
