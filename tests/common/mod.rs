//! Common test utilities for the dx crate.
//!
//! - `fixtures`: Elements, image payloads and archives on disk
//! - `mocks`: Recording render surface, timeline and encoder
#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

use tracing_subscriber::EnvFilter;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
