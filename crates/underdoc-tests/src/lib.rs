//! Shared fixtures for the integration tests.

use std::time::Duration;

use underdoc_core::{ClientConfig, DocumentInput, PollPolicy, RetryPolicy};

pub const TEST_API_KEY: &str = "test-key";

/// Configuration pointed at a mock server, with delays shrunk so retry and
/// poll loops finish quickly.
pub fn config_for(base_url: &str) -> ClientConfig {
    ClientConfig::new(TEST_API_KEY, base_url)
        .with_request_timeout(Duration::from_secs(1))
        .with_retry(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
        })
        .with_poll(PollPolicy {
            initial_interval: Duration::from_millis(10),
            multiplier: 1.5,
            max_interval: Duration::from_millis(50),
            max_wait: Duration::from_secs(5),
        })
}

/// A JPEG-typed document of `size` bytes.
pub fn jpeg(size: usize) -> DocumentInput {
    let mut bytes = vec![0u8; size];
    bytes[..4.min(size)].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0][..4.min(size)]);
    DocumentInput::new(bytes, "image/jpeg")
}
