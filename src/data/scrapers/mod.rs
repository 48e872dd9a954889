//! Page retrieval and USCF page parsing

pub mod http;
pub mod uschess;

pub use http::HttpFetcher;

use crate::{NetConfig, Result};
use std::time::Duration;

/// Anything that can turn a URL into page markup
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> Result<String>;
}

impl<F: PageFetcher + ?Sized> PageFetcher for &F {
    fn fetch(&self, url: &str) -> Result<String> {
        (**self).fetch(url)
    }
}

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &NetConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }
}

/// Retry an operation while it fails with a transient error.
///
/// Permanent errors are returned straight away. After `max_attempts`
/// attempts the last transient error is returned.
pub fn with_retry<T, F>(mut operation: F, policy: RetryPolicy) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                log::warn!("Attempt {} of {} failed: {}", attempt, max_attempts, e);
                std::thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
