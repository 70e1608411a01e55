//! Builds the shared outbound HTTP client used by every dispatched call.

use std::time::Duration;

use crate::config::AppConfig;

pub fn build_client(config: &AppConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_max_connections)
        .timeout(config.http_timeout)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_default_config() {
        let config = AppConfig::for_testing();
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn builds_with_zero_timeout_disabled() {
        let mut config = AppConfig::for_testing();
        config.http_timeout = Duration::from_secs(0);
        assert!(build_client(&config).is_ok());
    }
}
