use crate::config::types::{
    AutoThrottleConfig, CacheConfig, Config, CrawlerConfig, OutputConfig, UserAgentConfig,
};
use crate::ConfigError;

/// Smallest accepted `target-concurrency`
const MIN_TARGET_CONCURRENCY: f64 = 0.01;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_autothrottle_config(&config.autothrottle)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_cache_config(&config.cache)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 256 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-requests must be between 1 and 256, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.max_interstitial_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-interstitial-attempts must be >= 1".to_string(),
        ));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request-timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

fn validate_autothrottle_config(config: &AutoThrottleConfig) -> Result<(), ConfigError> {
    if !config.target_concurrency.is_finite() || config.target_concurrency < MIN_TARGET_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "target-concurrency must be a number >= {}, got {}",
            MIN_TARGET_CONCURRENCY, config.target_concurrency
        )));
    }

    if config.start_delay > config.max_delay {
        return Err(ConfigError::Validation(format!(
            "start-delay ({}ms) cannot exceed max-delay ({}ms)",
            config.start_delay, config.max_delay
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent name cannot be empty".to_string(),
        ));
    }

    if config.name.chars().any(|c| c.is_control()) {
        return Err(ConfigError::Validation(format!(
            "user-agent name contains control characters: {:?}",
            config.name
        )));
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.enabled && config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "cache directory cannot be empty when the cache is enabled".to_string(),
        ));
    }

    if let Some(code) = config
        .ignore_http_codes
        .iter()
        .find(|code| !(100..=599).contains(*code))
    {
        return Err(ConfigError::Validation(format!(
            "ignore-http-codes contains invalid status {}",
            code
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates a single allowed-domain pattern (supports a leading `*.`)
pub fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with(['.', '-']) || domain.ends_with(['.', '-']) || domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' is malformed",
            domain
        )));
    }

    Ok(())
}
