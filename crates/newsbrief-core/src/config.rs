use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if any configured value fails to parse.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if any configured value fails to parse.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let env = parse_environment(&or_default("NEWSBRIEF_ENV", "development"));
    let bind_addr = parse_addr("NEWSBRIEF_BIND_ADDR", "0.0.0.0:8000")?;
    let log_level = or_default("NEWSBRIEF_LOG_LEVEL", "info");
    let job_request_timeout_secs = parse_u64("NEWSBRIEF_JOB_REQUEST_TIMEOUT_SECS", "30")?;
    let github_trends_url = lookup("NEWSBRIEF_GITHUB_TRENDS_URL").ok();
    let feeds_parser_url = lookup("NEWSBRIEF_FEEDS_PARSER_URL").ok();

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        job_request_timeout_secs,
        github_trends_url,
        feeds_parser_url,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn parse_environment_production() {
        assert_eq!(parse_environment("production"), Environment::Production);
    }

    #[test]
    fn parse_environment_unknown_defaults_to_development() {
        assert_eq!(parse_environment("staging"), Environment::Development);
    }

    #[test]
    fn build_app_config_defaults() {
        let map: HashMap<&str, &str> = HashMap::new();
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(cfg.env, Environment::Development);
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.job_request_timeout_secs, 30);
        assert!(cfg.github_trends_url.is_none());
        assert!(cfg.feeds_parser_url.is_none());
    }

    #[test]
    fn build_app_config_overrides() {
        let mut map = HashMap::new();
        map.insert("NEWSBRIEF_ENV", "production");
        map.insert("NEWSBRIEF_BIND_ADDR", "127.0.0.1:9000");
        map.insert("NEWSBRIEF_LOG_LEVEL", "debug");
        map.insert("NEWSBRIEF_JOB_REQUEST_TIMEOUT_SECS", "60");
        map.insert("NEWSBRIEF_FEEDS_PARSER_URL", "http://reports.internal/feeds/run");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(cfg.env, Environment::Production);
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.job_request_timeout_secs, 60);
        assert_eq!(
            cfg.feeds_parser_url.as_deref(),
            Some("http://reports.internal/feeds/run")
        );
    }

    #[test]
    fn build_app_config_fails_with_invalid_bind_addr() {
        let mut map = HashMap::new();
        map.insert("NEWSBRIEF_BIND_ADDR", "not-a-socket-addr");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "NEWSBRIEF_BIND_ADDR"),
            "expected InvalidEnvVar(NEWSBRIEF_BIND_ADDR), got: {result:?}"
        );
    }

    #[test]
    fn build_app_config_fails_with_invalid_timeout() {
        let mut map = HashMap::new();
        map.insert("NEWSBRIEF_JOB_REQUEST_TIMEOUT_SECS", "soon");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "NEWSBRIEF_JOB_REQUEST_TIMEOUT_SECS"),
            "expected InvalidEnvVar(NEWSBRIEF_JOB_REQUEST_TIMEOUT_SECS), got: {result:?}"
        );
    }
}
