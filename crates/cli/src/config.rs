//! Startup configuration, resolved once from flags and environment.
//!
//! Flags win over environment variables. Required settings fail fast with a
//! diagnostic before any protocol output is written.

use remcache_core::{Error, Result};
use remcache_store::{AddressingStyle, HttpBackendConfig};

use crate::Args;

pub const ENV_ENDPOINT: &str = "REMCACHE_ENDPOINT";
pub const ENV_BUCKET: &str = "REMCACHE_BUCKET";
pub const ENV_PREFIX: &str = "REMCACHE_PREFIX";
pub const ENV_PATH_STYLE: &str = "REMCACHE_PATH_STYLE";
pub const ENV_AUTH_TOKEN: &str = "REMCACHE_AUTH_TOKEN";

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub bucket: String,
    pub prefix: Option<String>,
    pub addressing: AddressingStyle,
    pub auth_token: Option<String>,
}

impl Config {
    pub fn resolve(args: &Args) -> Result<Self> {
        Self::resolve_with(args, |var| std::env::var(var).ok())
    }

    fn resolve_with(args: &Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let endpoint = setting(args.endpoint.clone(), ENV_ENDPOINT, &env).ok_or_else(|| {
            Error::configuration("endpoint is required: set --endpoint or REMCACHE_ENDPOINT")
        })?;
        let bucket = setting(args.bucket.clone(), ENV_BUCKET, &env).ok_or_else(|| {
            Error::configuration("bucket is required: set --bucket or REMCACHE_BUCKET")
        })?;

        let addressing = if args.path_style || truthy(env(ENV_PATH_STYLE)) {
            AddressingStyle::Path
        } else {
            AddressingStyle::VirtualHosted
        };

        Ok(Config {
            endpoint,
            bucket,
            prefix: setting(args.prefix.clone(), ENV_PREFIX, &env),
            addressing,
            auth_token: setting(args.auth_token.clone(), ENV_AUTH_TOKEN, &env),
        })
    }

    pub fn backend_config(&self) -> HttpBackendConfig {
        HttpBackendConfig {
            addressing: self.addressing,
            auth_token: self.auth_token.clone(),
            ..HttpBackendConfig::new(self.endpoint.clone(), self.bucket.clone())
        }
    }
}

fn setting(
    flag: Option<String>,
    var: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    flag.or_else(|| env(var)).filter(|value| !value.is_empty())
}

fn truthy(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some("1") | Some("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["remcache"];
        full.extend_from_slice(argv);
        Args::parse_from(full)
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn flags_satisfy_required_settings() {
        let args = args(&["--endpoint", "https://s3.example.com", "--bucket", "cache"]);
        let config = Config::resolve_with(&args, env_of(&[])).expect("config");
        assert_eq!(config.endpoint, "https://s3.example.com");
        assert_eq!(config.bucket, "cache");
        assert_eq!(config.prefix, None);
        assert_eq!(config.addressing, AddressingStyle::VirtualHosted);
        assert_eq!(config.auth_token, None);
    }

    #[test]
    fn environment_fills_in_missing_flags() {
        let args = args(&[]);
        let config = Config::resolve_with(
            &args,
            env_of(&[
                (ENV_ENDPOINT, "https://s3.example.com"),
                (ENV_BUCKET, "cache"),
                (ENV_PREFIX, "ci"),
                (ENV_PATH_STYLE, "1"),
                (ENV_AUTH_TOKEN, "sekrit"),
            ]),
        )
        .expect("config");
        assert_eq!(config.bucket, "cache");
        assert_eq!(config.prefix.as_deref(), Some("ci"));
        assert_eq!(config.addressing, AddressingStyle::Path);
        assert_eq!(config.auth_token.as_deref(), Some("sekrit"));
    }

    #[test]
    fn flags_win_over_environment() {
        let args = args(&[
            "--endpoint",
            "https://flag.example.com",
            "--bucket",
            "from-flag",
        ]);
        let config = Config::resolve_with(
            &args,
            env_of(&[
                (ENV_ENDPOINT, "https://env.example.com"),
                (ENV_BUCKET, "from-env"),
            ]),
        )
        .expect("config");
        assert_eq!(config.endpoint, "https://flag.example.com");
        assert_eq!(config.bucket, "from-flag");
    }

    #[test]
    fn a_missing_endpoint_is_a_configuration_error() {
        let args = args(&["--bucket", "cache"]);
        let result = Config::resolve_with(&args, env_of(&[]));
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn a_missing_bucket_is_a_configuration_error() {
        let args = args(&["--endpoint", "https://s3.example.com"]);
        let result = Config::resolve_with(&args, env_of(&[]));
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn empty_values_do_not_satisfy_required_settings() {
        let args = args(&["--endpoint", "https://s3.example.com", "--bucket", ""]);
        let result = Config::resolve_with(&args, env_of(&[(ENV_BUCKET, "")]));
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn a_false_path_style_variable_keeps_virtual_hosting() {
        let args = args(&["--endpoint", "https://s3.example.com", "--bucket", "cache"]);
        let config = Config::resolve_with(&args, env_of(&[(ENV_PATH_STYLE, "0")])).expect("config");
        assert_eq!(config.addressing, AddressingStyle::VirtualHosted);
    }
}
