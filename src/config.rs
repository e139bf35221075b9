//! Configuration management for the cspace bridge

use std::env;
use std::str::FromStr;

use crate::upload::{
    ChunkPolicy, UploadPolicy, DEFAULT_MAX_CHUNK_ATTEMPTS, DEFAULT_PARALLELISM,
    DEFAULT_SINGLE_UPLOAD_MAX_SIZE, MAX_CHUNKS, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub dingtalk: DingTalkConfig,
    pub upload: UploadConfig,
    pub callback: CallbackConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DingTalkConfig {
    pub api_base_url: String,
    pub agent_id: String,
    /// Pre-issued access token; refreshing it is the operator's job
    pub access_token: String,
    pub timeout_secs: u64,
}

/// Address book event callback registered with the platform
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Public URL the platform posts events to; registration is refused without it
    pub url: Option<String>,
    pub token: String,
    pub aes_key: String,
    pub tags: Vec<String>,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        CallbackConfig {
            url: None,
            token: String::new(),
            aes_key: String::new(),
            tags: default_callback_tags(),
        }
    }
}

fn default_callback_tags() -> Vec<String> {
    ["user_add_org", "user_modify_org", "user_leave_org"]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Files below this size use the single-request upload
    pub min_chunk_size: u64,
    pub max_chunk_size: u64,
    pub max_chunks: u32,
    /// Files above this size are refused by the single-request upload
    pub single_upload_max_size: u64,
    pub parallelism: usize,
    pub max_chunk_attempts: u32,
}

impl UploadConfig {
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy {
            chunk: ChunkPolicy {
                min_chunk_size: self.min_chunk_size,
                max_chunk_size: self.max_chunk_size,
                max_chunks: self.max_chunks,
            },
            single_upload_max_size: self.single_upload_max_size,
            parallelism: self.parallelism,
            max_chunk_attempts: self.max_chunk_attempts,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            min_chunk_size: MIN_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            max_chunks: MAX_CHUNKS,
            single_upload_max_size: DEFAULT_SINGLE_UPLOAD_MAX_SIZE,
            parallelism: DEFAULT_PARALLELISM,
            max_chunk_attempts: DEFAULT_MAX_CHUNK_ATTEMPTS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            dingtalk: DingTalkConfig {
                api_base_url: "https://oapi.dingtalk.com".to_string(),
                agent_id: String::new(),
                access_token: String::new(),
                timeout_secs: 30,
            },
            upload: UploadConfig::default(),
            callback: CallbackConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = UploadConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_or("SERVER_PORT", 3000),
            },
            dingtalk: DingTalkConfig {
                api_base_url: env::var("DINGTALK_API_BASE")
                    .unwrap_or_else(|_| "https://oapi.dingtalk.com".to_string()),
                agent_id: required("DINGTALK_AGENT_ID")?,
                access_token: required("DINGTALK_ACCESS_TOKEN")?,
                timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 30),
            },
            upload: UploadConfig {
                min_chunk_size: parse_or("UPLOAD_MIN_CHUNK_SIZE", defaults.min_chunk_size),
                max_chunk_size: parse_or("UPLOAD_MAX_CHUNK_SIZE", defaults.max_chunk_size),
                max_chunks: parse_or("UPLOAD_MAX_CHUNKS", defaults.max_chunks),
                single_upload_max_size: parse_or(
                    "UPLOAD_SINGLE_MAX_SIZE",
                    defaults.single_upload_max_size,
                ),
                parallelism: parse_or("UPLOAD_PARALLELISM", defaults.parallelism),
                max_chunk_attempts: parse_or(
                    "UPLOAD_MAX_CHUNK_ATTEMPTS",
                    defaults.max_chunk_attempts,
                ),
            },
            callback: CallbackConfig {
                url: optional("DINGTALK_CALLBACK_URL"),
                token: env::var("DINGTALK_CALLBACK_TOKEN").unwrap_or_default(),
                aes_key: env::var("DINGTALK_CALLBACK_AES_KEY").unwrap_or_default(),
                tags: optional("DINGTALK_CALLBACK_TAGS")
                    .map(|v| parse_tags(&v))
                    .unwrap_or_else(default_callback_tags),
            },
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_matches_platform_limits() {
        let policy = Config::default().upload.policy();

        assert_eq!(policy.chunk.min_chunk_size, 100 * 1024);
        assert_eq!(policy.chunk.max_chunk_size, 8 * 1024 * 1024);
        assert_eq!(policy.chunk.max_chunks, 10_000);
        assert_eq!(policy, UploadPolicy::default());
    }

    #[test]
    fn test_callback_tags() {
        assert_eq!(
            parse_tags(" user_add_org, ,user_leave_org "),
            vec!["user_add_org".to_string(), "user_leave_org".to_string()]
        );
        assert_eq!(CallbackConfig::default().tags.len(), 3);
        assert!(CallbackConfig::default().url.is_none());
    }

    #[test]
    fn test_parse_or_falls_back() {
        assert_eq!(parse_or("CSPACE_BRIDGE_TEST_UNSET_VALUE", 7u32), 7);
    }

    #[test]
    fn test_required_reports_key() {
        let err = required("CSPACE_BRIDGE_TEST_UNSET_VALUE").unwrap_err();
        assert_eq!(err.to_string(), "Missing environment variable: CSPACE_BRIDGE_TEST_UNSET_VALUE");
    }
}
