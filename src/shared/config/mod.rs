//! Application configuration module
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables. Every key can be set either way; the TOML
//! keys are the lower-case field names below, the environment keys are
//! listed on each field.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Runtime configuration of the chat server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// HTTP port (`SERVER_PORT`)
    pub port: u16,
    /// PostgreSQL URL; in-memory stores when unset (`DATABASE_URL`)
    pub database_url: Option<String>,
    /// Kafka bootstrap brokers; in-process log when empty (`KAFKA_BROKERS`, comma separated)
    pub kafka_brokers: Vec<String>,
    /// Topic carrying chat events (`CHAT_TOPIC`)
    pub chat_topic: String,
    /// Partition count of the chat topic (`CHAT_PARTITIONS`)
    pub partitions: i32,
    /// Consumer group of this replica (`CONSUMER_GROUP`)
    pub consumer_group: String,
    /// Max time a log fetch waits for new records (`FETCH_MAX_WAIT_MS`)
    pub fetch_max_wait_ms: i32,
    /// HS256 secret; socket and REST auth disabled when unset (`JWT_SECRET`)
    pub jwt_secret: Option<String>,
    /// Model name passed to the text generator (`AI_MODEL`)
    pub ai_model: String,
    /// System prompt of the AI teacher (`AI_SYSTEM_PROMPT`)
    pub ai_system_prompt: String,
    /// Recent turns sent as AI context (`AI_HISTORY_WINDOW`)
    pub ai_history_window: u32,
    /// Fragment flush threshold in characters (`AI_CHUNK_THRESHOLD`)
    pub ai_chunk_threshold: usize,
    /// Max characters of an inbound message (`CHAT_MAX_CONTENT_LEN`)
    pub max_content_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            kafka_brokers: Vec::new(),
            chat_topic: "chat-events".to_string(),
            partitions: 3,
            consumer_group: "tutorchat-local".to_string(),
            fetch_max_wait_ms: 500,
            jwt_secret: None,
            ai_model: "gpt-4-turbo".to_string(),
            ai_system_prompt: "You are a kind AI teacher helping a student with their school assignments.".to_string(),
            ai_history_window: 10,
            ai_chunk_threshold: 50,
            max_content_len: 1000,
        }
    }
}

impl ChatConfig {
    /// Create a new ChatConfigBuilder
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }

    /// Load defaults, the optional TOML file named by `CHAT_CONFIG_FILE`, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("CHAT_CONFIG_FILE") {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Override fields from environment-style `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("SERVER_PORT") {
            self.port = parse_value("SERVER_PORT", &port)?;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(brokers) = lookup("KAFKA_BROKERS") {
            self.kafka_brokers = brokers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(topic) = lookup("CHAT_TOPIC") {
            self.chat_topic = topic;
        }
        if let Some(partitions) = lookup("CHAT_PARTITIONS") {
            self.partitions = parse_value("CHAT_PARTITIONS", &partitions)?;
        }
        if let Some(group) = lookup("CONSUMER_GROUP") {
            self.consumer_group = group;
        }
        if let Some(wait) = lookup("FETCH_MAX_WAIT_MS") {
            self.fetch_max_wait_ms = parse_value("FETCH_MAX_WAIT_MS", &wait)?;
        }
        if let Some(secret) = lookup("JWT_SECRET").filter(|v| !v.is_empty()) {
            self.jwt_secret = Some(secret);
        }
        if let Some(model) = lookup("AI_MODEL") {
            self.ai_model = model;
        }
        if let Some(prompt) = lookup("AI_SYSTEM_PROMPT") {
            self.ai_system_prompt = prompt;
        }
        if let Some(window) = lookup("AI_HISTORY_WINDOW") {
            self.ai_history_window = parse_value("AI_HISTORY_WINDOW", &window)?;
        }
        if let Some(threshold) = lookup("AI_CHUNK_THRESHOLD") {
            self.ai_chunk_threshold = parse_value("AI_CHUNK_THRESHOLD", &threshold)?;
        }
        if let Some(max_len) = lookup("CHAT_MAX_CONTENT_LEN") {
            self.max_content_len = parse_value("CHAT_MAX_CONTENT_LEN", &max_len)?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions < 1 {
            return Err(ConfigError::invalid("CHAT_PARTITIONS", self.partitions));
        }
        if self.chat_topic.trim().is_empty() {
            return Err(ConfigError::MissingValue("CHAT_TOPIC"));
        }
        if self.consumer_group.trim().is_empty() {
            return Err(ConfigError::MissingValue("CONSUMER_GROUP"));
        }
        if self.ai_chunk_threshold == 0 {
            return Err(ConfigError::invalid("AI_CHUNK_THRESHOLD", self.ai_chunk_threshold));
        }
        if self.max_content_len == 0 {
            return Err(ConfigError::invalid("CHAT_MAX_CONTENT_LEN", self.max_content_len));
        }
        if self.fetch_max_wait_ms < 0 {
            return Err(ConfigError::invalid("FETCH_MAX_WAIT_MS", self.fetch_max_wait_ms));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, value))
}

/// Builder for ChatConfig
#[derive(Debug, Default)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    pub fn kafka_brokers(mut self, brokers: Vec<String>) -> Self {
        self.config.kafka_brokers = brokers;
        self
    }

    pub fn partitions(mut self, partitions: i32) -> Self {
        self.config.partitions = partitions;
        self
    }

    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.config.consumer_group = group.into();
        self
    }

    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    pub fn ai_history_window(mut self, window: u32) -> Self {
        self.config.ai_history_window = window;
        self
    }

    pub fn max_content_len(mut self, max_len: usize) -> Self {
        self.config.max_content_len = max_len;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ChatConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl ToString) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ChatConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.kafka_brokers.is_empty());
        assert_eq!(config.ai_chunk_threshold, 50);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SERVER_PORT", "8080"),
            ("KAFKA_BROKERS", "kafka-1:9092, kafka-2:9092,"),
            ("CHAT_PARTITIONS", "6"),
            ("JWT_SECRET", "s3cret"),
        ]);
        let mut config = ChatConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.kafka_brokers, vec!["kafka-1:9092", "kafka-2:9092"]);
        assert_eq!(config.partitions, 6);
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = ChatConfig::default();
        let result = config.apply_env(|key| (key == "CHAT_PARTITIONS").then(|| "many".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { key: "CHAT_PARTITIONS", .. })));
    }

    #[test]
    fn test_toml_layer() {
        let config = ChatConfig::from_toml_str(
            r#"
            chat_topic = "tutoring"
            partitions = 12
            kafka_brokers = ["localhost:9092"]
            "#,
        )
        .unwrap();
        assert_eq!(config.chat_topic, "tutoring");
        assert_eq!(config.partitions, 12);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_builder_validates() {
        assert!(ChatConfig::builder().partitions(0).build().is_err());
        let config = ChatConfig::builder().port(9000).consumer_group("replica-a").build().unwrap();
        assert_eq!(config.consumer_group, "replica-a");
    }
}
