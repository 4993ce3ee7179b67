use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::pipeline::SupervisorOptions;
use crate::providers::yandex::{ClientTimeouts, DEFAULT_ENDPOINT};
use crate::translation::RetryPolicy;
use crate::translation::credentials::MAX_CREDENTIALS;

/// Application configuration module
/// This module holds the worker configuration: broker connection, translation
/// endpoint and pipeline settings, with their defaults and validation.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Broker connection and topics
    pub broker: BrokerConfig,

    /// Translation endpoint and credentials
    pub translation: TranslationConfig,

    /// Pipeline shutdown and housekeeping
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// SASL PLAIN credentials for the broker
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    pub username: String,
    pub password: String,
}

/// Broker connection settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrokerConfig {
    /// Broker host, or a comma-separated list of hosts
    pub host: String,

    /// Port appended to every host that has none
    #[serde(default = "default_port")]
    pub port: u16,

    /// Consumer group name
    pub group_id: String,

    /// Topics the reviews are consumed from
    pub source_topics: Vec<String>,

    /// Topics for translated reviews, only the first one is used
    pub destination_topics: Vec<String>,

    /// Broker protocol version, `major.minor.patch[.build]`
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional SASL PLAIN authentication
    #[serde(default)]
    pub sasl: Option<SaslCredentials>,

    /// Time a publish may wait for the broker acknowledgment
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Network request timeout of the broker clients
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,

    /// Send retries of the producer
    #[serde(default = "default_producer_retries")]
    pub producer_retries: u32,

    /// Messages buffered per partition claim
    #[serde(default = "default_claim_buffer")]
    pub claim_buffer: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_port(),
            group_id: String::new(),
            source_topics: Vec::new(),
            destination_topics: Vec::new(),
            version: default_version(),
            sasl: None,
            send_timeout_secs: default_send_timeout_secs(),
            socket_timeout_secs: default_socket_timeout_secs(),
            producer_retries: default_producer_retries(),
            claim_buffer: default_claim_buffer(),
        }
    }
}

impl BrokerConfig {
    /// Comma-separated `host:port` list
    pub fn bootstrap_servers(&self) -> Result<String, ConfigError> {
        let hosts = split_list(&self.host);
        if hosts.is_empty() {
            return Err(ConfigError::Missing("broker host"));
        }

        let mut servers = Vec::with_capacity(hosts.len());
        for host in hosts {
            match host.rsplit_once(':') {
                Some((name, port)) => {
                    if name.is_empty() || port.parse::<u16>().is_err() {
                        return Err(ConfigError::InvalidBrokerAddress(host));
                    }
                    servers.push(host);
                }
                None => servers.push(format!("{}:{}", host, self.port)),
            }
        }

        Ok(servers.join(","))
    }

    pub fn protocol_version(&self) -> Result<ProtocolVersion, ConfigError> {
        ProtocolVersion::parse(&self.version)
    }

    /// Topic translated records are published to
    pub fn destination_topic(&self) -> Option<&str> {
        self.destination_topics.first().map(String::as_str)
    }
}

/// Translation endpoint settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API keys in fallback order
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Attempts per call on transport failures
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Whole request timeout of one attempt in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// TCP keep-alive interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_keys: Vec::new(),
            retries: default_retries(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl TranslationConfig {
    pub fn timeouts(&self) -> ClientTimeouts {
        ClientTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            request: Duration::from_secs(self.timeout_secs),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::immediate(self.retries)
    }
}

/// Pipeline settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Seconds to wait for in-flight work on shutdown, 0 waits forever
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Seconds between statistics summaries, 0 disables them
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// Milliseconds to wait before rejoining after a generation ended
    #[serde(default = "default_rejoin_backoff_ms")]
    pub rejoin_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            stats_interval_secs: default_stats_interval_secs(),
            rejoin_backoff_ms: default_rejoin_backoff_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn supervisor_options(&self) -> SupervisorOptions {
        let seconds = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

        SupervisorOptions {
            drain_timeout: seconds(self.shutdown_timeout_secs),
            stats_interval: seconds(self.stats_interval_secs),
            rejoin_backoff: Duration::from_millis(self.rejoin_backoff_ms),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Broker protocol version such as `2.1.0` or `0.10.2.1`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    parts: Vec<u32>,
}

impl ProtocolVersion {
    pub fn parse(version: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidVersion(version.to_string());

        let parts = version
            .trim()
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        if !(3..=4).contains(&parts.len()) {
            return Err(invalid());
        }
        // Versions before 1.0 are only valid as 0.8 up to 0.11.
        if parts[0] == 0 && !(8..=11).contains(&parts[1]) {
            return Err(invalid());
        }

        Ok(Self { parts })
    }

    pub fn major(&self) -> u32 {
        self.parts[0]
    }

    pub fn minor(&self) -> u32 {
        self.parts[1]
    }

    /// Brokers from 0.10.0 on answer ApiVersion requests
    pub fn supports_api_version_request(&self) -> bool {
        self.major() > 0 || self.minor() >= 10
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.parts.iter().map(u32::to_string).collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.bootstrap_servers()?;
        self.broker.protocol_version()?;

        if self.broker.group_id.trim().is_empty() {
            return Err(ConfigError::Missing("consumer group"));
        }
        if self.broker.source_topics.is_empty() {
            return Err(ConfigError::Missing("review topics"));
        }
        if self.broker.destination_topic().is_none() {
            return Err(ConfigError::Missing("translate topics"));
        }
        if let Some(sasl) = &self.broker.sasl {
            if !sasl.username.is_empty() && sasl.password.is_empty() {
                return Err(ConfigError::Missing("broker password"));
            }
        }

        if self.translation.api_keys.is_empty() {
            return Err(ConfigError::Missing("translation API key"));
        }
        if self.translation.api_keys.len() > MAX_CREDENTIALS {
            return Err(ConfigError::TooManyCredentials {
                count: self.translation.api_keys.len(),
                max: MAX_CREDENTIALS,
            });
        }
        url::Url::parse(&self.translation.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: self.translation.endpoint.clone(),
            message: e.to_string(),
        })?;

        Ok(())
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_port() -> u16 {
    9092
}

fn default_version() -> String {
    "2.1.0".to_string()
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_socket_timeout_secs() -> u64 {
    20
}

fn default_producer_retries() -> u32 {
    3
}

fn default_claim_buffer() -> usize {
    64
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_keep_alive_secs() -> u64 {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_stats_interval_secs() -> u64 {
    60
}

fn default_rejoin_backoff_ms() -> u64 {
    2000
}
