// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::sync::Arc;

use review_translator::app_config::{
    BrokerConfig, Config, LogLevel, PipelineConfig, SaslCredentials, TranslationConfig, split_list,
};
use review_translator::broker::kafka::{KafkaChannelFactory, KafkaConsumerGroup};
use review_translator::pipeline::{MessageProcessor, PipelineStats, PipelineSupervisor, Publisher};
use review_translator::providers::yandex::{DEFAULT_ENDPOINT, YandexClient};
use review_translator::translation::{CredentialRotation, TranslationService};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// Review translator
///
/// Consumes restaurant reviews from Kafka, translates them into English and
/// publishes the translated records. Every option can be given through the
/// environment variable shown in its help.
#[derive(Parser, Debug)]
#[command(name = "review-translator")]
#[command(version)]
#[command(about = "Kafka review translation worker")]
struct CommandLineOptions {
    /// Broker host, or a comma-separated list of hosts
    #[arg(long, env = "KAFKA_SERVER", default_value = "localhost")]
    kafka_server: String,

    /// Port used for hosts that do not specify one
    #[arg(long, env = "KAFKA_PORT", default_value_t = 9092)]
    kafka_port: u16,

    /// Consumer group name
    #[arg(long, env = "CONSUMER_GROUP")]
    consumer_group: String,

    /// Comma-separated topics to consume reviews from
    #[arg(long, env = "REVIEW_TOPICS")]
    review_topics: String,

    /// Comma-separated topics for translated reviews (the first one is used)
    #[arg(long, env = "TRANSLATE_TOPICS")]
    translate_topics: String,

    /// Broker protocol version
    #[arg(long, env = "KAFKA_VERSION", default_value = "2.1.0")]
    kafka_version: String,

    /// SASL PLAIN username, authentication is off when empty
    #[arg(long, env = "KAFKA_USERNAME", default_value = "")]
    kafka_username: String,

    /// SASL PLAIN password
    #[arg(long, env = "KAFKA_PASSWORD", default_value = "", hide_env_values = true)]
    kafka_password: String,

    /// First translation API key
    #[arg(long = "api-key1", env = "TRANSLATE_API_KEY1", hide_env_values = true)]
    api_key1: Option<String>,

    /// Second translation API key
    #[arg(long = "api-key2", env = "TRANSLATE_API_KEY2", hide_env_values = true)]
    api_key2: Option<String>,

    /// Third translation API key
    #[arg(long = "api-key3", env = "TRANSLATE_API_KEY3", hide_env_values = true)]
    api_key3: Option<String>,

    /// Fourth translation API key
    #[arg(long = "api-key4", env = "TRANSLATE_API_KEY4", hide_env_values = true)]
    api_key4: Option<String>,

    /// Translation endpoint
    #[arg(long, env = "TRANSLATE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    translate_endpoint: String,

    /// Attempts per translation call on transport failures
    #[arg(long, env = "TRANSLATE_RETRIES", default_value_t = 3)]
    translate_retries: u32,

    /// Seconds to wait for in-flight messages on shutdown (0 waits forever)
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    shutdown_timeout_secs: u64,

    /// Seconds between statistics summaries (0 disables them)
    #[arg(long, env = "STATS_INTERVAL_SECS", default_value_t = 60)]
    stats_interval_secs: u64,

    /// Milliseconds to wait before rejoining the group after a generation ended
    #[arg(long, env = "REJOIN_BACKOFF_MS", default_value_t = 2000)]
    rejoin_backoff_ms: u64,

    /// Set logging level
    #[arg(short, long, env = "LOG_LEVEL", value_enum, default_value = "info")]
    log_level: CliLogLevel,
}

impl CommandLineOptions {
    fn into_config(self) -> Config {
        let sasl = (!self.kafka_username.is_empty()).then(|| SaslCredentials {
            username: self.kafka_username,
            password: self.kafka_password,
        });

        let api_keys = [self.api_key1, self.api_key2, self.api_key3, self.api_key4]
            .into_iter()
            .flatten()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();

        Config {
            broker: BrokerConfig {
                host: self.kafka_server,
                port: self.kafka_port,
                group_id: self.consumer_group,
                source_topics: split_list(&self.review_topics),
                destination_topics: split_list(&self.translate_topics),
                version: self.kafka_version,
                sasl,
                ..BrokerConfig::default()
            },
            translation: TranslationConfig {
                endpoint: self.translate_endpoint,
                api_keys,
                retries: self.translate_retries,
                ..TranslationConfig::default()
            },
            pipeline: PipelineConfig {
                shutdown_timeout_secs: self.shutdown_timeout_secs,
                stats_interval_secs: self.stats_interval_secs,
                rejoin_backoff_ms: self.rejoin_backoff_ms,
            },
            log_level: self.log_level.into(),
        }
    }
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Fixed-width tag and color for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("ERROR", "1;31"),
            Level::Warn => ("WARN ", "1;33"),
            Level::Info => ("INFO ", "1;32"),
            Level::Debug => ("DEBUG", "1;36"),
            Level::Trace => ("TRACE", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            let (tag, color) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, tag, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Completes on SIGINT or SIGTERM
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = CommandLineOptions::parse();
    let config = options.into_config();

    CustomLogger::init(config.log_level.to_level_filter())?;

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    let destination = config
        .broker
        .destination_topic()
        .ok_or_else(|| anyhow!("No destination topic configured"))?
        .to_string();
    if config.broker.destination_topics.len() > 1 {
        warn!(
            "Only the first translate topic is used, ignoring {:?}",
            &config.broker.destination_topics[1..]
        );
    }

    let provider = YandexClient::new(
        &config.translation.endpoint,
        config.translation.timeouts(),
        config.translation.retry_policy(),
    )
    .context("Failed to create translation client")?;
    let credentials =
        CredentialRotation::new(config.translation.api_keys.clone()).context("Invalid translation API keys")?;
    let translator = TranslationService::new(Arc::new(provider), Arc::new(credentials));

    let channels = KafkaChannelFactory::new(&config.broker).context("Invalid producer configuration")?;
    let group = KafkaConsumerGroup::new(&config.broker).context("Error creating consumer group client")?;

    let processor = MessageProcessor::new(
        translator,
        Publisher::new(Arc::new(channels)),
        destination.clone(),
        Arc::new(PipelineStats::new()),
    );

    info!(
        "Translating {:?} into '{}' as group '{}' ({} API key(s))",
        config.broker.source_topics,
        destination,
        config.broker.group_id,
        config.translation.api_keys.len()
    );

    let supervisor = PipelineSupervisor::new(
        Arc::new(group),
        processor,
        config.broker.source_topics.clone(),
        config.pipeline.supervisor_options(),
    );

    supervisor.run(shutdown_signal()).await?;
    Ok(())
}
