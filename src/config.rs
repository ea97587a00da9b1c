use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub bus: BusConfig,
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
    pub filter: FilterConfig,
    pub http: HttpConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Tls,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct BusConfig {
    pub servers: Vec<String>,
    pub topic: String,
    /// Connection name shown by the server. Each binary has its own default.
    pub client_id: Option<String>,
    /// Stream replicas that must persist a message before it is acknowledged.
    pub replicas: usize,
    pub security_protocol: SecurityProtocol,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub connect_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            topic: "truck-telemetry".to_string(),
            client_id: None,
            replicas: 1,
            security_protocol: SecurityProtocol::Plaintext,
            username: None,
            password: None,
            token: None,
            connect_timeout_ms: 5000,
        }
    }
}

impl BusConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn client_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.client_id.as_deref().unwrap_or(fallback)
    }
}

// Credentials stay out of logs.
impl fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("BusConfig")
            .field("servers", &self.servers)
            .field("topic", &self.topic)
            .field("client_id", &self.client_id)
            .field("replicas", &self.replicas)
            .field("security_protocol", &self.security_protocol)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("token", &redact(&self.token))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProducerConfig {
    /// Source tag stamped on every envelope.
    pub source: String,
    pub api_url: String,
    pub poll_interval_secs: u64,
    pub fetch_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub flush_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            source: "truck-poller".to_string(),
            api_url: "http://localhost/trucks/sample".to_string(),
            poll_interval_secs: 10,
            fetch_timeout_ms: 30_000,
            send_timeout_ms: 10_000,
            max_retries: 3,
            retry_backoff_ms: 1000,
            flush_timeout_ms: 10_000,
        }
    }
}

impl ProducerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliverFrom {
    #[default]
    Earliest,
    Latest,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Consumer group. Each consuming binary has its own default.
    pub group_id: Option<String>,
    pub batch_size: usize,
    pub poll_wait_ms: u64,
    pub commit_interval_ms: u64,
    pub deliver_from: DeliverFrom,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: None,
            batch_size: 100,
            poll_wait_ms: 1000,
            commit_interval_ms: 5000,
            deliver_from: DeliverFrom::Earliest,
        }
    }
}

impl ConsumerConfig {
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }

    pub fn group<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.group_id.as_deref().unwrap_or(fallback)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub target_topic: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            target_topic: "eda-topic".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HttpConfig {
    /// Health and metrics are only served when a port is configured.
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            // 1. Project config, e.g. config/haul-telemetry.toml
            .add_source(File::with_name("config/haul-telemetry").required(false))
            // 2. Local overrides (not checked in)
            .add_source(File::with_name("config/local").required(false))
            // 3. Environment, e.g. HAUL_BUS__SERVERS=nats://a:4222,nats://b:4222
            .add_source(
                Environment::with_prefix("HAUL")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("bus.servers")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let servers: Vec<&String> = self.bus.servers.iter().filter(|s| !s.trim().is_empty()).collect();
        if servers.is_empty() {
            return Err(ConfigError::Message("bus.servers must list at least one address".into()));
        }
        if self.bus.topic.trim().is_empty() {
            return Err(ConfigError::Message("bus.topic must not be empty".into()));
        }
        if self.bus.replicas == 0 {
            return Err(ConfigError::Message("bus.replicas must be at least 1".into()));
        }
        if self.producer.poll_interval_secs == 0 {
            return Err(ConfigError::Message("producer.poll_interval_secs must be positive".into()));
        }
        if self.consumer.batch_size == 0 {
            return Err(ConfigError::Message("consumer.batch_size must be positive".into()));
        }
        if self.consumer.commit_interval_ms == 0 {
            return Err(ConfigError::Message("consumer.commit_interval_ms must be positive".into()));
        }
        url::Url::parse(&self.producer.api_url).map_err(|e| {
            ConfigError::Message(format!("producer.api_url '{}' is not a URL: {}", self.producer.api_url, e))
        })?;
        Ok(())
    }
}
