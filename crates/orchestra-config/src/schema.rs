// Configuration schema and types

use alloc::string::{String, ToString};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrchestraConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub reasoner: ReasonerSection,
    #[serde(default)]
    pub embedder: EmbedderSection,
    #[serde(default)]
    pub hub: HubSection,
    #[serde(default)]
    pub orchestration: OrchestrationSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub webhook: WebhookSection,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_listen_port() -> u16 {
    8005
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            otlp_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "./data/orchestra".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReasonerSection {
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
}

impl Default for ReasonerSection {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            api_key: String::new(),
            base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmbedderSection {
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_similarity_threshold() -> f32 {
    0.95
}

impl Default for EmbedderSection {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            api_key: String::new(),
            base_url: String::new(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HubSection {
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_missed_pings")]
    pub missed_pings_before_unreachable: u32,
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    #[serde(default = "default_frame_soft_limit_bytes")]
    pub frame_soft_limit_bytes: usize,
}

fn default_ping_interval_secs() -> u64 {
    15
}

fn default_missed_pings() -> u32 {
    2
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_frame_soft_limit_bytes() -> usize {
    10 * 1024
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
            missed_pings_before_unreachable: default_missed_pings(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            frame_soft_limit_bytes: default_frame_soft_limit_bytes(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrchestrationSection {
    #[serde(default = "default_health_check_grace_period_secs")]
    pub health_check_grace_period_secs: u64,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,
    #[serde(default = "default_plan_cache_retention_secs")]
    pub plan_cache_retention_secs: u64,
    #[serde(default = "default_planner_max_attempts")]
    pub planner_max_attempts: u32,
}

fn default_health_check_grace_period_secs() -> u64 {
    30 * 60
}

fn default_task_timeout_secs() -> u64 {
    30
}

fn default_overall_timeout_secs() -> u64 {
    60 * 60
}

fn default_idempotency_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_plan_cache_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_planner_max_attempts() -> u32 {
    3
}

impl Default for OrchestrationSection {
    fn default() -> Self {
        Self {
            health_check_grace_period_secs: default_health_check_grace_period_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            overall_timeout_secs: default_overall_timeout_secs(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            plan_cache_retention_secs: default_plan_cache_retention_secs(),
            planner_max_attempts: default_planner_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ratio() -> f64 {
    0.2
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WebhookSection {
    #[serde(default = "default_webhook_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_webhook_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_webhook_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_webhook_max_retries() -> u32 {
    6
}

fn default_webhook_base_delay_ms() -> u64 {
    2000
}

fn default_webhook_max_delay_ms() -> u64 {
    60_000
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            max_retries: default_webhook_max_retries(),
            base_delay_ms: default_webhook_base_delay_ms(),
            max_delay_ms: default_webhook_max_delay_ms(),
        }
    }
}

impl Default for OrchestraConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            storage: StorageSection::default(),
            reasoner: ReasonerSection::default(),
            embedder: EmbedderSection::default(),
            hub: HubSection::default(),
            orchestration: OrchestrationSection::default(),
            retry: RetrySection::default(),
            webhook: WebhookSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "config io error: {e}"),
            Self::ParseError(e) => write!(f, "config parse error: {e}"),
            Self::ValidationError(e) => write!(f, "config validation error: {e}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}
