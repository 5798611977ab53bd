// orchestra-config/src/env.rs
// Environment variable parsing and override support

use alloc::string::{String, ToString};
use alloc::collections::BTreeMap;
use crate::schema::OrchestraConfig;

#[cfg(feature = "std")]
use std::env;

/// Load `ORCH_`-prefixed environment variables into a normalized map.
///
/// Format: `ORCH_<SECTION>_<KEY>`, e.g. `ORCH_SERVER_LISTEN_PORT=9000`,
/// `ORCH_REASONER_API_KEY=sk-...`.
#[cfg(feature = "std")]
pub fn load_env_config() -> BTreeMap<String, String> {
    let mut env_config = BTreeMap::new();
    for (key, value) in env::vars() {
        if let Some(rest) = key.strip_prefix("ORCH_") {
            env_config.insert(rest.to_lowercase(), value);
        }
    }
    env_config
}

#[cfg(not(feature = "std"))]
pub fn load_env_config() -> BTreeMap<String, String> {
    BTreeMap::new()
}

/// Apply environment variable overrides onto a loaded config. Env always wins
/// over the config file, per the loading hierarchy documented in `load_config`.
#[cfg(feature = "std")]
pub fn apply_env_overrides(config: &mut OrchestraConfig, env_vars: &BTreeMap<String, String>) {
    macro_rules! str_override {
        ($key:expr, $field:expr) => {
            if let Some(v) = env_vars.get($key) {
                $field = v.clone();
            }
        };
    }
    macro_rules! parsed_override {
        ($key:expr, $field:expr) => {
            if let Some(v) = env_vars.get($key) {
                if let Ok(parsed) = v.parse() {
                    $field = parsed;
                }
            }
        };
    }

    parsed_override!("server_listen_port", config.server.listen_port);
    if let Some(v) = env_vars.get("server_otlp_endpoint") {
        config.server.otlp_endpoint = Some(v.clone());
    }
    str_override!("storage_path", config.storage.path);

    str_override!("reasoner_model_id", config.reasoner.model_id);
    str_override!("reasoner_api_key", config.reasoner.api_key);
    str_override!("reasoner_base_url", config.reasoner.base_url);

    str_override!("embedder_model_id", config.embedder.model_id);
    str_override!("embedder_api_key", config.embedder.api_key);
    str_override!("embedder_base_url", config.embedder.base_url);
    parsed_override!("embedder_similarity_threshold", config.embedder.similarity_threshold);

    parsed_override!("hub_ping_interval_secs", config.hub.ping_interval_secs);
    parsed_override!(
        "hub_missed_pings_before_unreachable",
        config.hub.missed_pings_before_unreachable
    );
    parsed_override!("hub_outbound_queue_capacity", config.hub.outbound_queue_capacity);
    parsed_override!("hub_frame_soft_limit_bytes", config.hub.frame_soft_limit_bytes);

    parsed_override!(
        "orchestration_health_check_grace_period_secs",
        config.orchestration.health_check_grace_period_secs
    );
    parsed_override!("orchestration_task_timeout_secs", config.orchestration.task_timeout_secs);
    parsed_override!(
        "orchestration_overall_timeout_secs",
        config.orchestration.overall_timeout_secs
    );
    parsed_override!(
        "orchestration_idempotency_ttl_secs",
        config.orchestration.idempotency_ttl_secs
    );
    parsed_override!(
        "orchestration_plan_cache_retention_secs",
        config.orchestration.plan_cache_retention_secs
    );
    parsed_override!(
        "orchestration_planner_max_attempts",
        config.orchestration.planner_max_attempts
    );

    parsed_override!("retry_max_retries", config.retry.max_retries);
    parsed_override!("retry_base_delay_ms", config.retry.base_delay_ms);
    parsed_override!("retry_backoff_factor", config.retry.backoff_factor);
    parsed_override!("retry_max_delay_ms", config.retry.max_delay_ms);
    parsed_override!("retry_jitter_ratio", config.retry.jitter_ratio);

    parsed_override!("webhook_max_retries", config.webhook.max_retries);
    parsed_override!("webhook_base_delay_ms", config.webhook.base_delay_ms);
    parsed_override!("webhook_max_delay_ms", config.webhook.max_delay_ms);
}

#[cfg(not(feature = "std"))]
pub fn apply_env_overrides(_config: &mut OrchestraConfig, _env_vars: &BTreeMap<String, String>) {}
