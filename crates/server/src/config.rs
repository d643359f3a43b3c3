use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tessera_modeler::ModelerConfig;

/// Top-level configuration for the Tessera server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct TesseraConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Modeling loop tunables.
    #[serde(default)]
    pub modeler: ModelerFileConfig,
    /// Daily statistics retention.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// `OpenTelemetry` distributed tracing configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// HTTP server bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

/// Configuration for the state store backend.
#[derive(Debug, Deserialize)]
pub struct StateConfig {
    /// Which backend to use: `"memory"` or `"redis"`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Connection URL for the backend (e.g. `redis://localhost:6379`).
    pub url: Option<String>,

    /// Key prefix for backends that support it. Defaults to `"tessera"`.
    pub prefix: Option<String>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { backend: default_backend(), url: None, prefix: None }
    }
}

fn default_backend() -> String {
    "memory".to_owned()
}

/// TOML-level modeling settings. Durations are seconds; the conversion to
/// [`ModelerConfig`] happens once at startup.
#[derive(Debug, Deserialize)]
pub struct ModelerFileConfig {
    /// Business floor for the forecasted daily limit.
    #[serde(default = "default_min_value")]
    pub min_value: u64,
    /// Business ceiling for the forecasted daily limit.
    #[serde(default = "default_max_value")]
    pub max_value: u64,
    /// Days of issuance history fed into the trend fit.
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: u32,
    /// Maximum qualifying days in the claimed-ratio window.
    #[serde(default = "default_anomaly_window_days")]
    pub anomaly_window_days: usize,
    /// Complete days of history required before a realm is modeled.
    #[serde(default = "default_min_history_days")]
    pub min_history_days: usize,
    /// Minimum seconds between successful runs across all replicas.
    #[serde(default = "default_min_period_seconds")]
    pub min_period_seconds: u64,
    /// How far back the stats accessor scans for daily samples.
    #[serde(default = "default_history_scan_days")]
    pub history_scan_days: u32,
    /// Optional per-run wall-clock budget in seconds.
    pub run_deadline_seconds: Option<u64>,
}

impl ModelerFileConfig {
    /// Convert the TOML representation into the modeler's config.
    #[must_use]
    pub fn to_modeler_config(&self) -> ModelerConfig {
        ModelerConfig {
            min_value: self.min_value,
            max_value: self.max_value,
            trend_window_days: self.trend_window_days,
            anomaly_window_days: self.anomaly_window_days,
            min_history_days: self.min_history_days,
            min_period: Duration::from_secs(self.min_period_seconds),
            history_scan_days: self.history_scan_days,
            run_deadline: self.run_deadline_seconds.map(Duration::from_secs),
        }
    }
}

impl Default for ModelerFileConfig {
    fn default() -> Self {
        Self {
            min_value: default_min_value(),
            max_value: default_max_value(),
            trend_window_days: default_trend_window_days(),
            anomaly_window_days: default_anomaly_window_days(),
            min_history_days: default_min_history_days(),
            min_period_seconds: default_min_period_seconds(),
            history_scan_days: default_history_scan_days(),
            run_deadline_seconds: None,
        }
    }
}

fn default_min_value() -> u64 {
    10
}

fn default_max_value() -> u64 {
    20_000
}

fn default_trend_window_days() -> u32 {
    21
}

fn default_anomaly_window_days() -> usize {
    30
}

fn default_min_history_days() -> usize {
    14
}

fn default_min_period_seconds() -> u64 {
    3600
}

fn default_history_scan_days() -> u32 {
    90
}

/// Daily statistics retention configuration.
#[derive(Debug, Deserialize)]
pub struct RetentionConfig {
    /// Whether the background stats sweeper runs.
    #[serde(default = "default_retention_enabled")]
    pub enabled: bool,
    /// Days of daily stat counters to keep.
    #[serde(default = "default_stats_retention_days")]
    pub stats_retention_days: u32,
    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_retention_enabled(),
            stats_retention_days: default_stats_retention_days(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

fn default_retention_enabled() -> bool {
    true
}

fn default_stats_retention_days() -> u32 {
    120
}

fn default_sweep_interval_seconds() -> u64 {
    6 * 60 * 60
}

/// Configuration for `OpenTelemetry` distributed tracing.
///
/// When enabled, Tessera exports trace spans via OTLP to a collector
/// (Jaeger, Grafana Tempo, etc.), covering the trigger endpoint and the
/// full modeling pipeline behind it.
#[derive(Debug, Deserialize)]
pub struct TelemetryConfig {
    /// Whether `OpenTelemetry` tracing is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// OTLP exporter endpoint.
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    /// Service name reported in traces.
    #[serde(default = "default_otel_service_name")]
    pub service_name: String,
    /// Sampling ratio (0.0 to 1.0). `1.0` traces every request.
    #[serde(default = "default_otel_sample_ratio")]
    pub sample_ratio: f64,
    /// OTLP transport protocol: `"grpc"` or `"http"`.
    #[serde(default = "default_otel_protocol")]
    pub protocol: String,
    /// Exporter timeout in seconds.
    #[serde(default = "default_otel_timeout")]
    pub timeout_seconds: u64,
    /// Additional resource attributes as `key=value` pairs.
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_otel_service_name(),
            sample_ratio: default_otel_sample_ratio(),
            protocol: default_otel_protocol(),
            timeout_seconds: default_otel_timeout(),
            resource_attributes: HashMap::new(),
        }
    }
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_owned()
}

fn default_otel_service_name() -> String {
    "tessera".to_owned()
}

fn default_otel_sample_ratio() -> f64 {
    1.0
}

fn default_otel_protocol() -> String {
    "grpc".to_owned()
}

fn default_otel_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: TesseraConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.state.backend, "memory");
        assert!(config.retention.enabled);
        assert_eq!(config.retention.stats_retention_days, 120);
        assert!(!config.telemetry.enabled);

        let modeler = config.modeler.to_modeler_config();
        assert_eq!(modeler.min_value, 10);
        assert_eq!(modeler.max_value, 20_000);
        assert_eq!(modeler.min_period, Duration::from_secs(3600));
        assert!(modeler.run_deadline.is_none());
    }

    #[test]
    fn full_document_parses() {
        let raw = r#"
            [server]
            host = "0.0.0.0"
            port = 9090

            [state]
            backend = "redis"
            url = "redis://cache.internal:6379"
            prefix = "tessera-prod"

            [modeler]
            min_value = 25
            max_value = 50000
            trend_window_days = 28
            min_period_seconds = 7200
            run_deadline_seconds = 600

            [retention]
            enabled = false
            stats_retention_days = 30

            [telemetry]
            enabled = true
            endpoint = "http://otel.internal:4317"
            sample_ratio = 0.25
        "#;
        let config: TesseraConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.state.backend, "redis");
        assert_eq!(config.state.prefix.as_deref(), Some("tessera-prod"));
        assert!(!config.retention.enabled);
        assert_eq!(config.retention.stats_retention_days, 30);
        assert!(config.telemetry.enabled);
        assert!((config.telemetry.sample_ratio - 0.25).abs() < f64::EPSILON);

        let modeler = config.modeler.to_modeler_config();
        assert_eq!(modeler.min_value, 25);
        assert_eq!(modeler.max_value, 50_000);
        assert_eq!(modeler.trend_window_days, 28);
        assert_eq!(modeler.min_period, Duration::from_secs(7200));
        assert_eq!(modeler.run_deadline, Some(Duration::from_secs(600)));
        // Unspecified fields keep their defaults.
        assert_eq!(modeler.anomaly_window_days, 30);
        assert_eq!(modeler.min_history_days, 14);
    }
}
