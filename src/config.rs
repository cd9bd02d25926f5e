//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). The device catalog is either read from
//! the YAML file named by `DEVICES_FILE` or built in.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;

use crate::domain::{ActionKind, DeviceDescriptor, DeviceId, RemoteEndpoint};
use crate::relay::{InboundPolicy, RelayOptions};
use crate::ws::ConnectionSettings;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Spark Cloud credentials for the built-in `spark` device.
#[derive(Debug, Clone)]
pub struct SparkCredentials {
    /// Spark Core device id.
    pub device_id: String,
    /// Spark Cloud access token.
    pub access_token: SecretString,
}

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// YAML device catalog. `None` selects the built-in catalog.
    pub devices_file: Option<PathBuf>,

    /// Adds the `spark` device to the built-in catalog when present.
    pub spark: Option<SparkCredentials>,

    /// Capacity of each subscriber's send queue.
    pub subscriber_queue_capacity: usize,

    /// Consecutive full-queue messages before a subscriber is evicted.
    pub subscriber_max_strikes: u32,

    /// Milliseconds allowed for writing one frame to a socket.
    pub subscriber_send_timeout_ms: u64,

    /// Seconds between server pings.
    pub ping_interval_secs: u64,

    /// Seconds allowed for an outbound device-API call.
    pub outbound_timeout_secs: u64,

    /// Surface failed outbound calls to the caller instead of swallowing
    /// them.
    pub outbound_failures_visible: bool,

    /// Handling of raw messages clients send on their socket.
    pub inbound_policy: InboundPolicy,

    /// Log output format.
    pub log_format: LogFormat,
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set or a numeric or
    /// boolean value cannot be parsed.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` or `RELAY_INBOUND_POLICY` is set
    /// but invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("LISTEN_ADDR is not a socket address")?;

        let devices_file = std::env::var_os("DEVICES_FILE").map(PathBuf::from);

        let spark = match (
            std::env::var("SPARK_DEVICE_ID"),
            std::env::var("SPARK_ACCESS_TOKEN"),
        ) {
            (Ok(device_id), Ok(token)) => Some(SparkCredentials {
                device_id,
                access_token: SecretString::from(token),
            }),
            _ => None,
        };

        let inbound_policy = match std::env::var("RELAY_INBOUND_POLICY") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("RELAY_INBOUND_POLICY={raw}"))?,
            Err(_) => InboundPolicy::default(),
        };

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            devices_file,
            spark,
            subscriber_queue_capacity: parse_env("SUBSCRIBER_QUEUE_CAPACITY", 64),
            subscriber_max_strikes: parse_env("SUBSCRIBER_MAX_STRIKES", 3),
            subscriber_send_timeout_ms: parse_env("SUBSCRIBER_SEND_TIMEOUT_MS", 5_000),
            ping_interval_secs: parse_env("PING_INTERVAL_SECS", 30),
            outbound_timeout_secs: parse_env("OUTBOUND_TIMEOUT_SECS", 5),
            outbound_failures_visible: parse_env_bool("OUTBOUND_FAILURES_VISIBLE", false),
            inbound_policy,
            log_format,
        })
    }

    /// Options for the broadcast relay.
    #[must_use]
    pub const fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            max_strikes: self.subscriber_max_strikes,
            inbound_policy: self.inbound_policy,
        }
    }

    /// Settings applied to each WebSocket connection.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            queue_capacity: self.subscriber_queue_capacity,
            send_timeout: Duration::from_millis(self.subscriber_send_timeout_ms),
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
        }
    }

    /// Timeout for outbound device-API calls. Never shorter than one
    /// second.
    #[must_use]
    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.outbound_timeout_secs.max(1))
    }

    /// Loads the device catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if `DEVICES_FILE` cannot be read or parsed, or the
    /// built-in catalog cannot be assembled.
    pub fn load_devices(&self) -> anyhow::Result<Vec<DeviceDescriptor>> {
        match &self.devices_file {
            Some(path) => load_catalog_file(path),
            None => builtin_devices(self.spark.as_ref()),
        }
    }
}

/// On-disk device catalog.
#[derive(Debug, Deserialize)]
struct DeviceCatalog {
    devices: Vec<DeviceDescriptor>,
}

/// Parses a YAML device catalog.
///
/// # Errors
///
/// Returns an error on malformed YAML, an invalid device id, an empty
/// catalog, or a device without an `OFF` action.
pub fn parse_catalog(yaml: &str) -> anyhow::Result<Vec<DeviceDescriptor>> {
    let catalog: DeviceCatalog = serde_yaml::from_str(yaml).context("malformed device catalog")?;
    if catalog.devices.is_empty() {
        bail!("device catalog is empty");
    }
    for device in &catalog.devices {
        device.validate()?;
    }
    Ok(catalog.devices)
}

fn load_catalog_file(path: &Path) -> anyhow::Result<Vec<DeviceDescriptor>> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("reading device catalog {}", path.display()))?;
    parse_catalog(&yaml).with_context(|| format!("in {}", path.display()))
}

/// The boards the firmware in this project targets.
///
/// # Errors
///
/// Returns an error only if a built-in id or descriptor is invalid.
pub fn builtin_devices(spark: Option<&SparkCredentials>) -> anyhow::Result<Vec<DeviceDescriptor>> {
    let mut devices = vec![
        broadcast_device("mbed", "FRDM-K64F LED strip", "mbed", "https://developer.mbed.org")?,
        broadcast_device("cc3200", "CC3200 LaunchPad", "Energia", "http://energia.nu")?,
    ];
    if let Some(spark) = spark {
        let url = format!("https://api.spark.io/v1/devices/{}/mode", spark.device_id);
        let mut actions = IndexMap::new();
        for (name, mode) in [("ON", "ROTATE_HUE"), ("OFF", "OFF")] {
            actions.insert(
                name.to_string(),
                ActionKind::RemoteCall(RemoteEndpoint {
                    url: url.clone(),
                    token: spark.access_token.clone(),
                    mode: mode.to_string(),
                }),
            );
        }
        devices.push(DeviceDescriptor::new(
            DeviceId::new("spark")?,
            "Spark Core",
            "Spark",
            "https://www.spark.io",
            actions,
        )?);
    }
    Ok(devices)
}

fn broadcast_device(
    id: &str,
    display_name: &str,
    tooling_name: &str,
    tooling_url: &str,
) -> anyhow::Result<DeviceDescriptor> {
    let mut actions = IndexMap::new();
    for name in ["ON", "OFF"] {
        actions.insert(
            name.to_string(),
            ActionKind::LocalBroadcast {
                message: format!("{id}_{name}"),
            },
        );
    }
    Ok(DeviceDescriptor::new(
        DeviceId::new(id)?,
        display_name,
        tooling_name,
        tooling_url,
        actions,
    )?)
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::io::Write;

    use super::*;

    const CATALOG: &str = r#"
devices:
  - id: mbed
    display_name: FRDM-K64F LED strip
    tooling_name: mbed
    tooling_url: https://developer.mbed.org
    actions:
      ON:  { kind: local_broadcast, message: mbed_ON }
      OFF: { kind: local_broadcast, message: mbed_OFF }
  - id: spark
    display_name: Spark Core
    actions:
      ON:  { kind: remote_call, url: "https://api.spark.io/v1/devices/abc/mode", token: "tok", mode: ROTATE_HUE }
      OFF: { kind: remote_call, url: "https://api.spark.io/v1/devices/abc/mode", token: "tok", mode: "OFF" }
"#;

    #[test]
    fn catalog_parses_in_order() {
        let Ok(devices) = parse_catalog(CATALOG) else {
            panic!("catalog should parse");
        };
        let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["mbed", "spark"]);
        let Some(spark) = devices.get(1) else {
            panic!("spark missing");
        };
        assert!(spark.tooling_name.is_empty());
        assert!(matches!(spark.action("OFF"), Some(ActionKind::RemoteCall(_))));
    }

    #[test]
    fn catalog_rejects_missing_off() {
        let yaml = r#"
devices:
  - id: lamp
    display_name: Lamp
    actions:
      ON: { kind: local_broadcast, message: lamp_ON }
"#;
        assert!(parse_catalog(yaml).is_err());
    }

    #[test]
    fn catalog_rejects_bad_id_and_empty() {
        let yaml = r#"
devices:
  - id: my_lamp
    display_name: Lamp
    actions:
      OFF: { kind: local_broadcast, message: x }
"#;
        assert!(parse_catalog(yaml).is_err());
        assert!(parse_catalog("devices: []").is_err());
        assert!(parse_catalog("not: [valid").is_err());
    }

    #[test]
    fn catalog_file_is_read() {
        let Ok(mut file) = tempfile::NamedTempFile::new() else {
            panic!("tempfile");
        };
        let _ = file.write_all(CATALOG.as_bytes());
        let Ok(devices) = load_catalog_file(file.path()) else {
            panic!("catalog file should load");
        };
        assert_eq!(devices.len(), 2);
        assert!(load_catalog_file(Path::new("/nonexistent/devices.yaml")).is_err());
    }

    #[test]
    fn builtin_catalog_without_spark() {
        let Ok(devices) = builtin_devices(None) else {
            panic!("builtin catalog");
        };
        let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["mbed", "cc3200"]);
        let Some(mbed) = devices.first() else {
            panic!("mbed missing");
        };
        assert!(matches!(
            mbed.action("ON"),
            Some(ActionKind::LocalBroadcast { message }) if message == "mbed_ON"
        ));
    }

    #[test]
    fn builtin_catalog_with_spark() {
        let creds = SparkCredentials {
            device_id: "core42".to_string(),
            access_token: SecretString::from("tok"),
        };
        let Ok(devices) = builtin_devices(Some(&creds)) else {
            panic!("builtin catalog");
        };
        let Some(spark) = devices.last() else {
            panic!("spark missing");
        };
        assert_eq!(spark.id.as_str(), "spark");
        assert!(matches!(
            spark.action("ON"),
            Some(ActionKind::RemoteCall(RemoteEndpoint { url, mode, .. }))
                if url.ends_with("/core42/mode") && mode == "ROTATE_HUE"
        ));
    }

    fn zeroed_config() -> RelayConfig {
        let Ok(listen_addr) = "127.0.0.1:0".parse() else {
            panic!("addr");
        };
        RelayConfig {
            listen_addr,
            devices_file: None,
            spark: None,
            subscriber_queue_capacity: 0,
            subscriber_max_strikes: 0,
            subscriber_send_timeout_ms: 0,
            ping_interval_secs: 0,
            outbound_timeout_secs: 0,
            outbound_failures_visible: false,
            inbound_policy: InboundPolicy::default(),
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn zero_durations_are_clamped() {
        let config = zeroed_config();
        assert_eq!(config.outbound_timeout(), Duration::from_secs(1));
        assert_eq!(config.connection_settings().ping_interval, Duration::from_secs(1));
    }
}
