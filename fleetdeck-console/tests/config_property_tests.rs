use fleetdeck_console::config::{
    AuthConfig, ConfigError, ConsoleConfig, LogConfig, ReconnectConfig,
};
use fleetdeck_console::persistence::{self, PersistedState};
use fleetdeck_filter::parse;
use proptest::prelude::*;
use std::io::Write;

fn base_config() -> ConsoleConfig {
    ConsoleConfig {
        ws_endpoint: "ws://localhost:5240/ws".to_string(),
        auth: AuthConfig {
            session_id: Some("test-session".to_string()),
            csrf_token: None,
        },
        request_timeout_ms: 5_000,
        ping_interval_ms: 50_000,
        state_path: "tmp/fleetdeck-state.json".into(),
        log: LogConfig {
            filter: "info".to_string(),
            json: false,
        },
        reconnect: ReconnectConfig {
            initial_ms: 250,
            max_ms: 5_000,
            multiplier: 1.5,
            jitter_ms: 100,
        },
    }
}

fn invalid_field(config: &ConsoleConfig) -> Option<&'static str> {
    match config.validate() {
        Err(ConfigError::InvalidValue { field, .. }) => Some(field),
        _ => None,
    }
}

#[test]
fn config_base_is_valid() {
    assert!(base_config().validate().is_ok());
}

#[test]
fn config_requires_auth() {
    let mut config = base_config();
    config.auth = AuthConfig {
        session_id: None,
        csrf_token: Some("  ".to_string()),
    };
    assert_eq!(invalid_field(&config), Some("auth"));

    config.auth.csrf_token = Some("token".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn config_requires_ws_scheme() {
    let mut config = base_config();
    config.ws_endpoint = "http://localhost:5240/ws".to_string();
    assert_eq!(invalid_field(&config), Some("ws_endpoint"));
    config.ws_endpoint = " ".to_string();
    assert_eq!(invalid_field(&config), Some("ws_endpoint"));
    config.ws_endpoint = "wss://fleet.example.net/ws".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn config_rejects_zero_intervals() {
    let mut config = base_config();
    config.request_timeout_ms = 0;
    assert_eq!(invalid_field(&config), Some("request_timeout_ms"));

    let mut config = base_config();
    config.ping_interval_ms = 0;
    assert_eq!(invalid_field(&config), Some("ping_interval_ms"));
}

#[test]
fn config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
ws_endpoint = "ws://10.0.0.2:5240/ws"
request_timeout_ms = 2000
ping_interval_ms = 50000
state_path = "state.json"

[auth]
csrf_token = "tok"

[log]
filter = "debug"
json = true

[reconnect]
initial_ms = 100
max_ms = 100
multiplier = 1.0
jitter_ms = 0
"#
    )
    .unwrap();

    let config = ConsoleConfig::load(Some(file.path().to_path_buf())).unwrap();
    assert_eq!(config.ws_endpoint, "ws://10.0.0.2:5240/ws");
    assert!(config.log.json);
    assert_eq!(config.reconnect.max_ms, 100);
}

#[test]
fn config_load_validates() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
ws_endpoint = "ws://10.0.0.2:5240/ws"
request_timeout_ms = 2000
ping_interval_ms = 50000
state_path = "state.json"

[auth]

[log]
filter = "debug"
json = false

[reconnect]
initial_ms = 100
max_ms = 100
multiplier = 1.0
jitter_ms = 0
"#
    )
    .unwrap();

    assert!(matches!(
        ConsoleConfig::load(Some(file.path().to_path_buf())),
        Err(ConfigError::InvalidValue { field: "auth", .. })
    ));
}

#[test]
fn config_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(matches!(
        ConsoleConfig::load(Some(missing)),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn persisted_searches_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");
    assert!(persistence::load(&path).unwrap().is_none());

    let mut state = PersistedState::default();
    state.remember("machine", &parse("rack zone:(lab) !tags:(old)"));
    state.remember("zone", &parse("default"));
    persistence::save(&path, &state).unwrap();

    let loaded = persistence::load(&path).unwrap().unwrap();
    assert_eq!(loaded, state);
    assert_eq!(
        loaded.recall("machine"),
        Some(parse("rack zone:(lab) !tags:(old)"))
    );
}

proptest! {
    #[test]
    fn reconnect_config_validation(initial in 1u64..1000, max_delta in 0u64..2000, multiplier in 1.0f64..4.0f64) {
        let mut config = base_config();
        config.reconnect = ReconnectConfig {
            initial_ms: initial,
            max_ms: initial + max_delta,
            multiplier,
            jitter_ms: 50,
        };
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_reconnect_config_rejected(multiplier in 0.0f64..1.0f64, initial in 0u64..10) {
        let mut config = base_config();
        config.reconnect = ReconnectConfig {
            initial_ms: initial,
            max_ms: initial,
            multiplier,
            jitter_ms: 0,
        };
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn max_below_initial_rejected(initial in 2u64..1000, shortfall in 1u64..1000) {
        let mut config = base_config();
        config.reconnect.initial_ms = initial;
        config.reconnect.max_ms = initial.saturating_sub(shortfall);
        prop_assume!(config.reconnect.max_ms < initial);
        prop_assert_eq!(invalid_field(&config), Some("reconnect.max_ms"));
    }
}
