// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the intercom configuration system.

use intercom_config::diagnostic::ConfigError;
use intercom_config::model::IntercomConfig;
use intercom_config::{load_and_validate_str, load_config_from_str};
use serial_test::serial;

/// Valid TOML with every section deserializes successfully.
#[test]
fn full_toml_deserializes() {
    let toml = r#"
[logging]
level = "debug"

[server]
host = "0.0.0.0"
port = 8080
bearer_token = "s3cret"

[storage]
database_path = "/tmp/intercom-test.db"
wal_mode = false

[tokens]
app_id = "app-1"
app_certificate = "cert"
default_ttl_secs = 600
max_ttl_secs = 7200

[calls]
history_default_limit = 20
history_max_limit = 100
ringing_timeout_secs = 60
sweep_interval_secs = 0
default_schema_version = 2

[client]
api_base_url = "https://intercom.example"
renewal_lead_secs = 45
idle_grace_ms = 1500
ringing_timeout_secs = 30
invite_poll_interval_ms = 2000
request_timeout_secs = 5
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should load");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.bearer_token.as_deref(), Some("s3cret"));
    assert!(!config.storage.wal_mode);
    assert_eq!(config.tokens.max_ttl_secs, 7200);
    assert_eq!(config.calls.default_schema_version, 2);
    assert_eq!(config.calls.sweep_interval_secs, 0);
    assert_eq!(config.client.idle_grace_ms, 1500);
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("[server]\nport = 9000\n").expect("should load");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.tokens.default_ttl_secs, 300);
    assert_eq!(config.client.renewal_lead_secs, 30);
    assert_eq!(config.calls.history_default_limit, 50);
}

#[test]
fn unknown_key_suggests_correction() {
    let toml = r#"
[server]
prot = 3001
"#;
    let errors = load_and_validate_str(toml).expect_err("unknown key must fail");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, span, .. } if {
            key == "prot"
                && suggestion.as_deref() == Some("port")
                && valid_keys.contains("bearer_token")
                && span.is_some()
        })
    });
    assert!(found, "expected UnknownKey for `prot`, got {errors:?}");
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let errors = load_and_validate_str("[telemetry]\nenabled = true\n")
        .expect_err("unknown section must fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownKey { key, .. } if key == "telemetry"))
    );
}

#[test]
fn invalid_type_names_the_key() {
    let errors = load_and_validate_str("[server]\nport = \"eighty\"\n")
        .expect_err("string port must fail");
    let found = errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key == "server.port"));
    assert!(found, "got {errors:?}");
}

#[test]
fn validation_errors_are_reported_after_parse() {
    let toml = r#"
[tokens]
default_ttl_secs = 900
max_ttl_secs = 600
"#;
    let errors = load_and_validate_str(toml).expect_err("ttl ordering must fail");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("max_ttl_secs"))
    ));
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "prot".to_string(),
        suggestion: Some("port".to_string()),
        valid_keys: "host, port, bearer_token".to_string(),
        span: None,
        src: None,
    };
    assert!(error.code().is_some());
    let help = error.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("did you mean `port`"), "{help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render");
    assert!(buf.contains("prot"));
}

#[test]
#[serial]
fn env_vars_override_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("intercom.toml", "[server]\nport = 4000\n")?;
        jail.set_env("INTERCOM_SERVER_PORT", "5000");
        jail.set_env("INTERCOM_TOKENS_APP_ID", "env-app");
        jail.set_env("INTERCOM_CLIENT_IDLE_GRACE_MS", "500");

        let config: IntercomConfig = intercom_config::load_config()?;
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.tokens.app_id.as_deref(), Some("env-app"));
        assert_eq!(config.client.idle_grace_ms, 500);
        Ok(())
    });
}

#[test]
#[serial]
fn local_file_is_picked_up() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("intercom.toml", "[calls]\nhistory_default_limit = 25\n")?;
        let config = intercom_config::load_and_validate().map_err(|errors| {
            figment::Error::from(format!("unexpected config errors: {errors:?}"))
        })?;
        assert_eq!(config.calls.history_default_limit, 25);
        Ok(())
    });
}

#[test]
#[serial]
fn bad_env_value_is_attributed_to_the_variable() {
    figment::Jail::expect_with(|jail| {
        jail.set_env("INTERCOM_SERVER_PORT", "not-a-port");
        let errors = intercom_config::load_and_validate()
            .expect_err("non-numeric port must fail");
        assert!(
            errors.iter().any(
                |e| matches!(e, ConfigError::Env { variable, .. } if variable == "INTERCOM_SERVER_PORT")
            ),
            "got {errors:?}"
        );
        Ok(())
    });
}

#[test]
fn explicit_missing_path_is_an_error() {
    let errors = intercom_config::load_and_validate_path(std::path::Path::new(
        "/nonexistent/intercom.toml",
    ))
    .expect_err("missing explicit file must fail");
    assert!(matches!(errors[0], ConfigError::Other(_)));
}
