//! Loading configuration files from disk.

use certfleet_config::{Config, ConfigError};
use std::io::Write;

#[test]
fn load_and_validate_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        agent {{
            default-port 6737
        }}
        renewal {{
            check-interval-secs 600
        }}
        hosts {{
            host "guid-a" {{
                name "web-a"
                ipv4 "127.0.0.1"
                token "ta"
            }}
        }}
        domain-settings {{
            setting "example.com" host="guid-a" name="renewal" value="true"
        }}
        "#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.renewal.check_interval().as_secs(), 600);
    assert_eq!(config.renewal.renew_before().as_secs(), 30 * 86_400);
    assert_eq!(config.agent_port(&config.hosts[0]), Some(6737));
}

#[test]
fn missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.kdl")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
