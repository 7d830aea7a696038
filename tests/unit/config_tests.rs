//! Config parsing, validation, and listen-address form tests.

use machine_session::config::{GlobalConfig, ListenAddress, MachineConfig};

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(
        r#"
        [machine]
        memory_log2_size = 10
        program = [1, 2, 3]
        entry_point = 8
        registers = [0, 7]

        [registry]
        base_url = "http://localhost:8000"
        "#,
    )
    .expect("valid config");

    assert_eq!(config.machine.memory_log2_size, 10);
    assert_eq!(config.machine.program, vec![1, 2, 3]);
    assert_eq!(config.machine.entry_point, 8);
    assert_eq!(
        config.registry.expect("registry").base_url,
        "http://localhost:8000"
    );
}

#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");
    assert_eq!(config.machine, MachineConfig::default());
    assert!(config.registry.is_none());
    assert_eq!(config.machine.word_count(), 512);
}

#[test]
fn rejects_memory_size_out_of_bounds() {
    let result = GlobalConfig::from_toml_str("[machine]\nmemory_log2_size = 3\n");
    assert!(result.is_err());

    let result = GlobalConfig::from_toml_str("[machine]\nmemory_log2_size = 25\n");
    assert!(result.is_err());
}

#[test]
fn rejects_program_larger_than_memory() {
    let config = MachineConfig {
        memory_log2_size: 4,
        program: vec![0; 3],
        ..MachineConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn rejects_unaligned_entry_point() {
    let config = MachineConfig {
        entry_point: 4,
        ..MachineConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn rejects_entry_point_outside_memory() {
    let config = MachineConfig {
        memory_log2_size: 4,
        entry_point: 16,
        ..MachineConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn rejects_too_many_register_seeds() {
    let config = MachineConfig {
        registers: vec![0; 9],
        ..MachineConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn rejects_empty_registry_url() {
    let result = GlobalConfig::from_toml_str("[registry]\nbase_url = \"\"\n");
    assert!(result.is_err());
}

#[test]
fn parses_explicit_tcp_address() {
    assert_eq!(
        ListenAddress::parse("127.0.0.1:5000").expect("tcp"),
        ListenAddress::Tcp("127.0.0.1:5000".into())
    );
}

#[test]
fn parses_unix_path_address() {
    assert_eq!(
        ListenAddress::parse("unix:/tmp/session.sock").expect("unix"),
        ListenAddress::Unix("/tmp/session.sock".into())
    );
}

#[test]
fn parses_auto_forms() {
    assert_eq!(ListenAddress::parse("tcp").expect("tcp"), ListenAddress::AutoTcp);
    assert_eq!(
        ListenAddress::parse("unix").expect("unix"),
        ListenAddress::AutoUnix
    );
}

#[test]
fn rejects_unrecognized_address_form() {
    assert!(ListenAddress::parse("localhost").is_err());
    assert!(ListenAddress::parse("unix:").is_err());
}

#[test]
fn address_display_round_trips() {
    for raw in ["127.0.0.1:5000", "unix:/tmp/s.sock", "tcp", "unix"] {
        let parsed = ListenAddress::parse(raw).expect("parse");
        assert_eq!(parsed.to_string(), raw);
    }
}
