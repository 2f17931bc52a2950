#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use castlink_client::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
device:
  host: "192.168.1.20"
link:
  heartbeat_intervl_ms: 5000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
device:
  host: "192.168.1.20"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.device.host, "192.168.1.20");
    assert_eq!(cfg.device.port, 8009);
    assert_eq!(cfg.link.heartbeat_interval_ms, 5000);
    assert_eq!(cfg.link.initial_request_id, 1);
    assert_eq!(cfg.sender.id, "sender-0");
    assert!(cfg.sender.media_id().starts_with("client-"));
}

#[test]
fn explicit_sections_override_defaults() {
    let s = r#"
version: 1
device:
  host: "tv.local"
  port: 8010
link:
  initial_request_id: 1000
  request_timeout_ms: 2500
sender:
  media_id: "client-77"
"#;
    let cfg = config::load_from_str(s).expect("must parse");
    assert_eq!(cfg.device.port, 8010);
    assert_eq!(cfg.link.initial_request_id, 1000);
    assert_eq!(cfg.link.request_timeout_ms, 2500);
    assert_eq!(cfg.sender.media_id(), "client-77");
}

#[test]
fn out_of_range_values_are_rejected() {
    for bad in [
        "version: 2\ndevice: { host: \"a\" }\n",
        "version: 1\ndevice: { host: \"\" }\n",
        "version: 1\ndevice: { host: \"a\", port: 0 }\n",
        "version: 1\ndevice: { host: \"a\" }\nlink: { initial_request_id: 0 }\n",
        "version: 1\ndevice: { host: \"a\" }\nlink: { heartbeat_interval_ms: 10 }\n",
        "version: 1\ndevice: { host: \"a\" }\nlink: { subscriber_capacity: 0 }\n",
    ] {
        assert!(config::load_from_str(bad).is_err(), "config={bad}");
    }
}

#[test]
fn for_device_is_valid() {
    let cfg = config::ClientConfig::for_device("10.0.0.5", 8009);
    cfg.validate().expect("defaults must validate");
}

#[test]
fn file_errors_name_the_file() {
    let missing = std::env::temp_dir().join("castlink-missing-config.yaml");
    let err = config::load_from_file(&missing).expect_err("must fail");
    assert_eq!(err.code().as_str(), "CONFIG");
    assert!(err.to_string().contains("castlink-missing-config.yaml"), "{err}");

    let typo = std::env::temp_dir().join(format!("castlink-typo-{}.yaml", std::process::id()));
    std::fs::write(&typo, "version: 1\ndevice: { host: \"a\", prot: 8009 }\n").unwrap();
    let err = config::load_from_file(&typo).expect_err("must fail");
    let _ = std::fs::remove_file(&typo);
    assert_eq!(err.code().as_str(), "CONFIG");
    assert!(err.to_string().contains("castlink-typo-"), "{err}");
}
