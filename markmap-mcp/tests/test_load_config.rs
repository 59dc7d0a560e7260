use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::{tempdir, NamedTempFile};

use markmap_mcp::load_config::load_config;

const ALL_VARS: &[&str] = &[
    "MARKMAP_DIR",
    "OSS_ACCESS_KEY_ID",
    "OSS_ACCESS_KEY_SECRET",
    "OSS_BUCKET",
    "OSS_REGION",
    "OSS_ENDPOINT",
    "MINIO_ACCESS_KEY",
    "MINIO_SECRET_KEY",
    "MINIO_ENDPOINT",
    "MINIO_BUCKET",
    "MINIO_PREVIEW_URL_BASE",
    "DASHSCOPE_API_KEY",
    "QWEN_API_KEY",
];

fn clear_env() {
    for var in ALL_VARS {
        env::remove_var(var);
    }
}

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

#[test]
#[serial]
fn missing_secrets_disable_every_client() {
    clear_env();
    let out = tempdir().unwrap();

    let config = load_config(Some(out.path().to_path_buf()), None).expect("Config should load");

    assert_eq!(config.output_dir, out.path());
    assert!(config.oss.is_none());
    assert!(config.minio.is_none());
    assert!(config.qwen.is_none());
}

#[test]
#[serial]
fn yaml_settings_combine_with_env_secrets() {
    clear_env();
    let out = tempdir().unwrap();
    let yaml = format!(
        r#"
output_dir: {}
oss:
  bucket: maps
  region: oss-cn-hangzhou
  signed_url_expiry_secs: 3600
minio:
  endpoint: 10.0.0.5:9000
  bucket: page
  preview_url_base: https://preview.example.com/page
qwen:
  model: qwen-plus
"#,
        out.path().display()
    );
    let file = config_file(&yaml);
    env::set_var("OSS_ACCESS_KEY_ID", "id");
    env::set_var("OSS_ACCESS_KEY_SECRET", "secret");
    env::set_var("MINIO_ACCESS_KEY", "minio");
    env::set_var("MINIO_SECRET_KEY", "minio-secret");
    env::set_var("QWEN_API_KEY", "sk-test");

    let config = load_config(None, Some(file.path())).expect("Config should load");
    clear_env();

    assert_eq!(config.output_dir, out.path());

    let oss = config.oss.expect("OSS enabled");
    assert_eq!(oss.bucket, "maps");
    assert_eq!(oss.region, "oss-cn-hangzhou");
    assert_eq!(oss.endpoint, "https://oss-cn-hangzhou.aliyuncs.com");
    assert_eq!(oss.signed_url_expiry_secs, 3600);
    assert!(!oss.path_style);

    let minio = config.minio.expect("MinIO enabled");
    assert_eq!(minio.endpoint, "http://10.0.0.5:9000");
    assert_eq!(minio.bucket, "page");
    assert_eq!(
        minio.preview_url_base.as_deref(),
        Some("https://preview.example.com/page")
    );

    let qwen = config.qwen.expect("Qwen enabled");
    assert_eq!(qwen.api_key, "sk-test");
    assert_eq!(qwen.model, "qwen-plus");
    assert_eq!(qwen.endpoint, "https://dashscope.aliyuncs.com");
}

#[test]
#[serial]
fn env_overrides_yaml_for_store_settings() {
    clear_env();
    let out = tempdir().unwrap();
    let file = config_file("oss:\n  bucket: from-yaml\n");
    env::set_var("OSS_ACCESS_KEY_ID", "id");
    env::set_var("OSS_ACCESS_KEY_SECRET", "secret");
    env::set_var("OSS_BUCKET", "from-env");
    env::set_var("OSS_ENDPOINT", "http://127.0.0.1:9100");

    let config = load_config(Some(out.path().to_path_buf()), Some(file.path())).unwrap();
    clear_env();

    let oss = config.oss.expect("OSS enabled");
    assert_eq!(oss.bucket, "from-env");
    assert_eq!(oss.endpoint, "http://127.0.0.1:9100");
}

#[test]
#[serial]
fn oss_without_bucket_is_disabled() {
    clear_env();
    let out = tempdir().unwrap();
    env::set_var("OSS_ACCESS_KEY_ID", "id");
    env::set_var("OSS_ACCESS_KEY_SECRET", "secret");

    let config = load_config(Some(out.path().to_path_buf()), None).unwrap();
    clear_env();

    assert!(config.oss.is_none());
}

#[test]
#[serial]
fn dashscope_key_takes_precedence() {
    clear_env();
    let out = tempdir().unwrap();
    env::set_var("DASHSCOPE_API_KEY", "dashscope");
    env::set_var("QWEN_API_KEY", "qwen");

    let config = load_config(Some(out.path().to_path_buf()), None).unwrap();
    clear_env();

    assert_eq!(config.qwen.expect("Qwen enabled").api_key, "dashscope");
}

#[test]
#[serial]
fn output_dir_precedence() {
    clear_env();
    let cli_dir = tempdir().unwrap();
    let yaml_dir = tempdir().unwrap();
    let env_dir = tempdir().unwrap();
    let file = config_file(&format!("output_dir: {}\n", yaml_dir.path().display()));
    env::set_var("MARKMAP_DIR", env_dir.path());

    let from_cli = load_config(Some(cli_dir.path().to_path_buf()), Some(file.path())).unwrap();
    let from_yaml = load_config(None, Some(file.path())).unwrap();
    let from_env = load_config(None, None).unwrap();
    env::remove_var("MARKMAP_DIR");
    let fallback = load_config(None, None).unwrap();

    assert_eq!(from_cli.output_dir, cli_dir.path());
    assert_eq!(from_yaml.output_dir, yaml_dir.path());
    assert_eq!(from_env.output_dir, env_dir.path());
    assert_eq!(fallback.output_dir, env::temp_dir().join("markmap"));
}

#[test]
#[serial]
fn output_dir_is_created() {
    clear_env();
    let root = tempdir().unwrap();
    let nested: PathBuf = root.path().join("a").join("b");

    let config = load_config(Some(nested.clone()), None).unwrap();

    assert_eq!(config.output_dir, nested);
    assert!(nested.is_dir());
}

#[test]
#[serial]
fn invalid_yaml_is_reported() {
    clear_env();
    let file = config_file("oss: [not, a, map]\n");

    let err = load_config(None, Some(file.path())).unwrap_err();

    assert!(
        err.to_string().contains("Failed to parse config YAML"),
        "unexpected error: {err}"
    );
}

#[test]
#[serial]
fn unknown_keys_are_rejected() {
    clear_env();
    let file = config_file("oss:\n  bucket: maps\n  acess_key: typo\n");

    let err = load_config(None, Some(file.path())).unwrap_err();

    assert!(err.to_string().contains("Failed to parse config YAML"));
}
