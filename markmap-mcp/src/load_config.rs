/// `load_config` module: turns the optional YAML file, the environment and CLI flags into a [`ServerConfig`].
///
/// The YAML file only carries non-secret settings (endpoints, buckets, model
/// names, output directory). Credentials are read from the environment and
/// decide which clients exist at all: a backend whose secrets are missing is
/// disabled with a warning rather than failing startup.
///
/// # Precedence
/// - Output directory: `--output` > YAML `output_dir` > `MARKMAP_DIR` > `<tmp>/markmap`
/// - Store settings: env override (`OSS_BUCKET`, `MINIO_ENDPOINT`, ...) > YAML > built-in default
///
/// # Errors
/// Unreadable or malformed YAML and an uncreatable output directory are
/// reported through `anyhow::Error`; nothing else fails.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::minio::{self, MinioConfig};
use crate::oss::{self, OssConfig};
use crate::qwen::{self, QwenConfig};

pub const DEFAULT_OSS_REGION: &str = "oss-cn-beijing";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub oss: OssSection,
    #[serde(default)]
    pub minio: MinioSection,
    #[serde(default)]
    pub qwen: QwenSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OssSection {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub signed_url_expiry_secs: Option<u64>,
    #[serde(default)]
    pub path_style: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinioSection {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub preview_url_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QwenSection {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

/// Everything the server needs at startup.
#[derive(Debug)]
pub struct ServerConfig {
    pub output_dir: PathBuf,
    pub oss: Option<OssConfig>,
    pub minio: Option<MinioConfig>,
    pub qwen: Option<QwenConfig>,
}

pub fn load_config(cli_output: Option<PathBuf>, config_path: Option<&Path>) -> Result<ServerConfig> {
    let file = match config_path {
        Some(path) => read_file_config(path)?,
        None => FileConfig::default(),
    };

    let output_dir = cli_output
        .or(file.output_dir)
        .or_else(|| env_var("MARKMAP_DIR").map(PathBuf::from))
        .unwrap_or_else(|| std::env::temp_dir().join("markmap"));
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    info!(output_dir = %output_dir.display(), "Output directory ready");

    Ok(ServerConfig {
        output_dir,
        oss: oss_config(file.oss),
        minio: minio_config(file.minio),
        qwen: qwen_config(file.qwen),
    })
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path, e)
    })?;
    // An empty document is a valid, empty config.
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn with_scheme(endpoint: String, default_scheme: &str) -> String {
    if endpoint.contains("://") {
        endpoint
    } else {
        format!("{default_scheme}://{endpoint}")
    }
}

fn oss_config(section: OssSection) -> Option<OssConfig> {
    let (Some(access_key_id), Some(access_key_secret)) =
        (env_var("OSS_ACCESS_KEY_ID"), env_var("OSS_ACCESS_KEY_SECRET"))
    else {
        warn!("OSS credentials not configured (OSS_ACCESS_KEY_ID, OSS_ACCESS_KEY_SECRET); OSS upload disabled");
        return None;
    };
    let Some(bucket) = env_var("OSS_BUCKET").or(section.bucket) else {
        warn!("OSS bucket not configured (OSS_BUCKET or oss.bucket); OSS upload disabled");
        return None;
    };
    let region = env_var("OSS_REGION")
        .or(section.region)
        .unwrap_or_else(|| DEFAULT_OSS_REGION.to_string());
    let endpoint = env_var("OSS_ENDPOINT")
        .or(section.endpoint)
        .unwrap_or_else(|| format!("{region}.aliyuncs.com"));

    Some(OssConfig {
        access_key_id,
        access_key_secret,
        endpoint: with_scheme(endpoint, "https"),
        bucket,
        region,
        signed_url_expiry_secs: section
            .signed_url_expiry_secs
            .unwrap_or(oss::DEFAULT_SIGNED_URL_EXPIRY_SECS),
        path_style: section.path_style,
    })
}

fn minio_config(section: MinioSection) -> Option<MinioConfig> {
    let (Some(access_key), Some(secret_key)) =
        (env_var("MINIO_ACCESS_KEY"), env_var("MINIO_SECRET_KEY"))
    else {
        warn!("MinIO credentials not configured (MINIO_ACCESS_KEY, MINIO_SECRET_KEY); MinIO upload disabled");
        return None;
    };
    let (Some(endpoint), Some(bucket)) = (
        env_var("MINIO_ENDPOINT").or(section.endpoint),
        env_var("MINIO_BUCKET").or(section.bucket),
    ) else {
        warn!("MinIO endpoint or bucket not configured; MinIO upload disabled");
        return None;
    };

    Some(MinioConfig {
        access_key,
        secret_key,
        endpoint: with_scheme(endpoint, "http"),
        bucket,
        region: section
            .region
            .unwrap_or_else(|| minio::DEFAULT_REGION.to_string()),
        preview_url_base: env_var("MINIO_PREVIEW_URL_BASE").or(section.preview_url_base),
    })
}

fn qwen_config(section: QwenSection) -> Option<QwenConfig> {
    let Some(api_key) = env_var("DASHSCOPE_API_KEY").or_else(|| env_var("QWEN_API_KEY")) else {
        warn!("Qwen API key not configured (DASHSCOPE_API_KEY or QWEN_API_KEY); text expansion disabled");
        return None;
    };
    Some(QwenConfig {
        api_key,
        endpoint: with_scheme(
            section
                .endpoint
                .unwrap_or_else(|| qwen::DEFAULT_ENDPOINT.to_string()),
            "https",
        ),
        model: section
            .model
            .unwrap_or_else(|| qwen::DEFAULT_MODEL.to_string()),
    })
}
