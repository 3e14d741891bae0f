use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::core::{MetadataHints, Result};
use crate::utils::RetryConfig;

pub(crate) fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

pub const DEFAULT_API_ENDPOINT: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// 调度器配置，时长在文件中以秒为单位
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 用户目录，存放计划、账号和令牌
    pub config_dir: PathBuf,
    pub schedule_file: String,
    pub accounts_file: String,
    pub tokens_dir: String,

    /// 调度循环轮询周期
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
    /// 循环出错后的等待时间
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub error_backoff: Duration,
    /// `stop()` 等待循环退出的时间
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,
    /// 导入开始时间已过去时使用的偏移
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub start_delay: Duration,

    /// 可导入的文件扩展名，不区分大小写
    pub video_extensions: Vec<String>,
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub randomized_gap_min: Duration,
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub randomized_gap_max: Duration,
    /// 随机间隔的种子，未设置时随机
    pub rng_seed: Option<u64>,

    pub generate_metadata_on_import: bool,
    pub style_prompt: Option<String>,
    pub max_title_length: usize,
    pub sample_interval: u32,

    pub category_id: String,
    pub notify_subscribers: bool,
    pub upload_retry: RetryConfig,
    /// 放弃上传前允许的失败次数，未设置时不限
    pub max_failed_executions: Option<u32>,
    /// 有新计划时自动启动循环
    pub auto_start: bool,

    pub chunk_size: usize,
    pub api_endpoint: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            schedule_file: "schedule.json".to_string(),
            accounts_file: "accounts.json".to_string(),
            tokens_dir: "tokens".to_string(),
            poll_interval: Duration::from_secs(10),
            error_backoff: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(2),
            start_delay: Duration::from_secs(5 * 60),
            video_extensions: ["mp4", "mov", "avi", "mkv", "webm"]
                .into_iter()
                .map(String::from)
                .collect(),
            randomized_gap_min: Duration::from_secs(60 * 60),
            randomized_gap_max: Duration::from_secs(70 * 60),
            rng_seed: None,
            generate_metadata_on_import: true,
            style_prompt: None,
            max_title_length: 100,
            sample_interval: 5,
            category_id: "22".to_string(),
            notify_subscribers: true,
            upload_retry: RetryConfig::default(),
            max_failed_executions: None,
            auto_start: true,
            chunk_size: 5 * 1024 * 1024, // 5MB
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".youtube_shorts_uploader"))
        .unwrap_or_else(|| PathBuf::from(".youtube_shorts_uploader"))
}

impl SchedulerConfig {
    /// 读取 TOML 文件，文件不存在时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)?;
        let config = toml::from_str(&data)?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// 以 `config_dir` 为根目录的默认配置
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            ..Self::default()
        }
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.config_dir.join(&self.schedule_file)
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.config_dir.join(&self.accounts_file)
    }

    pub fn tokens_path(&self) -> PathBuf {
        self.config_dir.join(&self.tokens_dir)
    }

    /// 单进程写入锁，和计划文件放在一起
    pub fn lock_path(&self) -> PathBuf {
        self.config_dir.join("scheduler.lock")
    }

    pub fn is_video_file(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.video_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    pub fn metadata_hints(&self) -> MetadataHints {
        MetadataHints {
            style_prompt: self.style_prompt.clone().filter(|prompt| !prompt.is_empty()),
            max_title_length: self.max_title_length,
            sample_interval: self.sample_interval,
        }
    }
}
