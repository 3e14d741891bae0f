use std::fmt;
use std::path::PathBuf;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 计划上传 id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct UploadId(pub Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UploadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// 视频可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    #[default]
    Unlisted,
    Private,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Private => "private",
        }
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrivacyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(PrivacyStatus::Public),
            "unlisted" => Ok(PrivacyStatus::Unlisted),
            "private" => Ok(PrivacyStatus::Private),
            other => Err(format!("unknown privacy status '{}'", other)),
        }
    }
}

/// 根据记录标志得出的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// 等待计划时间或重试
    Pending,
    /// 远程已确认
    Uploaded,
    /// 用户已取消
    Cancelled,
    /// 达到失败次数上限后放弃
    Failed,
}

/// 一个计划上传的视频
///
/// 字段名即计划文件的存储格式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledUpload {
    pub id: UploadId,
    pub file_path: PathBuf,
    pub account_id: String,
    /// 到期时间，本地时间
    pub scheduled_time: NaiveDateTime,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub privacy_status: PrivacyStatus,
    #[serde(default)]
    pub uploaded: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub video_id: Option<String>,
    /// 最近一次执行错误
    #[serde(default)]
    pub error: Option<String>,
    /// 同批导入中到下一个条目的间隔是随机的
    #[serde(default)]
    pub randomized: bool,
    /// 执行次数，包括成功和失败
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_attempt_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub uploaded_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub failed: bool,
}

impl ScheduledUpload {
    pub fn new(
        file_path: impl Into<PathBuf>,
        account_id: impl Into<String>,
        scheduled_time: NaiveDateTime,
        privacy_status: PrivacyStatus,
    ) -> Self {
        Self {
            id: UploadId::new(),
            file_path: file_path.into(),
            account_id: account_id.into(),
            scheduled_time,
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            privacy_status,
            uploaded: false,
            cancelled: false,
            video_id: None,
            error: None,
            randomized: false,
            attempts: 0,
            last_attempt_at: None,
            uploaded_at: None,
            failed: false,
        }
    }

    pub fn status(&self) -> UploadStatus {
        if self.uploaded {
            UploadStatus::Uploaded
        } else if self.cancelled {
            UploadStatus::Cancelled
        } else if self.failed {
            UploadStatus::Failed
        } else {
            UploadStatus::Pending
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == UploadStatus::Pending
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.scheduled_time <= now
    }

    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.to_string_lossy().into_owned())
    }
}

/// 单个上传的计划请求
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub file_path: PathBuf,
    pub account_id: String,
    pub scheduled_time: NaiveDateTime,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub privacy_status: PrivacyStatus,
}

/// 文件夹导入参数
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// 相邻上传的固定间隔
    pub interval_hours: f64,
    /// 第一个上传时间，未设置或已过去时向后调整
    pub start_time: Option<NaiveDateTime>,
    /// 改为在配置的随机区间内取间隔
    pub randomized_hourly: bool,
    pub privacy_status: PrivacyStatus,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            interval_hours: 1.0,
            start_time: None,
            randomized_hourly: false,
            privacy_status: PrivacyStatus::default(),
        }
    }
}

/// 部分元数据更新，`None` 表示不修改
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// 传给元数据生成器的提示
#[derive(Debug, Clone)]
pub struct MetadataHints {
    pub style_prompt: Option<String>,
    pub max_title_length: usize,
    pub sample_interval: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// 账号凭证
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn bearer_token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// 以某个账号上传所需的信息
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub account_id: String,
    pub name: String,
    pub credentials: Credentials,
}

/// 单次上传尝试的请求
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
    pub notify_subscribers: bool,
}

/// 单步调度的结果
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// 队列为空
    Idle,
    /// 最早的条目还未到期
    NotDue { next: NaiveDateTime },
    /// 已出队但不再是待上传状态
    Skipped(UploadId),
    Uploaded { id: UploadId, video_id: String },
    Failed { id: UploadId, error: String },
}

/// 调度事件
#[derive(Debug, Clone)]
pub enum ScheduleEvent {
    /// 新条目入队
    Scheduled {
        id: UploadId,
        scheduled_time: NaiveDateTime,
    },
    /// 开始执行
    Started {
        id: UploadId,
    },
    /// 上传进度，0..=100
    Progress {
        id: UploadId,
        percentage: f64,
    },
    Uploaded {
        id: UploadId,
        video_id: String,
    },
    Failed {
        id: UploadId,
        error: String,
        attempts: u32,
    },
    Cancelled {
        id: UploadId,
    },
}

const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<ScheduledUpload>();
        assert_send::<ScheduleEvent>();
        assert_send::<UploadRequest>();
    }
};
