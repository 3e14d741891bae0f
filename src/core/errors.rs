use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 另一个进程持有计划文件锁
    #[error("Schedule is locked by another process: {}", .0.display())]
    Locked(PathBuf),
}

impl SchedulerError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// 远程上传失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// 可重试：5xx、限流、连接断开
    #[error("Transient upload error{}: {message}", status_suffix(.status))]
    Transient {
        status: Option<u16>,
        message: String,
    },

    /// 服务器拒绝，重试无效
    #[error("Upload rejected{}: {message}", status_suffix(.status))]
    Permanent {
        status: Option<u16>,
        message: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" (status {})", code)).unwrap_or_default()
}

impl RemoteError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            status: None,
            message: message.into(),
        }
    }

    /// 按 HTTP 状态码分类，5xx、408 和 429 可重试，其余都是永久错误
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 || status == 408 || status == 429 {
            Self::Transient { status: Some(status), message }
        } else {
            Self::Permanent { status: Some(status), message }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), err.to_string()),
            // 连接、超时、读取错误都没有拿到服务器的结果
            None => Self::transient(err.to_string()),
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        Self::transient(err.to_string())
    }
}

/// 单次上传执行失败的原因
///
/// `Display` 文本会写入记录的 `error` 字段。
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("{source} (after {attempts} attempts)")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Upload task panicked: {0}")]
    Panicked(String),
}
