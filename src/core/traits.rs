use std::path::Path;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use super::errors::RemoteError;
use super::progress::ProgressReporter;
use super::types::{AccountContext, GeneratedMetadata, MetadataHints, UploadRequest};

/// 根据账号 id 获取上传所需的账号信息
#[async_trait]
pub trait AccountResolver: Send + Sync {
    /// `None` 表示账号不存在
    async fn resolve(&self, account_id: &str) -> Option<AccountContext>;
}

/// 根据视频内容生成标题、描述和标签
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    async fn generate(&self, file_path: &Path, hints: &MetadataHints) -> Result<GeneratedMetadata, String>;
}

/// 实际执行上传到视频平台
///
/// 每次调用是一次尝试。实现可以在同一文件的多次调用之间保留续传会话，
/// 并通过 `progress` 上报进度。
#[async_trait]
pub trait RemoteUploader: Send + Sync {
    /// 返回远程视频 id
    async fn upload(
        &self,
        account: &AccountContext,
        request: &UploadRequest,
        progress: &ProgressReporter,
    ) -> Result<String, RemoteError>;
}

/// 本地时间来源
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}
