use std::sync::Arc;
use tracing::{info, warn};
use crate::utils::{retry_with_config, RetryConfig};
use super::errors::{RemoteError, UploadError};
use super::progress::ProgressReporter;
use super::traits::{AccountResolver, MetadataGenerator, RemoteUploader};
use super::types::{GeneratedMetadata, MetadataHints, ScheduledUpload, UploadRequest};

/// 执行器应用到每个请求的上传设置
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub category_id: String,
    pub notify_subscribers: bool,
    pub retry: RetryConfig,
    pub hints: MetadataHints,
}

/// 单次执行的结果
#[derive(Debug)]
pub struct ExecutionReport {
    /// 成功时为远程视频 id
    pub result: Result<String, UploadError>,
    /// 本次执行生成的元数据
    pub generated: Option<GeneratedMetadata>,
}

/// 执行一次计划上传
pub struct UploadExecutor {
    accounts: Arc<dyn AccountResolver>,
    metadata: Arc<dyn MetadataGenerator>,
    uploader: Arc<dyn RemoteUploader>,
    options: ExecutorOptions,
}

impl UploadExecutor {
    pub fn new(
        accounts: Arc<dyn AccountResolver>,
        metadata: Arc<dyn MetadataGenerator>,
        uploader: Arc<dyn RemoteUploader>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            accounts,
            metadata,
            uploader,
            options,
        }
    }

    pub async fn execute(&self, upload: &ScheduledUpload, progress: &ProgressReporter) -> ExecutionReport {
        info!("Processing upload for {}", upload.file_path.display());

        match tokio::fs::metadata(&upload.file_path).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return ExecutionReport {
                    result: Err(UploadError::FileNotFound(upload.file_path.clone())),
                    generated: None,
                };
            }
        }

        let Some(account) = self.accounts.resolve(&upload.account_id).await else {
            return ExecutionReport {
                result: Err(UploadError::AccountNotFound(upload.account_id.clone())),
                generated: None,
            };
        };

        let mut request = UploadRequest {
            file_path: upload.file_path.clone(),
            title: upload.title.clone(),
            description: upload.description.clone(),
            tags: upload.tags.clone(),
            category_id: self.options.category_id.clone(),
            privacy_status: upload.privacy_status,
            notify_subscribers: self.options.notify_subscribers,
        };

        let mut generated = None;
        if request.title.is_empty() || request.description.is_empty() {
            let metadata = self.generate_metadata(upload).await;
            if request.title.is_empty() {
                request.title = metadata.title.clone();
            }
            if request.description.is_empty() {
                request.description = metadata.description.clone();
            }
            if request.tags.is_empty() {
                request.tags = metadata.tags.clone();
            }
            generated = Some(metadata);
        }

        let result = retry_with_config(
            &self.options.retry,
            RemoteError::is_transient,
            || self.uploader.upload(&account, &request, progress),
        )
        .await
        .map_err(|(error, attempts)| {
            if error.is_transient() {
                UploadError::RetriesExhausted { attempts, source: error }
            } else {
                UploadError::Remote(error)
            }
        });

        match &result {
            Ok(video_id) => info!("Successfully uploaded {} as {}", upload.file_path.display(), video_id),
            Err(err) => warn!("Upload failed for {}: {}", upload.file_path.display(), err),
        }

        ExecutionReport { result, generated }
    }

    /// 生成元数据，失败时用文件名作为标题
    async fn generate_metadata(&self, upload: &ScheduledUpload) -> GeneratedMetadata {
        info!("Generating metadata for {}", upload.file_path.display());
        match self.metadata.generate(&upload.file_path, &self.options.hints).await {
            Ok(metadata) if !metadata.title.is_empty() => metadata,
            Ok(metadata) => GeneratedMetadata {
                title: upload.file_name(),
                ..metadata
            },
            Err(err) => {
                warn!("Metadata generation failed for {}: {}", upload.file_path.display(), err);
                GeneratedMetadata {
                    title: upload.file_name(),
                    ..GeneratedMetadata::default()
                }
            }
        }
    }
}
