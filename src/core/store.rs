use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use super::errors::Result;
use super::types::ScheduledUpload;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScheduleDocument {
    #[serde(default)]
    videos: Vec<ScheduledUpload>,
}

/// 保存所有计划上传的 JSON 文件
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载计划表
    ///
    /// 文件不存在时为空；无法读取或格式错误时记录日志、移到一边并按空处理。
    pub async fn load(&self) -> Vec<ScheduledUpload> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No schedule file at {}, starting empty", self.path.display());
                return Vec::new();
            }
            Err(err) => {
                error!("Failed to read schedule {}: {}", self.path.display(), err);
                return Vec::new();
            }
        };

        match serde_json::from_str::<ScheduleDocument>(&data) {
            Ok(document) => {
                info!("Loaded {} scheduled videos", document.videos.len());
                document.videos
            }
            Err(err) => {
                error!("Malformed schedule {}: {}", self.path.display(), err);
                self.quarantine().await;
                Vec::new()
            }
        }
    }

    /// 用完整列表覆盖文件
    pub async fn save(&self, videos: &[ScheduledUpload]) -> Result<()> {
        #[derive(Serialize)]
        struct DocumentRef<'a> {
            videos: &'a [ScheduledUpload],
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_string_pretty(&DocumentRef { videos })?;
        let tmp_path = self.sibling("tmp");
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!("Saved {} scheduled videos", videos.len());
        Ok(())
    }

    async fn quarantine(&self) {
        let target = self.sibling("corrupt");
        match tokio::fs::rename(&self.path, &target).await {
            Ok(()) => warn!("Moved malformed schedule to {}", target.display()),
            Err(err) => warn!("Could not move malformed schedule aside: {}", err),
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }
}
