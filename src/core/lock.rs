use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use super::errors::{Result, SchedulerError};

/// 计划文件的进程锁
///
/// 计划文件只允许一个进程写入。`run` 在整个运行期间持有锁，
/// 一次性的修改命令只在执行期间持有。锁文件里记录持有者的 pid，
/// 释放时删除。
#[derive(Debug)]
pub struct ScheduleLock {
    path: PathBuf,
}

impl ScheduleLock {
    /// 创建锁文件，已存在时返回 `SchedulerError::Locked`
    pub async fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let holder = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                warn!("Schedule lock {} held by pid {}", path.display(), holder.trim());
                return Err(SchedulerError::Locked(path));
            }
            Err(err) => return Err(err.into()),
        };

        let lock = Self { path };
        file.write_all(std::process::id().to_string().as_bytes()).await?;
        file.flush().await?;
        debug!("Acquired schedule lock {}", lock.path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScheduleLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove schedule lock {}: {}", self.path.display(), err);
        }
    }
}
