use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::TimeDelta;
use futures::FutureExt;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use crate::accounts::AccountDirectory;
use crate::config::SchedulerConfig;
use crate::metadata::FilenameMetadata;
use crate::utils::SystemClock;
use super::book::{Checkout, FailureDisposition, ScheduleBook};
use super::errors::{Result, SchedulerError, UploadError};
use super::executor::{ExecutionReport, ExecutorOptions, UploadExecutor};
use super::progress::ProgressReporter;
use super::store::ScheduleStore;
use super::traits::{AccountResolver, Clock, MetadataGenerator, RemoteUploader};
use super::types::{
    GeneratedMetadata,
    ImportOptions,
    MetadataUpdate,
    NewUpload,
    ScheduleEvent,
    ScheduledUpload,
    TickOutcome,
    UploadId,
};
use super::worker::BackgroundTask;

const EVENT_CAPACITY: usize = 256;

/// 对外句柄和后台循环共享的状态
pub(crate) struct SchedulerInner {
    config: SchedulerConfig,
    store: ScheduleStore,
    book: Mutex<ScheduleBook>,
    executor: UploadExecutor,
    metadata: Arc<dyn MetadataGenerator>,
    clock: Arc<dyn Clock>,
    rng: std::sync::Mutex<fastrand::Rng>,
    event_tx: broadcast::Sender<ScheduleEvent>,
}

impl SchedulerInner {
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 单步调度：执行下一个到期的上传
    pub async fn run_once(&self) -> Result<TickOutcome> {
        let now = self.clock.now();
        let upload = {
            let mut book = self.book.lock().await;
            match book.checkout(now) {
                Checkout::Empty => return Ok(TickOutcome::Idle),
                Checkout::NotDue(next) => return Ok(TickOutcome::NotDue { next }),
                Checkout::Stale(id) => {
                    debug!("Skipping {}, no longer pending", id);
                    return Ok(TickOutcome::Skipped(id));
                }
                Checkout::Ready(upload) => upload,
            }
        };

        let id = upload.id;
        self.emit(ScheduleEvent::Started { id });

        let progress = ProgressReporter::new(id, self.event_tx.clone());
        let report = AssertUnwindSafe(self.executor.execute(&upload, &progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!("Upload {} panicked: {}", id, message);
                ExecutionReport {
                    result: Err(UploadError::Panicked(message)),
                    generated: None,
                }
            });

        let finished_at = self.clock.now();
        let mut book = self.book.lock().await;
        let (outcome, event) = match report.result {
            Ok(video_id) => {
                book.complete(id, video_id.clone(), report.generated.as_ref(), finished_at);
                (
                    TickOutcome::Uploaded { id, video_id: video_id.clone() },
                    ScheduleEvent::Uploaded { id, video_id },
                )
            }
            Err(err) => {
                let error = err.to_string();
                let disposition = book.fail(
                    id,
                    error.clone(),
                    report.generated.as_ref(),
                    finished_at,
                    self.config.max_failed_executions,
                );
                let attempts = match disposition {
                    Some(FailureDisposition::Retry { attempts }) => attempts,
                    Some(FailureDisposition::GaveUp { attempts }) => {
                        warn!("Giving up on {} after {} failed executions", id, attempts);
                        attempts
                    }
                    None => 0,
                };
                (
                    TickOutcome::Failed { id, error: error.clone() },
                    ScheduleEvent::Failed { id, error, attempts },
                )
            }
        };

        self.store.save(&book.snapshot()).await?;
        drop(book);

        self.emit(event);
        Ok(outcome)
    }

    fn emit(&self, event: ScheduleEvent) {
        self.event_tx.send(event).ok();
    }

    /// 导入时相邻两个视频的间隔，超出时间范围时返回 None
    fn next_gap(&self, options: &ImportOptions) -> Option<TimeDelta> {
        if options.randomized_hourly {
            let min = self.config.randomized_gap_min.as_secs();
            let max = self.config.randomized_gap_max.as_secs().max(min);
            let secs = self
                .rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .u64(min..=max);
            TimeDelta::try_seconds(i64::try_from(secs).ok()?)
        } else {
            let millis = (options.interval_hours * 3_600_000.0).round();
            if millis >= i64::MAX as f64 {
                return None;
            }
            TimeDelta::try_milliseconds(millis as i64)
        }
    }

    async fn describe(&self, path: &Path) -> GeneratedMetadata {
        let fallback = || GeneratedMetadata {
            title: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..GeneratedMetadata::default()
        };

        if !self.config.generate_metadata_on_import {
            return GeneratedMetadata::default();
        }

        match self.metadata.generate(path, &self.config.metadata_hints()).await {
            Ok(metadata) if !metadata.title.is_empty() => metadata,
            Ok(_) => fallback(),
            Err(err) => {
                warn!("Metadata generation failed for {}: {}", path.display(), err);
                fallback()
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 根据配置和依赖组件构建 [`Scheduler`]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    accounts: Option<Arc<dyn AccountResolver>>,
    metadata: Option<Arc<dyn MetadataGenerator>>,
    uploader: Option<Arc<dyn RemoteUploader>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            accounts: None,
            metadata: None,
            uploader: None,
            clock: None,
        }
    }

    pub fn account_resolver(mut self, accounts: Arc<dyn AccountResolver>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn metadata_generator(mut self, metadata: Arc<dyn MetadataGenerator>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn remote_uploader(mut self, uploader: Arc<dyn RemoteUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 加载持久化的计划表并组装调度器
    ///
    /// 账号默认来自磁盘上的账号目录，元数据默认用文件名生成，时钟默认为本地时间。
    /// 上传器必须提供。
    pub async fn build(self) -> Result<Scheduler> {
        let config = self.config;
        let uploader = self
            .uploader
            .ok_or_else(|| SchedulerError::invalid_input("remote uploader is required"))?;
        let accounts = match self.accounts {
            Some(accounts) => accounts,
            None => Arc::new(AccountDirectory::load(&config).await),
        };
        let metadata = self
            .metadata
            .unwrap_or_else(|| Arc::new(FilenameMetadata::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let store = ScheduleStore::new(config.schedule_path());
        let book = ScheduleBook::from_records(store.load().await);
        info!(
            "Schedule loaded: {} entries, {} pending",
            book.len(),
            book.pending_count()
        );

        let executor = UploadExecutor::new(
            accounts,
            metadata.clone(),
            uploader,
            ExecutorOptions {
                category_id: config.category_id.clone(),
                notify_subscribers: config.notify_subscribers,
                retry: config.upload_retry.clone(),
                hints: config.metadata_hints(),
            },
        );

        let rng = match config.rng_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = SchedulerInner {
            config,
            store,
            book: Mutex::new(book),
            executor,
            metadata,
            clock,
            rng: std::sync::Mutex::new(rng),
            event_tx,
        };

        Ok(Scheduler {
            inner: Arc::new(inner),
            runner: Mutex::new(None),
        })
    }
}

/// 上传调度器，持有计划表和后台循环
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    runner: Mutex<Option<BackgroundTask>>,
}

impl Scheduler {
    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// 导入 `folder_path` 中的所有视频，按导入参数排开时间
    ///
    /// 返回创建的条目数，输入有问题时返回 0。
    pub async fn import_folder(
        &self,
        folder_path: impl AsRef<Path>,
        account_id: &str,
        options: ImportOptions,
    ) -> Result<usize> {
        let folder_path = folder_path.as_ref();
        let inner = &self.inner;

        match tokio::fs::metadata(folder_path).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                error!("Not a directory: {}", folder_path.display());
                return Ok(0);
            }
        }
        if !options.interval_hours.is_finite() || options.interval_hours < 0.0 {
            error!("Invalid interval: {} hours", options.interval_hours);
            return Ok(0);
        }

        let files = match self.list_videos(folder_path).await {
            Ok(files) => files,
            Err(err) => {
                error!("Failed to read {}: {}", folder_path.display(), err);
                return Ok(0);
            }
        };
        if files.is_empty() {
            warn!("No videos found in {}", folder_path.display());
            return Ok(0);
        }

        let now = inner.clock.now();
        let start = match options.start_time {
            Some(start) if start > now => Some(start),
            _ => TimeDelta::from_std(inner.config.start_delay)
                .ok()
                .and_then(|delay| now.checked_add_signed(delay)),
        };
        let Some(mut current) = start else {
            error!("Start time out of range");
            return Ok(0);
        };

        let total = files.len();
        let mut created = Vec::with_capacity(total);
        for (index, file) in files.into_iter().enumerate() {
            let file_path = match tokio::fs::canonicalize(&file).await {
                Ok(path) => path,
                Err(err) => {
                    warn!("Skipping {}: {}", file.display(), err);
                    continue;
                }
            };

            let metadata = inner.describe(&file_path).await;
            let mut upload =
                ScheduledUpload::new(file_path, account_id, current, options.privacy_status);
            upload.title = metadata.title;
            upload.description = metadata.description;
            upload.tags = metadata.tags;
            upload.randomized = options.randomized_hourly;

            debug!("Planned {} for {}", upload.file_name(), upload.scheduled_time);
            created.push(upload);

            if index + 1 < total {
                // 时间溢出时整批放弃，不写入任何记录
                match inner.next_gap(&options).and_then(|gap| current.checked_add_signed(gap)) {
                    Some(next) => current = next,
                    None => {
                        error!("Schedule overflows after {} with interval {} hours", current, options.interval_hours);
                        return Ok(0);
                    }
                }
            }
        }

        let events: Vec<_> = created
            .iter()
            .map(|upload| ScheduleEvent::Scheduled {
                id: upload.id,
                scheduled_time: upload.scheduled_time,
            })
            .collect();

        let count = {
            let mut book = inner.book.lock().await;
            let mut count = 0;
            for upload in created {
                if book.insert(upload) {
                    count += 1;
                }
            }
            inner.store.save(&book.snapshot()).await?;
            count
        };

        for event in events {
            inner.emit(event);
        }
        if inner.config.auto_start {
            self.ensure_running().await;
        }

        info!("Imported {} videos from {}", count, folder_path.display());
        Ok(count)
    }

    /// 计划单个视频
    pub async fn schedule_video(&self, request: NewUpload) -> Result<UploadId> {
        if request.account_id.is_empty() {
            return Err(SchedulerError::invalid_input("account id is empty"));
        }
        if request.file_path.as_os_str().is_empty() {
            return Err(SchedulerError::invalid_input("file path is empty"));
        }

        let mut upload = ScheduledUpload::new(
            request.file_path,
            request.account_id,
            request.scheduled_time,
            request.privacy_status,
        );
        upload.title = request.title;
        upload.description = request.description;
        upload.tags = request.tags;

        let id = upload.id;
        let scheduled_time = upload.scheduled_time;
        {
            let mut book = self.inner.book.lock().await;
            book.insert(upload);
            self.inner.store.save(&book.snapshot()).await?;
        }

        info!("Scheduled {} for {}", id, scheduled_time);
        self.inner.emit(ScheduleEvent::Scheduled { id, scheduled_time });
        if self.inner.config.auto_start {
            self.ensure_running().await;
        }
        Ok(id)
    }

    /// 按创建顺序复制全部记录
    pub async fn get_scheduled_videos(&self) -> Vec<ScheduledUpload> {
        self.inner.book.lock().await.snapshot()
    }

    pub async fn get_scheduled_video(&self, id: &UploadId) -> Option<ScheduledUpload> {
        self.inner.book.lock().await.get(id).cloned()
    }

    /// 取消待上传视频
    ///
    /// id 不存在、不是待上传状态或正在执行时返回 false。
    pub async fn cancel_scheduled_video(&self, id: &UploadId) -> Result<bool> {
        {
            let mut book = self.inner.book.lock().await;
            if !book.cancel(id) {
                return Ok(false);
            }
            self.inner.store.save(&book.snapshot()).await?;
        }

        info!("Cancelled {}", id);
        self.inner.emit(ScheduleEvent::Cancelled { id: *id });
        Ok(true)
    }

    /// 部分更新元数据，id 不存在或已上传时返回 false
    pub async fn update_video_metadata(&self, id: &UploadId, update: MetadataUpdate) -> Result<bool> {
        let mut book = self.inner.book.lock().await;
        if !book.update_metadata(id, update) {
            return Ok(false);
        }
        self.inner.store.save(&book.snapshot()).await?;
        debug!("Updated metadata of {}", id);
        Ok(true)
    }

    /// 取消所有待上传视频，记录保留
    pub async fn clear_all_scheduled_videos(&self) -> Result<usize> {
        let cancelled = {
            let mut book = self.inner.book.lock().await;
            let cancelled = book.cancel_all_pending();
            if !cancelled.is_empty() {
                self.inner.store.save(&book.snapshot()).await?;
            }
            cancelled
        };

        info!("Cleared {} pending uploads", cancelled.len());
        for id in &cancelled {
            self.inner.emit(ScheduleEvent::Cancelled { id: *id });
        }
        Ok(cancelled.len())
    }

    /// 启动后台循环（未运行时）
    pub async fn start(&self) {
        self.ensure_running().await;
    }

    pub async fn is_running(&self) -> bool {
        self.runner
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// 停止后台循环，最多等待 `shutdown_timeout`
    pub async fn stop(&self) {
        let Some(task) = self.runner.lock().await.take() else {
            return;
        };

        if !task.stop(self.inner.config.shutdown_timeout).await {
            if let Some(id) = self.inner.book.lock().await.release_in_flight() {
                warn!("Upload {} interrupted by shutdown, left pending", id);
            }
        }
        info!("Scheduler stopped");
    }

    /// 在调用方任务上执行一步调度
    pub async fn run_once(&self) -> Result<TickOutcome> {
        self.inner.run_once().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.inner.event_tx.subscribe()
    }

    async fn ensure_running(&self) {
        let mut runner = self.runner.lock().await;
        match runner.as_ref() {
            Some(task) if !task.is_finished() => return,
            Some(_) => warn!("Scheduler loop died, restarting"),
            None => {}
        }
        *runner = Some(BackgroundTask::spawn(self.inner.clone()));
    }

    async fn list_videos(&self, folder_path: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(folder_path).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && self.inner.config.is_video_file(&path) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(task) = self.runner.get_mut().as_ref() {
            task.cancel();
        }
    }
}

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_types() {
        assert_send_sync::<Scheduler>();
    }
};
