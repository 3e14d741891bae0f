use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use shorts_scheduler::core::{
    AccountContext,
    Clock,
    GeneratedMetadata,
    MetadataGenerator,
    MetadataHints,
    ProgressReporter,
    RemoteUploader,
    UploadRequest,
};
use shorts_scheduler::utils::{ManualClock, RetryBuilder, RetryStrategy};
use shorts_scheduler::{
    ImportOptions,
    MetadataUpdate,
    NewUpload,
    PrivacyStatus,
    RemoteError,
    ScheduleEvent,
    Scheduler,
    SchedulerConfig,
    StaticAccounts,
    TickOutcome,
    UploadId,
};

/// 记录每个请求并按脚本返回结果的上传器
struct MockUploader {
    calls: Mutex<Vec<UploadRequest>>,
    script: Mutex<VecDeque<Result<String, RemoteError>>>,
}

impl MockUploader {
    fn new() -> Self {
        Self::with_script(Vec::new())
    }

    fn with_script(results: Vec<Result<String, RemoteError>>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(results.into()),
        }
    }

    fn calls(&self) -> Vec<UploadRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn call_names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| call.file_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }
}

#[async_trait]
impl RemoteUploader for MockUploader {
    async fn upload(
        &self,
        _account: &AccountContext,
        request: &UploadRequest,
        progress: &ProgressReporter,
    ) -> Result<String, RemoteError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len()
        };
        progress.report(50.0);

        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(format!("vid-{}", call)),
        }
    }
}

struct PanickingUploader;

#[async_trait]
impl RemoteUploader for PanickingUploader {
    async fn upload(
        &self,
        _account: &AccountContext,
        _request: &UploadRequest,
        _progress: &ProgressReporter,
    ) -> Result<String, RemoteError> {
        panic!("uploader exploded");
    }
}

struct FixedMetadata;

#[async_trait]
impl MetadataGenerator for FixedMetadata {
    async fn generate(&self, _file_path: &Path, _hints: &MetadataHints) -> Result<GeneratedMetadata, String> {
        Ok(GeneratedMetadata {
            title: "Generated title".into(),
            description: "Generated description".into(),
            tags: vec!["#shorts".into()],
        })
    }
}

struct FailingMetadata;

#[async_trait]
impl MetadataGenerator for FailingMetadata {
    async fn generate(&self, _file_path: &Path, _hints: &MetadataHints) -> Result<GeneratedMetadata, String> {
        Err("model unavailable".into())
    }
}

fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2030, 1, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .unwrap()
}

fn test_config(dir: &Path) -> SchedulerConfig {
    let mut config = SchedulerConfig::with_dir(dir.join("config"));
    config.auto_start = false;
    config.rng_seed = Some(42);
    config.upload_retry = RetryBuilder::new()
        .max_attempts(1)
        .strategy(RetryStrategy::Fixed { delay: Duration::ZERO })
        .build();
    config
}

fn make_videos(dir: &Path, names: &[&str]) -> PathBuf {
    let folder = dir.join("videos");
    std::fs::create_dir_all(&folder).unwrap();
    for name in names {
        std::fs::write(folder.join(name), b"fake video bytes").unwrap();
    }
    folder
}

async fn build(
    config: SchedulerConfig,
    uploader: Arc<dyn RemoteUploader>,
    clock: Arc<ManualClock>,
) -> Scheduler {
    Scheduler::builder(config)
        .account_resolver(Arc::new(StaticAccounts::new().with_account("main", "Main", "token")))
        .remote_uploader(uploader)
        .clock(clock)
        .build()
        .await
        .unwrap()
}

fn new_upload(file_path: PathBuf, scheduled_time: NaiveDateTime) -> NewUpload {
    NewUpload {
        file_path,
        account_id: "main".into(),
        scheduled_time,
        title: "Title".into(),
        description: "Description".into(),
        tags: Vec::new(),
        privacy_status: PrivacyStatus::Private,
    }
}

#[tokio::test]
async fn test_batch_import_spacing() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["c.mp4", "a.MP4", "b.mov", "notes.txt"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(test_config(dir.path()), Arc::new(MockUploader::new()), clock).await;

    let t = start_time() + TimeDelta::days(1);
    let options = ImportOptions {
        interval_hours: 2.0,
        start_time: Some(t),
        randomized_hourly: false,
        privacy_status: PrivacyStatus::Public,
    };
    let count = scheduler.import_folder(&folder, "main", options).await.unwrap();
    assert_eq!(count, 3);

    let videos = scheduler.get_scheduled_videos().await;
    let names: Vec<String> = videos.iter().map(|v| v.file_name()).collect();
    assert_eq!(names, vec!["a.MP4", "b.mov", "c.mp4"]);

    let times: Vec<NaiveDateTime> = videos.iter().map(|v| v.scheduled_time).collect();
    assert_eq!(times, vec![t, t + TimeDelta::hours(2), t + TimeDelta::hours(4)]);

    for video in &videos {
        assert!(!video.uploaded);
        assert!(!video.cancelled);
        assert!(video.file_path.is_absolute());
        assert_eq!(video.privacy_status, PrivacyStatus::Public);
        assert_eq!(video.account_id, "main");
    }
    // 默认生成器用文件名作为标题
    assert_eq!(videos[0].title, "a");

    let saved = std::fs::read_to_string(scheduler.config().schedule_path()).unwrap();
    assert!(saved.contains("\"videos\""));
}

#[tokio::test]
async fn test_import_rejects_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let empty = dir.path().join("empty");
    std::fs::create_dir_all(&empty).unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(test_config(dir.path()), Arc::new(MockUploader::new()), clock).await;

    let missing = dir.path().join("missing");
    assert_eq!(scheduler.import_folder(&missing, "main", ImportOptions::default()).await.unwrap(), 0);
    assert_eq!(
        scheduler
            .import_folder(folder.join("a.mp4"), "main", ImportOptions::default())
            .await
            .unwrap(),
        0
    );
    assert_eq!(scheduler.import_folder(&empty, "main", ImportOptions::default()).await.unwrap(), 0);

    let negative = ImportOptions {
        interval_hours: -1.0,
        ..ImportOptions::default()
    };
    assert_eq!(scheduler.import_folder(&folder, "main", negative).await.unwrap(), 0);
    assert!(scheduler.get_scheduled_videos().await.is_empty());
}

#[tokio::test]
async fn test_import_rejects_out_of_range_interval() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4", "b.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(test_config(dir.path()), Arc::new(MockUploader::new()), clock).await;

    for interval_hours in [1e10, 1e300] {
        let options = ImportOptions {
            interval_hours,
            ..ImportOptions::default()
        };
        assert_eq!(scheduler.import_folder(&folder, "main", options).await.unwrap(), 0);
    }
    assert!(scheduler.get_scheduled_videos().await.is_empty());

    // 单个文件不需要计算下一个时间
    let single = make_videos(&dir.path().join("single"), &["only.mp4"]);
    let options = ImportOptions {
        interval_hours: 1e10,
        ..ImportOptions::default()
    };
    assert_eq!(scheduler.import_folder(&single, "main", options).await.unwrap(), 1);
}

#[tokio::test]
async fn test_randomized_spacing_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let names: Vec<String> = (0..8).map(|i| format!("clip_{}.mp4", i)).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let folder = make_videos(dir.path(), &name_refs);
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(test_config(dir.path()), Arc::new(MockUploader::new()), clock).await;

    let options = ImportOptions {
        start_time: Some(start_time() + TimeDelta::hours(1)),
        randomized_hourly: true,
        ..ImportOptions::default()
    };
    assert_eq!(scheduler.import_folder(&folder, "main", options).await.unwrap(), 8);

    let videos = scheduler.get_scheduled_videos().await;
    assert!(videos.iter().all(|v| v.randomized));
    for pair in videos.windows(2) {
        let gap = pair[1].scheduled_time - pair[0].scheduled_time;
        assert!(gap >= TimeDelta::minutes(60), "gap too short: {}", gap);
        assert!(gap <= TimeDelta::minutes(70), "gap too long: {}", gap);
    }
}

#[tokio::test]
async fn test_past_start_clamps_forward() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4", "b.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(test_config(dir.path()), Arc::new(MockUploader::new()), clock.clone()).await;

    let options = ImportOptions {
        start_time: Some(start_time() - TimeDelta::hours(3)),
        ..ImportOptions::default()
    };
    scheduler.import_folder(&folder, "main", options).await.unwrap();

    let videos = scheduler.get_scheduled_videos().await;
    assert!(videos[0].scheduled_time >= clock.now() + TimeDelta::minutes(5));
    assert_eq!(videos[1].scheduled_time - videos[0].scheduled_time, TimeDelta::hours(1));

    // 未指定时行为相同
    let scheduler_dir = tempfile::tempdir().unwrap();
    let folder = make_videos(scheduler_dir.path(), &["c.mp4"]);
    let scheduler = build(test_config(scheduler_dir.path()), Arc::new(MockUploader::new()), clock.clone()).await;
    scheduler.import_folder(&folder, "main", ImportOptions::default()).await.unwrap();
    let videos = scheduler.get_scheduled_videos().await;
    assert_eq!(videos[0].scheduled_time, clock.now() + TimeDelta::minutes(5));
}

#[tokio::test]
async fn test_import_falls_back_to_filename_title() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["my_clip.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = Scheduler::builder(test_config(dir.path()))
        .account_resolver(Arc::new(StaticAccounts::new().with_account("main", "Main", "token")))
        .metadata_generator(Arc::new(FailingMetadata))
        .remote_uploader(Arc::new(MockUploader::new()))
        .clock(clock)
        .build()
        .await
        .unwrap();

    assert_eq!(scheduler.import_folder(&folder, "main", ImportOptions::default()).await.unwrap(), 1);
    let video = &scheduler.get_scheduled_videos().await[0];
    assert_eq!(video.title, "my_clip.mp4");
    assert_eq!(video.description, "");
}

#[tokio::test]
async fn test_executes_in_time_order() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["first.mp4", "second.mp4", "third.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::new());
    let scheduler = build(test_config(dir.path()), uploader.clone(), clock.clone()).await;

    let now = clock.now();
    scheduler.schedule_video(new_upload(folder.join("third.mp4"), now + TimeDelta::minutes(30))).await.unwrap();
    scheduler.schedule_video(new_upload(folder.join("first.mp4"), now + TimeDelta::minutes(10))).await.unwrap();
    scheduler.schedule_video(new_upload(folder.join("second.mp4"), now + TimeDelta::minutes(20))).await.unwrap();

    assert_eq!(
        scheduler.run_once().await.unwrap(),
        TickOutcome::NotDue { next: now + TimeDelta::minutes(10) }
    );
    assert!(uploader.calls().is_empty());

    clock.advance(TimeDelta::hours(1));
    for _ in 0..3 {
        assert!(matches!(scheduler.run_once().await.unwrap(), TickOutcome::Uploaded { .. }));
    }
    assert_eq!(scheduler.run_once().await.unwrap(), TickOutcome::Idle);
    assert_eq!(uploader.call_names(), vec!["first.mp4", "second.mp4", "third.mp4"]);

    let request = &uploader.calls()[0];
    assert_eq!(request.category_id, "22");
    assert_eq!(request.privacy_status, PrivacyStatus::Private);
    assert!(request.notify_subscribers);
}

#[tokio::test]
async fn test_no_double_execution_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4", "b.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::new());

    {
        let scheduler = build(test_config(dir.path()), uploader.clone(), clock.clone()).await;
        scheduler.import_folder(&folder, "main", ImportOptions::default()).await.unwrap();
        clock.advance(TimeDelta::hours(3));
        assert!(matches!(scheduler.run_once().await.unwrap(), TickOutcome::Uploaded { .. }));
        assert!(matches!(scheduler.run_once().await.unwrap(), TickOutcome::Uploaded { .. }));
    }

    let scheduler = build(test_config(dir.path()), uploader.clone(), clock.clone()).await;
    let videos = scheduler.get_scheduled_videos().await;
    assert_eq!(videos.len(), 2);
    assert!(videos.iter().all(|v| v.uploaded && v.video_id.is_some()));

    assert_eq!(scheduler.run_once().await.unwrap(), TickOutcome::Idle);
    assert_eq!(uploader.calls().len(), 2);
}

#[tokio::test]
async fn test_restart_resumes_pending() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::new());

    let id = {
        let scheduler = build(test_config(dir.path()), uploader.clone(), clock.clone()).await;
        scheduler
            .schedule_video(new_upload(folder.join("a.mp4"), start_time() + TimeDelta::minutes(1)))
            .await
            .unwrap()
    };

    // 重启后已过期，第一步就执行
    clock.advance(TimeDelta::days(2));
    let scheduler = build(test_config(dir.path()), uploader.clone(), clock).await;
    assert_eq!(
        scheduler.run_once().await.unwrap(),
        TickOutcome::Uploaded { id, video_id: "vid-1".into() }
    );
}

#[tokio::test]
async fn test_cancel_wins() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::new());
    let scheduler = build(test_config(dir.path()), uploader.clone(), clock.clone()).await;

    let id = scheduler.schedule_video(new_upload(folder.join("a.mp4"), clock.now())).await.unwrap();
    assert!(scheduler.cancel_scheduled_video(&id).await.unwrap());
    assert!(!scheduler.cancel_scheduled_video(&id).await.unwrap());
    assert!(!scheduler.cancel_scheduled_video(&UploadId::new()).await.unwrap());

    clock.advance(TimeDelta::minutes(1));
    assert_eq!(scheduler.run_once().await.unwrap(), TickOutcome::Idle);
    assert!(uploader.calls().is_empty());

    let video = scheduler.get_scheduled_video(&id).await.unwrap();
    assert!(video.cancelled);
    assert!(!video.uploaded);
}

#[tokio::test]
async fn test_failed_upload_retried_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::with_script(vec![
        Err(RemoteError::from_status(503, "backend error")),
        Ok("abc123".into()),
    ]));
    let scheduler = build(test_config(dir.path()), uploader.clone(), clock.clone()).await;
    let id = scheduler.schedule_video(new_upload(folder.join("a.mp4"), clock.now())).await.unwrap();

    let first = scheduler.run_once().await.unwrap();
    assert!(matches!(first, TickOutcome::Failed { id: failed, .. } if failed == id));
    let video = scheduler.get_scheduled_video(&id).await.unwrap();
    assert!(video.error.as_deref().unwrap().contains("503"));
    assert!(video.is_pending());
    assert_eq!(video.scheduled_time, start_time());

    clock.advance(TimeDelta::seconds(10));
    assert_eq!(
        scheduler.run_once().await.unwrap(),
        TickOutcome::Uploaded { id, video_id: "abc123".into() }
    );

    let video = scheduler.get_scheduled_video(&id).await.unwrap();
    assert!(video.uploaded);
    assert_eq!(video.video_id.as_deref(), Some("abc123"));
    assert_eq!(video.error, None);
    assert_eq!(video.attempts, 2);
    assert_eq!(video.uploaded_at, Some(clock.now()));
}

#[tokio::test]
async fn test_transient_errors_retried_within_execution() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::with_script(vec![
        Err(RemoteError::from_status(500, "oops")),
        Err(RemoteError::transient("connection reset")),
        Ok("xyz".into()),
    ]));
    let mut config = test_config(dir.path());
    config.upload_retry.max_attempts = 5;
    let scheduler = build(config, uploader.clone(), clock.clone()).await;
    let id = scheduler.schedule_video(new_upload(folder.join("a.mp4"), clock.now())).await.unwrap();

    assert_eq!(
        scheduler.run_once().await.unwrap(),
        TickOutcome::Uploaded { id, video_id: "xyz".into() }
    );
    assert_eq!(uploader.calls().len(), 3);
    assert_eq!(scheduler.get_scheduled_video(&id).await.unwrap().attempts, 1);
}

#[tokio::test]
async fn test_permanent_error_not_retried_within_execution() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::with_script(vec![Err(RemoteError::from_status(403, "quota"))]));
    let mut config = test_config(dir.path());
    config.upload_retry.max_attempts = 5;
    let scheduler = build(config, uploader.clone(), clock.clone()).await;
    let id = scheduler.schedule_video(new_upload(folder.join("a.mp4"), clock.now())).await.unwrap();

    assert!(matches!(scheduler.run_once().await.unwrap(), TickOutcome::Failed { .. }));
    assert_eq!(uploader.calls().len(), 1);
    assert!(scheduler.get_scheduled_video(&id).await.unwrap().is_pending());
}

#[tokio::test]
async fn test_clear_all_pending() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4", "b.mp4", "c.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(test_config(dir.path()), Arc::new(MockUploader::new()), clock.clone()).await;

    let done = scheduler.schedule_video(new_upload(folder.join("a.mp4"), clock.now())).await.unwrap();
    assert!(matches!(scheduler.run_once().await.unwrap(), TickOutcome::Uploaded { .. }));
    scheduler.schedule_video(new_upload(folder.join("b.mp4"), clock.now() + TimeDelta::hours(1))).await.unwrap();
    scheduler.schedule_video(new_upload(folder.join("c.mp4"), clock.now() + TimeDelta::hours(2))).await.unwrap();

    assert_eq!(scheduler.clear_all_scheduled_videos().await.unwrap(), 2);
    assert_eq!(scheduler.clear_all_scheduled_videos().await.unwrap(), 0);

    let videos = scheduler.get_scheduled_videos().await;
    assert_eq!(videos.len(), 3);
    assert_eq!(videos.iter().filter(|v| v.is_pending()).count(), 0);
    let uploaded = scheduler.get_scheduled_video(&done).await.unwrap();
    assert!(uploaded.uploaded);
    assert!(!uploaded.cancelled);

    clock.advance(TimeDelta::days(1));
    assert_eq!(scheduler.run_once().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test]
async fn test_missing_file_stays_pending() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::new());
    let scheduler = build(test_config(dir.path()), uploader.clone(), clock.clone()).await;
    let id = scheduler
        .schedule_video(new_upload(dir.path().join("gone.mp4"), clock.now()))
        .await
        .unwrap();

    for _ in 0..2 {
        match scheduler.run_once().await.unwrap() {
            TickOutcome::Failed { error, .. } => assert!(error.contains("File not found")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert!(uploader.calls().is_empty());

    let video = scheduler.get_scheduled_video(&id).await.unwrap();
    assert!(video.is_pending());
    assert!(!video.uploaded);
    assert_eq!(video.attempts, 2);
}

#[tokio::test]
async fn test_failing_upload_does_not_block_queue() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["b.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::new());
    let scheduler = build(test_config(dir.path()), uploader.clone(), clock.clone()).await;

    let bad = scheduler
        .schedule_video(new_upload(dir.path().join("gone.mp4"), start_time()))
        .await
        .unwrap();
    let good = scheduler
        .schedule_video(new_upload(folder.join("b.mp4"), start_time() + TimeDelta::minutes(1)))
        .await
        .unwrap();

    clock.advance(TimeDelta::minutes(2));
    let mut bad_failures = 0;
    for _ in 0..20 {
        match scheduler.run_once().await.unwrap() {
            TickOutcome::Failed { id, .. } if id == bad => bad_failures += 1,
            TickOutcome::Uploaded { id, .. } => assert_eq!(id, good),
            other => panic!("unexpected outcome {:?}", other),
        }
        clock.advance(TimeDelta::seconds(30));
    }

    assert_eq!(uploader.call_names(), vec!["b.mp4"]);
    assert!(scheduler.get_scheduled_video(&good).await.unwrap().uploaded);
    assert_eq!(bad_failures, 19);

    let failing = scheduler.get_scheduled_video(&bad).await.unwrap();
    assert!(failing.is_pending());
    assert_eq!(failing.scheduled_time, start_time());
}

#[tokio::test]
async fn test_unknown_account_fails() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::new());
    let scheduler = build(test_config(dir.path()), uploader.clone(), clock.clone()).await;

    let mut request = new_upload(folder.join("a.mp4"), clock.now());
    request.account_id = "stranger".into();
    scheduler.schedule_video(request).await.unwrap();

    match scheduler.run_once().await.unwrap() {
        TickOutcome::Failed { error, .. } => assert_eq!(error, "Account not found: stranger"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(uploader.calls().is_empty());
}

#[tokio::test]
async fn test_failure_limit_makes_upload_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let mut config = test_config(dir.path());
    config.max_failed_executions = Some(2);
    let scheduler = build(config, Arc::new(MockUploader::new()), clock.clone()).await;
    let id = scheduler
        .schedule_video(new_upload(dir.path().join("gone.mp4"), clock.now()))
        .await
        .unwrap();

    assert!(matches!(scheduler.run_once().await.unwrap(), TickOutcome::Failed { .. }));
    assert!(matches!(scheduler.run_once().await.unwrap(), TickOutcome::Failed { .. }));
    assert_eq!(scheduler.run_once().await.unwrap(), TickOutcome::Idle);

    let video = scheduler.get_scheduled_video(&id).await.unwrap();
    assert!(video.failed);
    assert!(!video.is_pending());
    assert!(!scheduler.cancel_scheduled_video(&id).await.unwrap());
}

#[tokio::test]
async fn test_execution_time_metadata_written_back() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::new());
    let scheduler = Scheduler::builder(test_config(dir.path()))
        .account_resolver(Arc::new(StaticAccounts::new().with_account("main", "Main", "token")))
        .metadata_generator(Arc::new(FixedMetadata))
        .remote_uploader(uploader.clone())
        .clock(clock.clone())
        .build()
        .await
        .unwrap();

    let mut request = new_upload(folder.join("a.mp4"), clock.now());
    request.title = "Kept".into();
    request.description = String::new();
    let id = scheduler.schedule_video(request).await.unwrap();
    scheduler.run_once().await.unwrap();

    let sent = &uploader.calls()[0];
    assert_eq!(sent.title, "Kept");
    assert_eq!(sent.description, "Generated description");
    assert_eq!(sent.tags, vec!["#shorts".to_string()]);

    let video = scheduler.get_scheduled_video(&id).await.unwrap();
    assert_eq!(video.title, "Kept");
    assert_eq!(video.description, "Generated description");
}

#[tokio::test]
async fn test_update_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(test_config(dir.path()), Arc::new(MockUploader::new()), clock.clone()).await;
    let id = scheduler.schedule_video(new_upload(folder.join("a.mp4"), clock.now())).await.unwrap();

    let update = MetadataUpdate {
        description: Some("New description".into()),
        tags: Some(vec!["one".into(), "two".into()]),
        ..MetadataUpdate::default()
    };
    assert!(scheduler.update_video_metadata(&id, update).await.unwrap());
    let video = scheduler.get_scheduled_video(&id).await.unwrap();
    assert_eq!(video.title, "Title");
    assert_eq!(video.description, "New description");
    assert_eq!(video.tags, vec!["one".to_string(), "two".to_string()]);

    scheduler.run_once().await.unwrap();
    let frozen = MetadataUpdate {
        title: Some("Too late".into()),
        ..MetadataUpdate::default()
    };
    assert!(!scheduler.update_video_metadata(&id, frozen).await.unwrap());
    assert!(!scheduler.update_video_metadata(&UploadId::new(), MetadataUpdate::default()).await.unwrap());
}

#[tokio::test]
async fn test_panicking_upload_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(test_config(dir.path()), Arc::new(PanickingUploader), clock.clone()).await;
    let id = scheduler.schedule_video(new_upload(folder.join("a.mp4"), clock.now())).await.unwrap();

    match scheduler.run_once().await.unwrap() {
        TickOutcome::Failed { error, .. } => assert!(error.contains("uploader exploded")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(scheduler.get_scheduled_video(&id).await.unwrap().is_pending());
}

#[tokio::test]
async fn test_schedule_video_validates_input() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(test_config(dir.path()), Arc::new(MockUploader::new()), clock.clone()).await;

    let mut request = new_upload(PathBuf::from("/v/a.mp4"), clock.now());
    request.account_id = String::new();
    assert!(scheduler.schedule_video(request).await.is_err());
    assert!(scheduler.get_scheduled_videos().await.is_empty());
}

#[tokio::test]
async fn test_background_loop_uploads_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let folder = make_videos(dir.path(), &["a.mp4"]);
    let clock = Arc::new(ManualClock::new(start_time()));
    let uploader = Arc::new(MockUploader::new());
    let mut config = test_config(dir.path());
    config.auto_start = true;
    config.poll_interval = Duration::from_millis(10);
    let scheduler = build(config, uploader.clone(), clock.clone()).await;
    let mut events = scheduler.subscribe_events();

    assert!(!scheduler.is_running().await);
    let id = scheduler.schedule_video(new_upload(folder.join("a.mp4"), clock.now())).await.unwrap();
    assert!(scheduler.is_running().await);

    let uploaded = tokio::time::timeout(Duration::from_secs(5), async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.unwrap();
            let done = matches!(event, ScheduleEvent::Uploaded { .. });
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .unwrap();

    assert!(matches!(uploaded[0], ScheduleEvent::Scheduled { id: got, .. } if got == id));
    assert!(uploaded.iter().any(|e| matches!(e, ScheduleEvent::Started { .. })));
    assert!(uploaded.iter().any(|e| matches!(e, ScheduleEvent::Progress { percentage, .. } if *percentage == 50.0)));

    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
    assert_eq!(uploader.calls().len(), 1);
    assert!(scheduler.get_scheduled_video(&id).await.unwrap().uploaded);
}

#[tokio::test]
async fn test_corrupt_schedule_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.config_dir).unwrap();
    std::fs::write(config.schedule_path(), "{\"videos\": [oops").unwrap();

    let clock = Arc::new(ManualClock::new(start_time()));
    let scheduler = build(config.clone(), Arc::new(MockUploader::new()), clock).await;
    assert!(scheduler.get_scheduled_videos().await.is_empty());
    assert!(config.config_dir.join("schedule.json.corrupt").exists());
}
