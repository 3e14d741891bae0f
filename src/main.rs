use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use shorts_scheduler::{
    ImportOptions,
    MetadataUpdate,
    PrivacyStatus,
    ScheduleLock,
    Scheduler,
    SchedulerConfig,
    UploadId,
    YouTubeUploader,
};

#[derive(Parser)]
#[command(name = "shorts-scheduler")]
#[command(version)]
#[command(about = "Schedules short-video uploads to YouTube")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// 存放计划、账号和令牌的目录
    #[arg(short = 'D', long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// 日志级别
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 运行调度器直到 Ctrl-C
    Run,
    /// 导入文件夹中的所有视频
    Import {
        folder: PathBuf,
        #[arg(short, long)]
        account: String,
        #[arg(short, long, default_value_t = 1.0)]
        interval_hours: f64,
        /// 第一个上传时间，本地时间 `YYYY-MM-DD HH:MM`
        #[arg(short, long, value_parser = parse_start)]
        start: Option<NaiveDateTime>,
        /// 上传间隔随机取 60 到 70 分钟
        #[arg(short, long)]
        randomized: bool,
        #[arg(short, long, default_value = "unlisted")]
        privacy: PrivacyStatus,
    },
    /// 打印计划表
    List,
    /// 取消待上传视频
    Cancel { id: UploadId },
    /// 修改计划上传的元数据
    Update {
        id: UploadId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// 逗号分隔，替换现有标签
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },
    /// 取消所有待上传视频
    Clear,
}

fn parse_start(value: &str) -> std::result::Result<NaiveDateTime, String> {
    ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| format!("invalid start time '{}'", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("shorts_scheduler={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = SchedulerConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = cli.config_dir {
        config.config_dir = dir;
    }
    // 一次性命令不启动上传
    config.auto_start = matches!(cli.command, Command::Run);

    // 除 list 外都会写计划文件，同一时间只允许一个进程
    let lock_path = config.lock_path();
    let _lock = match cli.command {
        Command::List => None,
        _ => Some(ScheduleLock::acquire(&lock_path).await.with_context(|| {
            format!(
                "another shorts-scheduler process is using {}; remove {} if none is running",
                config.config_dir.display(),
                lock_path.display()
            )
        })?),
    };

    let uploader = Arc::new(YouTubeUploader::from_config(&config));
    let scheduler = Scheduler::builder(config)
        .remote_uploader(uploader)
        .build()
        .await?;

    match cli.command {
        Command::Run => {
            info!("Starting shorts scheduler v{}", env!("CARGO_PKG_VERSION"));
            scheduler.start().await;
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            scheduler.stop().await;
        }
        Command::Import { folder, account, interval_hours, start, randomized, privacy } => {
            let options = ImportOptions {
                interval_hours,
                start_time: start,
                randomized_hourly: randomized,
                privacy_status: privacy,
            };
            let count = scheduler.import_folder(&folder, &account, options).await?;
            if count == 0 {
                bail!("nothing imported from {}", folder.display());
            }
            println!("Scheduled {} videos", count);
        }
        Command::List => {
            for upload in scheduler.get_scheduled_videos().await {
                println!(
                    "{}  {}  {:<9}  {}  {}",
                    upload.id,
                    upload.scheduled_time.format("%Y-%m-%d %H:%M"),
                    format!("{:?}", upload.status()),
                    upload.file_name(),
                    upload.error.as_deref().unwrap_or(""),
                );
            }
        }
        Command::Cancel { id } => {
            if !scheduler.cancel_scheduled_video(&id).await? {
                bail!("{} is not a pending upload", id);
            }
            println!("Cancelled {}", id);
        }
        Command::Update { id, title, description, tags } => {
            let update = MetadataUpdate { title, description, tags };
            if !scheduler.update_video_metadata(&id, update).await? {
                bail!("{} not found or already uploaded", id);
            }
            println!("Updated {}", id);
        }
        Command::Clear => {
            let count = scheduler.clear_all_scheduled_videos().await?;
            println!("Cancelled {} pending uploads", count);
        }
    }

    Ok(())
}
