pub mod accounts;
pub mod config;
pub mod core;
pub mod metadata;
pub mod uploaders;
pub mod utils;

pub use core::{
    ImportOptions,
    MetadataUpdate,
    NewUpload,
    PrivacyStatus,
    RemoteError,
    Result,
    ScheduleEvent,
    ScheduleLock,
    ScheduledUpload,
    Scheduler,
    SchedulerBuilder,
    SchedulerError,
    TickOutcome,
    UploadError,
    UploadId,
};
pub use config::SchedulerConfig;

pub use accounts::{AccountDirectory, StaticAccounts, TokenFileCredentials};
pub use metadata::FilenameMetadata;
pub use uploaders::YouTubeUploader;
