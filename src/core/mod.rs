mod book;
mod errors;
mod executor;
mod lock;
mod progress;
mod queue;
mod scheduler;
mod store;
mod traits;
mod types;
mod worker;

pub use book::{Checkout, FailureDisposition, ScheduleBook};
pub use errors::{RemoteError, Result, SchedulerError, UploadError};
pub use executor::{ExecutionReport, ExecutorOptions, UploadExecutor};
pub use lock::ScheduleLock;
pub use progress::ProgressReporter;
pub use queue::UploadQueue;
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use store::ScheduleStore;
pub use traits::{
    AccountResolver,
    Clock,
    MetadataGenerator,
    RemoteUploader,
};
pub use types::{
    AccountContext,
    Credentials,
    GeneratedMetadata,
    ImportOptions,
    MetadataHints,
    MetadataUpdate,
    NewUpload,
    PrivacyStatus,
    ScheduleEvent,
    ScheduledUpload,
    TickOutcome,
    UploadId,
    UploadRequest,
    UploadStatus,
};
