pub mod clock;
pub mod retry;

pub use clock::{ManualClock, SystemClock};
pub use retry::{retry_with_config, RetryBuilder, RetryConfig, RetryStrategy};
