use std::future::Future;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;
use crate::config::{deserialize_duration, serialize_duration};

/// 重试策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// 固定延迟
    Fixed {
        #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
        delay: Duration,
    },
    /// 指数退避：`initial * multiplier^attempt`，不超过 `max_delay`
    Exponential {
        #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
        initial: Duration,
        multiplier: f64,
        #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
        max_delay: Duration,
    },
}

impl RetryStrategy {
    /// 计算第 n 次重试的延迟（从 0 开始）
    pub fn get_delay(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Fixed { delay } => *delay,
            RetryStrategy::Exponential { initial, multiplier, max_delay } => {
                let secs = initial.as_secs_f64() * multiplier.powf(attempt as f64);
                if !secs.is_finite() || secs >= max_delay.as_secs_f64() {
                    *max_delay
                } else {
                    Duration::from_secs_f64(secs.max(0.0))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 总尝试次数，包括第一次
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    /// 第 n 次（从 1 开始）失败后等待 2^n 秒
    fn default() -> Self {
        Self {
            max_attempts: 10,
            strategy: RetryStrategy::Exponential {
                initial: Duration::from_secs(2),
                multiplier: 2.0,
                max_delay: Duration::from_secs(600),
            },
        }
    }
}

/// 带重试执行 `operation`
///
/// 成功、遇到 `should_retry` 拒绝的错误或用完 `max_attempts` 时结束，
/// 失败时返回最后一个错误和尝试次数。
pub async fn retry_with_config<F, Fut, T, E, R>(
    config: &RetryConfig,
    should_retry: R,
    mut operation: F,
) -> Result<T, (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if !should_retry(&error) || attempt >= max_attempts {
                    return Err((error, attempt));
                }

                let delay = config.strategy.get_delay(attempt - 1);
                warn!("Retry {}/{} in {:?} after error: {}", attempt, max_attempts - 1, delay, error);
                sleep(delay).await;
            }
        }
    }
}

pub struct RetryBuilder {
    config: RetryConfig,
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn strategy(mut self, strategy: RetryStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
