//! 重试策略：指数退避
//!
//! 只用于对外部存储的调用。调用方提供一个判定函数，
//! 只有被判定为瞬时故障（超时、连接失败、5xx）的错误才会重试；
//! 其余错误立即返回。

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// 重试配置
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次），至少为 1
    pub max_attempts: u32,
    /// 第一次重试前的等待时间
    pub initial_delay: Duration,
    /// 每次重试后等待时间的倍数
    pub backoff_multiplier: f64,
    /// 单次等待上限
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            ..Self::default()
        }
    }

    /// 第 `retry` 次重试（从 0 开始）之前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// 执行 `op`，瞬时错误按策略重试
    ///
    /// 返回最后一次的结果：成功值、不可重试的错误，
    /// 或者尝试次数耗尽时的最后一个瞬时错误。
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && is_retryable(&err) => {
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
