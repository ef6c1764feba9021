use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// 单个客户端在当前窗口内的配额
#[derive(Debug, Clone)]
struct ClientQuota {
    /// 当前时间窗口内的提交数量
    count: u32,
    /// 当前时间窗口的开始时间
    window_start: Instant,
}

impl ClientQuota {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }
}

/// 限流错误类型
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit exceeded: {current}/{max} submissions per window, retry in {retry_after_secs}s")]
    RateLimitExceeded {
        current: u32,
        max: u32,
        retry_after_secs: u64,
    },
}

/// 便签提交限流器
///
/// 固定窗口计数，按客户端 IP 区分。
pub struct SubmissionRateLimiter {
    max_submissions: u32,
    window_duration: Duration,
    quotas: RwLock<HashMap<IpAddr, ClientQuota>>,
}

impl SubmissionRateLimiter {
    pub fn new(max_submissions: u32, window_duration: Duration) -> Self {
        Self {
            max_submissions,
            window_duration,
            quotas: RwLock::new(HashMap::new()),
        }
    }

    /// 记录一次提交，超出配额时返回错误
    pub fn check(&self, client: IpAddr) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let mut quotas = self.quotas.write().unwrap_or_else(PoisonError::into_inner);

        // 顺带清理过期记录，防止表无限增长
        if quotas.len() > 10_000 {
            let window = self.window_duration;
            quotas.retain(|_, quota| now.duration_since(quota.window_start) < window);
        }

        let quota = quotas
            .entry(client)
            .or_insert_with(|| ClientQuota::new(now));

        let elapsed = now.duration_since(quota.window_start);
        if elapsed >= self.window_duration {
            *quota = ClientQuota::new(now);
        }

        if quota.count >= self.max_submissions {
            let remaining = self.window_duration.saturating_sub(elapsed);
            return Err(RateLimitError::RateLimitExceeded {
                current: quota.count,
                max: self.max_submissions,
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        quota.count += 1;
        Ok(())
    }
}
