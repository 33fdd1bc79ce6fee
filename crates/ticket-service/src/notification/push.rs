//! 移动推送适配
//!
//! 负责令牌去重、调用超时、瞬时失败的有限重试以及永久失败令牌的上报。
//! 令牌的实际清理由调用方完成。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use helpdesk_shared::config::PushConfig;
use helpdesk_shared::observability::metrics;
use helpdesk_shared::retry::RetryPolicy;

use super::error::PushError;

/// 推送内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

/// 单个令牌的推送结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Delivered,
    /// 令牌无效或已注销，应从用户令牌集合中移除
    Permanent(String),
    /// 网络抖动、限流等，可以重试
    Transient(String),
}

/// 推送服务提供方
///
/// 返回的结果与传入的令牌按下标一一对应
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, PushError>;
}

/// 投递报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub success_count: usize,
    /// 永久失败的令牌
    pub failed_tokens: Vec<String>,
    /// 重试耗尽后放弃的令牌
    pub dropped_tokens: Vec<String>,
    /// 实际调用推送服务的次数
    pub attempts: u32,
}

impl DeliveryReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed_tokens.is_empty() && self.dropped_tokens.is_empty()
    }
}

/// 单次推送含首次在内的最大尝试次数
pub const MAX_PUSH_ATTEMPTS: u32 = 3;

/// 移动推送适配器
pub struct PushDeliveryAdapter {
    provider: Arc<dyn PushProvider>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl PushDeliveryAdapter {
    pub fn new(provider: Arc<dyn PushProvider>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            provider,
            policy,
            timeout,
        }
    }

    /// 按配置构建，尝试次数限制在 1 到 MAX_PUSH_ATTEMPTS 之间
    pub fn from_config(provider: Arc<dyn PushProvider>, config: &PushConfig) -> Self {
        let max_attempts = config.max_attempts.clamp(1, MAX_PUSH_ATTEMPTS);
        if max_attempts != config.max_attempts {
            warn!(
                configured = config.max_attempts,
                effective = max_attempts,
                "推送最大尝试次数超出允许范围，已调整"
            );
        }

        Self::new(
            provider,
            RetryPolicy::from_attempts(
                max_attempts,
                Duration::from_millis(config.initial_backoff_ms),
                Duration::from_millis(config.max_backoff_ms),
            ),
            Duration::from_millis(config.timeout_ms),
        )
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// 推送到一组令牌
    ///
    /// 先去重；永久失败进入 failed_tokens；瞬时失败按退避策略重试，
    /// 超过最大尝试次数后进入 dropped_tokens 并记录告警，不会无限重试。
    pub async fn send(&self, tokens: &[String], message: &PushMessage) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut pending = dedup_tokens(tokens);
        if pending.is_empty() {
            return report;
        }

        let mut retry_round: u32 = 0;
        loop {
            report.attempts += 1;
            let outcomes = self.attempt(&pending, message).await;

            let mut transient = Vec::new();
            for (token, outcome) in pending.into_iter().zip(outcomes) {
                match outcome {
                    TokenOutcome::Delivered => report.success_count += 1,
                    TokenOutcome::Permanent(reason) => {
                        debug!(provider = self.provider.name(), reason = %reason, "令牌永久失效");
                        report.failed_tokens.push(token);
                    }
                    TokenOutcome::Transient(reason) => {
                        debug!(provider = self.provider.name(), reason = %reason, "令牌推送瞬时失败");
                        transient.push(token);
                    }
                }
            }

            if transient.is_empty() {
                break;
            }

            if !self.policy.should_retry(retry_round) {
                warn!(
                    provider = self.provider.name(),
                    attempts = report.attempts,
                    dropped = transient.len(),
                    "推送重试次数耗尽，放弃剩余令牌"
                );
                report.dropped_tokens = transient;
                break;
            }

            tokio::time::sleep(self.policy.delay_for_attempt(retry_round)).await;
            retry_round += 1;
            pending = transient;
        }

        metrics::record_push_tokens("delivered", report.success_count);
        report
    }

    /// 单次调用，整批失败或超时都按瞬时失败处理
    async fn attempt(&self, tokens: &[String], message: &PushMessage) -> Vec<TokenOutcome> {
        let result =
            tokio::time::timeout(self.timeout, self.provider.send_multicast(tokens, message))
                .await
                .unwrap_or(Err(PushError::Timeout));

        match result {
            Ok(outcomes) if outcomes.len() == tokens.len() => outcomes,
            Ok(outcomes) => {
                warn!(
                    provider = self.provider.name(),
                    expected = tokens.len(),
                    actual = outcomes.len(),
                    "推送结果数量与令牌数量不一致"
                );
                vec![TokenOutcome::Transient("结果数量不一致".to_string()); tokens.len()]
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "推送请求失败");
                vec![TokenOutcome::Transient(e.to_string()); tokens.len()]
            }
        }
    }
}

/// 保留首次出现顺序去重，空令牌直接丢弃
fn dedup_tokens(tokens: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter(|t| !t.trim().is_empty())
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn message() -> PushMessage {
        PushMessage {
            title: "Ticket Resolved".to_string(),
            body: "resolved".to_string(),
            data: HashMap::new(),
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from_attempts(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(2),
        )
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dedup_tokens_keeps_order() {
        let deduped = dedup_tokens(&tokens(&["a", "b", "a", " ", "c", "b"]));
        assert_eq!(deduped, tokens(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_permanent_failure_reported() {
        let mut provider = MockPushProvider::new();
        provider.expect_name().return_const("mock".to_string());
        provider
            .expect_send_multicast()
            .times(1)
            .returning(|tokens, _| {
                Ok(tokens
                    .iter()
                    .map(|t| {
                        if t == "stale" {
                            TokenOutcome::Permanent("UNREGISTERED".to_string())
                        } else {
                            TokenOutcome::Delivered
                        }
                    })
                    .collect())
            });

        let adapter =
            PushDeliveryAdapter::new(Arc::new(provider), fast_policy(3), Duration::from_secs(1));
        let report = adapter
            .send(&tokens(&["good-1", "stale", "good-2", "good-1"]), &message())
            .await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_tokens, tokens(&["stale"]));
        assert!(report.dropped_tokens.is_empty());
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut provider = MockPushProvider::new();
        provider.expect_name().return_const("mock".to_string());
        provider.expect_send_multicast().returning(move |tokens, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(vec![
                    TokenOutcome::Delivered,
                    TokenOutcome::Transient("429".to_string()),
                ])
            } else {
                assert_eq!(tokens, ["b".to_string()]);
                Ok(vec![TokenOutcome::Delivered])
            }
        });

        let adapter =
            PushDeliveryAdapter::new(Arc::new(provider), fast_policy(3), Duration::from_secs(1));
        let report = adapter.send(&tokens(&["a", "b"]), &message()).await;

        assert_eq!(report.success_count, 2);
        assert!(report.is_complete_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_dropped_after_max_attempts() {
        let mut provider = MockPushProvider::new();
        provider.expect_name().return_const("mock".to_string());
        provider
            .expect_send_multicast()
            .times(3)
            .returning(|_, _| Err(PushError::Transient("503".to_string())));

        let adapter =
            PushDeliveryAdapter::new(Arc::new(provider), fast_policy(3), Duration::from_secs(1));
        let report = adapter.send(&tokens(&["a", "b"]), &message()).await;

        assert_eq!(report.success_count, 0);
        assert!(report.failed_tokens.is_empty());
        assert_eq!(report.dropped_tokens, tokens(&["a", "b"]));
        assert_eq!(report.attempts, 3);
    }

    #[tokio::test]
    async fn test_configured_attempts_capped_at_three() {
        let mut provider = MockPushProvider::new();
        provider.expect_name().return_const("mock".to_string());
        provider
            .expect_send_multicast()
            .times(3)
            .returning(|_, _| Err(PushError::Transient("503".to_string())));

        let config = PushConfig {
            max_attempts: 10,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            ..PushConfig::default()
        };
        let adapter = PushDeliveryAdapter::from_config(Arc::new(provider), &config);
        let report = adapter.send(&tokens(&["a"]), &message()).await;

        assert_eq!(report.attempts, MAX_PUSH_ATTEMPTS);
        assert_eq!(report.dropped_tokens, tokens(&["a"]));
    }

    #[tokio::test]
    async fn test_zero_configured_attempts_still_sends_once() {
        let mut provider = MockPushProvider::new();
        provider.expect_name().return_const("mock".to_string());
        provider
            .expect_send_multicast()
            .times(1)
            .returning(|tokens, _| Ok(vec![TokenOutcome::Delivered; tokens.len()]));

        let config = PushConfig {
            max_attempts: 0,
            ..PushConfig::default()
        };
        let adapter = PushDeliveryAdapter::from_config(Arc::new(provider), &config);
        let report = adapter.send(&tokens(&["a", "b"]), &message()).await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.attempts, 1);
    }

    struct SlowProvider;

    #[async_trait]
    impl PushProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn send_multicast(
            &self,
            tokens: &[String],
            _message: &PushMessage,
        ) -> Result<Vec<TokenOutcome>, PushError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![TokenOutcome::Delivered; tokens.len()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let adapter =
            PushDeliveryAdapter::new(Arc::new(SlowProvider), fast_policy(2), Duration::from_millis(50));
        let report = adapter.send(&tokens(&["a"]), &message()).await;

        assert_eq!(report.attempts, 2);
        assert_eq!(report.dropped_tokens, tokens(&["a"]));
        assert!(report.failed_tokens.is_empty());
    }

    #[tokio::test]
    async fn test_empty_tokens_skip_provider() {
        let provider = MockPushProvider::new();
        let adapter =
            PushDeliveryAdapter::new(Arc::new(provider), fast_policy(3), Duration::from_secs(1));
        let report = adapter.send(&[], &message()).await;
        assert_eq!(report, DeliveryReport::default());
    }
}
