//! 推送服务实现
//!
//! `FcmPushProvider` 通过 HTTP v1 接口逐令牌发送；`LoggingPushProvider`
//! 在未启用推送时使用，只记录日志。

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, info};

use helpdesk_shared::config::PushConfig;

use super::error::PushError;
use super::push::{PushMessage, PushProvider, TokenOutcome};

// ---------------------------------------------------------------------------
// FCM
// ---------------------------------------------------------------------------

/// FCM HTTP v1 推送
pub struct FcmPushProvider {
    client: reqwest::Client,
    send_url: String,
    access_token: String,
}

impl FcmPushProvider {
    pub fn from_config(config: &PushConfig) -> Result<Self, PushError> {
        if config.project_id.trim().is_empty() {
            return Err(PushError::Config("project_id 不能为空".to_string()));
        }
        let access_token = config
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PushError::Config("缺少 access_token".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PushError::Config(format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            client,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                config.endpoint.trim_end_matches('/'),
                config.project_id
            ),
            access_token,
        })
    }

    async fn send_one(&self, token: &str, message: &PushMessage) -> TokenOutcome {
        let body = json!({
            "message": {
                "token": token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": message.data,
            }
        });

        let response = match self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return TokenOutcome::Transient(format!("请求失败: {e}")),
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        classify_response(status, &text)
    }
}

#[async_trait]
impl PushProvider for FcmPushProvider {
    fn name(&self) -> &str {
        "fcm"
    }

    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, PushError> {
        let outcomes = join_all(tokens.iter().map(|t| self.send_one(t, message))).await;
        debug!(tokens = tokens.len(), "FCM 批量发送完成");
        Ok(outcomes)
    }
}

/// 按响应状态区分永久失败与可重试失败
///
/// 404（UNREGISTERED）说明令牌已注销。400 只有在错误详情指向 `message.token`
/// 时才是令牌问题，其余 400 多为消息体本身有误，不能据此清理令牌。
/// 鉴权、限流与服务端错误都可能恢复
pub fn classify_response(status: StatusCode, body: &str) -> TokenOutcome {
    if status.is_success() {
        return TokenOutcome::Delivered;
    }

    let reason = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
    match status {
        StatusCode::NOT_FOUND => TokenOutcome::Permanent(reason),
        StatusCode::BAD_REQUEST if rejects_token(body) => TokenOutcome::Permanent(reason),
        _ => TokenOutcome::Transient(reason),
    }
}

/// 错误详情是否指向令牌本身
fn rejects_token(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    let Some(details) = value.pointer("/error/details").and_then(Value::as_array) else {
        return false;
    };

    details.iter().any(|detail| {
        let unregistered = detail.get("errorCode").and_then(Value::as_str) == Some("UNREGISTERED");
        let token_field = detail
            .get("fieldViolations")
            .and_then(Value::as_array)
            .is_some_and(|violations| {
                violations
                    .iter()
                    .any(|v| v.get("field").and_then(Value::as_str) == Some("message.token"))
            });
        unregistered || token_field
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// 日志推送
// ---------------------------------------------------------------------------

/// 仅记录日志的推送实现，未配置推送服务时使用
pub struct LoggingPushProvider;

#[async_trait]
impl PushProvider for LoggingPushProvider {
    fn name(&self) -> &str {
        "logging"
    }

    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, PushError> {
        info!(
            tokens = tokens.len(),
            title = %message.title,
            "推送未启用，仅记录推送内容"
        );
        Ok(vec![TokenOutcome::Delivered; tokens.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_classify_response() {
        assert_eq!(
            classify_response(StatusCode::OK, "{}"),
            TokenOutcome::Delivered
        );
        assert!(matches!(
            classify_response(StatusCode::NOT_FOUND, "UNREGISTERED"),
            TokenOutcome::Permanent(_)
        ));
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            TokenOutcome::Transient(_)
        ));
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            assert!(matches!(
                classify_response(status, ""),
                TokenOutcome::Transient(_)
            ));
        }
    }

    #[test]
    fn test_bad_request_prunes_only_invalid_token() {
        let invalid_token = json!({
            "error": {
                "code": 400,
                "status": "INVALID_ARGUMENT",
                "details": [{
                    "@type": "type.googleapis.com/google.rpc.BadRequest",
                    "fieldViolations": [{
                        "field": "message.token",
                        "description": "The registration token is not a valid FCM registration token"
                    }]
                }]
            }
        });
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, &invalid_token.to_string()),
            TokenOutcome::Permanent(_)
        ));

        let unregistered = json!({
            "error": {
                "code": 400,
                "details": [{ "errorCode": "UNREGISTERED" }]
            }
        });
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, &unregistered.to_string()),
            TokenOutcome::Permanent(_)
        ));

        // 消息体字段有误，与令牌无关
        let bad_payload = json!({
            "error": {
                "code": 400,
                "status": "INVALID_ARGUMENT",
                "details": [{
                    "fieldViolations": [{ "field": "message.data[0].value" }]
                }]
            }
        });
        assert!(matches!(
            classify_response(StatusCode::BAD_REQUEST, &bad_payload.to_string()),
            TokenOutcome::Transient(_)
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate("令牌失效", 2), "令牌");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = PushConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(matches!(
            FcmPushProvider::from_config(&config),
            Err(PushError::Config(_))
        ));

        let config = PushConfig {
            enabled: true,
            project_id: "helpdesk".to_string(),
            access_token: Some("token".to_string()),
            endpoint: "https://fcm.example.com/".to_string(),
            ..Default::default()
        };
        let provider = FcmPushProvider::from_config(&config).unwrap();
        assert_eq!(
            provider.send_url,
            "https://fcm.example.com/v1/projects/helpdesk/messages:send"
        );
    }

    #[tokio::test]
    async fn test_logging_provider_delivers_all() {
        let message = PushMessage {
            title: "t".to_string(),
            body: "b".to_string(),
            data: HashMap::new(),
        };
        let outcomes = LoggingPushProvider
            .send_multicast(&["a".to_string(), "b".to_string()], &message)
            .await
            .unwrap();
        assert_eq!(outcomes, vec![TokenOutcome::Delivered; 2]);
    }
}
