use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::models::ProviderId;
use crate::transport::CandidateKind;

/**
 * \brief 配置/编程错误，重试无意义。
 */
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider {provider} does not support {operation}")]
    UnsupportedOperation {
        provider: ProviderId,
        operation: &'static str,
    },
}

/**
 * \brief 单个传输候选失败的原因。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /** \brief 连接、超时等网络层错误 */
    Network(String),
    /** \brief 非 2xx 状态；若响应体带有服务方错误信息则一并保留 */
    Status { status: u16, message: Option<String> },
    /** \brief 2xx 但响应体内嵌服务方错误 */
    Embedded(String),
    /** \brief 中继端点自身报错或信封无法解析 */
    Relay(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Network(e) => write!(f, "network error: {e}"),
            FailureReason::Status {
                status,
                message: Some(m),
            } => write!(f, "status {status}: {m}"),
            FailureReason::Status {
                status,
                message: None,
            } => write!(f, "status {status}"),
            FailureReason::Embedded(m) => write!(f, "embedded provider error: {m}"),
            FailureReason::Relay(m) => write!(f, "relay error: {m}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub candidate: CandidateKind,
    pub reason: FailureReason,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.candidate, self.reason)
    }
}

/**
 * \brief 全部候选均失败。是否降级为示例内容由编排器决定。
 */
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("all {} transport candidates failed", .failures.len())]
pub struct TransportExhausted {
    pub failures: Vec<CandidateFailure>,
}

impl TransportExhausted {
    /**
     * \brief 第一条来自服务方的结构化错误信息（如密钥无效、限流）。
     */
    pub fn provider_message(&self) -> Option<&str> {
        self.failures.iter().find_map(|f| match &f.reason {
            FailureReason::Status {
                message: Some(m), ..
            } => Some(m.as_str()),
            FailureReason::Embedded(m) => Some(m.as_str()),
            _ => None,
        })
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.to_string()).collect()
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("missing credential `{field}` for provider {provider}")]
    MissingCredential {
        provider: ProviderId,
        field: &'static str,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("unexpected response shape: {0}")]
    Unwrap(String),
    #[error(transparent)]
    Transport(#[from] TransportExhausted),
    #[error("access token request failed: {0}")]
    Token(#[source] Box<AdapterError>),
    #[error("invalid request: {0}")]
    Request(String),
}

impl AdapterError {
    pub fn exhausted(&self) -> Option<&TransportExhausted> {
        match self {
            AdapterError::Transport(e) => Some(e),
            AdapterError::Token(inner) => inner.exhausted(),
            _ => None,
        }
    }
}

/**
 * \brief 面向界面的错误类别；展示层按类别匹配，而不是匹配文案。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Configuration,
    MissingCredential,
    ProviderError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_message_prefers_first_structured_error() {
        let ex = TransportExhausted {
            failures: vec![
                CandidateFailure {
                    candidate: CandidateKind::Direct,
                    reason: FailureReason::Network("refused".into()),
                },
                CandidateFailure {
                    candidate: CandidateKind::NamedProxy("corsproxy".into()),
                    reason: FailureReason::Status {
                        status: 401,
                        message: Some("Incorrect API key".into()),
                    },
                },
                CandidateFailure {
                    candidate: CandidateKind::Relay,
                    reason: FailureReason::Embedded("later".into()),
                },
            ],
        };
        assert_eq!(ex.provider_message(), Some("Incorrect API key"));
        assert_eq!(ex.diagnostics().len(), 3);
        assert_eq!(ex.to_string(), "all 3 transport candidates failed");
    }

    #[test]
    fn test_token_error_exposes_inner_exhaustion() {
        let err = AdapterError::Token(Box::new(AdapterError::Transport(TransportExhausted {
            failures: vec![],
        })));
        assert!(err.exhausted().is_some());
        assert!(err.to_string().starts_with("access token request failed"));
    }
}
