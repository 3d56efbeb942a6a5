use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{AdapterError, ConfigError};
use crate::models::{AspectRatio, ProviderConfig, ProviderId};
use crate::prompts;
use crate::registry::{self, Endpoint, Resolved, ANTHROPIC_VERSION};
use crate::transport::{CandidateKind, HttpRequest, RawResponse, TransportResolver};

const TEST_MAX_TOKENS: u32 = 10;
const TEST_ACK: &str = "API连接成功";

/**
 * \brief 适配器可执行的逻辑操作。
 */
#[derive(Debug, Clone, Copy)]
pub enum AdapterOp<'a> {
    Test,
    GenerateText { system: &'a str, prompt: &'a str },
    GenerateImage { prompt: &'a str, aspect_ratio: AspectRatio },
    /** \brief 让模型从链接中列出图片地址，不带 system 提示 */
    DescribeExtract { prompt: &'a str },
}

/**
 * \brief 归一化后的成功结果。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Text(String),
    ImageUrl(String),
    Ack(String),
}

/**
 * \brief 每个服务一个适配器：负责构造请求、解析响应、识别服务方错误。
 */
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn build_request(
        &self,
        op: &AdapterOp<'_>,
        cfg: &ProviderConfig,
    ) -> Result<HttpRequest, AdapterError>;

    fn unwrap_response(
        &self,
        op: &AdapterOp<'_>,
        raw: &RawResponse,
    ) -> Result<Normalized, AdapterError>;

    /** \brief 从响应体中提取服务方错误信息 */
    fn provider_error(&self, body: &Value) -> Option<String>;

    async fn execute(
        &self,
        op: &AdapterOp<'_>,
        cfg: &ProviderConfig,
        transport: &TransportResolver,
        candidates: &[CandidateKind],
    ) -> Result<Normalized, AdapterError> {
        let request = self.build_request(op, cfg)?;
        let probe = |v: &Value| self.provider_error(v);
        let raw = transport.execute(&request, candidates, &probe).await?;
        self.unwrap_response(op, &raw)
    }
}

/**
 * \brief 凭据检查，在任何网络请求之前执行。
 */
pub fn check_credentials(id: ProviderId, cfg: &ProviderConfig) -> Result<(), AdapterError> {
    if cfg.api_key.trim().is_empty() {
        return Err(AdapterError::MissingCredential {
            provider: id,
            field: "apiKey",
        });
    }
    if registry::spec(id).requires_secret && cfg.secret_key.trim().is_empty() {
        return Err(AdapterError::MissingCredential {
            provider: id,
            field: "secretKey",
        });
    }
    Ok(())
}

static OPENAI: OpenAiCompatible = OpenAiCompatible {
    id: ProviderId::OpenAI,
};
static DEEPSEEK: OpenAiCompatible = OpenAiCompatible {
    id: ProviderId::DeepSeek,
};
static POE: OpenAiCompatible = OpenAiCompatible { id: ProviderId::Poe };
static MOONSHOT: OpenAiCompatible = OpenAiCompatible {
    id: ProviderId::Moonshot,
};
static ANTHROPIC: Anthropic = Anthropic;
static BAIDU: Baidu = Baidu;

pub fn adapter_for(id: ProviderId) -> &'static dyn ProviderAdapter {
    match id {
        ProviderId::OpenAI => &OPENAI,
        ProviderId::DeepSeek => &DEEPSEEK,
        ProviderId::Poe => &POE,
        ProviderId::Moonshot => &MOONSHOT,
        ProviderId::Anthropic => &ANTHROPIC,
        ProviderId::Baidu => &BAIDU,
    }
}

/** \brief `error.message` 或顶层 `message` */
fn extract_openai_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(|v| v.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
}

fn extract_openai_content(v: &Value) -> Option<String> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}

fn extract_anthropic_content(v: &Value) -> Option<String> {
    let text = v
        .get("content")
        .and_then(|arr| arr.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })?;
    Some(text)
}

fn unsupported(provider: ProviderId, endpoint: Endpoint) -> AdapterError {
    ConfigError::UnsupportedOperation {
        provider,
        operation: endpoint.as_str(),
    }
    .into()
}

fn require_json(raw: &RawResponse) -> Result<Value, AdapterError> {
    raw.json()
        .ok_or_else(|| AdapterError::Unwrap(format!("response via {} is not JSON", raw.via)))
}

fn non_empty(text: Option<String>, what: &str) -> Result<String, AdapterError> {
    text.filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AdapterError::Unwrap(format!("missing {what}")))
}

fn dalle_size(aspect_ratio: AspectRatio) -> &'static str {
    match aspect_ratio {
        AspectRatio::Square => "1024x1024",
        AspectRatio::Landscape | AspectRatio::Wide => "1792x1024",
        AspectRatio::Portrait | AspectRatio::Tall => "1024x1792",
    }
}

fn chat_messages(system: Option<&str>, prompt: &str) -> Value {
    let mut messages = Vec::new();
    if let Some(sys) = system.filter(|s| !s.is_empty()) {
        messages.push(json!({"role": "system", "content": sys}));
    }
    messages.push(json!({"role": "user", "content": prompt}));
    Value::Array(messages)
}

/**
 * \brief OpenAI 兼容的 chat completions 协议：openai、deepseek、moonshot、poe。
 */
#[derive(Debug)]
pub struct OpenAiCompatible {
    id: ProviderId,
}

impl OpenAiCompatible {
    fn chat_body(&self, r: &Resolved<'_>, model: &str, messages: Value) -> Value {
        let mut body = json!({ "model": model, "messages": messages });
        if r.spec.sends_temperature {
            body["temperature"] = json!(r.temperature);
        }
        if r.spec.sends_max_tokens {
            body["max_tokens"] = json!(r.max_tokens);
        }
        body
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatible {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn build_request(
        &self,
        op: &AdapterOp<'_>,
        cfg: &ProviderConfig,
    ) -> Result<HttpRequest, AdapterError> {
        check_credentials(self.id, cfg)?;
        let r = registry::spec(self.id).resolve(cfg);
        let (url, body) = match *op {
            AdapterOp::Test => {
                let mut body = json!({
                    "model": r.test_model(),
                    "messages": chat_messages(None, prompts::test_prompt(self.id)),
                });
                if self.id == ProviderId::OpenAI {
                    body["max_tokens"] = json!(TEST_MAX_TOKENS);
                }
                (r.endpoint(Endpoint::Text)?, body)
            }
            AdapterOp::GenerateText { system, prompt } => (
                r.endpoint(Endpoint::Text)?,
                self.chat_body(&r, r.text_model, chat_messages(Some(system), prompt)),
            ),
            AdapterOp::DescribeExtract { prompt } => (
                r.endpoint(Endpoint::Text)?,
                self.chat_body(&r, r.text_model, chat_messages(None, prompt)),
            ),
            AdapterOp::GenerateImage {
                prompt,
                aspect_ratio,
            } => {
                let url = r.endpoint(Endpoint::Image)?;
                let body = if self.id == ProviderId::Poe {
                    json!({
                        "model": r.image_model,
                        "messages": chat_messages(None, prompt),
                    })
                } else {
                    json!({
                        "model": r.image_model,
                        "prompt": prompt,
                        "n": 1,
                        "size": dalle_size(aspect_ratio),
                    })
                };
                (url, body)
            }
        };
        Ok(HttpRequest::post(url)
            .header("Authorization", format!("Bearer {}", r.api_key))
            .json(body))
    }

    fn unwrap_response(
        &self,
        op: &AdapterOp<'_>,
        raw: &RawResponse,
    ) -> Result<Normalized, AdapterError> {
        let v = require_json(raw)?;
        match op {
            AdapterOp::Test => Ok(Normalized::Ack(
                extract_openai_content(&v)
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| TEST_ACK.to_string()),
            )),
            AdapterOp::GenerateText { .. } | AdapterOp::DescribeExtract { .. } => Ok(
                Normalized::Text(non_empty(extract_openai_content(&v), "choices[0].message.content")?),
            ),
            AdapterOp::GenerateImage { .. } if self.id == ProviderId::Poe => {
                let content = extract_openai_content(&v).unwrap_or_default();
                prompts::parse_image_urls(&content, 1)
                    .into_iter()
                    .next()
                    .map(Normalized::ImageUrl)
                    .ok_or_else(|| AdapterError::Unwrap("no image url in reply".to_string()))
            }
            AdapterOp::GenerateImage { .. } => {
                let first = v.get("data").and_then(|d| d.get(0));
                let url = first
                    .and_then(|d| d.get("url"))
                    .and_then(|u| u.as_str())
                    .map(|s| s.to_string())
                    .or_else(|| {
                        first
                            .and_then(|d| d.get("b64_json"))
                            .and_then(|b| b.as_str())
                            .map(|b| format!("data:image/png;base64,{b}"))
                    });
                Ok(Normalized::ImageUrl(non_empty(url, "data[0].url")?))
            }
        }
    }

    fn provider_error(&self, body: &Value) -> Option<String> {
        extract_openai_error(body)
    }
}

/**
 * \brief Anthropic Messages API。
 */
#[derive(Debug)]
pub struct Anthropic;

#[async_trait]
impl ProviderAdapter for Anthropic {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn build_request(
        &self,
        op: &AdapterOp<'_>,
        cfg: &ProviderConfig,
    ) -> Result<HttpRequest, AdapterError> {
        check_credentials(ProviderId::Anthropic, cfg)?;
        let r = registry::spec(ProviderId::Anthropic).resolve(cfg);
        let user = |text: &str| json!([{"role": "user", "content": text}]);
        let body = match *op {
            AdapterOp::Test => json!({
                "model": r.test_model(),
                "max_tokens": TEST_MAX_TOKENS,
                "messages": user(prompts::test_prompt(ProviderId::Anthropic)),
            }),
            AdapterOp::GenerateText { system, prompt } => {
                let mut body = json!({
                    "model": r.text_model,
                    "max_tokens": r.max_tokens,
                    "temperature": r.temperature,
                    "messages": user(prompt),
                });
                if !system.is_empty() {
                    body["system"] = json!(system);
                }
                body
            }
            AdapterOp::DescribeExtract { prompt } => json!({
                "model": r.text_model,
                "max_tokens": r.max_tokens,
                "messages": user(prompt),
            }),
            AdapterOp::GenerateImage { .. } => {
                return Err(unsupported(self.id(), Endpoint::Image))
            }
        };
        Ok(HttpRequest::post(r.endpoint(Endpoint::Text)?)
            .header("x-api-key", r.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body))
    }

    fn unwrap_response(
        &self,
        op: &AdapterOp<'_>,
        raw: &RawResponse,
    ) -> Result<Normalized, AdapterError> {
        let v = require_json(raw)?;
        let text = extract_anthropic_content(&v);
        match op {
            AdapterOp::Test => Ok(Normalized::Ack(
                text.filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| TEST_ACK.to_string()),
            )),
            _ => Ok(Normalized::Text(non_empty(text, "content[].text")?)),
        }
    }

    fn provider_error(&self, body: &Value) -> Option<String> {
        extract_openai_error(body)
    }
}

/**
 * \brief 百度文心：先用 apiKey/secretKey 换取 access_token，再调用对话接口。
 */
#[derive(Debug)]
pub struct Baidu;

impl Baidu {
    fn completion_request(
        &self,
        op: &AdapterOp<'_>,
        cfg: &ProviderConfig,
        token: &str,
    ) -> Result<HttpRequest, AdapterError> {
        let r = registry::spec(ProviderId::Baidu).resolve(cfg);
        let endpoint = r.endpoint(Endpoint::Text)?;
        let sep = if endpoint.contains('?') { '&' } else { '?' };
        let url = format!("{endpoint}{sep}access_token={}", urlencoding::encode(token));
        let body = match *op {
            AdapterOp::Test => json!({
                "messages": chat_messages(None, prompts::test_prompt(ProviderId::Baidu)),
            }),
            AdapterOp::GenerateText { system, prompt } => {
                let mut body = json!({
                    "messages": chat_messages(None, prompt),
                    "temperature": r.temperature,
                });
                if !system.is_empty() {
                    body["system"] = json!(system);
                }
                body
            }
            AdapterOp::DescribeExtract { prompt } => json!({
                "messages": chat_messages(None, prompt),
                "temperature": r.temperature,
            }),
            AdapterOp::GenerateImage { .. } => {
                return Err(unsupported(self.id(), Endpoint::Image))
            }
        };
        Ok(HttpRequest::post(url).json(body))
    }
}

#[async_trait]
impl ProviderAdapter for Baidu {
    fn id(&self) -> ProviderId {
        ProviderId::Baidu
    }

    /**
     * \brief 第一步的令牌请求；凭据缺失时立即失败。
     */
    fn build_request(
        &self,
        op: &AdapterOp<'_>,
        cfg: &ProviderConfig,
    ) -> Result<HttpRequest, AdapterError> {
        check_credentials(ProviderId::Baidu, cfg)?;
        if matches!(op, AdapterOp::GenerateImage { .. }) {
            return Err(unsupported(ProviderId::Baidu, Endpoint::Image));
        }
        let r = registry::spec(ProviderId::Baidu).resolve(cfg);
        let url = format!(
            "{}?grant_type=client_credentials&client_id={}&client_secret={}",
            r.endpoint(Endpoint::Token)?,
            urlencoding::encode(r.api_key),
            urlencoding::encode(r.secret_key),
        );
        Ok(HttpRequest::post(url).header("Accept", "application/json"))
    }

    fn unwrap_response(
        &self,
        op: &AdapterOp<'_>,
        raw: &RawResponse,
    ) -> Result<Normalized, AdapterError> {
        let v = require_json(raw)?;
        let result = v
            .get("result")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string());
        match op {
            AdapterOp::Test => Ok(Normalized::Ack(
                result
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| TEST_ACK.to_string()),
            )),
            _ => Ok(Normalized::Text(non_empty(result, "result")?)),
        }
    }

    fn provider_error(&self, body: &Value) -> Option<String> {
        body.get("error_msg")
            .or_else(|| body.get("error_description"))
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
    }

    async fn execute(
        &self,
        op: &AdapterOp<'_>,
        cfg: &ProviderConfig,
        transport: &TransportResolver,
        candidates: &[CandidateKind],
    ) -> Result<Normalized, AdapterError> {
        let token_request = self.build_request(op, cfg)?;
        let probe = |v: &Value| self.provider_error(v);
        let token_raw = transport
            .execute(&token_request, candidates, &probe)
            .await
            .map_err(|e| AdapterError::Token(Box::new(e.into())))?;
        let token = token_raw
            .json()
            .and_then(|v| v.get("access_token").and_then(|t| t.as_str()).map(str::to_string))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AdapterError::Token(Box::new(AdapterError::Unwrap(
                    "missing access_token".to_string(),
                )))
            })?;

        let request = self.completion_request(op, cfg, &token)?;
        let raw = transport.execute(&request, candidates, &probe).await?;
        self.unwrap_response(op, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{PreferredTransport, TransportSettings};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(base: &str) -> ProviderConfig {
        ProviderConfig {
            api_key: "sk-test".into(),
            secret_key: "sec".into(),
            api_base: base.into(),
            ..Default::default()
        }
    }

    fn direct_only() -> TransportResolver {
        TransportResolver::new(TransportSettings {
            proxies: vec![],
            relay_url: String::new(),
            timeout_secs: 5,
            ..Default::default()
        })
        .expect("client")
        .with_preference(PreferredTransport::default())
    }

    fn raw(body: Value) -> RawResponse {
        RawResponse {
            status: 200,
            body: body.to_string(),
            via: CandidateKind::Direct,
        }
    }

    #[test]
    fn test_missing_credentials_fail_fast() {
        let err = adapter_for(ProviderId::OpenAI)
            .build_request(&AdapterOp::Test, &ProviderConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::MissingCredential { field: "apiKey", .. }
        ));

        let only_key = ProviderConfig {
            api_key: "k".into(),
            ..Default::default()
        };
        let err = check_credentials(ProviderId::Baidu, &only_key).unwrap_err();
        assert!(matches!(
            err,
            AdapterError::MissingCredential { field: "secretKey", .. }
        ));
    }

    #[test]
    fn test_openai_chat_request_shape() {
        let req = adapter_for(ProviderId::OpenAI)
            .build_request(
                &AdapterOp::GenerateText {
                    system: "sys",
                    prompt: "hello",
                },
                &cfg(""),
            )
            .expect("request");
        assert_eq!(req.url, "https://api.openai.com/v1/chat/completions");
        assert!(req
            .headers
            .contains(&("Authorization".to_string(), "Bearer sk-test".to_string())));
        let body = req.body.expect("body");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], 4000);
    }

    #[test]
    fn test_poe_omits_sampling_params() {
        let req = adapter_for(ProviderId::Poe)
            .build_request(
                &AdapterOp::GenerateText {
                    system: "",
                    prompt: "hi",
                },
                &cfg(""),
            )
            .expect("request");
        let body = req.body.expect("body");
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["messages"].as_array().map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_image_request_sizes_and_unsupported() {
        let req = adapter_for(ProviderId::OpenAI)
            .build_request(
                &AdapterOp::GenerateImage {
                    prompt: "cat",
                    aspect_ratio: AspectRatio::Tall,
                },
                &cfg(""),
            )
            .expect("request");
        assert!(req.url.ends_with("/v1/images/generations"));
        assert_eq!(req.body.expect("body")["size"], "1024x1792");

        for id in [ProviderId::Anthropic, ProviderId::DeepSeek, ProviderId::Baidu] {
            let err = adapter_for(id)
                .build_request(
                    &AdapterOp::GenerateImage {
                        prompt: "cat",
                        aspect_ratio: AspectRatio::Square,
                    },
                    &cfg(""),
                )
                .unwrap_err();
            assert!(matches!(err, AdapterError::Config(_)), "{id}: {err}");
        }
    }

    #[test]
    fn test_unwrap_shapes() {
        let text = AdapterOp::GenerateText {
            system: "",
            prompt: "p",
        };
        assert_eq!(
            adapter_for(ProviderId::DeepSeek)
                .unwrap_response(&text, &raw(json!({"choices": [{"message": {"content": "ok"}}]})))
                .unwrap(),
            Normalized::Text("ok".into())
        );
        assert_eq!(
            adapter_for(ProviderId::Anthropic)
                .unwrap_response(
                    &text,
                    &raw(json!({"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}))
                )
                .unwrap(),
            Normalized::Text("ab".into())
        );
        assert_eq!(
            adapter_for(ProviderId::Baidu)
                .unwrap_response(&text, &raw(json!({"result": "你好"})))
                .unwrap(),
            Normalized::Text("你好".into())
        );
        let err = adapter_for(ProviderId::Moonshot)
            .unwrap_response(&text, &raw(json!({"choices": []})))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unwrap(_)));
    }

    #[test]
    fn test_poe_image_reply_is_scanned_for_url() {
        let op = AdapterOp::GenerateImage {
            prompt: "p",
            aspect_ratio: AspectRatio::Square,
        };
        let body = json!({"choices": [{"message": {"content": "Here: ![img](https://cdn.poe.com/a.png)"}}]});
        assert_eq!(
            adapter_for(ProviderId::Poe).unwrap_response(&op, &raw(body)).unwrap(),
            Normalized::ImageUrl("https://cdn.poe.com/a.png".into())
        );
    }

    #[test]
    fn test_error_probes() {
        assert_eq!(
            adapter_for(ProviderId::OpenAI)
                .provider_error(&json!({"error": {"message": "Incorrect API key"}})),
            Some("Incorrect API key".into())
        );
        assert_eq!(
            adapter_for(ProviderId::Baidu)
                .provider_error(&json!({"error_code": 110, "error_msg": "Access token invalid"})),
            Some("Access token invalid".into())
        );
        assert_eq!(
            adapter_for(ProviderId::Baidu)
                .provider_error(&json!({"error": "invalid_client", "error_description": "unknown client id"})),
            Some("unknown client id".into())
        );
        assert_eq!(adapter_for(ProviderId::Baidu).provider_error(&json!({"result": "x"})), None);
    }

    #[tokio::test]
    async fn test_anthropic_headers_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"system": "sys"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"content": [{"type": "text", "text": "done"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = direct_only();
        let out = adapter_for(ProviderId::Anthropic)
            .execute(
                &AdapterOp::GenerateText {
                    system: "sys",
                    prompt: "write",
                },
                &cfg(&server.uri()),
                &transport,
                &transport.candidates(),
            )
            .await
            .expect("anthropic ok");
        assert_eq!(out, Normalized::Text("done".into()));
    }

    #[tokio::test]
    async fn test_baidu_two_step_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/2.0/token"))
            .and(query_param("grant_type", "client_credentials"))
            .and(query_param("client_id", "sk-test"))
            .and(query_param("client_secret", "sec"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok123"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions"))
            .and(query_param("access_token", "tok123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "你好"})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = direct_only();
        let out = adapter_for(ProviderId::Baidu)
            .execute(
                &AdapterOp::GenerateText {
                    system: "",
                    prompt: "hi",
                },
                &cfg(&server.uri()),
                &transport,
                &transport.candidates(),
            )
            .await
            .expect("baidu ok");
        assert_eq!(out, Normalized::Text("你好".into()));
    }

    #[tokio::test]
    async fn test_baidu_token_failure_skips_completion() {
        let server = MockServer::start().await;
        Mock::given(path("/oauth/2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "unknown client id"
            })))
            .mount(&server)
            .await;
        Mock::given(path("/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "x"})))
            .expect(0)
            .mount(&server)
            .await;

        let transport = direct_only();
        let err = adapter_for(ProviderId::Baidu)
            .execute(&AdapterOp::Test, &cfg(&server.uri()), &transport, &transport.candidates())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Token(_)));
        assert_eq!(
            err.exhausted().and_then(|e| e.provider_message()),
            Some("unknown client id")
        );
    }
}
