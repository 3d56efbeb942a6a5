use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{CandidateFailure, FailureReason, TransportExhausted};

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:5173/api/relay";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/**
 * \brief 具名 CORS 中继服务：`prefix + encodeURIComponent(url)`。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedProxy {
    pub name: String,
    pub prefix: String,
}

impl NamedProxy {
    pub fn new(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
        }
    }

    pub fn wrap(&self, url: &str) -> String {
        format!("{}{}", self.prefix, urlencoding::encode(url))
    }
}

pub fn default_proxies() -> Vec<NamedProxy> {
    vec![
        NamedProxy::new("allorigins", "https://api.allorigins.win/raw?url="),
        NamedProxy::new("corsproxy", "https://corsproxy.io/?"),
        NamedProxy::new("corsanywhere", "https://cors-anywhere.herokuapp.com/"),
        NamedProxy::new("thingproxy", "https://thingproxy.freeboard.io/fetch/"),
    ]
}

/**
 * \brief 传输相关的持久化设置。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    pub proxies: Vec<NamedProxy>,
    /** \brief 用户当前选中的具名代理 */
    pub current_proxy: String,
    /** \brief 中继端点，留空则不使用中继 */
    pub relay_url: String,
    /** \brief 单个候选的超时；0 表示不限 */
    pub timeout_secs: u64,
    /** \brief 开启后跳过网络，直接返回示例内容 */
    pub simulation_mode: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            proxies: default_proxies(),
            current_proxy: "allorigins".to_string(),
            relay_url: DEFAULT_RELAY_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            simulation_mode: false,
        }
    }
}

impl TransportSettings {
    pub fn proxy(&self, name: &str) -> Option<&NamedProxy> {
        self.proxies.iter().find(|p| p.name == name)
    }

    /**
     * \brief 代理表中当前代理的下一个（循环）。
     */
    pub fn next_proxy_name(&self) -> Option<&str> {
        if self.proxies.is_empty() {
            return None;
        }
        let next = self
            .proxies
            .iter()
            .position(|p| p.name == self.current_proxy)
            .map(|i| (i + 1) % self.proxies.len())
            .unwrap_or(0);
        Some(self.proxies[next].name.as_str())
    }

    /**
     * \brief 默认候选顺序：直连 → 当前代理 → 其余代理（表内顺序）→ 中继。
     */
    pub fn candidates(&self) -> Vec<CandidateKind> {
        let mut out = vec![CandidateKind::Direct];
        if self.proxy(&self.current_proxy).is_some() {
            out.push(CandidateKind::NamedProxy(self.current_proxy.clone()));
        }
        out.extend(
            self.proxies
                .iter()
                .filter(|p| p.name != self.current_proxy)
                .map(|p| CandidateKind::NamedProxy(p.name.clone())),
        );
        if !self.relay_url.trim().is_empty() {
            out.push(CandidateKind::Relay);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "camelCase")]
pub enum CandidateKind {
    Direct,
    NamedProxy(String),
    Relay,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::Direct => f.write_str("direct"),
            CandidateKind::NamedProxy(name) => write!(f, "proxy:{name}"),
            CandidateKind::Relay => f.write_str("relay"),
        }
    }
}

/**
 * \brief 与传输方式无关的请求描述。
 */
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn relay_envelope(&self) -> Value {
        let headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<_, _>>();
        let mut envelope = json!({
            "targetUrl": self.url,
            "method": self.method.as_str(),
            "headers": headers,
        });
        if let Some(body) = &self.body {
            envelope["body"] = body.clone();
        }
        envelope
    }
}

/**
 * \brief 候选返回的原始响应。
 */
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub via: CandidateKind,
}

impl RawResponse {
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/** \brief 从响应体中识别服务方错误信息。 */
pub type ErrorProbe<'a> = dyn Fn(&Value) -> Option<String> + Send + Sync + 'a;

/**
 * \brief 上次成功的候选（仅作建议，不影响正确性）。
 */
#[derive(Debug, Clone, Default)]
pub struct PreferredTransport(Arc<RwLock<Option<CandidateKind>>>);

static PROCESS_PREFERENCE: Lazy<PreferredTransport> = Lazy::new(PreferredTransport::default);

impl PreferredTransport {
    /** \brief 进程级共享实例。 */
    pub fn process_wide() -> Self {
        PROCESS_PREFERENCE.clone()
    }

    pub fn get(&self) -> Option<CandidateKind> {
        self.0.read().ok().and_then(|g| g.clone())
    }

    pub fn set(&self, kind: CandidateKind) {
        if let Ok(mut guard) = self.0.write() {
            *guard = Some(kind);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.0.write() {
            *guard = None;
        }
    }
}

/**
 * \brief 按顺序逐个尝试候选，直到某个候选给出可用响应。
 */
pub struct TransportResolver {
    client: Client,
    settings: TransportSettings,
    preference: PreferredTransport,
}

impl TransportResolver {
    pub fn new(settings: TransportSettings) -> Result<Self> {
        let mut builder = Client::builder();
        if settings.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(settings.timeout_secs));
        }
        Ok(Self {
            client: builder.build()?,
            settings,
            preference: PreferredTransport::process_wide(),
        })
    }

    pub fn with_preference(mut self, preference: PreferredTransport) -> Self {
        self.preference = preference;
        self
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn preference(&self) -> &PreferredTransport {
        &self.preference
    }

    /**
     * \brief 默认候选列表；若有缓存的偏好且仍在列表中，则提到最前。
     */
    pub fn candidates(&self) -> Vec<CandidateKind> {
        let mut list = self.settings.candidates();
        if let Some(preferred) = self.preference.get() {
            if let Some(pos) = list.iter().position(|c| *c == preferred) {
                let kind = list.remove(pos);
                list.insert(0, kind);
            }
        }
        list
    }

    /**
     * \brief 依次执行候选。非 2xx、网络错误或内嵌错误都转到下一个候选，同一候选不重试。
     */
    pub async fn execute(
        &self,
        request: &HttpRequest,
        candidates: &[CandidateKind],
        probe: &ErrorProbe<'_>,
    ) -> Result<RawResponse, TransportExhausted> {
        let mut failures = Vec::new();
        for candidate in candidates {
            debug!(candidate = %candidate, url = %request.url, "trying transport candidate");
            let reason = match self.attempt(candidate, request).await {
                Ok(raw) => match classify(&raw, probe) {
                    None => {
                        self.preference.set(candidate.clone());
                        return Ok(raw);
                    }
                    Some(reason) => reason,
                },
                Err(reason) => reason,
            };
            warn!(candidate = %candidate, reason = %reason, "candidate failed");
            failures.push(CandidateFailure {
                candidate: candidate.clone(),
                reason,
            });
        }
        Err(TransportExhausted { failures })
    }

    async fn attempt(
        &self,
        candidate: &CandidateKind,
        request: &HttpRequest,
    ) -> Result<RawResponse, FailureReason> {
        let (status, body) = match candidate {
            CandidateKind::Direct => self.send(request, &request.url).await?,
            CandidateKind::NamedProxy(name) => {
                let proxy = self
                    .settings
                    .proxy(name)
                    .ok_or_else(|| FailureReason::Network(format!("unknown proxy `{name}`")))?;
                self.send(request, &proxy.wrap(&request.url)).await?
            }
            CandidateKind::Relay => self.send_relay(request).await?,
        };
        Ok(RawResponse {
            status,
            body,
            via: candidate.clone(),
        })
    }

    async fn send(&self, request: &HttpRequest, url: &str) -> Result<(u16, String), FailureReason> {
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(header_map(&request.headers)?);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| FailureReason::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| FailureReason::Network(e.to_string()))?;
        Ok((status, text))
    }

    async fn send_relay(&self, request: &HttpRequest) -> Result<(u16, String), FailureReason> {
        let relay_url = self.settings.relay_url.trim();
        if relay_url.is_empty() {
            return Err(FailureReason::Relay("relay url not configured".to_string()));
        }
        let resp = self
            .client
            .post(relay_url)
            .header(CONTENT_TYPE, "application/json")
            .json(&request.relay_envelope())
            .send()
            .await
            .map_err(|e| FailureReason::Network(e.to_string()))?;
        let outer = resp.status();
        let envelope: Value = resp
            .json()
            .await
            .map_err(|e| FailureReason::Relay(format!("invalid relay envelope: {e}")))?;
        if !outer.is_success() {
            let msg = envelope
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("relay request failed");
            return Err(FailureReason::Relay(format!("{} -> {}", outer.as_u16(), msg)));
        }
        let status = envelope
            .get("status")
            .and_then(|s| s.as_u64())
            .ok_or_else(|| FailureReason::Relay("relay envelope without status".to_string()))?;
        let body = match envelope.get("data") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Ok((status as u16, body))
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, FailureReason> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FailureReason::Network(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FailureReason::Network(format!("invalid header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/**
 * \brief 判定响应是否可用；不可用时返回失败原因。
 */
fn classify(raw: &RawResponse, probe: &ErrorProbe<'_>) -> Option<FailureReason> {
    let parsed = raw.json();
    let message = parsed.as_ref().and_then(|v| probe(v));
    if !raw.is_success() {
        return Some(FailureReason::Status {
            status: raw.status,
            message,
        });
    }
    message.map(FailureReason::Embedded)
}
