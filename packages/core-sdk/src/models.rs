use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ConfigError, ErrorKind};
use crate::registry;

/**
 * \brief 内置的模型服务标识。新增服务 = 新增一个变体 + 一条注册表记录 + 一个适配器分支。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    Anthropic,
    DeepSeek,
    Poe,
    Baidu,
    Moonshot,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::OpenAI,
        ProviderId::Anthropic,
        ProviderId::DeepSeek,
        ProviderId::Poe,
        ProviderId::Baidu,
        ProviderId::Moonshot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Poe => "poe",
            ProviderId::Baidu => "baidu",
            ProviderId::Moonshot => "moonshot",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAI),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "deepseek" => Ok(ProviderId::DeepSeek),
            "poe" => Ok(ProviderId::Poe),
            "baidu" | "wenxin" | "ernie" => Ok(ProviderId::Baidu),
            "moonshot" | "kimi" => Ok(ProviderId::Moonshot),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

/**
 * \brief 单个服务的配置。空字段在读取时回落到注册表中的默认值。
 */
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /** \brief API Key（明文保存在本地配置中） */
    pub api_key: String,
    /** \brief 第二凭据，仅百度使用 */
    pub secret_key: String,
    /** \brief 文本模型 */
    #[serde(alias = "model")]
    pub text_model: String,
    /** \brief 图片模型 */
    pub image_model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /** \brief 用户自备的完整接口地址，非空时替换文本接口 URL */
    pub api_proxy: String,
    /** \brief API 基地址覆盖 */
    pub api_base: String,
}

/**
 * \brief 整体持久化的应用配置：`{ provider, <id>: {...}, ... }`。
 * \details 读取时逐项解析，未知的顶层键只丢弃该项本身。
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    #[serde(rename = "provider")]
    pub active_provider: ProviderId,
    #[serde(flatten)]
    pub providers: BTreeMap<ProviderId, ProviderConfig>,
}

impl<'de> Deserialize<'de> for AppConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw = Map::<String, Value>::deserialize(deserializer)?;
        let active = raw
            .remove("provider")
            .ok_or_else(|| D::Error::missing_field("provider"))?;
        let active_provider = ProviderId::deserialize(active).map_err(D::Error::custom)?;

        let mut providers = BTreeMap::new();
        for (key, value) in raw {
            let Ok(id) = ProviderId::deserialize(Value::String(key.clone())) else {
                warn!(key, "ignoring unknown config entry");
                continue;
            };
            let cfg = ProviderConfig::deserialize(value)
                .map_err(|e| D::Error::custom(format!("{key}: {e}")))?;
            providers.insert(id, cfg);
        }
        Ok(Self {
            active_provider,
            providers,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        registry::default_app_config()
    }
}

impl AppConfig {
    /**
     * \brief 读取某个服务的配置；缺失时返回注册表默认值。
     */
    pub fn provider(&self, id: ProviderId) -> ProviderConfig {
        self.providers
            .get(&id)
            .cloned()
            .unwrap_or_else(|| registry::defaults_for(id))
    }

    pub fn provider_mut(&mut self, id: ProviderId) -> &mut ProviderConfig {
        self.providers
            .entry(id)
            .or_insert_with(|| registry::defaults_for(id))
    }

    /**
     * \brief 为缺失的服务与空字段补齐默认值。
     */
    pub fn fill_defaults(&mut self) {
        for id in ProviderId::ALL {
            registry::fill_defaults(id, self.provider_mut(id));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl FromStr for ArticleLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(ArticleLength::Short),
            "medium" => Ok(ArticleLength::Medium),
            "long" => Ok(ArticleLength::Long),
            other => Err(format!("unknown article length: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleTheme {
    #[default]
    Modern,
    Magazine,
    Tech,
    Business,
    Creative,
    Tutorial,
    Entertainment,
    Academic,
    Media,
}

impl FromStr for ArticleTheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modern" => Ok(ArticleTheme::Modern),
            "magazine" => Ok(ArticleTheme::Magazine),
            "tech" => Ok(ArticleTheme::Tech),
            "business" => Ok(ArticleTheme::Business),
            "creative" => Ok(ArticleTheme::Creative),
            "tutorial" => Ok(ArticleTheme::Tutorial),
            "entertainment" => Ok(ArticleTheme::Entertainment),
            "academic" => Ok(ArticleTheme::Academic),
            "media" => Ok(ArticleTheme::Media),
            other => Err(format!("unknown article theme: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[default]
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1:1" => Ok(AspectRatio::Square),
            "4:3" => Ok(AspectRatio::Landscape),
            "3:4" => Ok(AspectRatio::Portrait),
            "16:9" => Ok(AspectRatio::Wide),
            "9:16" => Ok(AspectRatio::Tall),
            other => Err(format!("unknown aspect ratio: {other}")),
        }
    }
}

/**
 * \brief 文章生成参数。
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleParams {
    pub title: Option<String>,
    /** \brief 用户的创作要求 */
    pub prompt: String,
    pub reference_text: String,
    pub reference_links: Vec<String>,
    pub length: ArticleLength,
    pub theme: ArticleTheme,
}

impl ArticleParams {
    /** \brief 去空白后的标题，空标题视为未提供。 */
    pub fn title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageParams {
    pub prompt: String,
    pub count: usize,
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractParams {
    pub links: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapeParams {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    TestConnection,
    GenerateArticle,
    GenerateImages,
    ExtractImages,
    ScrapeContent,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::TestConnection => "test_connection",
            OperationKind::GenerateArticle => "generate_article",
            OperationKind::GenerateImages => "generate_images",
            OperationKind::ExtractImages => "extract_images",
            OperationKind::ScrapeContent => "scrape_content",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum OperationPayload {
    Test,
    Article(ArticleParams),
    Images(ImageParams),
    Extract(ExtractParams),
    Scrape(ScrapeParams),
}

/**
 * \brief 一次性的操作请求，不落盘。
 */
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub provider: ProviderId,
    pub payload: OperationPayload,
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self.payload {
            OperationPayload::Test => OperationKind::TestConnection,
            OperationPayload::Article(_) => OperationKind::GenerateArticle,
            OperationPayload::Images(_) => OperationKind::GenerateImages,
            OperationPayload::Extract(_) => OperationKind::ExtractImages,
            OperationPayload::Scrape(_) => OperationKind::ScrapeContent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    SimulatedSuccess,
    Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationData {
    Empty,
    Message(String),
    Content(String),
    Images(Vec<String>),
}

/**
 * \brief 统一的操作结果。`SimulatedSuccess` 与 `Success` 结构一致，界面须显示“示例内容”标记。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub outcome: Outcome,
    pub data: OperationData,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    /** \brief 每个失败的传输候选一条诊断 */
    pub diagnostics: Vec<String>,
}

impl OperationResult {
    pub fn success(data: OperationData) -> Self {
        Self {
            outcome: Outcome::Success,
            data,
            error_kind: None,
            message: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn simulated(data: OperationData, diagnostics: Vec<String>) -> Self {
        Self {
            outcome: Outcome::SimulatedSuccess,
            data,
            error_kind: None,
            message: None,
            diagnostics,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failure,
            data: OperationData::Empty,
            error_kind: Some(kind),
            message: Some(message.into()),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome != Outcome::Failure
    }

    pub fn is_simulated(&self) -> bool {
        self.outcome == Outcome::SimulatedSuccess
    }

    pub fn content(&self) -> Option<&str> {
        match &self.data {
            OperationData::Content(text) => Some(text),
            _ => None,
        }
    }

    pub fn images(&self) -> Option<&[String]> {
        match &self.data {
            OperationData::Images(urls) => Some(urls),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OperationResultWire<'a> {
    success: bool,
    simulated: bool,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    diagnostics: &'a [String],
}

impl Serialize for OperationResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let message = match (&self.message, &self.data) {
            (Some(m), _) => Some(m.as_str()),
            (None, OperationData::Message(m)) => Some(m.as_str()),
            _ => None,
        };
        OperationResultWire {
            success: self.is_success(),
            simulated: self.is_simulated(),
            outcome: self.outcome,
            content: self.content(),
            images: self.images(),
            message,
            error_kind: self.error_kind,
            diagnostics: &self.diagnostics,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_id_parse_and_aliases() {
        assert_eq!("OpenAI".parse::<ProviderId>().unwrap(), ProviderId::OpenAI);
        assert_eq!(" kimi ".parse::<ProviderId>().unwrap(), ProviderId::Moonshot);
        let err = "nope".parse::<ProviderId>().unwrap_err();
        assert_eq!(err, ConfigError::UnknownProvider("nope".to_string()));
    }

    #[test]
    fn test_app_config_wire_shape() {
        let raw = json!({
            "provider": "deepseek",
            "deepseek": { "apiKey": "k", "model": "deepseek-reasoner" }
        });
        let cfg: AppConfig = serde_json::from_value(raw).expect("parse");
        assert_eq!(cfg.active_provider, ProviderId::DeepSeek);
        let ds = cfg.provider(ProviderId::DeepSeek);
        assert_eq!(ds.api_key, "k");
        assert_eq!(ds.text_model, "deepseek-reasoner");

        let back = serde_json::to_value(&cfg).expect("serialize");
        assert_eq!(back["provider"], "deepseek");
        assert_eq!(back["deepseek"]["textModel"], "deepseek-reasoner");
    }

    #[test]
    fn test_unknown_entries_do_not_drop_known_ones() {
        let raw = json!({
            "provider": "moonshot",
            "moonshot": { "apiKey": "mk" },
            "mistral": { "apiKey": "later-provider" },
            "uiTheme": "dark"
        });
        let cfg: AppConfig = serde_json::from_value(raw).expect("parse");
        assert_eq!(cfg.active_provider, ProviderId::Moonshot);
        assert_eq!(cfg.provider(ProviderId::Moonshot).api_key, "mk");
        assert_eq!(cfg.providers.len(), 1);

        let missing = serde_json::from_value::<AppConfig>(json!({"openai": {}}));
        assert!(missing.is_err());
    }

    #[test]
    fn test_result_serializes_flags() {
        let r = OperationResult::simulated(
            OperationData::Images(vec!["a".into()]),
            vec!["direct: boom".into()],
        );
        let v = serde_json::to_value(&r).expect("serialize");
        assert_eq!(v["success"], true);
        assert_eq!(v["simulated"], true);
        assert_eq!(v["images"][0], "a");
        assert!(v.get("content").is_none());

        let f = OperationResult::failure(ErrorKind::MissingCredential, "need key");
        let v = serde_json::to_value(&f).expect("serialize");
        assert_eq!(v["success"], false);
        assert_eq!(v["errorKind"], "missingCredential");
        assert_eq!(v["message"], "need key");
    }

    #[test]
    fn test_article_title_blank_is_none() {
        let p = ArticleParams {
            title: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(p.title(), None);
    }
}
