use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::models::{AppConfig, ProviderConfig, ProviderId};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/** \brief 模板中的基地址占位符 */
pub const BASE_PLACEHOLDER: &str = "{base}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Text,
    Image,
    Token,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Text => "text generation",
            Endpoint::Image => "image generation",
            Endpoint::Token => "token exchange",
        }
    }
}

/**
 * \brief 静态注册表条目：默认值与接口模板。
 */
#[derive(Debug)]
pub struct ProviderSpec {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub default_base: &'static str,
    pub text_model: &'static str,
    pub image_model: Option<&'static str>,
    /** \brief 连接测试使用的模型；为空时使用文本模型 */
    pub test_model: Option<&'static str>,
    pub text_path: &'static str,
    pub image_path: Option<&'static str>,
    pub token_path: Option<&'static str>,
    pub sends_temperature: bool,
    pub sends_max_tokens: bool,
    pub requires_secret: bool,
}

static PROVIDERS: [ProviderSpec; 6] = [
    ProviderSpec {
        id: ProviderId::OpenAI,
        display_name: "OpenAI",
        default_base: "https://api.openai.com",
        text_model: "gpt-4o",
        image_model: Some("dall-e-3"),
        test_model: Some("gpt-3.5-turbo"),
        text_path: "/v1/chat/completions",
        image_path: Some("/v1/images/generations"),
        token_path: None,
        sends_temperature: true,
        sends_max_tokens: true,
        requires_secret: false,
    },
    ProviderSpec {
        id: ProviderId::Anthropic,
        display_name: "Anthropic",
        default_base: "https://api.anthropic.com",
        text_model: "claude-3-sonnet-20240229",
        image_model: None,
        test_model: None,
        text_path: "/v1/messages",
        image_path: None,
        token_path: None,
        sends_temperature: true,
        sends_max_tokens: true,
        requires_secret: false,
    },
    ProviderSpec {
        id: ProviderId::DeepSeek,
        display_name: "DeepSeek",
        default_base: "https://api.deepseek.com",
        text_model: "deepseek-chat",
        image_model: None,
        test_model: Some("deepseek-chat"),
        text_path: "/v1/chat/completions",
        image_path: None,
        token_path: None,
        sends_temperature: true,
        sends_max_tokens: true,
        requires_secret: false,
    },
    ProviderSpec {
        id: ProviderId::Poe,
        display_name: "Poe",
        default_base: "https://api.poe.com",
        text_model: "Claude-3.7-Sonnet",
        image_model: Some("FLUX-pro-1.1"),
        test_model: Some("Claude-3.5-Sonnet-20240620"),
        text_path: "/chat/completions",
        // Poe 的图片机器人同样走 chat completions
        image_path: Some("/chat/completions"),
        token_path: None,
        sends_temperature: false,
        sends_max_tokens: false,
        requires_secret: false,
    },
    ProviderSpec {
        id: ProviderId::Baidu,
        display_name: "百度文心一言",
        default_base: "https://aip.baidubce.com",
        text_model: "ernie-bot-4",
        image_model: None,
        test_model: None,
        text_path: "/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions",
        image_path: None,
        token_path: Some("/oauth/2.0/token"),
        sends_temperature: true,
        sends_max_tokens: false,
        requires_secret: true,
    },
    ProviderSpec {
        id: ProviderId::Moonshot,
        display_name: "月之暗面",
        default_base: "https://api.moonshot.cn",
        text_model: "moonshot-v1-8k",
        image_model: None,
        test_model: None,
        text_path: "/v1/chat/completions",
        image_path: None,
        token_path: None,
        sends_temperature: true,
        sends_max_tokens: false,
        requires_secret: false,
    },
];

/**
 * \brief 按标识取注册表条目。
 */
pub fn spec(id: ProviderId) -> &'static ProviderSpec {
    let index = match id {
        ProviderId::OpenAI => 0,
        ProviderId::Anthropic => 1,
        ProviderId::DeepSeek => 2,
        ProviderId::Poe => 3,
        ProviderId::Baidu => 4,
        ProviderId::Moonshot => 5,
    };
    &PROVIDERS[index]
}

/**
 * \brief 按字符串标识查找；未知标识返回 `UnknownProvider`。
 */
pub fn lookup(id: &str) -> Result<&'static ProviderSpec, ConfigError> {
    Ok(spec(id.parse()?))
}

pub fn all() -> &'static [ProviderSpec] {
    &PROVIDERS
}

/**
 * \brief 某服务的内置默认配置（不含任何凭据）。
 */
pub fn defaults_for(id: ProviderId) -> ProviderConfig {
    let mut cfg = ProviderConfig::default();
    fill_defaults(id, &mut cfg);
    cfg
}

/**
 * \brief 只补齐空字段，显式设置的值保持不变。
 */
pub fn fill_defaults(id: ProviderId, cfg: &mut ProviderConfig) {
    let spec = spec(id);
    if cfg.text_model.trim().is_empty() {
        cfg.text_model = spec.text_model.to_string();
    }
    if cfg.image_model.trim().is_empty() {
        if let Some(model) = spec.image_model {
            cfg.image_model = model.to_string();
        }
    }
    if cfg.temperature.is_none() {
        cfg.temperature = Some(DEFAULT_TEMPERATURE);
    }
    if cfg.max_tokens.is_none() {
        cfg.max_tokens = Some(DEFAULT_MAX_TOKENS);
    }
}

pub fn default_app_config() -> AppConfig {
    let providers = ProviderId::ALL
        .into_iter()
        .map(|id| (id, defaults_for(id)))
        .collect::<BTreeMap<_, _>>();
    AppConfig {
        active_provider: ProviderId::OpenAI,
        providers,
    }
}

/**
 * \brief 接口 URL 模板，形如 `{base}/v1/chat/completions`。
 */
pub fn endpoint_template_for(id: ProviderId, endpoint: Endpoint) -> Result<String, ConfigError> {
    let spec = spec(id);
    let path = match endpoint {
        Endpoint::Text => Some(spec.text_path),
        Endpoint::Image => spec.image_path,
        Endpoint::Token => spec.token_path,
    }
    .ok_or(ConfigError::UnsupportedOperation {
        provider: id,
        operation: endpoint.as_str(),
    })?;
    Ok(format!("{BASE_PLACEHOLDER}{path}"))
}

/**
 * \brief 把存储配置与默认值合并后的有效参数，所有适配器都从这里取值。
 */
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub spec: &'static ProviderSpec,
    pub api_key: &'a str,
    pub secret_key: &'a str,
    pub base: &'a str,
    pub text_model: &'a str,
    pub image_model: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_proxy: Option<&'a str>,
}

impl ProviderSpec {
    pub fn resolve<'a>(&'static self, cfg: &'a ProviderConfig) -> Resolved<'a> {
        fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                fallback
            } else {
                trimmed
            }
        }
        Resolved {
            spec: self,
            api_key: cfg.api_key.trim(),
            secret_key: cfg.secret_key.trim(),
            base: or_default(&cfg.api_base, self.default_base).trim_end_matches('/'),
            text_model: or_default(&cfg.text_model, self.text_model),
            image_model: or_default(&cfg.image_model, self.image_model.unwrap_or("")),
            temperature: cfg.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: cfg
                .max_tokens
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            api_proxy: Some(cfg.api_proxy.trim()).filter(|p| !p.is_empty()),
        }
    }
}

impl Resolved<'_> {
    /**
     * \brief 生成最终 URL；文本接口在配置了 `api_proxy` 时直接使用该地址。
     */
    pub fn endpoint(&self, endpoint: Endpoint) -> Result<String, ConfigError> {
        if endpoint == Endpoint::Text {
            if let Some(proxy) = self.api_proxy {
                return Ok(proxy.to_string());
            }
        }
        let template = endpoint_template_for(self.spec.id, endpoint)?;
        Ok(template.replace(BASE_PLACEHOLDER, self.base))
    }

    pub fn test_model(&self) -> &str {
        self.spec.test_model.unwrap_or(self.text_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_ids() {
        for id in ProviderId::ALL {
            assert_eq!(spec(id).id, id);
        }
        assert_eq!(all().len(), ProviderId::ALL.len());
    }

    #[test]
    fn test_lookup_unknown_provider() {
        let err = lookup("mistral").unwrap_err();
        assert_eq!(err, ConfigError::UnknownProvider("mistral".into()));
        assert_eq!(lookup("baidu").unwrap().id, ProviderId::Baidu);
    }

    #[test]
    fn test_defaults_have_no_credentials() {
        for id in ProviderId::ALL {
            let cfg = defaults_for(id);
            assert!(cfg.api_key.is_empty());
            assert!(cfg.secret_key.is_empty());
            assert_eq!(cfg.temperature, Some(DEFAULT_TEMPERATURE));
            assert_eq!(cfg.max_tokens, Some(DEFAULT_MAX_TOKENS));
        }
        assert_eq!(defaults_for(ProviderId::OpenAI).image_model, "dall-e-3");
        assert_eq!(defaults_for(ProviderId::Moonshot).text_model, "moonshot-v1-8k");
    }

    #[test]
    fn test_endpoint_templates() {
        assert_eq!(
            endpoint_template_for(ProviderId::DeepSeek, Endpoint::Text).unwrap(),
            "{base}/v1/chat/completions"
        );
        assert!(endpoint_template_for(ProviderId::Anthropic, Endpoint::Image).is_err());
        assert_eq!(
            endpoint_template_for(ProviderId::Baidu, Endpoint::Token).unwrap(),
            "{base}/oauth/2.0/token"
        );
    }

    #[test]
    fn test_resolve_applies_overrides() {
        let cfg = ProviderConfig {
            api_key: " sk ".into(),
            api_base: "http://localhost:9000/".into(),
            ..Default::default()
        };
        let r = spec(ProviderId::OpenAI).resolve(&cfg);
        assert_eq!(r.api_key, "sk");
        assert_eq!(r.text_model, "gpt-4o");
        assert_eq!(r.test_model(), "gpt-3.5-turbo");
        assert_eq!(
            r.endpoint(Endpoint::Text).unwrap(),
            "http://localhost:9000/v1/chat/completions"
        );

        let proxied = ProviderConfig {
            api_proxy: "https://my.proxy/v1/chat".into(),
            ..Default::default()
        };
        let r = spec(ProviderId::OpenAI).resolve(&proxied);
        assert_eq!(r.endpoint(Endpoint::Text).unwrap(), "https://my.proxy/v1/chat");
        assert_eq!(
            r.endpoint(Endpoint::Image).unwrap(),
            "https://api.openai.com/v1/images/generations"
        );
    }
}
