use anyhow::Result;
use reqwest::Url;
use tracing::{info, warn};

use crate::adapter::{self, AdapterOp, Normalized};
use crate::db::ConfigStore;
use crate::error::{AdapterError, ErrorKind};
use crate::models::{
    AppConfig, ArticleParams, ExtractParams, ImageParams, OperationData, OperationPayload,
    OperationRequest, OperationResult, ProviderConfig, ProviderId, ScrapeParams,
};
use crate::prompts;
use crate::registry;
use crate::simulate;
use crate::telemetry;
use crate::transport::{CandidateKind, TransportResolver};

/** \brief 单次请求允许的最多图片数 */
pub const MAX_IMAGE_COUNT: usize = 10;

/**
 * \brief 界面调用的门面：选择适配器、按候选顺序执行、整理为统一结果。
 * \details 传输全部失败时降级为示例内容，这是唯一允许做降级的地方。
 */
pub struct Orchestrator {
    config: AppConfig,
    transport: TransportResolver,
}

impl Orchestrator {
    pub fn new(config: AppConfig, transport: TransportResolver) -> Self {
        Self { config, transport }
    }

    /**
     * \brief 以存储中的配置与传输设置构建。
     */
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        let transport = TransportResolver::new(store.load_transport())?;
        Ok(Self::new(store.load(), transport))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn transport(&self) -> &TransportResolver {
        &self.transport
    }

    pub async fn test_connection(&self, provider: Option<ProviderId>) -> OperationResult {
        self.run(&self.request(provider, OperationPayload::Test)).await
    }

    pub async fn generate_article(&self, params: ArticleParams) -> OperationResult {
        self.run(&self.request(None, OperationPayload::Article(params)))
            .await
    }

    pub async fn generate_images(&self, params: ImageParams) -> OperationResult {
        self.run(&self.request(None, OperationPayload::Images(params)))
            .await
    }

    pub async fn extract_images(&self, params: ExtractParams) -> OperationResult {
        self.run(&self.request(None, OperationPayload::Extract(params)))
            .await
    }

    pub async fn scrape_content(&self, params: ScrapeParams) -> OperationResult {
        self.run(&self.request(None, OperationPayload::Scrape(params)))
            .await
    }

    fn request(&self, provider: Option<ProviderId>, payload: OperationPayload) -> OperationRequest {
        OperationRequest {
            provider: provider.unwrap_or(self.config.active_provider),
            payload,
        }
    }

    pub async fn run(&self, request: &OperationRequest) -> OperationResult {
        let kind = request.kind();
        let result = self.dispatch(request).await;
        info!(
            provider = %request.provider,
            operation = %kind,
            outcome = ?result.outcome,
            failed_candidates = result.diagnostics.len(),
            "operation finished"
        );
        let category = format!("orchestrator.{kind}");
        let line = format!("provider={} outcome={:?}", request.provider, result.outcome);
        if result.is_success() {
            telemetry::log_event(&category, &line);
        } else {
            telemetry::log_error(&category, &line);
        }
        result
    }

    async fn dispatch(&self, request: &OperationRequest) -> OperationResult {
        let provider = request.provider;
        let payload = &request.payload;

        let count = match payload {
            OperationPayload::Images(p) => Some(p.count),
            OperationPayload::Extract(p) => Some(p.count),
            _ => None,
        };
        match count {
            Some(0) => return OperationResult::success(OperationData::Images(Vec::new())),
            Some(n) if n > MAX_IMAGE_COUNT => {
                return OperationResult::failure(
                    ErrorKind::Configuration,
                    format!("image count {n} exceeds the limit of {MAX_IMAGE_COUNT}"),
                )
            }
            _ => {}
        }

        // 模拟模式不检查凭据
        if self.transport.settings().simulation_mode {
            return OperationResult::simulated(simulate::respond(payload), Vec::new());
        }
        let cfg = self.config.provider(provider);
        if let Err(err) = adapter::check_credentials(provider, &cfg) {
            return OperationResult::failure(ErrorKind::MissingCredential, err.to_string());
        }
        if matches!(payload, OperationPayload::Images(_))
            && registry::spec(provider).image_path.is_none()
        {
            return OperationResult::simulated(
                simulate::respond(payload),
                vec![format!("{provider}: no image generation endpoint")],
            );
        }

        let outcome = match payload {
            OperationPayload::Test => self.test(provider, &cfg).await,
            OperationPayload::Article(p) => self.article(provider, &cfg, p).await,
            OperationPayload::Images(p) => self.images(provider, &cfg, p).await,
            OperationPayload::Extract(p) => self.extract(provider, &cfg, p).await,
            OperationPayload::Scrape(p) => self.scrape(provider, &cfg, p).await,
        };
        match outcome {
            Ok(data) => OperationResult::success(data),
            Err(err) => settle(provider, err, payload),
        }
    }

    /**
     * \brief 用户自备 `api_proxy` 时只走直连，其余情况使用解析器的默认顺序。
     */
    fn candidates_for(&self, cfg: &ProviderConfig) -> Vec<CandidateKind> {
        if cfg.api_proxy.trim().is_empty() {
            self.transport.candidates()
        } else {
            vec![CandidateKind::Direct]
        }
    }

    async fn execute(
        &self,
        provider: ProviderId,
        cfg: &ProviderConfig,
        op: AdapterOp<'_>,
    ) -> Result<Normalized, AdapterError> {
        adapter::adapter_for(provider)
            .execute(&op, cfg, &self.transport, &self.candidates_for(cfg))
            .await
    }

    async fn test(
        &self,
        provider: ProviderId,
        cfg: &ProviderConfig,
    ) -> Result<OperationData, AdapterError> {
        match self.execute(provider, cfg, AdapterOp::Test).await? {
            Normalized::Ack(m) | Normalized::Text(m) | Normalized::ImageUrl(m) => {
                Ok(OperationData::Message(m))
            }
        }
    }

    async fn article(
        &self,
        provider: ProviderId,
        cfg: &ProviderConfig,
        params: &ArticleParams,
    ) -> Result<OperationData, AdapterError> {
        let prompt = prompts::article_prompt(params);
        let op = AdapterOp::GenerateText {
            system: prompts::writer_system_prompt(provider),
            prompt: &prompt,
        };
        let text = expect_text(self.execute(provider, cfg, op).await?)?;
        Ok(OperationData::Content(prompts::finalize_article(
            &text,
            params.title(),
        )))
    }

    /**
     * \brief N 张图片依次请求，结果顺序与请求顺序一致。
     */
    async fn images(
        &self,
        provider: ProviderId,
        cfg: &ProviderConfig,
        params: &ImageParams,
    ) -> Result<OperationData, AdapterError> {
        let prompt = prompts::image_prompt(&params.prompt);
        let mut urls = Vec::new();
        for index in 0..params.count {
            let op = AdapterOp::GenerateImage {
                prompt,
                aspect_ratio: params.aspect_ratio,
            };
            match self.execute(provider, cfg, op).await? {
                Normalized::ImageUrl(url) => urls.push(url),
                other => {
                    return Err(AdapterError::Unwrap(format!(
                        "image #{} returned {:?}",
                        index + 1,
                        other
                    )))
                }
            }
        }
        Ok(OperationData::Images(urls))
    }

    async fn extract(
        &self,
        provider: ProviderId,
        cfg: &ProviderConfig,
        params: &ExtractParams,
    ) -> Result<OperationData, AdapterError> {
        let prompt = prompts::extract_images_prompt(&params.links, params.count);
        let text = expect_text(
            self.execute(provider, cfg, AdapterOp::DescribeExtract { prompt: &prompt })
                .await?,
        )?;
        let urls = prompts::parse_image_urls(&text, params.count);
        if urls.is_empty() {
            return Err(AdapterError::Unwrap("no image urls in reply".to_string()));
        }
        Ok(OperationData::Images(urls))
    }

    async fn scrape(
        &self,
        provider: ProviderId,
        cfg: &ProviderConfig,
        params: &ScrapeParams,
    ) -> Result<OperationData, AdapterError> {
        let url = params.url.trim();
        Url::parse(url).map_err(|e| AdapterError::Request(format!("invalid url `{url}`: {e}")))?;
        let prompt = prompts::scrape_prompt(url);
        let op = AdapterOp::GenerateText {
            system: "",
            prompt: &prompt,
        };
        Ok(OperationData::Content(expect_text(
            self.execute(provider, cfg, op).await?,
        )?))
    }
}

fn expect_text(normalized: Normalized) -> Result<String, AdapterError> {
    match normalized {
        Normalized::Text(t) => Ok(t),
        other => Err(AdapterError::Unwrap(format!("expected text, got {other:?}"))),
    }
}

/**
 * \brief 把适配器错误整理为统一结果。只有纯传输失败会降级为示例内容。
 */
fn settle(provider: ProviderId, err: AdapterError, payload: &OperationPayload) -> OperationResult {
    if let Some(exhausted) = err.exhausted() {
        let diagnostics = exhausted.diagnostics();
        return match exhausted.provider_message() {
            Some(message) => {
                let message = if matches!(err, AdapterError::Token(_)) {
                    format!("access token request failed: {message}")
                } else {
                    message.to_string()
                };
                OperationResult::failure(ErrorKind::ProviderError, message)
                    .with_diagnostics(diagnostics)
            }
            None => {
                warn!(
                    provider = %provider,
                    failed_candidates = diagnostics.len(),
                    "all transport candidates failed, returning simulated content"
                );
                OperationResult::simulated(simulate::respond(payload), diagnostics)
            }
        };
    }
    match err {
        AdapterError::MissingCredential { .. } => {
            OperationResult::failure(ErrorKind::MissingCredential, err.to_string())
        }
        AdapterError::Config(_) | AdapterError::Request(_) => {
            OperationResult::failure(ErrorKind::Configuration, err.to_string())
        }
        AdapterError::Provider(message) => {
            OperationResult::failure(ErrorKind::ProviderError, message)
        }
        AdapterError::Unwrap(detail) => OperationResult::failure(
            ErrorKind::ProviderError,
            format!("{provider} returned an unexpected response ({detail})"),
        ),
        AdapterError::Token(_) | AdapterError::Transport(_) => {
            OperationResult::failure(ErrorKind::ProviderError, err.to_string())
        }
    }
}
