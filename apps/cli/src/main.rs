use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use inkrelay_core_sdk::prelude::*;

/**
 * \brief CLI 程序入口：配置服务、切换传输方式、执行生成操作或启动本地服务。
 */
#[derive(Parser, Debug)]
#[command(name = "inkrelay", version, about = "InkRelay multi-provider article & image generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /** \brief 查看或修改服务配置。 */
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /** \brief 管理具名 CORS 代理。 */
    Proxy {
        #[command(subcommand)]
        action: ProxyAction,
    },

    /** \brief 开关模拟模式（不访问网络，直接返回示例内容）。 */
    Simulate {
        #[arg(value_enum)]
        state: Toggle,
    },

    /** \brief 测试服务连接。 */
    Test {
        #[arg(long)]
        provider: Option<ProviderId>,
    },

    /** \brief 生成文章。 */
    Article {
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "")]
        prompt: String,
        #[arg(long, default_value = "")]
        reference_text: String,
        #[arg(long, num_args = 1..)]
        links: Vec<String>,
        #[arg(long, default_value = "medium")]
        length: ArticleLength,
        #[arg(long, default_value = "modern")]
        theme: ArticleTheme,
    },

    /** \brief 生成配图。 */
    Images {
        #[arg(long, default_value = "")]
        prompt: String,
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value = "4:3")]
        aspect_ratio: AspectRatio,
    },

    /** \brief 从链接中提取图片地址。 */
    ExtractImages {
        #[arg(long, num_args = 1.., required = true)]
        links: Vec<String>,
        #[arg(long, default_value_t = 3)]
        count: usize,
    },

    /** \brief 抓取网页正文。 */
    Scrape {
        #[arg(long)]
        url: String,
    },

    /**
     * \brief 启动本地 HTTP 服务并提供前端页面。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /** \brief 打印当前配置（密钥打码）。 */
    Show,
    /** \brief 修改某个服务的配置（读取-修改-整体写回）。 */
    Set {
        #[arg(long)]
        provider: ProviderId,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        secret_key: Option<String>,
        #[arg(long)]
        text_model: Option<String>,
        #[arg(long)]
        image_model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        api_proxy: Option<String>,
        #[arg(long)]
        api_base: Option<String>,
        /** \brief 同时设为当前服务 */
        #[arg(long, default_value_t = false)]
        activate: bool,
        #[arg(long)]
        enable_telemetry: Option<bool>,
    },
}

#[derive(Subcommand, Debug)]
enum ProxyAction {
    List,
    Use { name: String },
    /** \brief 切换到代理表中的下一个 */
    Next,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("inkrelay=info,inkrelay_core_sdk=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store = ConfigStore::open_default().context("open database failed")?;
    let telemetry_enabled = store.telemetry_enabled().unwrap_or(false);
    telemetry::set_enabled(telemetry_enabled);

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut config = store.load();
                for provider in config.providers.values_mut() {
                    provider.api_key = mask(&provider.api_key);
                    provider.secret_key = mask(&provider.secret_key);
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config).context("serialize config failed")?
                );
                println!("telemetry_enabled: {}", telemetry_enabled);
            }
            ConfigAction::Set {
                provider,
                api_key,
                secret_key,
                text_model,
                image_model,
                temperature,
                max_tokens,
                api_proxy,
                api_base,
                activate,
                enable_telemetry,
            } => {
                let mut config = store.load();
                let entry = config.provider_mut(provider);
                if let Some(v) = api_key {
                    entry.api_key = v;
                }
                if let Some(v) = secret_key {
                    entry.secret_key = v;
                }
                if let Some(v) = text_model {
                    entry.text_model = v;
                }
                if let Some(v) = image_model {
                    entry.image_model = v;
                }
                if let Some(v) = temperature {
                    entry.temperature = Some(v);
                }
                if let Some(v) = max_tokens {
                    entry.max_tokens = Some(v);
                }
                if let Some(v) = api_proxy {
                    entry.api_proxy = v;
                }
                if let Some(v) = api_base {
                    entry.api_base = v;
                }
                if activate {
                    config.active_provider = provider;
                }
                store.save(&config).context("save config failed")?;
                if let Some(enabled) = enable_telemetry {
                    store
                        .set_telemetry_enabled(enabled)
                        .context("save telemetry failed")?;
                    telemetry::set_enabled(enabled);
                }
                println!(
                    "Saved {} (active provider: {})",
                    provider, config.active_provider
                );
            }
        },
        Commands::Proxy { action } => {
            let settings = match action {
                ProxyAction::List => store.load_transport(),
                ProxyAction::Use { name } => store
                    .set_current_proxy(&name)
                    .context("select proxy failed")?,
                ProxyAction::Next => {
                    let current = store.load_transport();
                    let Some(next) = current.next_proxy_name().map(str::to_string) else {
                        bail!("proxy table is empty");
                    };
                    store
                        .set_current_proxy(&next)
                        .context("select proxy failed")?
                }
            };
            for proxy in &settings.proxies {
                let marker = if proxy.name == settings.current_proxy {
                    "*"
                } else {
                    " "
                };
                println!("{} {:<14} {}", marker, proxy.name, proxy.prefix);
            }
            if !settings.relay_url.is_empty() {
                println!("  relay          {}", settings.relay_url);
            }
        }
        Commands::Simulate { state } => {
            let enabled = matches!(state, Toggle::On);
            store
                .set_simulation_mode(enabled)
                .context("save simulation mode failed")?;
            println!("simulation mode: {}", if enabled { "on" } else { "off" });
        }
        Commands::Serve { addr } => {
            drop(store);
            server::run(&addr).await?;
        }
        Commands::Test { provider } => {
            let result = orchestrator(&store)?.test_connection(provider).await;
            print_result(&result)?;
        }
        Commands::Article {
            title,
            prompt,
            reference_text,
            links,
            length,
            theme,
        } => {
            let params = ArticleParams {
                title,
                prompt,
                reference_text,
                reference_links: links,
                length,
                theme,
            };
            let result = orchestrator(&store)?.generate_article(params).await;
            print_result(&result)?;
        }
        Commands::Images {
            prompt,
            count,
            aspect_ratio,
        } => {
            let params = ImageParams {
                prompt,
                count,
                aspect_ratio,
            };
            let result = orchestrator(&store)?.generate_images(params).await;
            print_result(&result)?;
        }
        Commands::ExtractImages { links, count } => {
            let result = orchestrator(&store)?
                .extract_images(ExtractParams { links, count })
                .await;
            print_result(&result)?;
        }
        Commands::Scrape { url } => {
            let result = orchestrator(&store)?
                .scrape_content(ScrapeParams { url })
                .await;
            print_result(&result)?;
        }
    }

    Ok(())
}

fn orchestrator(store: &ConfigStore) -> Result<Orchestrator> {
    Orchestrator::from_store(store).context("build orchestrator failed")
}

fn print_result(result: &OperationResult) -> Result<()> {
    if result.is_simulated() {
        println!("[simulated] 以下为示例内容，并非服务真实返回");
        for line in &result.diagnostics {
            eprintln!("  - {}", line);
        }
    }
    match result.outcome {
        Outcome::Failure => {
            for line in &result.diagnostics {
                eprintln!("  - {}", line);
            }
            bail!(
                "{:?}: {}",
                result.error_kind.unwrap_or(ErrorKind::ProviderError),
                result.message.as_deref().unwrap_or("operation failed")
            );
        }
        Outcome::Success | Outcome::SimulatedSuccess => match &result.data {
            OperationData::Message(m) | OperationData::Content(m) => println!("{}", m),
            OperationData::Images(urls) => {
                for url in urls {
                    println!("{}", url);
                }
            }
            OperationData::Empty => {}
        },
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "****".to_string(),
        n => format!(
            "{}****{}",
            chars[..4].iter().collect::<String>(),
            chars[n - 4..].iter().collect::<String>()
        ),
    }
}
