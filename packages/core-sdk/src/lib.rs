pub mod adapter;
pub mod db;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod server;
pub mod simulate;
pub mod telemetry;
pub mod transport;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块与类型。
 */
pub mod prelude {
    pub use crate::db::{self, ConfigStore};
    pub use crate::error::{AdapterError, ConfigError, ErrorKind, TransportExhausted};
    pub use crate::models::{
        AppConfig, ArticleLength, ArticleParams, ArticleTheme, AspectRatio, ExtractParams,
        ImageParams, OperationData, OperationResult, Outcome, ProviderConfig, ProviderId,
        ScrapeParams,
    };
    pub use crate::orchestrator::Orchestrator;
    pub use crate::registry;
    pub use crate::server;
    pub use crate::telemetry;
    pub use crate::transport::{CandidateKind, PreferredTransport, TransportResolver, TransportSettings};
}
