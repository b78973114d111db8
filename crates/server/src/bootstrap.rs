use std::sync::Arc;

use concierge_agent::classifier::IntentClassifier;
use concierge_agent::escalation::EscalationHandler;
use concierge_agent::llm::{HttpLlmClient, LlmClient};
use concierge_agent::ops::OperationsHandler;
use concierge_agent::resolver::KnowledgeResolver;
use concierge_agent::runtime::SupportRuntime;
use concierge_core::audit::NoopAuditSink;
use concierge_core::config::{AppConfig, ConfigError, LoadOptions};
use concierge_core::knowledge::{CorpusError, KnowledgeCorpus};
use concierge_db::repositories::{
    SqlConversationRepository, SqlReservationRepository, SqlSubscriptionRepository,
    SqlTicketRepository, SqlUserRepository,
};
use concierge_db::{connect_store, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub support_pool: DbPool,
    pub crm_pool: DbPool,
    pub runtime: Arc<SupportRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("knowledge corpus load failed: {0}")]
    Corpus(#[source] CorpusError),
    #[error("client construction failed: {0}")]
    Client(#[source] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let support_pool =
        connect_store(&config.support_db).await.map_err(BootstrapError::DatabaseConnect)?;
    let crm_pool =
        connect_store(&config.crm_db).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.databases_connected",
        correlation_id = "bootstrap",
        "support and crm store connections established"
    );

    migrations::run_support_pending(&support_pool).await.map_err(BootstrapError::Migration)?;
    migrations::run_crm_pending(&crm_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let corpus =
        KnowledgeCorpus::load(&config.knowledge.corpus_path).map_err(BootstrapError::Corpus)?;
    info!(
        event_name = "system.bootstrap.corpus_loaded",
        correlation_id = "bootstrap",
        articles = corpus.len(),
        "knowledge corpus loaded"
    );

    let llm: Arc<dyn LlmClient> =
        Arc::new(HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Client)?);

    let escalation = EscalationHandler::new(
        Arc::new(SqlTicketRepository::new(support_pool.clone())),
        llm.clone(),
        &config.escalation,
    )
    .map_err(BootstrapError::Client)?;

    let runtime = Arc::new(SupportRuntime::new(
        IntentClassifier::new(llm.clone()),
        KnowledgeResolver::new(
            Arc::new(corpus),
            llm.clone(),
            config.knowledge.min_confidence,
            config.knowledge.top_k,
        ),
        OperationsHandler::new(
            Arc::new(SqlUserRepository::new(crm_pool.clone())),
            Arc::new(SqlSubscriptionRepository::new(crm_pool.clone())),
            Arc::new(SqlReservationRepository::new(crm_pool.clone())),
            llm,
        ),
        escalation,
        Arc::new(SqlConversationRepository::new(support_pool.clone())),
        Arc::new(NoopAuditSink),
    ));

    Ok(Application { config, support_pool, crm_pool, runtime })
}
