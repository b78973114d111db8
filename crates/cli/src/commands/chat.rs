use std::sync::Arc;

use crate::commands::CommandResult;
use concierge_agent::classifier::IntentClassifier;
use concierge_agent::escalation::EscalationHandler;
use concierge_agent::llm::HttpLlmClient;
use concierge_agent::ops::OperationsHandler;
use concierge_agent::resolver::KnowledgeResolver;
use concierge_agent::runtime::{SupportRuntime, TurnRequest};
use concierge_core::audit::NoopAuditSink;
use concierge_core::config::{AppConfig, LoadOptions};
use concierge_core::domain::conversation::ConversationId;
use concierge_core::knowledge::KnowledgeCorpus;
use concierge_db::repositories::{
    SqlConversationRepository, SqlReservationRepository, SqlSubscriptionRepository,
    SqlTicketRepository, SqlUserRepository,
};
use concierge_db::{connect_store, migrations};

pub fn run(conversation: &str, user: &str, message: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(run_turn(&config, conversation, user, message));

    match result {
        Ok(outcome) => CommandResult::success(
            "chat",
            format!(
                "intent={} route={} escalated={}\n{}",
                outcome.intent.as_str(),
                outcome.route.as_str(),
                outcome.escalated,
                outcome.response
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

async fn run_turn(
    config: &AppConfig,
    conversation: &str,
    user: &str,
    message: &str,
) -> Result<concierge_agent::runtime::TurnOutcome, (&'static str, String, u8)> {
    let support_pool = connect_store(&config.support_db)
        .await
        .map_err(|error| ("support_db_connectivity", error.to_string(), 4u8))?;
    migrations::run_support_pending(&support_pool)
        .await
        .map_err(|error| ("support_migration", error.to_string(), 5u8))?;

    let crm_pool = connect_store(&config.crm_db)
        .await
        .map_err(|error| ("crm_db_connectivity", error.to_string(), 4u8))?;
    migrations::run_crm_pending(&crm_pool)
        .await
        .map_err(|error| ("crm_migration", error.to_string(), 5u8))?;

    let corpus = KnowledgeCorpus::load(&config.knowledge.corpus_path)
        .map_err(|error| ("knowledge_corpus", error.to_string(), 6u8))?;

    let llm: Arc<dyn concierge_agent::llm::LlmClient> = Arc::new(
        HttpLlmClient::from_config(&config.llm)
            .map_err(|error| ("llm_client", error.to_string(), 6u8))?,
    );

    let escalation = EscalationHandler::new(
        Arc::new(SqlTicketRepository::new(support_pool.clone())),
        llm.clone(),
        &config.escalation,
    )
    .map_err(|error| ("escalation_client", error.to_string(), 6u8))?;

    let support_runtime = SupportRuntime::new(
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
    );

    let outcome = support_runtime
        .handle_message(TurnRequest {
            conversation_id: ConversationId(conversation.to_string()),
            user_id: user.to_string(),
            text: message.to_string(),
        })
        .await
        .map_err(|error| ("turn_execution", error.to_string(), 7u8))?;

    support_pool.close().await;
    crm_pool.close().await;
    Ok(outcome)
}
