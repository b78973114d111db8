use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use concierge_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |field: &str, env_key: Option<&str>| {
        field_source(field, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "support_db.url",
        &config.support_db.url,
        source("support_db.url", Some("CONCIERGE_SUPPORT_DB_URL")),
    ));
    lines.push(render_line(
        "crm_db.url",
        &config.crm_db.url,
        source("crm_db.url", Some("CONCIERGE_CRM_DB_URL")),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", Some("CONCIERGE_LLM_PROVIDER")),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", Some("CONCIERGE_LLM_MODEL")),
    ));
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line("llm.api_key", &api_key, source("llm.api_key", Some("CONCIERGE_LLM_API_KEY"))));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("(unset)"),
        source("llm.base_url", Some("CONCIERGE_LLM_BASE_URL")),
    ));

    lines.push(render_line(
        "knowledge.corpus_path",
        &config.knowledge.corpus_path.display().to_string(),
        source("knowledge.corpus_path", Some("CONCIERGE_KNOWLEDGE_CORPUS_PATH")),
    ));
    lines.push(render_line(
        "knowledge.min_confidence",
        &format!("{:.2}", config.knowledge.min_confidence),
        source("knowledge.min_confidence", Some("CONCIERGE_KNOWLEDGE_MIN_CONFIDENCE")),
    ));

    lines.push(render_line(
        "escalation.endpoint",
        config.escalation.endpoint.as_deref().unwrap_or("(unset)"),
        source("escalation.endpoint", Some("CONCIERGE_ESCALATION_ENDPOINT")),
    ));
    let escalation_token = config
        .escalation
        .token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line(
        "escalation.token",
        &escalation_token,
        source("escalation.token", Some("CONCIERGE_ESCALATION_TOKEN")),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", Some("CONCIERGE_SERVER_BIND_ADDRESS")),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", Some("CONCIERGE_SERVER_PORT")),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", Some("CONCIERGE_LOGGING_LEVEL")),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", Some("CONCIERGE_LOGGING_FORMAT")),
    ));

    lines.join("\n")
}

fn render_line(field: &str, value: &str, source: &'static str) -> String {
    format!("  {field} = {value}  [{source}]")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("concierge.toml"), PathBuf::from("config/concierge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &str,
    env_key: Option<&str>,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> &'static str {
    if let Some(env_key) = env_key {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return "env";
        }
    }

    if let (Some(doc), Some(_)) = (file_doc, file_path) {
        let mut cursor = Some(doc);
        for segment in field.split('.') {
            cursor = cursor.and_then(|value| value.get(segment));
        }
        if cursor.is_some() {
            return "file";
        }
    }

    "default"
}

fn redact_token(token: &str) -> String {
    if token.is_empty() {
        return "(unset)".to_string();
    }
    if token.len() <= 4 {
        return "****".to_string();
    }
    format!("{}****", &token[..4])
}
