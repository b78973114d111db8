use crate::commands::CommandResult;
use concierge_core::config::{AppConfig, LoadOptions};
use concierge_db::{connect_store, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
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
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let support_pool = connect_store(&config.support_db)
            .await
            .map_err(|error| ("support_db_connectivity", error.to_string(), 4u8))?;
        migrations::run_support_pending(&support_pool)
            .await
            .map_err(|error| ("support_migration", error.to_string(), 5u8))?;
        support_pool.close().await;

        let crm_pool = connect_store(&config.crm_db)
            .await
            .map_err(|error| ("crm_db_connectivity", error.to_string(), 4u8))?;
        migrations::run_crm_pending(&crm_pool)
            .await
            .map_err(|error| ("crm_migration", error.to_string(), 5u8))?;
        crm_pool.close().await;

        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations to both stores"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
