use crate::commands::CommandResult;
use concierge_core::config::{AppConfig, LoadOptions};
use concierge_db::{connect_store, migrations, SeedDataset};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
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
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let crm_pool = connect_store(&config.crm_db)
            .await
            .map_err(|error| ("crm_db_connectivity", error.to_string(), 4u8))?;

        migrations::run_crm_pending(&crm_pool)
            .await
            .map_err(|error| ("crm_migration", error.to_string(), 5u8))?;

        let seed_result = SeedDataset::demo()
            .apply(&crm_pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;

        crm_pool.close().await;
        Ok::<concierge_db::SeedResult, (&'static str, String, u8)>(seed_result)
    });

    match result {
        Ok(seed_result) => CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: {} users, {} subscriptions, {} experiences, {} reservations",
                seed_result.users,
                seed_result.subscriptions,
                seed_result.experiences,
                seed_result.reservations
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
