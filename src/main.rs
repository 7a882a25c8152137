use clap::Parser;
use servo_mask::utils::logger;
use servo_mask::{CliConfig, FileStore, LineChannel, PwmServoDriver, ServoMaskEngine};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting Servo Control...");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let settings = match cli.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Configuration validation failed: {}", e);
            tracing::error!("Suggestion: {}", e.recovery_suggestion());
            eprintln!("{}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    let store = FileStore::new(settings.persistence.store_dir.clone());
    let driver = PwmServoDriver::new(settings.pins()?, settings.pwm_timing());
    let mut engine = ServoMaskEngine::new(store, driver, settings.engine_settings());
    let mut channel = LineChannel::stdio();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    engine.run(&mut channel, shutdown).await;

    tracing::info!("Servo control stopped");
    Ok(())
}
