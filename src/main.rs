use clap::Parser;
use log::{error, info, LevelFilter};
use sigcap::configuration::config::{CliArgs, Config};
use sigcap::controller::controller_handler::Controller;

#[tokio::main]
async fn main() {
    // Get command-line arguments
    let args = CliArgs::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_target(false)
        .init();

    println!(
        "
=========================================================
  sigcap v{}  signal-gated UDP capture sessions
=========================================================
",
        env!("CARGO_PKG_VERSION")
    );

    info!("Importing configuration");

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration imported successfully");

    let mut controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };
    let single_session = controller.config.controller.max_sessions == 1;

    let result = tokio::spawn(async move {
        info!("Spawning the controller");
        controller.run().await
    })
    .await;

    match result {
        Ok(Ok(summary)) => {
            if single_session && summary.failed > 0 {
                std::process::exit(1);
            }
        }
        Ok(Err(e)) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Error joining at the end of execution: {:?}", e);
            std::process::exit(1);
        }
    }
}
