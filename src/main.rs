use log::{error, info};
use timetable_solver::config::{self, ServiceConfig};
use timetable_solver::server;

#[tokio::main]
async fn main() {
    let path = std::env::var("TIMETABLE_CONFIG")
        .unwrap_or_else(|_| config::DEFAULT_CONFIG_FILE.to_string());
    let (service_config, load_error) = match config::load(&path) {
        Ok(loaded) => (loaded, None),
        Err(e) => (ServiceConfig::default(), Some(e)),
    };

    let env = env_logger::Env::default().default_filter_or(service_config.log_filter.as_str());
    env_logger::Builder::from_env(env).init();

    if let Some(e) = load_error {
        error!("Failed to load config from {path}: {e}. Using defaults.");
    }
    if let Err(e) = service_config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(1);
    }
    info!("Starting timetable service with {service_config:?}");

    if let Err(e) = server::run_server(service_config).await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
