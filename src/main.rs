use log::{info, warn};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};

use relayd::{AppConfig, AppState, DeviceController, DeviceRegistry};

#[cfg(feature = "hardware-gpio")]
use relayd::LibgpiodBackend;
#[cfg(not(feature = "hardware-gpio"))]
use relayd::MockGpioBackend;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RELAYD_CONFIG").ok());
    let config = match &config_path {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::embedded(),
    }
    .unwrap_or_else(|e| panic!("Failed to load config: {e}"));
    info!(
        "Loaded {} devices from {}",
        config.devices.len(),
        config_path.as_deref().unwrap_or("embedded config")
    );

    let backend = {
        #[cfg(feature = "hardware-gpio")]
        {
            Arc::new(
                LibgpiodBackend::new()
                    .unwrap_or_else(|e| panic!("Failed to init libgpiod backend: {e}")),
            )
        }
        #[cfg(not(feature = "hardware-gpio"))]
        {
            Arc::new(MockGpioBackend::default())
        }
    };

    let registry = DeviceRegistry::new(&config.devices)
        .unwrap_or_else(|e| panic!("Invalid device table: {e}"));
    let controller = Arc::new(DeviceController::new(registry, backend));

    info!("Preparing pins");
    controller
        .initialize()
        .unwrap_or_else(|e| panic!("Failed to initialize devices: {e}"));

    let app_state = AppState::new(controller.clone(), config.http.path.clone());
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .service(app_state.api_scope())
            .service(app_state.page_resource())
    });

    let bind_addrs: String;
    let http_cfg = config.http.clone();
    let server = match (&http_cfg.unix_socket, &http_cfg.host) {
        (Some(socket_path), Some(host)) => {
            if Path::new(socket_path).exists() {
                fs::remove_file(socket_path)?;
            }
            bind_addrs = format!("{} and {}", socket_path, host);

            server.bind_uds(socket_path)?.bind(host)?
        }
        (Some(socket_path), None) => {
            if Path::new(socket_path).exists() {
                fs::remove_file(socket_path)?;
            }
            bind_addrs = socket_path.clone();

            server.bind_uds(socket_path)?
        }
        (None, Some(host)) => {
            bind_addrs = host.clone();

            server.bind(host)?
        }
        (None, None) => {
            panic!("Config error: either 'unix_socket' or 'host' must be specified")
        }
    };

    info!("Listening at {}...", bind_addrs);

    // actix stops the server on SIGINT and SIGTERM
    let result = server.run().await;

    info!("Server stopped, releasing pins");
    if let Err(e) = controller.shutdown() {
        warn!("{e}");
    }

    result
}
