pub mod app_config;
pub mod config;
pub mod logger;

pub use app_config::load_server_config;
pub use config::*;
pub use logger::setup_logging;
