//! Host side of the Linkbot firmware updater: settings, the persisted
//! scheduler state, the file-system bridge and logging.

mod app;
mod bridge;
mod config_store;
mod error;
pub mod logging;
mod settings;

pub use app::App;
pub use bridge::{FlasherCommand, LocalBridge};
pub use config_store::JsonConfigStore;
pub use error::AppError;
pub use settings::AppSettings;
