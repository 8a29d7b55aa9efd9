pub mod classifier;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod reports;
pub mod session;
pub mod utils;

pub use classifier::PayloadKind;
pub use config::Config;
pub use error::{CalistaError, ValidationError};
pub use history::CalistaClient;
pub use models::{Device, MeterType, Reading};
pub use reports::ParserError;
pub use session::SessionStatus;
