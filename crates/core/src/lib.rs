pub mod config;
pub mod error;
pub mod templates;
pub mod types;

pub use self::config::AppConfig;
pub use error::{PostboxError, PostboxResult};
pub use types::{Channel, Contact, ContactPreferences, PreferenceMap};
