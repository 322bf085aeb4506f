//! Configuration file handling.
//!
//! [`ConfigFile`] is the on-disk INI form; [`crate::session::SessionConfig`]
//! is the runtime form built from it.

mod file;

pub use file::{
    config_dir, config_file_path, default_pins_dir, AnimationSettings, ApiSettings, ConfigError,
    ConfigFile, ConfigKey, FetchSettings, PinSettings, UiSettings,
};
