mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    ClientSettings, LoggingSettings, PartialClientSettings, PartialLoggingSettings,
    PartialSettings, Settings,
};

/// Loads the configuration from the default file and environment variables.
///
/// Environment variables use the `MBUS` prefix and `__` as the nesting
/// separator, e.g. `MBUS__CLIENT__SERVER_PORT=9000`. Whatever is missing is
/// taken from `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix("MBUS").separator("__"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
