use crate::core::config::LoggingSection;
use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::anyhow;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

const DEFAULT_LEVEL: &str = "info";

/// Resolved logging configuration after the `[logging]` table and env overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub default_level: String,
    pub enable_file: bool,
    pub console_output: Option<ConsoleOutput>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_level: DEFAULT_LEVEL.to_string(),
            enable_file: true,
            console_output: None,
        }
    }
}

impl LoggingConfig {
    /// Defaults overlaid with whatever the `[logging]` table sets.
    pub fn from_section(section: &LoggingSection) -> Result<Self> {
        let mut config = LoggingConfig::default();
        if let Some(log_dir) = &section.log_dir {
            config.log_dir = Some(log_dir.clone());
        }
        if let Some(default_level) = &section.default_level {
            config.default_level = default_level.clone();
        }
        if let Some(enable_file) = section.enable_file {
            config.enable_file = enable_file;
        }
        if let Some(console_output) = &section.console_output {
            config.console_output =
                Some(ConsoleOutput::from_str(console_output).map_err(|err| anyhow!(err))?);
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Directive::from_str(&self.default_level)
            .map_err(|_| anyhow!("logging.default_level must be a valid tracing directive"))?;
        Ok(())
    }
}
