//! `n6ctl config` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use n6_config::loader::discover_config_files;
use n6_config::{Config, ConfigError, ConfigLoadOptions, FormatData};

use super::read_text;
use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
pub fn execute(args: ConfigArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Check {
            spec,
            config_dir,
            format,
        } => {
            let report = check_config(&spec, &config_dir, format.to_format_data())?;
            writer.render(&report)?;
            if !report.valid {
                return Err(CliError::Config("configuration is invalid".to_owned()));
            }
            Ok(())
        }
    }
}

/// Build the configuration described by `spec_path` from the config files.
///
/// An empty `config_dirs` means the default roots. Build failures end up in
/// the report; only an unreadable spec file is returned as an error.
pub fn check_config(
    spec_path: &Path,
    config_dirs: &[PathBuf],
    format_data: Option<FormatData>,
) -> Result<ConfigCheckReport, CliError> {
    let spec_text = read_text(spec_path)?;

    let mut options = ConfigLoadOptions::default();
    if !config_dirs.is_empty() {
        options = options.with_roots(config_dirs.iter().cloned());
    }

    let files = match discover_config_files(&options) {
        Ok(files) => files,
        Err(e) => return Ok(ConfigCheckReport::invalid(spec_path, Vec::new(), &e)),
    };
    info!(spec = %spec_path.display(), files = files.len(), "checking configuration");

    let mut builder = Config::builder(spec_text).load_options(options);
    if let Some(data) = format_data {
        builder = builder.format_data(data);
    }

    Ok(match builder.build() {
        Ok(config) => ConfigCheckReport {
            spec: spec_path.display().to_string(),
            files: display_all(&files),
            valid: true,
            errors: Vec::new(),
            config: Some(config.to_json()),
        },
        Err(e) => ConfigCheckReport::invalid(spec_path, files, &e),
    })
}

fn display_all(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

/// Result of building a configuration.
#[derive(Debug, Serialize)]
pub struct ConfigCheckReport {
    /// Spec file path
    pub spec: String,
    /// Config files read, in reading order
    pub files: Vec<String>,
    pub valid: bool,
    /// Aggregated error messages (empty if valid)
    pub errors: Vec<String>,
    /// Converted values, by section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl ConfigCheckReport {
    fn invalid(spec_path: &Path, files: Vec<PathBuf>, error: &ConfigError) -> Self {
        Self {
            spec: spec_path.display().to_string(),
            files: display_all(&files),
            valid: false,
            errors: vec![error.to_string()],
            config: None,
        }
    }
}

impl Render for ConfigCheckReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Check: {}", self.spec.bold())?;
        if self.files.is_empty() {
            writeln!(w, "  Files: (none)")?;
        } else {
            writeln!(w, "  Files:")?;
            for file in &self.files {
                writeln!(w, "    {file}")?;
            }
        }

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            if let Some(serde_json::Value::Object(sections)) = &self.config {
                for (name, values) in sections {
                    writeln!(w, "  [{name}]")?;
                    if let serde_json::Value::Object(values) = values {
                        for (opt, value) in values {
                            writeln!(w, "    {opt} = {value}")?;
                        }
                    }
                }
            }
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for error in &self.errors {
                writeln!(w, "  - {error}")?;
            }
        }
        Ok(())
    }
}
