//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use n6_collectors::{LegacyTextEncoding, PickleProtocol};
use n6_config::FormatData;

/// n6ctl -- inspect n6 config specs, config files and collector state.
///
/// Use `n6ctl <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "n6ctl", version, about, long_about = None)]
pub struct Cli {
    /// Log level or filter directives (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Log output format (logs go to stderr).
    #[arg(long, global = true, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Supported log formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// JSON lines.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render and inspect config specs.
    Spec(SpecArgs),

    /// Validate config files against a spec.
    Config(ConfigArgs),

    /// Inspect and migrate collector state files.
    State(StateArgs),
}

/// Template data given as repeated `--format key=value` flags.
#[derive(Args, Debug, Default)]
pub struct FormatFlags {
    /// Template data for `{key}` fields in spec text.
    #[arg(long = "format", value_name = "KEY=VALUE", value_parser = parse_format_pair)]
    pub pairs: Vec<(String, String)>,
}

impl FormatFlags {
    /// `None` when no flag was given (spec text is used literally).
    pub fn to_format_data(&self) -> Option<FormatData> {
        if self.pairs.is_empty() {
            return None;
        }
        Some(self.pairs.iter().cloned().collect())
    }
}

fn parse_format_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

// ---- spec ----

/// Render and inspect config specs.
#[derive(Args, Debug)]
pub struct SpecArgs {
    #[command(subcommand)]
    pub action: SpecAction,
}

#[derive(Subcommand, Debug)]
pub enum SpecAction {
    /// Combine spec files (ancestor first) and print the merged spec.
    Render {
        /// Spec files, from the most general to the most specific.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        format: FormatFlags,
    },
    /// Parse a spec file and list its sections and options.
    Check {
        /// Spec file.
        file: PathBuf,

        #[command(flatten)]
        format: FormatFlags,
    },
}

// ---- config ----

/// Validate config files against a spec.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Build the configuration and report the aggregated errors, if any.
    Check {
        /// Spec file the configuration must satisfy.
        #[arg(long)]
        spec: PathBuf,

        /// Directory with `*.conf` files (repeatable; default: /etc/n6 and ~/.n6).
        #[arg(long)]
        config_dir: Vec<PathBuf>,

        #[command(flatten)]
        format: FormatFlags,
    },
}

// ---- state ----

/// Inspect and migrate collector state files.
#[derive(Args, Debug)]
pub struct StateArgs {
    #[command(subcommand)]
    pub action: StateAction,
}

#[derive(Subcommand, Debug)]
pub enum StateAction {
    /// Decode a state file (legacy formats included) and print it.
    Show {
        /// State file.
        file: PathBuf,

        /// How byte strings in legacy files are turned into text.
        #[arg(long, default_value = "utf8-or-latin1")]
        legacy_encoding: LegacyEncodingArg,
    },
    /// Rewrite a state file in the current format, atomically.
    Migrate {
        /// State file.
        file: PathBuf,

        /// Pickle protocol to write.
        #[arg(long, default_value = "v3")]
        protocol: ProtocolArg,

        /// How byte strings in legacy files are turned into text.
        #[arg(long, default_value = "utf8-or-latin1")]
        legacy_encoding: LegacyEncodingArg,
    },
}

/// Pickle protocol accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProtocolArg {
    V2,
    V3,
}

impl From<ProtocolArg> for PickleProtocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::V2 => Self::V2,
            ProtocolArg::V3 => Self::V3,
        }
    }
}

/// Legacy text decoding accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LegacyEncodingArg {
    /// Every byte is a Latin-1 code point.
    Latin1,
    /// UTF-8, falling back to Latin-1.
    Utf8OrLatin1,
}

impl From<LegacyEncodingArg> for LegacyTextEncoding {
    fn from(arg: LegacyEncodingArg) -> Self {
        match arg {
            LegacyEncodingArg::Latin1 => Self::Latin1,
            LegacyEncodingArg::Utf8OrLatin1 => Self::Utf8OrLatin1,
        }
    }
}
