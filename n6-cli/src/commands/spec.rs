//! `n6ctl spec` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use n6_config::{
    ConfigSpec, FormatArgs, FormatData, SectSpec, SpecSource, as_config_spec_string, combine,
};

use super::read_text;
use crate::cli::{SpecAction, SpecArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `spec` command.
pub fn execute(args: SpecArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        SpecAction::Render { files, format } => {
            let report = render_specs(&files, format.to_format_data())?;
            writer.render(&report)
        }
        SpecAction::Check { file, format } => {
            let report = check_spec(&file, format.to_format_data())?;
            writer.render(&report)
        }
    }
}

/// Combine spec files in the given order and render the merged spec.
///
/// Each file overrides the ones before it, like a subclass spec over its parent.
pub fn render_specs(
    files: &[PathBuf],
    format_data: Option<FormatData>,
) -> Result<SpecRenderReport, CliError> {
    let mut source: Option<SpecSource> = None;
    for path in files {
        let text = read_text(path)?;
        source = Some(combine(source, text, path.display().to_string()));
    }
    let source = source.ok_or_else(|| CliError::Command("no spec files given".to_owned()))?;

    info!(files = files.len(), "rendering combined spec");
    let spec_text = as_config_spec_string(&source, FormatArgs::from(format_data.as_ref()))?;
    let sections = ConfigSpec::parse(&spec_text)?
        .get_all_sect_specs()
        .iter()
        .map(|s| s.name.clone())
        .collect();

    Ok(SpecRenderReport {
        files: files.iter().map(|p| p.display().to_string()).collect(),
        sections,
        spec: spec_text,
    })
}

/// Parse one spec file and describe what it declares.
pub fn check_spec(path: &Path, format_data: Option<FormatData>) -> Result<SpecCheckReport, CliError> {
    let text = read_text(path)?;
    let spec = ConfigSpec::from_source(
        &SpecSource::from(text),
        FormatArgs::from(format_data.as_ref()),
    )?;
    info!(path = %path.display(), sections = spec.get_all_sect_specs().len(), "spec parsed");

    Ok(SpecCheckReport {
        source: path.display().to_string(),
        sections: spec
            .get_all_sect_specs()
            .iter()
            .map(SectionSummary::from)
            .collect(),
    })
}

/// Merged spec text with the files it came from.
#[derive(Debug, Serialize)]
pub struct SpecRenderReport {
    pub files: Vec<String>,
    pub sections: Vec<String>,
    pub spec: String,
}

impl Render for SpecRenderReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write!(w, "{}", self.spec)?;
        if !self.spec.ends_with('\n') {
            writeln!(w)?;
        }
        Ok(())
    }
}

/// Sections and options declared by one spec.
#[derive(Debug, Serialize)]
pub struct SpecCheckReport {
    pub source: String,
    pub sections: Vec<SectionSummary>,
}

#[derive(Debug, Serialize)]
pub struct SectionSummary {
    pub name: String,
    pub required: bool,
    pub free_opts_allowed: bool,
    pub free_opts_converter: String,
    pub options: Vec<OptionSummary>,
}

#[derive(Debug, Serialize)]
pub struct OptionSummary {
    pub name: String,
    pub converter: String,
    pub required: bool,
    pub default: Option<String>,
}

impl From<&SectSpec> for SectionSummary {
    fn from(sect: &SectSpec) -> Self {
        Self {
            name: sect.name.clone(),
            required: sect.required(),
            free_opts_allowed: sect.free_opts_allowed,
            free_opts_converter: sect.free_opts_converter_spec.clone(),
            options: sect
                .opt_specs
                .iter()
                .map(|o| OptionSummary {
                    name: o.name.clone(),
                    converter: o.converter_spec.clone(),
                    required: o.is_required(),
                    default: o.default.clone(),
                })
                .collect(),
        }
    }
}

impl Render for SpecCheckReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Spec: {}", self.source.bold())?;
        for sect in &self.sections {
            let label = if sect.name.is_empty() {
                "(implicit section)".to_owned()
            } else {
                format!("[{}]", sect.name)
            };
            let marker = if sect.required {
                "required".yellow().to_string()
            } else {
                "optional".dimmed().to_string()
            };
            writeln!(w)?;
            writeln!(w, "  {} {}", label.bold(), marker)?;
            for opt in &sect.options {
                match &opt.default {
                    None => writeln!(w, "    {} :: {} (required)", opt.name, opt.converter)?,
                    Some(default) => writeln!(
                        w,
                        "    {} = {:?} :: {}",
                        opt.name, default, opt.converter
                    )?,
                }
            }
            if sect.free_opts_allowed {
                writeln!(w, "    ... :: {}", sect.free_opts_converter)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).expect("should write spec file");
        path
    }

    #[test]
    fn test_render_specs_child_overrides_parent() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let base = write_file(dir.path(), "base.spec", "[{section}]\nstate_dir = ~/.n6state :: path\n");
        let feed = write_file(
            dir.path(),
            "feed.spec",
            "[{section}]\nstate_dir = /var/n6 :: path\nurl :: str\n",
        );
        let data: FormatData = [("section".to_owned(), "csv_feed".to_owned())].into();

        let report = render_specs(&[base, feed], Some(data)).expect("render should succeed");

        assert_eq!(report.sections, vec!["csv_feed".to_owned()]);
        let spec = ConfigSpec::parse(&report.spec).expect("rendered spec should parse");
        let sect = spec.get_sect_spec("csv_feed").expect("section exists");
        assert_eq!(
            sect.get_opt_spec("state_dir").and_then(|o| o.default.as_deref()),
            Some("/var/n6")
        );
        assert!(sect.get_opt_spec("url").is_some_and(|o| o.is_required()));
    }

    #[test]
    fn test_render_specs_missing_template_key_is_config_error() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let base = write_file(dir.path(), "base.spec", "[{section}]\nx = 1 :: int\n");
        let data: FormatData = [("other".to_owned(), "v".to_owned())].into();

        let err = render_specs(&[base], Some(data)).expect_err("missing key should fail");
        assert_eq!(err.exit_code(), 2, "{err}");
    }

    #[test]
    fn test_render_specs_missing_file_is_io_error() {
        let err = render_specs(&[PathBuf::from("/nonexistent/n6/base.spec")], None)
            .expect_err("missing file should fail");
        assert_eq!(err.exit_code(), 10);
        assert!(err.to_string().contains("base.spec"), "{err}");
    }

    #[test]
    fn test_check_spec_lists_options() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write_file(
            dir.path(),
            "feed.spec",
            "[feed]\nurl :: str\nretries = 3 :: int\n...\n\n[misc]\nlevel = info\n",
        );

        let report = check_spec(&path, None).expect("check should succeed");

        assert_eq!(report.sections.len(), 2);
        let feed = &report.sections[0];
        assert_eq!(feed.name, "feed");
        assert!(feed.required);
        assert!(feed.free_opts_allowed);
        assert_eq!(feed.options[0].name, "url");
        assert!(feed.options[0].required);
        assert_eq!(feed.options[1].default.as_deref(), Some("3"));
        assert_eq!(feed.options[1].converter, "int");
        assert!(!report.sections[1].required);
    }

    #[test]
    fn test_check_spec_rejects_duplicate_section() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = write_file(dir.path(), "bad.spec", "[feed]\na = 1\n\n[feed]\nb = 2\n");
        let err = check_spec(&path, None).expect_err("bad spec should fail");
        assert_eq!(err.exit_code(), 2, "{err}");
    }

    #[test]
    fn test_check_report_text_marks_required_options() {
        let report = SpecCheckReport {
            source: "feed.spec".to_owned(),
            sections: vec![SectionSummary {
                name: "feed".to_owned(),
                required: true,
                free_opts_allowed: false,
                free_opts_converter: "str".to_owned(),
                options: vec![OptionSummary {
                    name: "url".to_owned(),
                    converter: "str".to_owned(),
                    required: true,
                    default: None,
                }],
            }],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render should succeed");
        let text = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(text.contains("url :: str (required)"), "{text}");
    }
}
