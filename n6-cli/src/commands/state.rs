//! `n6ctl state` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use n6_collectors::state::pickle_protocol;
use n6_collectors::{
    Decoded, LegacyTextEncoding, LoadOutcome, PickleProtocol, PickleStateCodec, StateCodec,
    StateStore,
};

use crate::cli::{StateAction, StateArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `state` command.
pub fn execute(args: StateArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        StateAction::Show {
            file,
            legacy_encoding,
        } => {
            let report = show_state(&file, legacy_encoding.into())?;
            writer.render(&report)
        }
        StateAction::Migrate {
            file,
            protocol,
            legacy_encoding,
        } => {
            let report = migrate_state(&file, protocol.into(), legacy_encoding.into())?;
            writer.render(&report)
        }
    }
}

/// Decode a state file into a JSON value.
pub fn show_state(path: &Path, encoding: LegacyTextEncoding) -> Result<StateShowReport, CliError> {
    let data = std::fs::read(path).map_err(|e| {
        CliError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })?;
    let codec = PickleStateCodec::new().with_legacy_text_encoding(encoding);
    let protocol = pickle_protocol(&data);
    let (state, legacy) = match codec.decode::<serde_json::Value>(path, &data) {
        Ok(decoded) => {
            let legacy = matches!(decoded, Decoded::Legacy(_));
            (decoded.into_inner(), legacy)
        }
        // JSON has no byte strings or non-string keys, so walk the raw pickle value instead
        Err(err) => match serde_pickle::value_from_slice(&data, serde_pickle::DeOptions::new()) {
            Ok(value) if protocol.is_some_and(|p| p > 2) => {
                debug!(path = %path.display(), error = %err, "showing state through the raw pickle value");
                (pickle_to_json(value), false)
            }
            _ => return Err(err.into()),
        },
    };

    Ok(StateShowReport {
        path: path.display().to_string(),
        protocol,
        legacy,
        state,
    })
}

/// Convert a raw pickle value for display.
///
/// Byte strings become `{"bytes": "<hex>"}`. Dict keys that are not strings
/// are rendered as their compact JSON text.
fn pickle_to_json(value: serde_pickle::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    use serde_pickle::Value as Pickle;

    match value {
        Pickle::None => Json::Null,
        Pickle::Bool(b) => Json::Bool(b),
        Pickle::I64(i) => Json::from(i),
        Pickle::Int(big) => Json::String(big.to_string()),
        Pickle::F64(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
        Pickle::Bytes(bytes) => bytes_to_json(&bytes),
        Pickle::String(s) => Json::String(s),
        Pickle::List(items) | Pickle::Tuple(items) => {
            Json::Array(items.into_iter().map(pickle_to_json).collect())
        }
        Pickle::Set(items) | Pickle::FrozenSet(items) => {
            Json::Array(items.into_iter().map(hashable_to_json).collect())
        }
        Pickle::Dict(entries) => Json::Object(
            entries
                .into_iter()
                .map(|(key, value)| {
                    let key = match hashable_to_json(key) {
                        Json::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, pickle_to_json(value))
                })
                .collect(),
        ),
    }
}

fn hashable_to_json(value: serde_pickle::HashableValue) -> serde_json::Value {
    use serde_json::Value as Json;
    use serde_pickle::HashableValue as Hashable;

    match value {
        Hashable::None => Json::Null,
        Hashable::Bool(b) => Json::Bool(b),
        Hashable::I64(i) => Json::from(i),
        Hashable::Int(big) => Json::String(big.to_string()),
        Hashable::F64(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
        Hashable::Bytes(bytes) => bytes_to_json(&bytes),
        Hashable::String(s) => Json::String(s),
        Hashable::Tuple(items) => Json::Array(items.into_iter().map(hashable_to_json).collect()),
        Hashable::FrozenSet(items) => {
            Json::Array(items.into_iter().map(hashable_to_json).collect())
        }
    }
}

fn bytes_to_json(bytes: &[u8]) -> serde_json::Value {
    serde_json::json!({ "bytes": hex::encode(bytes) })
}

/// Rewrite a state file with the current codec, atomically.
///
/// A file that is already current is rewritten too, so the protocol can be
/// changed with the same command.
pub fn migrate_state(
    path: &Path,
    protocol: PickleProtocol,
    encoding: LegacyTextEncoding,
) -> Result<StateMigrateReport, CliError> {
    let (dir, file_name) = split_state_path(path)?;
    let codec = PickleStateCodec::new()
        .with_protocol(protocol)
        .with_legacy_text_encoding(encoding);
    let store = StateStore::with_codec(dir, file_name, codec);

    let (state, outcome) =
        store.load_with_outcome(|| serde_json::Value::Null, std::convert::identity)?;
    if outcome == LoadOutcome::Missing {
        return Err(CliError::Command(format!(
            "state file not found: {}",
            path.display()
        )));
    }
    store.save(&state)?;

    let was_legacy = outcome == LoadOutcome::Legacy;
    info!(path = %path.display(), ?protocol, was_legacy, "state file rewritten");

    Ok(StateMigrateReport {
        path: path.display().to_string(),
        was_legacy,
        protocol: match protocol {
            PickleProtocol::V2 => 2,
            PickleProtocol::V3 => 3,
        },
    })
}

fn split_state_path(path: &Path) -> Result<(&Path, String), CliError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::Command(format!("not a state file path: {}", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, file_name.to_owned()))
}

/// Decoded state file.
#[derive(Debug, Serialize)]
pub struct StateShowReport {
    pub path: String,
    /// Pickle protocol marker found in the file (0 when there is none)
    pub protocol: Option<u8>,
    /// Whether the legacy decode path was needed
    pub legacy: bool,
    pub state: serde_json::Value,
}

impl Render for StateShowReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let format = if self.legacy {
            "legacy".yellow().to_string()
        } else {
            "current".green().to_string()
        };
        let protocol = self
            .protocol
            .map_or_else(|| "?".to_owned(), |p| p.to_string());
        writeln!(
            w,
            "State: {} (protocol {protocol}, {format})",
            self.path.bold()
        )?;
        let pretty = serde_json::to_string_pretty(&self.state).map_err(std::io::Error::other)?;
        writeln!(w, "{pretty}")
    }
}

/// Outcome of a migration.
#[derive(Debug, Serialize)]
pub struct StateMigrateReport {
    pub path: String,
    pub was_legacy: bool,
    /// Protocol the file was written with
    pub protocol: u8,
}

impl Render for StateMigrateReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let from = if self.was_legacy { "legacy" } else { "current" };
        writeln!(
            w,
            "Rewrote {} ({from} format) with pickle protocol {}",
            self.path, self.protocol
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Protocol 2 pickle with byte strings: {'newest_row_time': '2019-07-10', 'newest_rows': ['a']}
    const LEGACY_STATE: &[u8] =
        b"\x80\x02}(U\x0fnewest_row_timeU\n2019-07-10U\x0bnewest_rows]U\x01aau.";

    #[test]
    fn test_show_legacy_state_as_text() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("feed.pickle");
        std::fs::write(&path, LEGACY_STATE).expect("should write state");

        let report = show_state(&path, LegacyTextEncoding::default()).expect("show should succeed");

        assert!(report.legacy);
        assert_eq!(report.protocol, Some(2));
        assert_eq!(report.state["newest_row_time"], "2019-07-10");
        assert_eq!(report.state["newest_rows"][0], "a");
    }

    #[test]
    fn test_show_current_state_with_bytes_and_tuple_keys() {
        // protocol 3: {'newest_row_time': '2024-01-02', 'digest': b'\x00\xff', (1, 2): [1.5, None]}
        const CURRENT_STATE: &[u8] = b"\x80\x03}q\x00(X\x0f\x00\x00\x00newest_row_timeq\x01X\n\x00\x00\x002024-01-02q\x02X\x06\x00\x00\x00digestq\x03C\x02\x00\xffq\x04K\x01K\x02\x86q\x05]q\x06(G?\xf8\x00\x00\x00\x00\x00\x00Neu.";
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("feed.pickle");
        std::fs::write(&path, CURRENT_STATE).expect("should write state");

        let report = show_state(&path, LegacyTextEncoding::default()).expect("show should succeed");

        assert!(!report.legacy);
        assert_eq!(report.protocol, Some(3));
        assert_eq!(report.state["newest_row_time"], "2024-01-02");
        assert_eq!(report.state["digest"], serde_json::json!({ "bytes": "00ff" }));
        assert_eq!(report.state["[1,2]"], serde_json::json!([1.5, null]));
    }

    #[test]
    fn test_migrate_legacy_state_then_show_current() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("feed.pickle");
        std::fs::write(&path, LEGACY_STATE).expect("should write state");

        let report = migrate_state(&path, PickleProtocol::V3, LegacyTextEncoding::default())
            .expect("migrate should succeed");
        assert!(report.was_legacy);
        assert_eq!(report.protocol, 3);

        let shown = show_state(&path, LegacyTextEncoding::default()).expect("show should succeed");
        assert!(!shown.legacy, "migrated file should decode without the legacy path");
        assert_eq!(shown.protocol, Some(3));
        assert_eq!(shown.state["newest_row_time"], "2019-07-10");
    }

    #[test]
    fn test_migrate_missing_file_fails_without_creating_it() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("absent.pickle");

        let err = migrate_state(&path, PickleProtocol::V3, LegacyTextEncoding::default())
            .expect_err("missing file should fail");

        assert_eq!(err.exit_code(), 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_show_garbage_is_state_error() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("broken.pickle");
        std::fs::write(&path, b"not a pickle").expect("should write state");

        let err = show_state(&path, LegacyTextEncoding::default()).expect_err("should fail");
        assert_eq!(err.exit_code(), 3, "{err}");
    }

    #[test]
    fn test_split_state_path_bare_name() {
        let (dir, name) = split_state_path(Path::new("feed.pickle")).expect("valid path");
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "feed.pickle");
    }
}
