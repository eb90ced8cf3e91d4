//! Command handlers -- one module per subcommand

pub mod config;
pub mod spec;
pub mod state;

use std::path::Path;

use crate::error::CliError;

/// Read a UTF-8 text file, keeping the path in the error message.
pub(crate) fn read_text(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|e| {
        CliError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}
