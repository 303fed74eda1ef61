//! Open a source location in the user's editor.

use log::debug;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use crate::domain::NavigationError;

const FALLBACK_EDITOR: &str = "vi";

/// Editor to launch: `$VISUAL`, then `$EDITOR`, then `vi`.
#[must_use]
pub fn configured_editor() -> String {
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| FALLBACK_EDITOR.to_string())
}

/// Build the command line that opens `file` at `line`, centered where the
/// editor supports it.
///
/// `editor` may carry its own arguments (`code --wait`); they are kept in
/// front of the location arguments.
///
/// # Errors
/// `NavigationError::InvalidLine` for line 0, `NavigationError::NoEditor`
/// when `editor` is blank.
pub fn editor_command(editor: &str, file: &Path, line: u32) -> Result<Vec<OsString>, NavigationError> {
    if line == 0 {
        return Err(NavigationError::InvalidLine(line));
    }
    let mut words = editor.split_whitespace();
    let program = words.next().ok_or(NavigationError::NoEditor)?;

    let mut argv: Vec<OsString> = std::iter::once(program).chain(words).map(OsString::from).collect();

    let name = Path::new(program).file_name().and_then(|n| n.to_str()).unwrap_or(program);
    match name {
        "code" | "codium" | "code-insiders" => {
            argv.push("-g".into());
            let mut target = file.as_os_str().to_owned();
            target.push(format!(":{line}"));
            argv.push(target);
        }
        "vim" | "nvim" | "vi" | "gvim" => {
            argv.push(format!("+{line}").into());
            argv.push("-c".into());
            argv.push("normal! zz".into());
            argv.push(file.as_os_str().to_owned());
        }
        _ => {
            argv.push(format!("+{line}").into());
            argv.push(file.as_os_str().to_owned());
        }
    }
    Ok(argv)
}

/// Launch the configured editor at `file:line` and wait for it to exit.
///
/// # Errors
/// Any [`NavigationError`]: invalid line, editor missing, failing to start
/// or exiting non-zero.
pub fn open_location(file: &Path, line: u32) -> Result<(), NavigationError> {
    let editor = configured_editor();
    let argv = editor_command(&editor, file, line)?;
    debug!("open {}:{line} with {argv:?}", file.display());

    let (program, args) = argv.split_first().ok_or(NavigationError::NoEditor)?;
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| NavigationError::LaunchFailed { editor: editor.clone(), source })?;

    if status.success() {
        Ok(())
    } else {
        Err(NavigationError::EditorFailed { editor, status: status.to_string() })
    }
}
