//! Common utilities shared between the kernel builder and the SDK assembler.
//!
//! ## Error Messages
//!
//! Failures carry what went wrong and where (paths, command lines), plus the
//! tail of a failed command's output, so a broken target can be diagnosed
//! without re-running it.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::types::AssemblyError;

/// Number of trailing output lines kept when a command fails.
const OUTPUT_TAIL_LINES: usize = 40;

/// Renders a command as a shell-like line for logs and error messages.
pub fn describe_command(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs an external command to completion and checks its exit status.
///
/// Captures both stdout and stderr; on failure the returned message holds the
/// exit status and the tail of both streams.
pub fn run_command(mut cmd: Command) -> Result<(), String> {
    let output = cmd.output().map_err(|e| {
        format!(
            "Failed to start {:?}: {}\n\nEnsure the tool is installed and available on PATH.",
            cmd.get_program(),
            e
        )
    })?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "Exit status: {}\n\n\
             Stdout:\n{}\n\n\
             Stderr:\n{}",
            output.status,
            tail(&stdout, OUTPUT_TAIL_LINES),
            tail(&stderr, OUTPUT_TAIL_LINES)
        ));
    }
    Ok(())
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// Creates a directory and all of its parents.
pub fn create_dir(path: &Path) -> Result<(), AssemblyError> {
    fs::create_dir_all(path).map_err(|source| AssemblyError::Io {
        action: "create directory",
        path: path.to_path_buf(),
        source,
    })
}

/// Copies a single file into `dest_dir`, keeping its file name.
///
/// `artifact` names the file in the error raised when `src` does not exist.
pub fn copy_file_into(src: &Path, dest_dir: &Path, artifact: &str) -> Result<(), AssemblyError> {
    if !src.is_file() {
        return Err(AssemblyError::MissingArtifact {
            artifact: artifact.to_string(),
            path: src.to_path_buf(),
        });
    }
    let file_name = src.file_name().ok_or_else(|| AssemblyError::MissingArtifact {
        artifact: artifact.to_string(),
        path: src.to_path_buf(),
    })?;
    let dest = dest_dir.join(file_name);
    fs::copy(src, &dest).map_err(|source| AssemblyError::Io {
        action: "copy to",
        path: dest,
        source,
    })?;
    Ok(())
}

/// Recursively copies the directory `src` to `dest`.
///
/// `dest` is created if needed; existing files in it are overwritten.
/// `artifact` names the tree in the error raised when `src` does not exist.
pub fn copy_tree(src: &Path, dest: &Path, artifact: &str) -> Result<(), AssemblyError> {
    if !src.is_dir() {
        return Err(AssemblyError::MissingArtifact {
            artifact: artifact.to_string(),
            path: src.to_path_buf(),
        });
    }
    copy_dir_recursive(src, dest)
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), AssemblyError> {
    create_dir(dest)?;

    let entries = fs::read_dir(src).map_err(|source| AssemblyError::Io {
        action: "read directory",
        path: src.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| AssemblyError::Io {
            action: "read entry in",
            path: src.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path).map_err(|source| AssemblyError::Io {
                action: "copy to",
                path: dest_path.clone(),
                source,
            })?;
        }
    }

    Ok(())
}
