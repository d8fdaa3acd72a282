//! LSP output-channel capture.
//!
//! The framed LSP stream must own the process's real standard output, but
//! spawned tooling and careless libraries write there too. At startup the
//! real stdout is duplicated onto a spare descriptor reserved for framed
//! output, and fd 1 is re-pointed at stderr so stray writes land on the
//! log channel instead of corrupting the wire.

use std::fs::File;
use std::os::fd::FromRawFd;

use tokio::io::Stdin;

use crate::Result;

/// Claims the process's standard output for framed LSP traffic.
///
/// Returns the editor-facing input stream and the only handle through
/// which framed output may be written. After this call, anything written
/// to fd 1 goes to stderr.
///
/// # Errors
///
/// Returns the OS error when duplicating the descriptors fails.
pub fn capture_lsp_output() -> Result<(Stdin, tokio::fs::File)> {
	// SAFETY: dup/dup2 operate on the standard descriptors, which are open
	// for the lifetime of the process; the duplicate is owned exclusively
	// by the returned File.
	let saved = unsafe { libc::dup(libc::STDOUT_FILENO) };
	if saved < 0 {
		return Err(std::io::Error::last_os_error().into());
	}
	if unsafe { libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO) } < 0 {
		return Err(std::io::Error::last_os_error().into());
	}
	let output = unsafe { File::from_raw_fd(saved) };
	Ok((tokio::io::stdin(), tokio::fs::File::from_std(output)))
}
