//! Child language-server process supervision.

use std::process::Stdio;

use tokio::process::{ChildStdin, ChildStdout, Command};
use tracing::{error, info};

use crate::{Error, Result};

/// Stdio pipes of a spawned language server.
///
/// Standard error is inherited so child noise flows to the proxy's own log
/// channel rather than the LSP wire. The process itself is owned by a
/// background wait task and is killed if that task is dropped.
pub struct ChildProcess {
	/// Pipe feeding the child's standard input.
	pub stdin: ChildStdin,
	/// Pipe reading the child's standard output.
	pub stdout: ChildStdout,
}

/// Spawns `sh -c <command>` with piped stdio.
///
/// # Errors
///
/// Returns [`Error::Spawn`] when the shell itself cannot be started. A
/// command that starts but exits immediately (e.g. the server binary is
/// missing) is observed later as EOF on its pipes.
pub fn spawn(command: &str) -> Result<ChildProcess> {
	let mut cmd = Command::new("sh");
	cmd.arg("-c")
		.arg(command)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::inherit())
		.kill_on_drop(true);

	let mut child = cmd.spawn().map_err(|e| Error::Spawn {
		command: command.to_owned(),
		reason: e.to_string(),
	})?;

	let stdin = child.stdin.take().expect("stdin");
	let stdout = child.stdout.take().expect("stdout");

	let command = command.to_owned();
	tokio::spawn(async move {
		match child.wait().await {
			Ok(status) => info!(command = %command, %status, "language server exited"),
			Err(err) => error!(command = %command, error = %err, "failed waiting on language server"),
		}
	});

	Ok(ChildProcess { stdin, stdout })
}
