//! LSP multiplexing proxy.
//!
//! Presents itself to an editor as a single language server while fanning
//! requests and notifications out to one real language server per file type
//! (YAML, JSON, XML, Python, JavaScript), each spawned as a child process
//! speaking `Content-Length`-framed JSON-RPC on its own stdio.
//!
//! The interesting machinery lives in four places:
//! * [`message`]: the framed transport codec and the tagged message variant.
//! * [`route`]: the closed classifier from document URI to child server.
//! * [`pending`]: reversible request-id namespacing across children.
//! * [`server`]: the serve loop, per-child fan-in loops, initialize
//!   orchestration, and the schema/DTD configuration engine.
#![warn(missing_docs)]

pub mod config;
pub mod endpoint;
pub mod message;
pub mod pending;
pub mod process;
pub mod route;
pub mod server;
pub mod stdio;

pub use endpoint::Endpoint;
pub use message::{AnyNotification, AnyRequest, AnyResponse, ErrorCode, Message, RequestId, ResponseError};
pub use pending::PendingRequests;
pub use route::{ChildId, FACTOR};
pub use server::Proxy;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The underlying stream raised an error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	/// The peer violated the framed JSON-RPC wire format.
	#[error("protocol violation: {0}")]
	Protocol(String),
	/// The peer sent an undecodable message body.
	#[error("failed to deserialize message: {0}")]
	Deserialize(#[from] serde_json::Error),
	/// The stream ended cleanly between messages.
	#[error("stream ended")]
	Eof,
	/// No language server handles the document's file type.
	#[error("no language server for {0}")]
	UnknownFileType(String),
	/// A language server process could not be started.
	#[error("failed to spawn {command}: {reason}")]
	Spawn {
		/// The shell command that failed to start.
		command: String,
		/// Why the spawn failed.
		reason: String,
	},
}

/// Convenience alias for `Result` with the crate [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
