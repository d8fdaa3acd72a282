//! Bidirectional framed JSON-RPC endpoints.

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::Mutex;

use crate::Result;
use crate::message::Message;

type BoxRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// A message endpoint pairing the framed codec with a byte-stream pair.
///
/// Exactly one loop reads from an endpoint, but many loops may write to it
/// (every child fan-in loop plus the serve loop write to the editor
/// endpoint), so writes are serialized behind a send lock.
pub struct Endpoint {
	name: &'static str,
	reader: Mutex<BufReader<BoxRead>>,
	writer: Mutex<BoxWrite>,
}

impl Endpoint {
	/// Creates an endpoint over a readable/writable stream pair.
	pub fn new(
		name: &'static str,
		input: impl AsyncRead + Send + Unpin + 'static,
		output: impl AsyncWrite + Send + Unpin + 'static,
	) -> Self {
		Self {
			name,
			reader: Mutex::new(BufReader::new(Box::new(input) as BoxRead)),
			writer: Mutex::new(Box::new(output) as BoxWrite),
		}
	}

	/// The peer name, used in logs.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Reads the next framed message from the peer.
	pub async fn read_message(&self) -> Result<Message> {
		let mut reader = self.reader.lock().await;
		Message::read(&mut *reader).await
	}

	/// Writes one framed message, holding the send lock for the frame.
	pub async fn write_message(&self, msg: &Message) -> Result<()> {
		let mut writer = self.writer.lock().await;
		msg.write(&mut *writer).await
	}

	/// Writes several framed messages under a single hold of the send lock,
	/// so no other writer can interleave between them.
	pub async fn write_batch(&self, msgs: &[Message]) -> Result<()> {
		let mut writer = self.writer.lock().await;
		for msg in msgs {
			msg.write(&mut *writer).await?;
		}
		Ok(())
	}
}

impl std::fmt::Debug for Endpoint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Endpoint").field("name", &self.name).finish()
	}
}
