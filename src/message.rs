//! JSON-RPC message framing and I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// A JSON-RPC message with version header.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMessage<T> {
	/// JSON-RPC version (always "2.0").
	jsonrpc: RpcVersion,
	/// The wrapped message content.
	#[serde(flatten)]
	inner: T,
}

impl<T> RawMessage<T> {
	fn new(inner: T) -> Self {
		Self {
			jsonrpc: RpcVersion::V2,
			inner,
		}
	}
}

/// JSON-RPC protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum RpcVersion {
	/// JSON-RPC version 2.0.
	#[serde(rename = "2.0")]
	V2,
}

/// A request identifier, numeric or string.
///
/// LSP allows both; the proxy coerces either form to an integer when it
/// needs to do id arithmetic (see [`crate::pending`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
	/// Numeric id.
	Number(i64),
	/// String id.
	String(String),
}

impl RequestId {
	/// The integer value of this id, parsing decimal string ids.
	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Number(n) => Some(*n),
			Self::String(s) => s.parse().ok(),
		}
	}
}

impl From<i64> for RequestId {
	fn from(id: i64) -> Self {
		Self::Number(id)
	}
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(n) => n.fmt(f),
			Self::String(s) => s.fmt(f),
		}
	}
}

/// An incoming or outgoing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyRequest {
	/// The request id.
	pub id: RequestId,
	/// The method to invoke.
	pub method: String,
	/// Raw parameters, kept opaque for pass-through.
	#[serde(default, skip_serializing_if = "JsonValue::is_null")]
	pub params: JsonValue,
}

/// A response to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyResponse {
	/// The id of the request being answered.
	pub id: RequestId,
	/// The result payload on success.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<JsonValue>,
	/// The error payload on failure.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ResponseError>,
}

/// A notification (no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyNotification {
	/// The method to invoke.
	pub method: String,
	/// Raw parameters, kept opaque for pass-through.
	#[serde(default, skip_serializing_if = "JsonValue::is_null")]
	pub params: JsonValue,
}

/// A JSON-RPC error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode(pub i64);

impl ErrorCode {
	/// Invalid JSON-RPC request.
	pub const INVALID_REQUEST: Self = Self(-32600);
	/// The method does not exist or is not available.
	pub const METHOD_NOT_FOUND: Self = Self(-32601);
	/// Invalid method parameters.
	pub const INVALID_PARAMS: Self = Self(-32602);
	/// Internal JSON-RPC error.
	pub const INTERNAL_ERROR: Self = Self(-32603);
	/// The request failed for a reason unrelated to its syntax.
	pub const REQUEST_FAILED: Self = Self(-32803);
}

/// The error object of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
	/// The error code.
	pub code: ErrorCode,
	/// A short human-readable description.
	pub message: String,
	/// Optional structured details.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<JsonValue>,
}

impl ResponseError {
	/// Creates an error with no structured details.
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			data: None,
		}
	}
}

/// A JSON-RPC message (request, response, or notification).
///
/// Deserialization is untagged with the request arm first, so a frame
/// carrying both `id` and `method` is a request: some language servers send
/// requests that would otherwise also satisfy the response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// An incoming or outgoing request.
	Request(AnyRequest),
	/// A response to a request.
	Response(AnyResponse),
	/// A notification (no response expected).
	Notification(AnyNotification),
}

/// Header-terminator tracking for [`Message::read`].
///
/// The terminator `\r\n\r\n` is detected exactly; any other byte sequence
/// resets progress through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
	/// Inside a header field's bytes.
	Field,
	/// Last byte was `\r`.
	Cr,
	/// Last bytes ended a header line with `\n`.
	Lf,
	/// Saw `\r\n\r`; one `\n` away from the terminator.
	CrLfCr,
}

impl Message {
	/// Header prefix selecting the content length, matched case-sensitively.
	const CONTENT_LENGTH: &'static str = "Content-Length:";

	/// Reads one complete framed JSON-RPC message from the input stream.
	///
	/// Only the `Content-Length` header (case-sensitive) is interpreted;
	/// other headers are read and discarded. Whitespace around the length
	/// value is tolerated.
	///
	/// # Errors
	///
	/// - [`Error::Eof`] when the stream ends between messages.
	/// - [`Error::Io`] when the underlying stream raises an error.
	/// - [`Error::Protocol`] when the header block carries no usable
	///   `Content-Length`.
	/// - [`Error::Deserialize`] when the body is not a JSON-RPC message.
	pub async fn read(reader: &mut (impl AsyncBufRead + Unpin)) -> Result<Self> {
		let mut content_len: Option<usize> = None;
		let mut header = Vec::new();
		let mut state = HeaderState::Field;
		let mut seen_any = false;

		loop {
			let (consumed, done) = {
				let buf = reader.fill_buf().await?;
				if buf.is_empty() {
					// Clean EOF only between frames.
					return Err(if seen_any {
						Error::Protocol("stream ended inside headers".into())
					} else {
						Error::Eof
					});
				}

				let mut consumed = 0;
				let mut done = false;
				for &byte in buf {
					consumed += 1;
					seen_any = true;
					match byte {
						b'\r' => {
							state = if state == HeaderState::Lf {
								HeaderState::CrLfCr
							} else {
								HeaderState::Cr
							};
						}
						b'\n' => {
							if state == HeaderState::CrLfCr {
								done = true;
								break;
							}
							state = HeaderState::Lf;
							if let Ok(line) = std::str::from_utf8(&header)
								&& let Some(value) = line.strip_prefix(Self::CONTENT_LENGTH)
							{
								content_len = value.trim().parse().ok();
							}
							header.clear();
						}
						other => {
							header.push(other);
							state = HeaderState::Field;
						}
					}
				}
				(consumed, done)
			};
			reader.consume(consumed);
			if done {
				break;
			}
		}

		let content_len =
			content_len.ok_or_else(|| Error::Protocol("missing Content-Length".into()))?;
		let mut body = vec![0u8; content_len];
		reader.read_exact(&mut body).await?;
		tracing::trace!(msg = %String::from_utf8_lossy(&body), "incoming");
		let msg = serde_json::from_slice::<RawMessage<Self>>(&body)?;
		Ok(msg.inner)
	}

	/// Writes this message to the output stream with a `Content-Length` header.
	///
	/// # Errors
	///
	/// - [`Error::Protocol`] when the body would serialize to the literal
	///   `null`, which some editors treat as a protocol error.
	/// - [`Error::Io`] when the underlying stream raises an error.
	pub async fn write(&self, writer: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
		let body = serde_json::to_string(&RawMessage::new(self))?;
		if body == "null" {
			return Err(Error::Protocol("refusing to send a null message body".into()));
		}
		tracing::trace!(msg = %body, "outgoing");
		writer
			.write_all(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes())
			.await?;
		writer.write_all(body.as_bytes()).await?;
		writer.flush().await?;
		Ok(())
	}

	/// Creates a request message.
	pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: JsonValue) -> Self {
		Self::Request(AnyRequest {
			id: id.into(),
			method: method.into(),
			params,
		})
	}

	/// Creates a successful response message.
	pub fn response(id: impl Into<RequestId>, result: JsonValue) -> Self {
		Self::Response(AnyResponse {
			id: id.into(),
			result: Some(result),
			error: None,
		})
	}

	/// Creates a failed response message.
	pub fn error_response(id: impl Into<RequestId>, error: ResponseError) -> Self {
		Self::Response(AnyResponse {
			id: id.into(),
			result: None,
			error: Some(error),
		})
	}

	/// Creates a notification message.
	pub fn notification(method: impl Into<String>, params: JsonValue) -> Self {
		Self::Notification(AnyNotification {
			method: method.into(),
			params,
		})
	}
}

#[cfg(test)]
mod tests;
