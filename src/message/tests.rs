use serde_json::json;

use super::*;

async fn roundtrip(msg: &Message) -> Message {
	let mut wire = Vec::new();
	msg.write(&mut wire).await.expect("write");
	let mut reader = wire.as_slice();
	Message::read(&mut reader).await.expect("read")
}

async fn read_bytes(wire: &[u8]) -> Result<Message> {
	let mut reader = wire;
	Message::read(&mut reader).await
}

#[tokio::test]
async fn roundtrip_request() {
	let msg = Message::request(7, "initialize", json!({"rootUri": "file:///w"}));
	let Message::Request(req) = roundtrip(&msg).await else {
		panic!("expected request");
	};
	assert_eq!(req.id, RequestId::Number(7));
	assert_eq!(req.method, "initialize");
	assert_eq!(req.params, json!({"rootUri": "file:///w"}));
}

#[tokio::test]
async fn roundtrip_body_containing_header_terminator() {
	let msg = Message::notification("window/logMessage", json!({"message": "a\r\n\r\nb"}));
	let Message::Notification(notif) = roundtrip(&msg).await else {
		panic!("expected notification");
	};
	assert_eq!(notif.params["message"], "a\r\n\r\nb");
}

#[tokio::test]
async fn roundtrip_multibyte_utf8() {
	let text = "schéma — ファイル 🚀".repeat(3);
	let msg = Message::notification("textDocument/didOpen", json!({"text": text}));
	let Message::Notification(notif) = roundtrip(&msg).await else {
		panic!("expected notification");
	};
	assert_eq!(notif.params["text"], text);
}

#[tokio::test]
async fn roundtrip_large_body() {
	let blob = "x".repeat(3 * 1024 * 1024);
	let msg = Message::response(9, json!({"contents": blob}));
	let Message::Response(resp) = roundtrip(&msg).await else {
		panic!("expected response");
	};
	assert_eq!(resp.result.expect("result")["contents"].as_str().map(str::len), Some(3 * 1024 * 1024));
}

#[tokio::test]
async fn ignores_other_headers_and_tolerates_whitespace() {
	let body = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;
	let wire = format!(
		"X-Extra: yes\r\nContent-Length:   {}  \r\nUser-Agent: editor\r\n\r\n{}",
		body.len(),
		body
	);
	let Message::Notification(notif) = read_bytes(wire.as_bytes()).await.expect("read") else {
		panic!("expected notification");
	};
	assert_eq!(notif.method, "initialized");
}

#[tokio::test]
async fn content_length_prefix_is_case_sensitive() {
	let body = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;
	let wire = format!("content-length: {}\r\n\r\n{}", body.len(), body);
	assert!(matches!(
		read_bytes(wire.as_bytes()).await,
		Err(Error::Protocol(_))
	));
}

#[tokio::test]
async fn missing_content_length_is_a_protocol_error() {
	let wire = b"X-Extra: yes\r\n\r\n{}";
	assert!(matches!(read_bytes(wire).await, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn clean_eof_between_messages() {
	assert!(matches!(read_bytes(b"").await, Err(Error::Eof)));
}

#[tokio::test]
async fn eof_inside_headers_is_a_protocol_error() {
	assert!(matches!(
		read_bytes(b"Content-Length: 10\r\n").await,
		Err(Error::Protocol(_))
	));
}

#[tokio::test]
async fn truncated_body_is_an_io_error() {
	let wire = b"Content-Length: 50\r\n\r\n{\"jsonrpc\":\"2.0\"";
	assert!(matches!(read_bytes(wire).await, Err(Error::Io(_))));
}

#[tokio::test]
async fn request_wins_over_response_shape() {
	// A child request carries id, method, and params at once; it must not
	// be mistaken for a response.
	let body = r#"{"jsonrpc":"2.0","id":9,"method":"workspace/configuration","params":{"items":[]}}"#;
	let wire = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
	let Message::Request(req) = read_bytes(wire.as_bytes()).await.expect("read") else {
		panic!("expected request");
	};
	assert_eq!(req.method, "workspace/configuration");
	assert_eq!(req.id, RequestId::Number(9));
}

#[tokio::test]
async fn response_without_method_parses_as_response() {
	let body = r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#;
	let wire = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
	let Message::Response(resp) = read_bytes(wire.as_bytes()).await.expect("read") else {
		panic!("expected response");
	};
	assert_eq!(resp.id, RequestId::Number(1));
	assert!(resp.error.is_none());
}

#[tokio::test]
async fn error_response_preserves_code_and_data() {
	let body = r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"nope","data":{"hint":1}}}"#;
	let wire = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
	let Message::Response(resp) = read_bytes(wire.as_bytes()).await.expect("read") else {
		panic!("expected response");
	};
	let err = resp.error.expect("error");
	assert_eq!(err.code, ErrorCode::METHOD_NOT_FOUND);
	assert_eq!(err.data, Some(json!({"hint": 1})));
}

#[tokio::test]
async fn null_result_serializes_as_explicit_null() {
	let msg = Message::response(3, JsonValue::Null);
	let mut wire = Vec::new();
	msg.write(&mut wire).await.expect("write");
	let text = String::from_utf8(wire).expect("utf8");
	assert!(text.ends_with(r#""result":null}"#), "got {text}");
}

#[test]
fn string_ids_coerce_to_integers() {
	assert_eq!(RequestId::Number(42).as_int(), Some(42));
	assert_eq!(RequestId::String("1000042".into()).as_int(), Some(1_000_042));
	assert_eq!(RequestId::String("abc".into()).as_int(), None);
}
