//! Multiplexer core: the editor serve loop, per-child fan-in loops,
//! initialize orchestration, and the schema/DTD configuration engine.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::endpoint::Endpoint;
use crate::message::{AnyNotification, AnyRequest, AnyResponse, ErrorCode, Message, RequestId, ResponseError};
use crate::pending::PendingRequests;
use crate::route::{self, ChildId, FileClassSets};
use crate::{Error, Result, config, process};

/// Name the proxy reports as itself, both as server and as client.
const SERVER_NAME: &str = "proxy-ls";
/// Version advertised to the editor.
const SERVER_VERSION: &str = "0.1";
/// Version advertised to children in `clientInfo`.
const CLIENT_VERSION: &str = "0.0.1";
/// The id the proxy uses for its own `initialize` request to every child.
const INIT_REQUEST_ID: i64 = 1;
/// Completion trigger characters advertised to the editor.
const COMPLETION_TRIGGERS: [&str; 5] = [",", ".", ":", "_", "-"];

/// Editor request methods forwarded to a child chosen by document URI.
const ROUTED_METHODS: [&str; 8] = [
	"textDocument/documentSymbol",
	"textDocument/formatting",
	"textDocument/codeAction",
	"textDocument/completion",
	"textDocument/hover",
	"textDocument/declaration",
	"textDocument/definition",
	"textDocument/rename",
];

/// A child language server endpoint with its readiness latch.
struct ChildEndpoint {
	id: ChildId,
	endpoint: Endpoint,
	ready_tx: watch::Sender<bool>,
}

impl ChildEndpoint {
	fn new(id: ChildId, endpoint: Endpoint) -> Self {
		let (ready_tx, _) = watch::channel(false);
		Self { id, endpoint, ready_tx }
	}

	fn subscribe_ready(&self) -> watch::Receiver<bool> {
		self.ready_tx.subscribe()
	}

	/// Latches readiness; true exactly once, on the first transition.
	fn mark_initialized(&self) -> bool {
		!self.ready_tx.send_replace(true)
	}
}

/// The multiplexing proxy.
///
/// Owns the editor-facing endpoint and one endpoint per spawned child.
/// [`Proxy::run`] drives one fan-in loop per child plus the editor serve
/// loop; the loops share the pending-request set, the diagnostics store,
/// and the tracked file-class sets, each behind its own lock.
pub struct Proxy {
	editor: Endpoint,
	children: HashMap<ChildId, ChildEndpoint>,
	pending: PendingRequests,
	diagnostics: Mutex<HashMap<String, Vec<JsonValue>>>,
	files: Mutex<FileClassSets>,
	/// Serializes the three-notification pushes of [`Proxy::update_configs`].
	config_push: tokio::sync::Mutex<()>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentParams {
	text_document: DocumentIdentifier,
}

#[derive(Deserialize)]
struct DocumentIdentifier {
	uri: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidOpenParams {
	text_document: OpenedDocument,
}

#[derive(Deserialize)]
struct OpenedDocument {
	uri: String,
	#[serde(default)]
	text: String,
}

#[derive(Deserialize)]
struct PublishDiagnosticsParams {
	uri: String,
	#[serde(default)]
	diagnostics: Vec<JsonValue>,
}

#[derive(Deserialize)]
struct ConfigurationParams {
	#[serde(default)]
	items: Vec<ConfigurationItem>,
}

#[derive(Deserialize)]
struct ConfigurationItem {
	#[serde(default)]
	section: String,
}

impl Proxy {
	/// Creates a proxy over already-built endpoints.
	///
	/// Children absent from `children` (e.g. because their process failed
	/// to spawn) are tolerated: requests routed to them fail back to the
	/// editor instead of aborting the proxy.
	pub fn new(editor: Endpoint, children: HashMap<ChildId, Endpoint>) -> Self {
		Self {
			editor,
			children: children
				.into_iter()
				.map(|(id, endpoint)| (id, ChildEndpoint::new(id, endpoint)))
				.collect(),
			pending: PendingRequests::new(),
			diagnostics: Mutex::new(HashMap::new()),
			files: Mutex::new(FileClassSets::default()),
			config_push: tokio::sync::Mutex::new(()),
		}
	}

	/// Spawns every managed language server and wires it to an endpoint.
	///
	/// A server that fails to spawn is logged and left out; the proxy keeps
	/// serving the remaining file types.
	pub fn spawn(editor: Endpoint) -> Self {
		let mut children = HashMap::new();
		for id in ChildId::ALL {
			match process::spawn(id.command()) {
				Ok(child) => {
					children.insert(id, Endpoint::new(id.name(), child.stdout, child.stdin));
				}
				Err(err) => error!(server = %id, error = %err, "failed to spawn language server"),
			}
		}
		Self::new(editor, children)
	}

	/// Runs the proxy until the editor stream ends.
	///
	/// # Errors
	///
	/// Returns the editor-side transport error that ended the serve loop,
	/// if it was not a clean EOF.
	pub async fn run(self: Arc<Self>) -> Result<()> {
		for id in self.children.keys().copied() {
			let proxy = Arc::clone(&self);
			tokio::spawn(async move { proxy.run_child(id).await });
		}
		self.serve().await
	}

	/// The editor-facing serve loop.
	async fn serve(&self) -> Result<()> {
		loop {
			let msg = match self.editor.read_message().await {
				Ok(msg) => msg,
				Err(Error::Deserialize(err)) => {
					warn!(error = %err, "skipping undecodable editor message");
					continue;
				}
				Err(Error::Eof) => {
					info!("editor stream ended");
					return Ok(());
				}
				Err(err) => {
					error!(error = %err, "editor transport failed");
					return Err(err);
				}
			};
			match msg {
				Message::Request(req) => self.handle_call(req).await?,
				Message::Notification(notif) => self.handle_notification(notif).await?,
				Message::Response(resp) => {
					// The proxy never sends the editor a request, so any
					// response here is a malformed client; log and skip.
					match &resp.error {
						Some(err) => warn!(id = %resp.id, message = %err.message, "error from editor"),
						None => debug!(id = %resp.id, "unsolicited response from editor"),
					}
				}
			}
		}
	}

	/// Handles one editor request.
	async fn handle_call(&self, req: AnyRequest) -> Result<()> {
		debug!(method = %req.method, id = %req.id, "editor call");
		if req.method == "initialize" {
			self.handle_initialize(req).await
		} else if ROUTED_METHODS.contains(&req.method.as_str()) {
			self.redirect_request(req).await
		} else {
			self.editor
				.write_message(&Message::error_response(
					req.id,
					ResponseError::new(ErrorCode::METHOD_NOT_FOUND, "Method not found"),
				))
				.await
		}
	}

	/// Initializes all children, then answers with the proxy's own
	/// capabilities.
	async fn handle_initialize(&self, req: AnyRequest) -> Result<()> {
		let root_uri = req.params.get("rootUri").cloned().unwrap_or(JsonValue::Null);
		let client_caps = req
			.params
			.get("capabilities")
			.cloned()
			.unwrap_or_else(|| json!({}));
		self.initialize_all(root_uri, client_caps).await;

		let capabilities = serde_json::to_value(server_capabilities()).expect("serialize capabilities");
		self.editor
			.write_message(&Message::response(
				req.id,
				json!({
					"capabilities": capabilities,
					"serverInfo": {
						"name": SERVER_NAME,
						"version": SERVER_VERSION,
					},
				}),
			))
			.await
	}

	/// Sends `initialize` to every child and waits for the file-type
	/// servers (yaml, json, xml) to come up.
	///
	/// ruff and rome are deliberately not awaited; the editor's own
	/// initialize completes without them.
	async fn initialize_all(&self, root_uri: JsonValue, client_caps: JsonValue) {
		let params = json!({
			"processId": std::process::id(),
			"rootUri": root_uri,
			"trace": "verbose",
			"clientInfo": {
				"name": SERVER_NAME,
				"version": CLIENT_VERSION,
			},
			"capabilities": augment_client_capabilities(client_caps),
			"initializationOptions": initialization_options(),
		});

		let sends = self.children.values().map(|child| {
			let params = params.clone();
			async move {
				let msg = Message::request(INIT_REQUEST_ID, "initialize", params);
				if let Err(err) = child.endpoint.write_message(&msg).await {
					error!(server = %child.id, error = %err, "failed to send initialize");
				}
			}
		});
		futures::future::join_all(sends).await;

		for id in [ChildId::Yaml, ChildId::Json, ChildId::Xml] {
			let Some(child) = self.children.get(&id) else {
				error!(server = %id, "language server never started; not waiting for it");
				continue;
			};
			let mut ready = child.subscribe_ready();
			if ready.wait_for(|up| *up).await.is_err() {
				warn!(server = %id, "readiness latch dropped");
			}
		}
	}

	/// Forwards an editor request to the child owning its document,
	/// rewriting the id into the child's namespace.
	async fn redirect_request(&self, req: AnyRequest) -> Result<()> {
		let uri = match serde_json::from_value::<DocumentParams>(req.params.clone()) {
			Ok(params) => params.text_document.uri,
			Err(err) => {
				return self
					.respond_error(req.id, ErrorCode::INVALID_PARAMS, format!("missing document: {err}"))
					.await;
			}
		};
		let child = match route::classify(&uri) {
			Ok(child) => child,
			Err(err) => {
				return self
					.respond_error(req.id, ErrorCode::REQUEST_FAILED, err.to_string())
					.await;
			}
		};
		let Some(editor_id) = req.id.as_int() else {
			return self
				.respond_error(req.id, ErrorCode::INVALID_REQUEST, "non-integer request id")
				.await;
		};

		let tagged = self.pending.track(child, editor_id);
		info!(method = %req.method, server = %child, tagged, "redirecting editor request");

		let mut forwarded = req;
		let id = forwarded.id.clone();
		forwarded.id = RequestId::Number(tagged);
		let outcome = match self.child(child) {
			Some(endpoint) => endpoint.write_message(&Message::Request(forwarded)).await,
			None => Err(Error::Spawn {
				command: child.command().to_owned(),
				reason: "not running".to_owned(),
			}),
		};
		if let Err(err) = outcome {
			warn!(server = %child, error = %err, "failed to forward editor request");
			self.pending.forget(tagged);
			return self
				.respond_error(id, ErrorCode::REQUEST_FAILED, err.to_string())
				.await;
		}
		Ok(())
	}

	async fn respond_error(
		&self,
		id: RequestId,
		code: ErrorCode,
		message: impl Into<String>,
	) -> Result<()> {
		self.editor
			.write_message(&Message::error_response(id, ResponseError::new(code, message)))
			.await
	}

	/// Handles one editor notification.
	async fn handle_notification(&self, notif: AnyNotification) -> Result<()> {
		debug!(method = %notif.method, "editor notification");
		match notif.method.as_str() {
			"textDocument/didOpen" => self.handle_did_open(notif).await,
			"textDocument/didChange" | "textDocument/didSave" | "textDocument/didClose" => {
				let uri = match serde_json::from_value::<DocumentParams>(notif.params.clone()) {
					Ok(params) => params.text_document.uri,
					Err(err) => {
						warn!(method = %notif.method, error = %err, "notification without document");
						return Ok(());
					}
				};
				match route::classify(&uri) {
					Ok(child) => self.redirect_notification(child, notif).await,
					Err(err) => warn!(error = %err, "dropping editor notification"),
				}
				Ok(())
			}
			other => {
				debug!(method = other, "ignoring editor notification");
				Ok(())
			}
		}
	}

	/// Routes a `didOpen`, sniffing the body for tracked document shapes.
	///
	/// Opens of a tracked class (any yaml document, Flatpak json manifests,
	/// gschema/gresource xml) re-push schema associations to the children;
	/// other documents only get forwarded.
	async fn handle_did_open(&self, notif: AnyNotification) -> Result<()> {
		let doc = match serde_json::from_value::<DidOpenParams>(notif.params.clone()) {
			Ok(params) => params.text_document,
			Err(err) => {
				warn!(error = %err, "didOpen without document");
				return Ok(());
			}
		};
		let child = match route::classify(&doc.uri) {
			Ok(child) => child,
			Err(err) => {
				warn!(error = %err, "dropping didOpen");
				return Ok(());
			}
		};
		let tracked = self.files.lock().record_open(&doc.uri, &doc.text, child);
		self.redirect_notification(child, notif).await;
		if tracked {
			self.update_configs().await;
		}
		Ok(())
	}

	/// Forwards an editor notification verbatim to a child.
	async fn redirect_notification(&self, child: ChildId, notif: AnyNotification) {
		info!(method = %notif.method, server = %child, "redirecting editor notification");
		let Some(endpoint) = self.child(child) else {
			warn!(server = %child, "dropping notification for absent language server");
			return;
		};
		if let Err(err) = endpoint.write_message(&Message::Notification(notif)).await {
			warn!(server = %child, error = %err, "failed to forward notification");
		}
	}

	/// The fan-in loop for one child.
	async fn run_child(&self, id: ChildId) {
		let Some(child) = self.children.get(&id) else {
			return;
		};
		loop {
			let msg = match child.endpoint.read_message().await {
				Ok(msg) => msg,
				Err(Error::Deserialize(err)) => {
					warn!(server = %id, error = %err, "skipping undecodable message");
					continue;
				}
				Err(err) => {
					warn!(server = %id, error = %err, "language server stream closed");
					return;
				}
			};
			let outcome = match msg {
				Message::Request(req) => self.handle_child_request(id, req).await,
				Message::Response(resp) => self.handle_child_response(id, resp).await,
				Message::Notification(notif) => self.handle_child_notification(id, notif).await,
			};
			if let Err(err) = outcome {
				warn!(server = %id, error = %err, "stopping fan-in after write failure");
				return;
			}
		}
	}

	/// Answers a request a child sent to the proxy.
	async fn handle_child_request(&self, id: ChildId, req: AnyRequest) -> Result<()> {
		debug!(server = %id, method = %req.method, "language server request");
		let Some(endpoint) = self.child(id) else {
			return Ok(());
		};
		match req.method.as_str() {
			"client/registerCapability" => {
				endpoint.write_message(&Message::response(req.id, JsonValue::Null)).await
			}
			"workspace/configuration" => {
				let items = match serde_json::from_value::<ConfigurationParams>(req.params.clone()) {
					Ok(params) => params.items,
					Err(err) => {
						return endpoint
							.write_message(&Message::error_response(
								req.id,
								ResponseError::new(ErrorCode::INVALID_PARAMS, err.to_string()),
							))
							.await;
					}
				};
				let values: Vec<JsonValue> = items
					.iter()
					.map(|item| self.configuration_section(id, &item.section))
					.collect();
				info!(server = %id, sections = items.len(), "synthesized configuration");
				endpoint
					.write_message(&Message::response(req.id, JsonValue::Array(values)))
					.await
			}
			other => {
				warn!(server = %id, method = other, params = %req.params, "unhandled language server request");
				Ok(())
			}
		}
	}

	/// Synthesizes one `workspace/configuration` section value.
	fn configuration_section(&self, id: ChildId, section: &str) -> JsonValue {
		match section {
			"xml.format.insertSpaces" => json!(true),
			"xml.format.tabSize" => json!(config::DEFAULT_TAB_SIZE),
			"yaml" => config::yaml_config(self.yaml_schema_associations()),
			"[yaml]" => json!({
				"editor.tabSize": config::DEFAULT_TAB_SIZE,
				"editor.insertSpace": true,
				"editor.formatOnType": false,
			}),
			"editor" => json!({"detectIndentation": true}),
			"files" => json!({}),
			"rome" => json!({
				"unstable": true,
				"rename": true,
				"require_configuration": true,
			}),
			other => {
				warn!(server = %id, section = other, "unknown configuration section");
				JsonValue::Null
			}
		}
	}

	/// Handles a response frame from a child.
	async fn handle_child_response(&self, id: ChildId, resp: AnyResponse) -> Result<()> {
		debug!(server = %id, id = %resp.id, "language server response");
		if let Some(err) = &resp.error {
			warn!(server = %id, code = err.code.0, message = %err.message, "error response from language server");
		}

		let Some(seq) = resp.id.as_int() else {
			// Non-integer ids can only belong to pass-through traffic.
			return self.editor.write_message(&Message::Response(resp)).await;
		};

		if seq == INIT_REQUEST_ID {
			if let Some(child) = self.children.get(&id)
				&& child.mark_initialized()
			{
				info!(server = %id, "language server initialized");
				child
					.endpoint
					.write_message(&Message::notification("initialized", json!({})))
					.await?;
			}
			return Ok(());
		}

		let mut resp = resp;
		if let Some(editor_id) = self.pending.claim(id, seq) {
			resp.id = RequestId::Number(editor_id);
		}
		self.editor.write_message(&Message::Response(resp)).await
	}

	/// Handles a notification from a child.
	async fn handle_child_notification(&self, id: ChildId, notif: AnyNotification) -> Result<()> {
		match notif.method.as_str() {
			"textDocument/publishDiagnostics" => {
				let params = match serde_json::from_value::<PublishDiagnosticsParams>(notif.params) {
					Ok(params) => params,
					Err(err) => {
						warn!(server = %id, error = %err, "undecodable diagnostics");
						return Ok(());
					}
				};
				self.diagnostics.lock().insert(params.uri, params.diagnostics);
				self.republish_diagnostics().await
			}
			"window/logMessage" => {
				let message = notif
					.params
					.get("message")
					.and_then(JsonValue::as_str)
					.unwrap_or_default();
				info!(server = %id, message, "language server log");
				Ok(())
			}
			other => {
				debug!(server = %id, method = other, "dropping language server notification");
				Ok(())
			}
		}
	}

	/// Re-publishes every known URI's diagnostics to the editor.
	///
	/// Each URI is sent as a clear (empty list) immediately followed by its
	/// current list, under one hold of the editor send lock so the pair
	/// stays contiguous. Works around stale-diagnostic caches in some
	/// editors.
	async fn republish_diagnostics(&self) -> Result<()> {
		let snapshot: Vec<(String, Vec<JsonValue>)> = self
			.diagnostics
			.lock()
			.iter()
			.map(|(uri, diags)| (uri.clone(), diags.clone()))
			.collect();
		for (uri, diags) in snapshot {
			let clear = Message::notification(
				"textDocument/publishDiagnostics",
				json!({"uri": uri, "diagnostics": []}),
			);
			let set = Message::notification(
				"textDocument/publishDiagnostics",
				json!({"uri": uri, "diagnostics": diags}),
			);
			self.editor.write_batch(&[clear, set]).await?;
		}
		Ok(())
	}

	/// Pushes the current schema/DTD associations to the json, xml, and
	/// yaml children as one atomic triple of notifications.
	async fn update_configs(&self) {
		let _guard = self.config_push.lock().await;

		let (json_associations, xml_associations, yaml_schemas) = {
			let files = self.files.lock();
			let json_associations = json!([{
				"uri": config::FLATPAK_MANIFEST_SCHEMA,
				"fileMatch": &files.flatpak_manifests_json,
			}]);
			let mut xml_associations: Vec<JsonValue> = Vec::new();
			for gschema in &files.gschema_files {
				xml_associations.push(json!({
					"pattern": gschema,
					"systemId": config::GSCHEMA_DTD,
				}));
			}
			for gresource in &files.gresource_files {
				xml_associations.push(json!({
					"pattern": gresource,
					"systemId": config::GRESOURCE_DTD,
				}));
			}
			let yaml_schemas = json!({
				(config::FLATPAK_MANIFEST_SCHEMA): &files.flatpak_manifests_yaml,
			});
			(json_associations, xml_associations, yaml_schemas)
		};

		// The json child takes a bespoke notification; xml and yaml take
		// standard configuration changes (yaml without the settings
		// wrapper, which is what yaml-language-server expects).
		self.notify_child(
			ChildId::Json,
			Message::notification("json/schemaAssociations", json!([json_associations])),
		)
		.await;
		self.notify_child(
			ChildId::Xml,
			Message::notification(
				"workspace/didChangeConfiguration",
				json!({"settings": {"xml": config::xml_config(JsonValue::Array(xml_associations))}}),
			),
		)
		.await;
		self.notify_child(
			ChildId::Yaml,
			Message::notification(
				"workspace/didChangeConfiguration",
				json!({"yaml": config::yaml_config(yaml_schemas)}),
			),
		)
		.await;
	}

	/// Current yaml schema map: flatpak schema URL → opened manifest names.
	fn yaml_schema_associations(&self) -> JsonValue {
		let files = self.files.lock();
		json!({
			(config::FLATPAK_MANIFEST_SCHEMA): &files.flatpak_manifests_yaml,
		})
	}

	async fn notify_child(&self, id: ChildId, msg: Message) {
		let Some(endpoint) = self.child(id) else {
			return;
		};
		if let Err(err) = endpoint.write_message(&msg).await {
			warn!(server = %id, error = %err, "failed to push configuration");
		}
	}

	fn child(&self, id: ChildId) -> Option<&Endpoint> {
		self.children.get(&id).map(|child| &child.endpoint)
	}
}

/// Capabilities the proxy advertises to the editor.
fn server_capabilities() -> lsp_types::ServerCapabilities {
	lsp_types::ServerCapabilities {
		text_document_sync: Some(lsp_types::TextDocumentSyncCapability::Kind(
			lsp_types::TextDocumentSyncKind::INCREMENTAL,
		)),
		completion_provider: Some(lsp_types::CompletionOptions {
			trigger_characters: Some(COMPLETION_TRIGGERS.iter().map(|c| (*c).to_owned()).collect()),
			..Default::default()
		}),
		hover_provider: Some(lsp_types::HoverProviderCapability::Simple(true)),
		definition_provider: Some(lsp_types::OneOf::Left(true)),
		document_symbol_provider: Some(lsp_types::OneOf::Left(true)),
		code_action_provider: Some(lsp_types::CodeActionProviderCapability::Simple(true)),
		document_formatting_provider: Some(lsp_types::OneOf::Left(true)),
		..Default::default()
	}
}

/// Copies the editor's capabilities, forcing on the bits the proxy relies
/// on: configuration queries and dynamic range-formatting registration.
fn augment_client_capabilities(mut caps: JsonValue) -> JsonValue {
	if !caps.is_object() {
		caps = json!({});
	}
	if !caps["workspace"].is_object() {
		caps["workspace"] = json!({});
	}
	caps["workspace"]["configuration"] = json!(true);
	if !caps["textDocument"].is_object() {
		caps["textDocument"] = json!({});
	}
	if !caps["textDocument"]["rangeFormatting"].is_object() {
		caps["textDocument"]["rangeFormatting"] = json!({});
	}
	caps["textDocument"]["rangeFormatting"]["dynamicRegistration"] = json!(true);
	caps
}

/// Bootstrap settings handed to every child at initialize time.
fn initialization_options() -> JsonValue {
	json!({
		"handledSchemaProtocols": ["file", "http", "https"],
		"provideFormatter": true,
		"settings": {
			"xml": config::xml_config(json!([])),
			"yaml": config::yaml_config(json!({})),
			"pyright": {
				// ruff-lsp organizes imports itself.
				"disableOrganizeImports": true,
			},
			"python": {
				"analysis": {
					"autoImportCompletions": true,
					"logLevel": "Trace",
					"typeCheckingMode": "strict",
				},
			},
		},
		"globalSettings": {
			"logLevel": "debug",
			"run": "onType",
			"organizeImports": true,
			"fixAll": true,
			"codeAction": {
				"fixViolation": {
					"enable": true,
				},
				"disableRuleComment": {
					"enable": true,
				},
			},
		},
	})
}
