//! proxy-ls: an LSP multiplexing proxy.
//!
//! Speaks the LSP base protocol on stdio toward the editor and fans every
//! text-document request out to per-filetype language server children.

use std::sync::Arc;

use proxy_ls::endpoint::Endpoint;
use proxy_ls::server::Proxy;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	// All logging goes to stderr; stdout belongs to the LSP wire.
	let subscriber = tracing_subscriber::fmt()
		.with_max_level(tracing::Level::INFO)
		.with_writer(std::io::stderr)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;

	let (input, output) = proxy_ls::stdio::capture_lsp_output()?;
	let editor = Endpoint::new("editor", input, output);

	info!("starting proxy-ls");
	let proxy = Arc::new(Proxy::spawn(editor));
	proxy.run().await?;
	Ok(())
}
