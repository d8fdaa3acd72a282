//! URI classification and tracked document-shape detection.

use std::collections::BTreeSet;
use std::fmt;

use tracing::info;

use crate::{Error, Result};

/// Multiplier separating the per-child id namespaces.
///
/// Editor-issued ids are assumed to stay below this, so a tagged id
/// uniquely encodes both the child and the original id.
pub const FACTOR: i64 = 1_000_000;

/// One of the managed language servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildId {
	/// `yaml-language-server`.
	Yaml,
	/// `vscode-json-languageserver`.
	Json,
	/// `lemminx`.
	Xml,
	/// `ruff-lsp`.
	Ruff,
	/// `rome lsp-proxy`.
	Rome,
}

impl ChildId {
	/// Every managed server, in tag order.
	pub const ALL: [Self; 5] = [Self::Yaml, Self::Json, Self::Xml, Self::Ruff, Self::Rome];

	/// The integer tag used for id namespacing, `1 ≤ tag < FACTOR`.
	pub fn tag(self) -> i64 {
		match self {
			Self::Yaml => 1,
			Self::Json => 2,
			Self::Xml => 3,
			Self::Ruff => 4,
			Self::Rome => 5,
		}
	}

	/// The shell command that starts this server.
	pub fn command(self) -> &'static str {
		match self {
			Self::Yaml => "yaml-language-server --stdio",
			Self::Json => "vscode-json-languageserver --stdio",
			Self::Xml => "lemminx",
			Self::Ruff => "ruff-lsp",
			Self::Rome => "rome lsp-proxy",
		}
	}

	/// Short name used in logs.
	pub fn name(self) -> &'static str {
		match self {
			Self::Yaml => "yaml",
			Self::Json => "json",
			Self::Xml => "xml",
			Self::Ruff => "ruff",
			Self::Rome => "rome",
		}
	}

	/// Tags an editor-issued id into this child's namespace.
	pub fn namespace(self, editor_id: i64) -> i64 {
		editor_id + self.tag() * FACTOR
	}

	/// Recovers the editor-issued id from a tagged id.
	pub fn restore(self, tagged: i64) -> i64 {
		tagged - self.tag() * FACTOR
	}
}

impl fmt::Display for ChildId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Classifies a document URI by suffix.
///
/// # Errors
///
/// Returns [`Error::UnknownFileType`] for suffixes no child handles.
pub fn classify(uri: &str) -> Result<ChildId> {
	if uri.ends_with(".yaml") || uri.ends_with(".yml") {
		Ok(ChildId::Yaml)
	} else if uri.ends_with(".json") {
		Ok(ChildId::Json)
	} else if uri.ends_with(".xml") || uri.ends_with(".doap") {
		Ok(ChildId::Xml)
	} else if uri.ends_with(".py") {
		Ok(ChildId::Ruff)
	} else if uri.ends_with(".js") {
		Ok(ChildId::Rome)
	} else {
		Err(Error::UnknownFileType(uri.to_owned()))
	}
}

/// Opened documents of the shapes that drive schema/DTD associations.
///
/// Grows monotonically for the process lifetime; ordered sets keep the
/// rebuilt configuration payloads deterministic.
#[derive(Debug, Default)]
pub struct FileClassSets {
	/// Basenames of opened JSON Flatpak manifests.
	pub flatpak_manifests_json: BTreeSet<String>,
	/// Basenames of opened YAML Flatpak manifests.
	pub flatpak_manifests_yaml: BTreeSet<String>,
	/// Paths of opened GSettings schema files.
	pub gschema_files: BTreeSet<String>,
	/// Paths of opened GResource files.
	pub gresource_files: BTreeSet<String>,
}

impl FileClassSets {
	/// Records any tracked shape for a freshly opened document.
	///
	/// Returns whether the open should trigger a re-push of schema/DTD
	/// associations: every yaml document does, json and xml only when the
	/// document matches a tracked shape, python and javascript never.
	pub fn record_open(&mut self, uri: &str, text: &str, child: ChildId) -> bool {
		match child {
			ChildId::Yaml => {
				if is_flatpak_yaml(text) {
					let name = basename(uri);
					info!(file = name, "found YAML flatpak manifest");
					self.flatpak_manifests_yaml.insert(name.to_owned());
				}
				true
			}
			ChildId::Json => {
				if is_flatpak_json(text) {
					let name = basename(uri);
					info!(file = name, "found flatpak manifest");
					self.flatpak_manifests_json.insert(name.to_owned());
					return true;
				}
				false
			}
			ChildId::Xml => {
				let path = uri.strip_prefix("file://").unwrap_or(uri);
				if uri.ends_with(".gschema.xml") {
					info!(file = basename(uri), "found GSettings schema file");
					self.gschema_files.insert(path.to_owned());
					true
				} else if uri.ends_with(".gresource.xml") {
					info!(file = basename(uri), "found GResource file");
					self.gresource_files.insert(path.to_owned());
					true
				} else {
					false
				}
			}
			ChildId::Ruff | ChildId::Rome => false,
		}
	}
}

fn basename(uri: &str) -> &str {
	uri.rsplit('/').next().unwrap_or(uri)
}

// The bare `id` fallbacks are deliberately loose; they match what editors
// in the wild send for manifests using the legacy key.
fn is_flatpak_yaml(text: &str) -> bool {
	text.contains("finish-args:")
		&& text.contains("modules:")
		&& (text.contains("app-id:") || text.contains("id"))
}

fn is_flatpak_json(text: &str) -> bool {
	text.contains("\"build-options\"")
		&& text.contains("\"modules\"")
		&& text.contains("\"finish-args\"")
		&& (text.contains("\"app-id\"") || text.contains("\"id\""))
}

#[cfg(test)]
mod tests;
