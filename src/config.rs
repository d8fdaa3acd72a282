//! Settings payload builders for the xml and yaml children.

use serde_json::{Value as JsonValue, json};

/// JSON Schema describing Flatpak build manifests.
pub const FLATPAK_MANIFEST_SCHEMA: &str =
	"https://raw.githubusercontent.com/flatpak/flatpak-builder/main/data/flatpak-manifest.schema.json";

/// DTD for GSettings schema files, served from the GLib repository.
pub const GSCHEMA_DTD: &str =
	"https://gitlab.gnome.org/GNOME/glib/-/raw/HEAD/gio/gschema.dtd";

/// DTD for GResource files, served from the GLib repository.
pub const GRESOURCE_DTD: &str =
	"https://gitlab.gnome.org/GNOME/glib/-/raw/HEAD/gio/gresource.dtd";

/// The SchemaStore catalog the yaml child is pointed at.
pub const SCHEMA_STORE_CATALOG: &str = "https://www.schemastore.org/api/json/catalog.json";

/// Indentation width pushed to children that ask.
pub const DEFAULT_TAB_SIZE: u32 = 2;

const LEMMINX_LOG_FILE: &str = "/tmp/lemminx.log";

/// Builds the settings block for the xml child (lemminx).
///
/// `file_associations` is a list of `{pattern, systemId}` objects mapping
/// opened files to their DTDs.
pub fn xml_config(file_associations: JsonValue) -> JsonValue {
	json!({
		"fileAssociations": file_associations,
		"logs": {
			"client": true,
			"file": LEMMINX_LOG_FILE,
		},
		"trace": {
			"server": "verbose",
		},
		"validation": {
			"enabled": true,
			"resolveExternalEntities": true,
			"schema": {
				"enabled": "always",
			},
		},
		"downloadExternalResources": {
			"enabled": true,
		},
	})
}

/// Builds the settings block for the yaml child.
///
/// `schemas` maps schema URLs to lists of file matches.
pub fn yaml_config(schemas: JsonValue) -> JsonValue {
	json!({
		"trace": {
			"server": "verbose",
		},
		"schemaStore": {
			"enable": true,
			"url": SCHEMA_STORE_CATALOG,
		},
		"validate": true,
		"schemas": schemas,
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn xml_config_carries_associations_and_validation() {
		let cfg = xml_config(json!([{"pattern": "/a.gschema.xml", "systemId": GSCHEMA_DTD}]));
		assert_eq!(cfg["fileAssociations"][0]["systemId"], GSCHEMA_DTD);
		assert_eq!(cfg["validation"]["enabled"], true);
		assert_eq!(cfg["validation"]["schema"]["enabled"], "always");
		assert_eq!(cfg["logs"]["file"], "/tmp/lemminx.log");
		assert_eq!(cfg["downloadExternalResources"]["enabled"], true);
	}

	#[test]
	fn yaml_config_points_at_schema_store() {
		let cfg = yaml_config(json!({(FLATPAK_MANIFEST_SCHEMA): ["a.yaml"]}));
		assert_eq!(cfg["schemaStore"]["url"], SCHEMA_STORE_CATALOG);
		assert_eq!(cfg["validate"], true);
		assert_eq!(cfg["schemas"][FLATPAK_MANIFEST_SCHEMA][0], "a.yaml");
		assert_eq!(cfg["trace"]["server"], "verbose");
	}
}
