use super::*;

#[test]
fn classifies_by_suffix() {
	assert_eq!(classify("file:///a.yaml").unwrap(), ChildId::Yaml);
	assert_eq!(classify("file:///a.yml").unwrap(), ChildId::Yaml);
	assert_eq!(classify("file:///a.json").unwrap(), ChildId::Json);
	assert_eq!(classify("file:///a.xml").unwrap(), ChildId::Xml);
	assert_eq!(classify("file:///a.doap").unwrap(), ChildId::Xml);
	assert_eq!(classify("file:///a.py").unwrap(), ChildId::Ruff);
	assert_eq!(classify("file:///a.js").unwrap(), ChildId::Rome);
}

#[test]
fn unknown_suffix_fails() {
	assert!(matches!(
		classify("file:///a.rs"),
		Err(Error::UnknownFileType(uri)) if uri == "file:///a.rs"
	));
}

#[test]
fn tags_are_unique_and_below_factor() {
	for child in ChildId::ALL {
		assert!(child.tag() >= 1 && child.tag() < FACTOR);
	}
	let mut tags: Vec<i64> = ChildId::ALL.iter().map(|c| c.tag()).collect();
	tags.dedup();
	assert_eq!(tags.len(), ChildId::ALL.len());
}

#[test]
fn namespace_roundtrip() {
	assert_eq!(ChildId::Yaml.namespace(42), 1_000_042);
	assert_eq!(ChildId::Yaml.restore(1_000_042), 42);
	assert_eq!(ChildId::Rome.namespace(7), 5_000_007);
	assert_eq!(ChildId::Rome.restore(5_000_007), 7);
}

#[test]
fn detects_yaml_flatpak_manifest() {
	let mut sets = FileClassSets::default();
	let manifest = "app-id: org.example.App\nmodules:\n  - name: app\nfinish-args:\n  - --share=network\n";
	assert!(sets.record_open("file:///proj/org.example.App.yaml", manifest, ChildId::Yaml));
	assert!(sets.flatpak_manifests_yaml.contains("org.example.App.yaml"));

	// Every yaml open triggers a push, tracked shape or not.
	assert!(sets.record_open("file:///proj/other.yaml", "key: value\n", ChildId::Yaml));
	assert!(!sets.flatpak_manifests_yaml.contains("other.yaml"));
}

#[test]
fn detects_json_flatpak_manifest() {
	let mut sets = FileClassSets::default();
	let manifest = r#"{"app-id": "org.example.App", "build-options": {}, "modules": [], "finish-args": []}"#;
	assert!(sets.record_open("file:///proj/org.example.App.json", manifest, ChildId::Json));
	assert!(sets.flatpak_manifests_json.contains("org.example.App.json"));

	assert!(!sets.record_open("file:///proj/package.json", r#"{"name": "pkg"}"#, ChildId::Json));
	assert!(!sets.flatpak_manifests_json.contains("package.json"));
}

#[test]
fn records_gschema_and_gresource_paths_without_scheme() {
	let mut sets = FileClassSets::default();
	assert!(sets.record_open("file:///proj/data/app.gschema.xml", "", ChildId::Xml));
	assert!(sets.record_open("file:///proj/data/app.gresource.xml", "", ChildId::Xml));
	assert!(sets.gschema_files.contains("/proj/data/app.gschema.xml"));
	assert!(sets.gresource_files.contains("/proj/data/app.gresource.xml"));

	assert!(!sets.record_open("file:///proj/data/plain.xml", "", ChildId::Xml));
	assert!(sets.gschema_files.len() == 1 && sets.gresource_files.len() == 1);
}

#[test]
fn python_and_javascript_opens_never_trigger_a_push() {
	let mut sets = FileClassSets::default();
	assert!(!sets.record_open("file:///pkg/mod.py", "print()", ChildId::Ruff));
	assert!(!sets.record_open("file:///pkg/mod.js", "export {}", ChildId::Rome));
}

#[test]
fn repeated_opens_are_idempotent() {
	let mut sets = FileClassSets::default();
	for _ in 0..2 {
		sets.record_open("file:///proj/data/app.gschema.xml", "", ChildId::Xml);
	}
	assert_eq!(sets.gschema_files.len(), 1);
}
