//! Parser for the extension manifest text format (§6 of the external
//! interfaces contract).
//!
//! A manifest is UTF-8 text, one entry per line: `#` starts a comment, blank
//! lines are ignored, and each remaining line is either `name = path` or a
//! bare `path` (the name is then derived from the path). Rust has no
//! classloader to turn a `path` string into a constructor at runtime, so
//! [`register_from_manifest`] takes the parsed entries plus a `name ->
//! factory` map the embedding binary built at compile time — the manifest
//! format itself is still a real, testable grammar because it is part of
//! this core's declared external contract.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::extension::{ExtensionFactory, ExtensionLoader, ExtensionPoint};

/// One parsed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub path: String,
}

/// Suffixes stripped from a bare path's last segment when deriving its name,
/// checked longest-first.
const CAPABILITY_SUFFIXES: [&str; 6] = ["LoadBalance", "Configurator", "Protocol", "Cluster", "Router", "Filter"];

fn derive_name(path: &str) -> String {
    let last_segment = path.rsplit("::").next().unwrap_or(path);
    for suffix in CAPABILITY_SUFFIXES {
        if let Some(stripped) = last_segment.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped.to_lowercase();
            }
        }
    }
    last_segment.to_lowercase()
}

/// Parse manifest text into entries, in file order. Does not reject
/// duplicate names — see [`register_from_manifest`] for that check, which
/// additionally needs to know whether the duplicate names agree on target.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>, CoreError> {
    let mut entries = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = match line.split_once('=') {
            Some((name, path)) => {
                let name = name.trim();
                let path = path.trim();
                if name.is_empty() || path.is_empty() {
                    return Err(CoreError::Manifest(format!("line {}: empty name or path", line_no + 1)));
                }
                ManifestEntry { name: name.to_string(), path: path.to_string() }
            }
            None => ManifestEntry { name: derive_name(line), path: line.to_string() },
        };
        entries.push(entry);
    }
    Ok(entries)
}

/// Validate parsed entries against a `name -> factory` map and register each
/// into `loader`. Fails with [`CoreError::DuplicateExtension`] if the same
/// name appears twice with different paths, and with
/// [`CoreError::NoSuchExtension`] if an entry's name has no matching factory.
pub fn register_from_manifest<T: ?Sized + ExtensionPoint>(
    loader: &ExtensionLoader<T>,
    entries: &[ManifestEntry],
    factories: &HashMap<String, ExtensionFactory<T>>,
) -> Result<(), CoreError> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for entry in entries {
        if let Some(&prev_path) = seen.get(entry.name.as_str()) {
            if prev_path != entry.path {
                return Err(CoreError::DuplicateExtension { name: entry.name.clone() });
            }
            continue;
        }
        seen.insert(&entry.name, &entry.path);

        let factory = factories.get(&entry.name).cloned().ok_or_else(|| CoreError::NoSuchExtension {
            extension_point: std::any::type_name::<T>().to_string(),
            name: entry.name.clone(),
        })?;
        loader.register(entry.name.clone(), factory);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionContext;
    use std::sync::Arc;

    trait Stub: Send + Sync + 'static {}
    impl ExtensionPoint for dyn Stub {}
    struct StubImpl;
    impl Stub for StubImpl {}

    #[test]
    fn ignores_comments_and_blank_lines() {
        let text = "# a comment\n\nname = some::path::Thing\n";
        let entries = parse_manifest(text).unwrap();
        assert_eq!(entries, vec![ManifestEntry { name: "name".into(), path: "some::path::Thing".into() }]);
    }

    #[test]
    fn derives_name_from_bare_path_suffix() {
        let entries = parse_manifest("dubbo::FailoverCluster\n").unwrap();
        assert_eq!(entries[0].name, "failover");
    }

    #[test]
    fn derives_name_without_known_suffix_lowercases_segment() {
        let entries = parse_manifest("dubbo::Zookeeper\n").unwrap();
        assert_eq!(entries[0].name, "zookeeper");
    }

    #[test]
    fn rejects_empty_name_or_path() {
        assert!(parse_manifest(" = path\n").is_err());
        assert!(parse_manifest("name = \n").is_err());
    }

    #[test]
    fn registration_detects_conflicting_duplicate_names() {
        let entries = vec![
            ManifestEntry { name: "x".into(), path: "a::X".into() },
            ManifestEntry { name: "x".into(), path: "b::X".into() },
        ];
        let loader: ExtensionLoader<dyn Stub> = ExtensionLoader::new();
        let factories: HashMap<String, ExtensionFactory<dyn Stub>> = HashMap::new();
        let err = register_from_manifest(&loader, &entries, &factories).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateExtension { .. }));
    }

    #[test]
    fn registration_allows_same_name_same_path_twice() {
        let entries = vec![
            ManifestEntry { name: "x".into(), path: "a::X".into() },
            ManifestEntry { name: "x".into(), path: "a::X".into() },
        ];
        let mut factories: HashMap<String, ExtensionFactory<dyn Stub>> = HashMap::new();
        factories.insert("x".into(), Arc::new(|_ctx: &ExtensionContext| Ok(Arc::new(StubImpl) as Arc<dyn Stub>)));
        let loader: ExtensionLoader<dyn Stub> = ExtensionLoader::new();
        register_from_manifest(&loader, &entries, &factories).unwrap();
        assert!(loader.get("x").is_ok());
    }

    #[test]
    fn registration_fails_for_unmapped_name() {
        let entries = vec![ManifestEntry { name: "missing".into(), path: "a::Missing".into() }];
        let factories: HashMap<String, ExtensionFactory<dyn Stub>> = HashMap::new();
        let loader: ExtensionLoader<dyn Stub> = ExtensionLoader::new();
        let err = register_from_manifest(&loader, &entries, &factories).unwrap_err();
        assert!(matches!(err, CoreError::NoSuchExtension { .. }));
    }
}
