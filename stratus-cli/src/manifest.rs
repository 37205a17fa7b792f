//! Reading instance declarations
//!
//! A manifest is a JSON document keyed by resource type, then by name:
//!
//! ```json
//! { "instance": { "web": { "group": "prod", "cloud": "vmware-east", ... } } }
//! ```

use std::fs;
use std::path::Path;

use stratus_core::resource::Resource;

pub fn load(path: &Path) -> Result<Vec<Resource>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Parse a manifest. Resources come back sorted by type, then name.
pub fn parse(content: &str) -> Result<Vec<Resource>, String> {
    let document: serde_json::Value =
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;
    let types = document
        .as_object()
        .ok_or("top level must be an object keyed by resource type")?;

    let mut resources = Vec::new();
    for (resource_type, declared) in types {
        let declared = declared
            .as_object()
            .ok_or_else(|| format!("`{}` must be an object keyed by resource name", resource_type))?;
        for (name, attributes) in declared {
            let attributes = attributes
                .as_object()
                .ok_or_else(|| format!("{}.{} must be an object", resource_type, name))?;
            resources.push(Resource::from_json_object(
                resource_type.as_str(),
                name.as_str(),
                attributes,
            ));
        }
    }
    resources.sort_by(|a, b| {
        (&a.id.resource_type, &a.id.name).cmp(&(&b.id.resource_type, &b.id.name))
    });
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::resource::Value;

    #[test]
    fn test_parse_manifest() {
        let resources = parse(
            r#"{
                "instance": {
                    "web": {"group": "prod", "cloud": 2, "labels": ["a"]},
                    "db": {"group": "prod"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].id.to_string(), "instance.db");
        assert_eq!(resources[1].attributes.get("cloud"), Some(&Value::Int(2)));
        assert_eq!(
            resources[1].attributes.get("labels"),
            Some(&Value::List(vec![Value::String("a".into())]))
        );
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(parse("[]").unwrap_err().contains("top level"));
        assert_eq!(
            parse(r#"{"instance": {"web": 3}}"#).unwrap_err(),
            "instance.web must be an object"
        );
        assert!(parse("{").unwrap_err().starts_with("Parse error"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(load(&path).unwrap_err().contains("missing.json"));

        let path = dir.path().join("stratus.json");
        fs::write(&path, r#"{"instance": {"web": {}}}"#).unwrap();
        assert_eq!(load(&path).unwrap().len(), 1);
    }
}
