//! YAML parsing utilities
//!
//! Parses YAML documents into `serde_json::Value` trees so the rest of the
//! codebase manipulates one untyped representation regardless of whether a
//! document arrived as YAML or JSON.

use serde_json::Value;

use crate::error::Error;

/// Parse a YAML string into a `serde_json::Value`.
///
/// For multi-document YAML, returns only the first document.
/// Returns `Value::Null` for empty input.
pub fn parse_yaml(input: &str) -> Result<Value, Error> {
    if input.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(input).map_err(|e| Error::serialization(e.to_string()))
}

/// Parse a multi-document YAML string into a Vec of `serde_json::Value`s.
///
/// Each document separated by `---` becomes a separate value; empty
/// documents are skipped.
pub fn parse_yaml_multi(input: &str) -> Result<Vec<Value>, Error> {
    use serde::Deserialize;

    let mut documents = Vec::new();
    for deserializer in serde_yaml::Deserializer::from_str(input) {
        let value = Value::deserialize(deserializer)
            .map_err(|e| Error::serialization(e.to_string()))?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_mapping() {
        let result = parse_yaml("name: test\nvalue: 42").unwrap();
        assert_eq!(result["name"], "test");
        assert_eq!(result["value"], 42);
    }

    #[test]
    fn parse_kubernetes_manifest() {
        let yaml = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: my-app
  namespace: default
spec:
  replicas: 3
"#;
        let result = parse_yaml(yaml).unwrap();
        assert_eq!(result["apiVersion"], "apps/v1");
        assert_eq!(result["kind"], "Deployment");
        assert_eq!(result["metadata"]["name"], "my-app");
        assert_eq!(result["spec"]["replicas"], 3);
    }

    #[test]
    fn parse_multi_doc() {
        let yaml = "name: first\n---\nname: second\n---\nname: third\n";
        let results = parse_yaml_multi(yaml).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["name"], "first");
        assert_eq!(results[2]["name"], "third");
    }

    #[test]
    fn multi_doc_skips_empty_documents() {
        let yaml = "name: only\n---\n";
        let results = parse_yaml_multi(yaml).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn empty_input_is_null() {
        assert_eq!(parse_yaml("").unwrap(), Value::Null);
        assert!(parse_yaml_multi("").unwrap().is_empty());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(parse_yaml("not: valid: yaml: {{").is_err());
    }
}
