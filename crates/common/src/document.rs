//! Cloud-config document assembly
//!
//! Serializes a `CloudConfig` to the wire format the boot-time agent
//! consumes: the `#cloud-config` marker line, block-style YAML, mapping keys
//! sorted for reproducible diffs, and no keys for absent sections.

use crate::schema::CloudConfig;
use crate::Result;
use serde_yaml::Value;

/// Marker line identifying the document format to its consumer
pub const MARKER: &str = "#cloud-config";

/// Serialize the document. Pure: no filesystem or process side effects.
pub fn assemble(config: &CloudConfig) -> Result<String> {
    let value = sort_value(serde_yaml::to_value(config)?);
    let body = serde_yaml::to_string(&value)?;
    Ok(format!("{MARKER}\n{body}"))
}

/// Recursively sort mapping keys. serde_yaml preserves struct field order,
/// which is declaration order, not sorted order.
fn sort_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut entries: Vec<(Value, Value)> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            entries.sort_by(|(a, _), (b, _)| {
                a.as_str().unwrap_or_default().cmp(b.as_str().unwrap_or_default())
            });
            Value::Mapping(entries.into_iter().collect())
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(sort_value).collect()),
        Value::Tagged(tagged) => Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
            tag: tagged.tag,
            value: sort_value(tagged.value),
        })),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CloudConfig, Datasource, DatasourceParams, SudoSpec, User};

    fn config() -> CloudConfig {
        let manifest = r#"
[[users]]
name = "admin"
sudo = ["ALL=(ALL) NOPASSWD:ALL"]

[datasource.Vultr]
"#;
        toml::from_str(manifest).unwrap()
    }

    #[test]
    fn starts_with_marker() {
        let doc = assemble(&config()).unwrap();
        assert!(doc.starts_with("#cloud-config\n"));
    }

    #[test]
    fn absent_sections_are_omitted() {
        let doc = assemble(&config()).unwrap();
        assert!(!doc.contains("apt:"));
        assert!(!doc.contains("runcmd:"));
        assert!(!doc.contains("packages:"));
        assert!(!doc.contains("final_message:"));
        assert!(!doc.contains("null"));
    }

    #[test]
    fn top_level_keys_are_sorted() {
        let doc = assemble(&config()).unwrap();
        let keys: Vec<&str> = doc
            .lines()
            .skip(1)
            .filter(|l| !l.starts_with([' ', '-']))
            .map(|l| l.split(':').next().unwrap_or(""))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(keys.contains(&"datasource"));
        assert!(keys.contains(&"users"));
    }

    #[test]
    fn assembly_is_deterministic() {
        assert_eq!(assemble(&config()).unwrap(), assemble(&config()).unwrap());
    }

    #[test]
    fn datasource_provider_tag_is_nested() {
        let mut c = config();
        c.datasource = Datasource::DigitalOcean(DatasourceParams::default());
        let doc = assemble(&c).unwrap();
        assert!(doc.contains("datasource:\n  DigitalOcean:\n"));
        assert!(doc.contains("url: http://169.254.169.254"));
        // No YAML local tag; the consumer only takes plain mappings
        assert!(!doc.contains('!'));
    }

    #[test]
    fn flat_sudo_bool_serializes_flat() {
        let mut c = config();
        c.users.push(User {
            name: "guest".to_string(),
            shell: "/bin/bash".to_string(),
            groups: None,
            sudo: SudoSpec::Enabled(false),
            ssh_import_id: None,
            ssh_authorized_keys: None,
        });
        let doc = assemble(&c).unwrap();
        assert!(doc.contains("sudo: false"));
    }
}
