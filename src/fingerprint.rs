use std::fmt;

use parley_plugin::message::StructureSnapshot;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 over the canonical JSON form of a [`StructureSnapshot`].
///
/// Object keys are sorted; node and link order is kept, so reordering the
/// graph on the host side counts as a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    pub fn of(snapshot: &StructureSnapshot) -> serde_json::Result<Self> {
        let value = canonical(serde_json::to_value(snapshot)?);
        let bytes = serde_json::to_vec(&value)?;
        Ok(Self(hex::encode(Sha256::digest(&bytes))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is plenty for logs
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

fn canonical(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, canonical(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_plugin::message::{Link, Node, NodeKind};
    use serde_json::json;

    fn graph() -> StructureSnapshot {
        StructureSnapshot {
            nodes: vec![
                Node::new("root", NodeKind::Root, "Start"),
                Node::new("npc_1", NodeKind::Npc, "Hello").with_speaker("Guard"),
            ],
            links: vec![Link::new("root", "npc_1")],
        }
    }

    #[test]
    fn same_graph_same_fingerprint() {
        let a = ContentFingerprint::of(&graph()).unwrap();
        let b = ContentFingerprint::of(&graph()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn text_edit_changes_fingerprint() {
        let before = ContentFingerprint::of(&graph()).unwrap();
        let mut edited = graph();
        edited.nodes[1].text = "Hello there".into();
        assert_ne!(before, ContentFingerprint::of(&edited).unwrap());
    }

    #[test]
    fn node_order_is_significant() {
        let before = ContentFingerprint::of(&graph()).unwrap();
        let mut swapped = graph();
        swapped.nodes.reverse();
        assert_ne!(before, ContentFingerprint::of(&swapped).unwrap());
    }

    #[test]
    fn canonical_sorts_nested_keys() {
        let v = canonical(json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 0, "x": 1} ]}));
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            r#"{"a":[{"x":1,"y":0}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn display_is_abbreviated() {
        let fp = ContentFingerprint::of(&graph()).unwrap();
        assert_eq!(fp.to_string().len(), 12);
        assert!(fp.as_str().starts_with(&fp.to_string()));
    }
}
