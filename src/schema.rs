use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parley_plugin::message::{
    DocumentHandle, PanelEvent, PanelPreferences, RegisterPanelParams, SelectedNode, SpeakerColors,
    StructureSnapshot, ThemeInfo,
};
use schemars::schema_for;

/// Write one JSON-Schema per host-facing type into `out_dir`.
pub fn write_schema(out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir).with_context(|| format!("could not create {}", out_dir.display()))?;

    let schemas = [
        ("dialog-structure", schema_for!(StructureSnapshot)),
        ("document-handle", schema_for!(DocumentHandle)),
        ("selected-node", schema_for!(SelectedNode)),
        ("panel-event", schema_for!(PanelEvent)),
        ("panel-preferences", schema_for!(PanelPreferences)),
        ("register-panel", schema_for!(RegisterPanelParams)),
        ("theme", schema_for!(ThemeInfo)),
        ("speaker-colors", schema_for!(SpeakerColors)),
    ];

    let mut written = Vec::with_capacity(schemas.len());
    for (name, schema) in schemas {
        let path = out_dir.join(format!("{name}.schema.json"));
        fs::write(&path, serde_json::to_string_pretty(&schema)?)
            .with_context(|| format!("could not write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn writes_a_schema_per_type() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_schema(&dir.path().join("schemas")).unwrap();
        assert_eq!(written.len(), 8);

        let raw = fs::read_to_string(dir.path().join("schemas/dialog-structure.schema.json")).unwrap();
        let schema: Value = serde_json::from_str(&raw).unwrap();
        assert!(schema["properties"]["nodes"].is_object());
    }
}
