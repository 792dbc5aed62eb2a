//! Scripted scenes standing in for the camera and the face models.

use std::path::Path;

use anyhow::{Context, Result, bail};
use facegate_hardware::mock::{SceneScript, ScriptedScene};

/// Load a scene script from a JSON file.
pub fn load_scene(path: &Path) -> Result<ScriptedScene> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scene {}", path.display()))?;
    let script: SceneScript = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse scene {}", path.display()))?;
    if script.frames.is_empty() {
        bail!("Scene {} has no frames", path.display());
    }
    Ok(ScriptedScene::from_script(script))
}
