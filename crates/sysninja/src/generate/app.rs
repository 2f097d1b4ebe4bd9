use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::model::{App, Model};
use crate::script::{BuildStatement, ScriptEmitter};

use super::{BuildParams, ComponentGenerator};

// Emits one app: component statements (through the shared component
// generator, so a component used by several apps compiles once), the
// manifest statement, staging statements for component artifacts and
// bundled files, and the packaging statement that ties them together.
pub struct AppGenerator {
    components: ComponentGenerator,
    emitted: BTreeMap<String, String>,
}

impl AppGenerator {
    pub fn new() -> Self {
        Self {
            components: ComponentGenerator::new(),
            emitted: BTreeMap::new(),
        }
    }

    pub fn generate(
        &mut self,
        script: &mut ScriptEmitter,
        params: &BuildParams,
        model: &Model,
        app: &App,
    ) -> Result<String> {
        if let Some(package) = self.emitted.get(&app.name) {
            return Ok(package.clone());
        }

        tracing::debug!(app = %app.name, "emitting app statements");

        let mut artifacts = Vec::new();
        for comp_name in &app.components {
            let component = model.components.get(comp_name).ok_or_else(|| {
                Error::model(format!(
                    "app '{}' references unknown component '{}'",
                    app.name, comp_name
                ))
            })?;
            artifacts.push(self.components.generate(script, params, component)?);
        }

        script.blank();
        script.comment(&format!("app: {}", app.name));

        let app_dir = format!("$builddir/app/{}", app.name);
        let staging = format!("{app_dir}/staging");

        // Manifest depends on the component artifacts so it is rewritten
        // whenever any of them changes.
        let manifest = format!("{staging}/manifest.json");
        let mut inputs = vec![app.def_file.display().to_string()];
        inputs.extend(artifacts.iter().cloned());
        let mut vars = BTreeMap::new();
        vars.insert("app".to_string(), app.name.clone());
        script.build(&BuildStatement {
            outputs: vec![manifest.clone()],
            rule: "app-manifest".into(),
            inputs,
            vars,
            ..Default::default()
        })?;

        // Component artifacts stage into the app's tree so the pack command
        // archives one directory.
        let mut staged = Vec::new();
        for (comp_name, artifact) in app.components.iter().zip(&artifacts) {
            let dst = format!("{staging}/lib/lib{}.so", comp_name);
            script.build(&BuildStatement {
                outputs: vec![dst.clone()],
                rule: "bundle".into(),
                inputs: vec![artifact.clone()],
                ..Default::default()
            })?;
            staged.push(dst);
        }

        for (src, dst) in expand_bundles(app)? {
            let out = format!("{staging}/{dst}");
            script.build(&BuildStatement {
                outputs: vec![out.clone()],
                rule: "bundle".into(),
                inputs: vec![src.display().to_string()],
                ..Default::default()
            })?;
            staged.push(out);
        }

        let package = format!("{app_dir}/{}.app", app.name);
        let mut inputs = vec![manifest];
        inputs.extend(artifacts);
        inputs.extend(staged);
        let mut vars = BTreeMap::new();
        vars.insert("staging".to_string(), staging);
        script.build(&BuildStatement {
            outputs: vec![package.clone()],
            rule: "pack-app".into(),
            inputs,
            vars,
            ..Default::default()
        })?;

        self.emitted.insert(app.name.clone(), package.clone());
        Ok(package)
    }
}

impl Default for AppGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// A bundled directory expands to its contained files here, at generation
// time; the emitted script only ever copies single files. Walk order is
// sorted so the script is deterministic.
fn expand_bundles(app: &App) -> Result<Vec<(PathBuf, String)>> {
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    for bundle in &app.bundles {
        if bundle.src.is_dir() {
            for entry in walkdir::WalkDir::new(&bundle.src).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    Error::model(format!(
                        "app '{}' failed to walk bundled directory {}: {e}",
                        app.name,
                        bundle.src.display()
                    ))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&bundle.src)
                    .expect("walkdir stays under its root");
                let dst = format!("{}/{}", bundle.dst.trim_end_matches('/'), rel.display());
                out.push((entry.path().to_path_buf(), dst));
            }
        } else {
            out.push((bundle.src.clone(), bundle.dst.clone()));
        }
    }
    for (_, dst) in &out {
        if !seen.insert(dst.clone()) {
            return Err(Error::model(format!(
                "app '{}' bundles two files to the same destination '{}'",
                app.name, dst
            )));
        }
    }
    Ok(out)
}
