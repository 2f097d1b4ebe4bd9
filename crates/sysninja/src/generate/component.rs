use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::Component;
use crate::script::{BuildStatement, ScriptEmitter};

use super::BuildParams;

// Emits the build statements for one component: interface binding
// generation first (its outputs are compiled like declared sources), then
// the compile statement producing the component's intermediate artifact.
//
// Idempotent per pass: a component referenced by several apps is emitted
// once; repeat calls return the cached artifact path.
pub struct ComponentGenerator {
    emitted: BTreeMap<String, String>,
}

impl ComponentGenerator {
    pub fn new() -> Self {
        Self {
            emitted: BTreeMap::new(),
        }
    }

    pub fn generate(
        &mut self,
        script: &mut ScriptEmitter,
        _params: &BuildParams,
        component: &Component,
    ) -> Result<String> {
        if let Some(artifact) = self.emitted.get(&component.name) {
            return Ok(artifact.clone());
        }
        if component.name.trim().is_empty() {
            return Err(Error::model(format!(
                "component definition {} has an empty name",
                component.def_file.display()
            )));
        }
        if component.sources.is_empty() {
            return Err(Error::model(format!(
                "component '{}' has no source files",
                component.name
            )));
        }

        tracing::debug!(component = %component.name, "emitting component statements");
        script.blank();
        script.comment(&format!("component: {}", component.name));

        let comp_dir = format!("$builddir/component/{}", component.name);
        let mut inputs: Vec<String> = component
            .sources
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        // Binding sources are generated build inputs: their statements come
        // first so the compile statement below never references an artifact
        // with no producer.
        let sides = component
            .provides
            .iter()
            .map(|i| (i, "server"))
            .chain(component.requires.iter().map(|i| (i, "client")));
        for (interface, side) in sides {
            let generated = format!("{comp_dir}/ipc/{}_{}.c", interface.name, side);
            let mut vars = BTreeMap::new();
            vars.insert("side".to_string(), side.to_string());
            script.build(&BuildStatement {
                outputs: vec![generated.clone()],
                rule: "ipcgen".into(),
                inputs: vec![interface.api_file.display().to_string()],
                vars,
                ..Default::default()
            })?;
            inputs.push(generated);
        }

        let artifact = format!("{comp_dir}/lib{}.so", component.name);
        let mut vars = BTreeMap::new();
        if !component.cflags.is_empty() {
            vars.insert("cflags".to_string(), component.cflags.join(" "));
        }
        if !component.libs.is_empty() {
            let libs = component
                .libs
                .iter()
                .map(|l| format!("-l{l}"))
                .collect::<Vec<_>>()
                .join(" ");
            vars.insert("libs".to_string(), libs);
        }
        script.build(&BuildStatement {
            outputs: vec![artifact.clone()],
            rule: "compile-component".into(),
            inputs,
            vars,
            ..Default::default()
        })?;

        self.emitted
            .insert(component.name.clone(), artifact.clone());
        Ok(artifact)
    }
}

impl Default for ComponentGenerator {
    fn default() -> Self {
        Self::new()
    }
}
