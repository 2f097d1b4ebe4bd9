use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::KernelModule;
use crate::script::{BuildStatement, ScriptEmitter};

use super::BuildParams;

#[derive(Debug, Clone)]
pub struct ModuleArtifacts {
    // The loadable object; what the system pack depends on explicitly.
    pub object: String,
    // Load-parameters metadata consumed by packaging.
    pub params: String,
}

// Like the component generator but without the binding step, plus a
// load-metadata statement so editing load parameters regenerates metadata
// without recompiling sources.
pub struct ModuleGenerator {
    emitted: BTreeMap<String, ModuleArtifacts>,
}

impl ModuleGenerator {
    pub fn new() -> Self {
        Self {
            emitted: BTreeMap::new(),
        }
    }

    pub fn generate(
        &mut self,
        script: &mut ScriptEmitter,
        _params: &BuildParams,
        module: &KernelModule,
    ) -> Result<ModuleArtifacts> {
        if let Some(artifacts) = self.emitted.get(&module.name) {
            return Ok(artifacts.clone());
        }
        if module.sources.is_empty() {
            return Err(Error::model(format!(
                "kernel module '{}' has no source files",
                module.name
            )));
        }

        tracing::debug!(module = %module.name, "emitting kernel module statements");
        script.blank();
        script.comment(&format!("kernel module: {}", module.name));

        let module_dir = format!("$builddir/module/{}", module.name);
        let object = format!("{module_dir}/{}.ko", module.name);
        let mut vars = BTreeMap::new();
        if !module.cflags.is_empty() {
            vars.insert("cflags".to_string(), module.cflags.join(" "));
        }
        script.build(&BuildStatement {
            outputs: vec![object.clone()],
            rule: "compile-module".into(),
            inputs: module.sources.iter().map(|p| p.display().to_string()).collect(),
            vars,
            ..Default::default()
        })?;

        let params_file = format!("{module_dir}/params.json");
        let mut vars = BTreeMap::new();
        vars.insert("module".to_string(), module.name.clone());
        script.build(&BuildStatement {
            outputs: vec![params_file.clone()],
            rule: "module-params".into(),
            inputs: vec![module.def_file.display().to_string()],
            vars,
            ..Default::default()
        })?;

        let artifacts = ModuleArtifacts {
            object,
            params: params_file,
        };
        self.emitted.insert(module.name.clone(), artifacts.clone());
        Ok(artifacts)
    }
}

impl Default for ModuleGenerator {
    fn default() -> Self {
        Self::new()
    }
}
