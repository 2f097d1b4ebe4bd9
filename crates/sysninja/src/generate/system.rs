use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::{Model, System};
use crate::script::{BuildStatement, RuleDef, ScriptEmitter};

use super::{AppGenerator, BuildParams, ModuleGenerator, write_build_rules};

// The root of the traversal. Owns the app and module generators
// (composition: it drives them, it does not extend them) and emits the
// system-level aggregation on top of what they produce. Holds no state
// across passes; construct one per `generate` call.
pub struct SystemGenerator {
    apps: AppGenerator,
    modules: ModuleGenerator,
}

impl SystemGenerator {
    pub fn new() -> Self {
        Self {
            apps: AppGenerator::new(),
            modules: ModuleGenerator::new(),
        }
    }

    pub fn generate(
        &mut self,
        script: &mut ScriptEmitter,
        params: &BuildParams,
        model: &Model,
    ) -> Result<()> {
        let system = &model.system;
        tracing::debug!(system = %system.name, "generating build script");

        self.comment_header(script, params, system);

        script.var("builddir", &params.build_dir);
        script.var("sysdef", &system.def_file.display().to_string());
        script.blank();

        write_build_rules(script, params)?;

        let mut app_packages = Vec::new();
        for name in &system.apps {
            let app = model.app(name)?;
            app_packages.push(self.apps.generate(script, params, model, app)?);
        }

        let mut module_objects = Vec::new();
        let mut module_params = Vec::new();
        for name in &system.modules {
            let module = model.module(name)?;
            let artifacts = self.modules.generate(script, params, module)?;
            module_objects.push(artifacts.object);
            module_params.push(artifacts.params);
        }

        self.system_pack(script, params, model, app_packages, module_objects, module_params)?;
        self.regen_statement(script, params, model)?;
        Ok(())
    }

    fn comment_header(
        &self,
        script: &mut ScriptEmitter,
        params: &BuildParams,
        system: &System,
    ) {
        script.comment_header(&format!("build script for system '{}'", system.name));
        script.comment(&format!("definition: {}", system.def_file.display()));
        script.comment(&format!(
            "generated by {} {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));
        script.comment(&format!("flags-signature: {}", params.flags_signature()));
        script.blank();
    }

    // The deployable update package. Its explicit inputs are exactly the
    // app and module artifacts; module metadata and the system definition
    // ride as implicit inputs, and configuration content participates
    // through the signature variable in the command.
    fn system_pack(
        &self,
        script: &mut ScriptEmitter,
        params: &BuildParams,
        model: &Model,
        app_packages: Vec<String>,
        module_objects: Vec<String>,
        module_params: Vec<String>,
    ) -> Result<()> {
        let system = &model.system;
        script.blank();
        script.comment_header(&format!("system pack: {}", system.name));
        script.rule(
            "pack-system",
            &RuleDef {
                command: format!(
                    "{} -czf $out $in && echo $config_sig > $out.sig",
                    params.packer
                ),
                description: "Packing system update $out".into(),
                ..Default::default()
            },
        )?;

        let update = format!("$builddir/{}.update", system.name);
        let mut inputs = app_packages;
        inputs.extend(module_objects);
        let mut implicit = module_params;
        implicit.push(system.def_file.display().to_string());
        let mut vars = BTreeMap::new();
        vars.insert("config_sig".to_string(), config_signature(system)?);
        script.build(&BuildStatement {
            outputs: vec![update.clone()],
            rule: "pack-system".into(),
            inputs,
            implicit,
            vars,
            ..Default::default()
        })?;
        script.default_target(&update);
        Ok(())
    }

    // The script is an artifact of the same graph: its statement rebuilds
    // it from every definition source the model builder read, so no other
    // target runs against a stale script.
    fn regen_statement(
        &self,
        script: &mut ScriptEmitter,
        params: &BuildParams,
        model: &Model,
    ) -> Result<()> {
        script.blank();
        script.comment_header("script regeneration");
        script.rule(
            "regen",
            &RuleDef {
                command: params.regen_command(),
                description: "Regenerating $out".into(),
                generator: true,
                ..Default::default()
            },
        )?;

        let output = script.script_path().display().to_string();
        let implicit = model
            .sources
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        script.build(&BuildStatement {
            outputs: vec![output],
            rule: "regen".into(),
            implicit,
            ..Default::default()
        })
    }
}

impl Default for SystemGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn config_signature(system: &System) -> Result<String> {
    let encoded = toml::to_string(&system.config).map_err(|e| {
        Error::model(format!(
            "system '{}' configuration cannot be encoded: {e}",
            system.name
        ))
    })?;
    Ok(ScriptEmitter::content_signature(encoded.as_bytes()))
}
