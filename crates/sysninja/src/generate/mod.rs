use std::path::PathBuf;

use crate::error::Result;
use crate::model::Model;
use crate::script::{RuleDef, ScriptEmitter};

pub mod app;
pub mod component;
pub mod module;
pub mod system;

pub use app::AppGenerator;
pub use component::ComponentGenerator;
pub use module::{ModuleArtifacts, ModuleGenerator};
pub use system::SystemGenerator;

// Configuration for one generation pass. The generators decide what build
// steps exist and how they depend on each other; these fields only decide
// which external tools the emitted commands name.
#[derive(Debug, Clone)]
pub struct BuildParams {
    // Value of the script's `builddir` variable.
    pub build_dir: String,
    pub script_path: PathBuf,
    // Compiler driver named in emitted compile commands.
    pub compiler: String,
    // IPC interface binding generator.
    pub ipcgen: String,
    // Archiver named in emitted pack commands.
    pub packer: String,
    // Command the emitted script uses to re-invoke model-aware steps
    // (manifests, and regeneration when no original argv is known).
    pub self_cmd: String,
    pub target: Option<String>,
    // The user's original command line; drives the self-regeneration
    // command and the flags signature in the script header.
    pub argv: Vec<String>,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            build_dir: "build".into(),
            script_path: PathBuf::from("build/build.ninja"),
            compiler: "cc".into(),
            ipcgen: "ipcgen".into(),
            packer: "tar".into(),
            self_cmd: "sysninja".into(),
            target: None,
            argv: Vec::new(),
        }
    }
}

impl BuildParams {
    // Signature over the flags that shaped this pass. Embedded in the
    // script header so a flags-only change still produces a different
    // script, which is what makes the regeneration rule converge.
    pub fn flags_signature(&self) -> String {
        ScriptEmitter::content_signature(self.argv.join("\n").as_bytes())
    }

    pub fn regen_command(&self) -> String {
        if self.argv.is_empty() {
            return format!("{} generate $sysdef -o $out", self.self_cmd);
        }
        // '$' would be a ninja escape inside the command value.
        shell_join(&self.argv).replace('$', "$$")
    }

    fn compiler_invocation(&self) -> String {
        match self.target.as_deref() {
            Some(target) => format!("{} --target={}", self.compiler, target),
            None => self.compiler.clone(),
        }
    }
}

// The rule set shared by component, module, and app statements. Rules are
// written before any statement references them; the system generator emits
// its own aggregation rules separately.
pub fn write_build_rules(script: &mut ScriptEmitter, params: &BuildParams) -> Result<()> {
    script.comment_header("build rules");
    script.rule(
        "ipcgen",
        &RuleDef {
            command: format!("{} --side $side -o $out $in", params.ipcgen),
            description: "Generating $side IPC binding $out".into(),
            ..Default::default()
        },
    )?;
    script.rule(
        "compile-component",
        &RuleDef {
            command: format!(
                "{} -shared -fPIC $cflags -o $out $in $libs",
                params.compiler_invocation()
            ),
            description: "Compiling component $out".into(),
            ..Default::default()
        },
    )?;
    script.rule(
        "compile-module",
        &RuleDef {
            command: format!("{} -DMODULE $cflags -o $out $in", params.compiler_invocation()),
            description: "Compiling kernel module $out".into(),
            ..Default::default()
        },
    )?;
    script.rule(
        "app-manifest",
        &RuleDef {
            command: format!("{} manifest $sysdef --app $app -o $out", params.self_cmd),
            description: "Writing manifest for app $app".into(),
            ..Default::default()
        },
    )?;
    script.rule(
        "module-params",
        &RuleDef {
            command: format!(
                "{} manifest $sysdef --module $module -o $out",
                params.self_cmd
            ),
            description: "Writing load parameters for module $module".into(),
            ..Default::default()
        },
    )?;
    script.rule(
        "bundle",
        &RuleDef {
            command: "cp $in $out".into(),
            description: "Staging $out".into(),
            ..Default::default()
        },
    )?;
    script.rule(
        "pack-app",
        &RuleDef {
            command: format!("{} -czf $out -C $staging .", params.packer),
            description: "Packaging app $out".into(),
            ..Default::default()
        },
    )?;
    script.blank();
    Ok(())
}

// Single entry point of a pass: build the generator tree, run the
// traversal, commit atomically. An error anywhere leaves the filesystem
// untouched.
pub fn generate_script(model: &Model, params: &BuildParams) -> Result<PathBuf> {
    let mut script = ScriptEmitter::new(&params.script_path);
    SystemGenerator::new().generate(&mut script, params, model)?;
    script.commit()
}

// Same traversal, returning the script text instead of writing it. Library
// and test entry point.
pub fn generate_script_text(model: &Model, params: &BuildParams) -> Result<String> {
    let mut script = ScriptEmitter::new(&params.script_path);
    SystemGenerator::new().generate(&mut script, params, model)?;
    Ok(script.into_script())
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}
