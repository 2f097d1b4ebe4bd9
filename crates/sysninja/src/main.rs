use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sysninja::Result;
use sysninja::error::Error;
use sysninja::generate::{BuildParams, generate_script};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a system definition and emit its ninja build script
    Generate {
        /// Path to the system definition TOML
        system: PathBuf,
        /// Directory the emitted statements build into
        #[arg(long, default_value = "build")]
        build_dir: String,
        /// Where to write the script (default: <build-dir>/build.ninja)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Compiler driver named in emitted compile commands
        #[arg(long, default_value = "cc")]
        compiler: String,
        /// Interface binding generator named in emitted binding commands
        #[arg(long, default_value = "ipcgen")]
        ipcgen: String,
        /// Archiver named in emitted pack commands
        #[arg(long, default_value = "tar")]
        packer: String,
        /// Target flavor folded into compile commands
        #[arg(long)]
        target: Option<String>,
    },
    /// Load a system definition and print the resolved model
    Resolve {
        /// Path to the system definition TOML
        system: PathBuf,
    },
    /// Write the manifest / load-parameters artifact for one app or module
    /// (this is what emitted build statements invoke at build time)
    Manifest {
        /// Path to the system definition TOML
        system: PathBuf,
        /// App to write a manifest for
        #[arg(long, conflicts_with = "module")]
        app: Option<String>,
        /// Kernel module to write load parameters for
        #[arg(long)]
        module: Option<String>,
        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Generate {
            system,
            build_dir,
            output,
            compiler,
            ipcgen,
            packer,
            target,
        } => cmd_generate(system, build_dir, output, compiler, ipcgen, packer, target),
        Command::Resolve { system } => cmd_resolve(&system),
        Command::Manifest {
            system,
            app,
            module,
            output,
        } => cmd_manifest(&system, app, module, &output),
    }
}

fn cmd_generate(
    system: PathBuf,
    build_dir: String,
    output: Option<PathBuf>,
    compiler: String,
    ipcgen: String,
    packer: String,
    target: Option<String>,
) -> Result<()> {
    let model = sysninja::model::loader::load(&system)?;
    let script_path = output.unwrap_or_else(|| PathBuf::from(&build_dir).join("build.ninja"));
    let params = BuildParams {
        build_dir,
        script_path,
        compiler,
        ipcgen,
        packer,
        target,
        argv: std::env::args().collect(),
        ..Default::default()
    };
    let path = generate_script(&model, &params)?;
    tracing::info!(script = %path.display(), system = %model.system.name, "build script written");
    Ok(())
}

fn cmd_resolve(system: &PathBuf) -> Result<()> {
    let model = sysninja::model::loader::load(system)?;
    println!("system {}", model.system.name);
    for name in &model.system.apps {
        let app = model.app(name)?;
        println!(
            "  app    {:<20} components: {}",
            app.name,
            app.components.join(", ")
        );
    }
    for name in &model.system.modules {
        let module = model.module(name)?;
        println!(
            "  module {:<20} sources: {}",
            module.name,
            module.sources.len()
        );
    }
    for component in model.components.values() {
        println!(
            "  comp   {:<20} sources: {} provides: {} requires: {}",
            component.name,
            component.sources.len(),
            component.provides.len(),
            component.requires.len()
        );
    }
    println!("  read   {} definition files", model.sources.len());
    Ok(())
}

fn cmd_manifest(
    system: &PathBuf,
    app: Option<String>,
    module: Option<String>,
    output: &PathBuf,
) -> Result<()> {
    let model = sysninja::model::loader::load(system)?;
    match (app, module) {
        (Some(app), None) => sysninja::manifest::write_app_manifest(&model, &app, output),
        (None, Some(module)) => sysninja::manifest::write_module_params(&model, &module, output),
        _ => Err(Error::msg("pass exactly one of --app or --module")),
    }
}
