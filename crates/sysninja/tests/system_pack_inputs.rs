use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use sysninja::generate::{BuildParams, generate_script_text};
use sysninja::model::{App, Component, KernelModule, Model, StartMode, System};

fn component(name: &str) -> Component {
    Component {
        name: name.into(),
        def_file: PathBuf::from(format!("defs/components/{name}.toml")),
        dir: PathBuf::from("defs/components"),
        sources: vec![PathBuf::from(format!("defs/components/src/{name}.c"))],
        cflags: Vec::new(),
        libs: Vec::new(),
        provides: Vec::new(),
        requires: Vec::new(),
    }
}

fn app(name: &str, components: &[&str]) -> App {
    App {
        name: name.into(),
        def_file: PathBuf::from(format!("defs/apps/{name}.toml")),
        dir: PathBuf::from("defs/apps"),
        components: components.iter().map(|s| s.to_string()).collect(),
        bundles: Vec::new(),
        version: None,
        start: StartMode::Auto,
    }
}

fn module(name: &str) -> KernelModule {
    KernelModule {
        name: name.into(),
        def_file: PathBuf::from(format!("defs/modules/{name}.toml")),
        dir: PathBuf::from("defs/modules"),
        sources: vec![PathBuf::from(format!("defs/modules/{name}drv.c"))],
        cflags: Vec::new(),
        params: BTreeMap::new(),
    }
}

fn model(apps: Vec<App>, modules: Vec<KernelModule>, components: Vec<Component>) -> Model {
    Model {
        system: System {
            name: "demo".into(),
            def_file: PathBuf::from("defs/demo.toml"),
            apps: apps.iter().map(|a| a.name.clone()).collect(),
            modules: modules.iter().map(|m| m.name.clone()).collect(),
            config: BTreeMap::new(),
        },
        apps: apps.into_iter().map(|a| (a.name.clone(), a)).collect(),
        modules: modules.into_iter().map(|m| (m.name.clone(), m)).collect(),
        components: components
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect(),
        sources: BTreeSet::from([PathBuf::from("defs/demo.toml")]),
    }
}

fn pack_statement(script: &str) -> &str {
    script
        .lines()
        .find(|l| l.starts_with("build $builddir/demo.update: pack-system"))
        .unwrap_or_else(|| panic!("system pack statement missing:\n{script}"))
}

fn explicit_inputs(pack_line: &str) -> BTreeSet<String> {
    let explicit = pack_line.split(" | ").next().expect("explicit section");
    explicit
        .strip_prefix("build $builddir/demo.update: pack-system")
        .expect("statement prefix")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[test]
fn pack_inputs_are_exactly_the_app_and_module_artifacts() {
    let model = model(
        vec![app("viewer", &["camera"]), app("recorder", &["camera"])],
        vec![module("spi"), module("can")],
        vec![component("camera")],
    );
    let script = generate_script_text(&model, &BuildParams::default()).expect("generate");

    let expected: BTreeSet<String> = [
        "$builddir/app/viewer/viewer.app",
        "$builddir/app/recorder/recorder.app",
        "$builddir/module/spi/spi.ko",
        "$builddir/module/can/can.ko",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    assert_eq!(explicit_inputs(pack_statement(&script)), expected);
}

#[test]
fn module_metadata_and_definition_ride_as_implicit_inputs() {
    let model = model(vec![], vec![module("spi")], vec![]);
    let script = generate_script_text(&model, &BuildParams::default()).expect("generate");

    let pack = pack_statement(&script);
    let implicit = pack.split(" | ").nth(1).expect("implicit section");
    assert!(implicit.contains("$builddir/module/spi/params.json"));
    assert!(implicit.contains("defs/demo.toml"));
}

#[test]
fn empty_system_still_packs() {
    let model = model(vec![], vec![], vec![]);
    let script = generate_script_text(&model, &BuildParams::default()).expect("generate");

    let pack = pack_statement(&script);
    assert!(
        explicit_inputs(pack).is_empty(),
        "empty system must pack with no explicit inputs: {pack}"
    );
    assert!(script.contains("rule pack-system\n"));
    assert!(script.contains("default $builddir/demo.update\n"));
    assert!(
        script.contains("build build/build.ninja: regen |"),
        "regeneration statement must still be emitted:\n{script}"
    );
}

#[test]
fn config_edits_change_the_pack_command_signature() {
    let plain = model(vec![], vec![], vec![]);
    let mut tuned = plain.clone();
    tuned
        .system
        .config
        .insert("version".into(), toml::Value::String("9".into()));

    let params = BuildParams::default();
    let first = generate_script_text(&plain, &params).expect("generate");
    let second = generate_script_text(&tuned, &params).expect("generate");

    let sig = |script: &str| {
        script
            .lines()
            .find(|l| l.trim_start().starts_with("config_sig = "))
            .map(str::to_string)
            .expect("config_sig var")
    };
    assert_ne!(sig(&first), sig(&second));
}
