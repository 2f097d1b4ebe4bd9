use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use sysninja::error::ErrorKind;
use sysninja::generate::{BuildParams, generate_script};
use sysninja::model::{App, Model, System};

fn dangling_model() -> Model {
    let app = App {
        name: "viewer".into(),
        def_file: PathBuf::from("defs/apps/viewer.toml"),
        dir: PathBuf::from("defs/apps"),
        components: vec!["camera".into()],
        bundles: Vec::new(),
        version: None,
        start: Default::default(),
    };
    Model {
        system: System {
            name: "demo".into(),
            def_file: PathBuf::from("defs/demo.toml"),
            apps: vec!["viewer".into()],
            modules: Vec::new(),
            config: BTreeMap::new(),
        },
        apps: BTreeMap::from([("viewer".to_string(), app)]),
        modules: BTreeMap::new(),
        // "camera" is referenced but absent.
        components: BTreeMap::new(),
        sources: BTreeSet::from([PathBuf::from("defs/demo.toml")]),
    }
}

#[test]
fn dangling_component_reference_aborts_before_any_output() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut params = BuildParams::default();
    params.script_path = tmp.path().join("build.ninja");

    let err = generate_script(&dangling_model(), &params).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Model);
    assert!(err.to_string().contains("app 'viewer'"));
    assert!(err.to_string().contains("unknown component 'camera'"));

    assert!(
        !params.script_path.exists(),
        "no partial script may be left behind"
    );
}

#[test]
fn dangling_app_reference_aborts() {
    let mut model = dangling_model();
    model.apps.clear();

    let tmp = tempfile::tempdir().expect("tempdir");
    let mut params = BuildParams::default();
    params.script_path = tmp.path().join("build.ninja");

    let err = generate_script(&model, &params).expect_err("must fail");
    assert!(err.to_string().contains("unknown app 'viewer'"));
    assert!(!params.script_path.exists());
}
