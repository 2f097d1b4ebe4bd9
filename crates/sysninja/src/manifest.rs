use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{App, KernelModule, Model};

// Metadata artifacts the emitted script asks this tool to write at build
// time (`sysninja manifest ...`). Shapes stay sorted and stable: these
// files are build outputs, so byte churn means spurious rebuilds.

pub fn app_manifest(model: &Model, app: &App) -> Result<serde_json::Value> {
    let mut components = Vec::new();
    for name in &app.components {
        let component = model.component(name)?;
        let provides: Vec<&str> = component.provides.iter().map(|i| i.name.as_str()).collect();
        let requires: Vec<&str> = component.requires.iter().map(|i| i.name.as_str()).collect();
        components.push(serde_json::json!({
            "name": component.name,
            "lib": format!("lib/lib{}.so", component.name),
            "provides": provides,
            "requires": requires,
        }));
    }
    let bundles: Vec<&str> = app.bundles.iter().map(|b| b.dst.as_str()).collect();
    Ok(serde_json::json!({
        "name": app.name,
        "version": app.version,
        "start": app.start.as_str(),
        "components": components,
        "bundles": bundles,
    }))
}

pub fn module_params(module: &KernelModule) -> serde_json::Value {
    serde_json::json!({
        "name": module.name,
        "object": format!("{}.ko", module.name),
        "params": module.params,
    })
}

pub fn write_app_manifest(model: &Model, app_name: &str, out: &Path) -> Result<()> {
    let app = model.app(app_name)?;
    write_json(out, &app_manifest(model, app)?)
}

pub fn write_module_params(model: &Model, module_name: &str, out: &Path) -> Result<()> {
    let module = model.module(module_name)?;
    write_json(out, &module_params(module))
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::io(format!("json encode error: {e}")))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("failed to create dir {}: {e}", parent.display())))?;
    }
    fs::write(path, text + "\n")
        .map_err(|e| Error::io(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::PathBuf;

    use super::*;
    use crate::model::{ApiInterface, BundledFile, Component, StartMode, System};

    fn fixture() -> Model {
        let component = Component {
            name: "camera".into(),
            def_file: PathBuf::from("defs/camera.toml"),
            dir: PathBuf::from("defs"),
            sources: vec![PathBuf::from("defs/src/cam.c")],
            cflags: Vec::new(),
            libs: vec!["m".into()],
            provides: vec![ApiInterface {
                name: "camctl".into(),
                api_file: PathBuf::from("defs/api/camctl.api"),
            }],
            requires: Vec::new(),
        };
        let app = App {
            name: "viewer".into(),
            def_file: PathBuf::from("defs/viewer.toml"),
            dir: PathBuf::from("defs"),
            components: vec!["camera".into()],
            bundles: vec![BundledFile {
                src: PathBuf::from("defs/cfg.json"),
                dst: "cfg/cfg.json".into(),
            }],
            version: Some("1.0".into()),
            start: StartMode::Auto,
        };
        let module = KernelModule {
            name: "spi".into(),
            def_file: PathBuf::from("defs/spi.toml"),
            dir: PathBuf::from("defs"),
            sources: vec![PathBuf::from("defs/spidrv.c")],
            cflags: Vec::new(),
            params: BTreeMap::from([("bus".to_string(), "1".to_string())]),
        };
        Model {
            system: System {
                name: "demo".into(),
                def_file: PathBuf::from("defs/demo.toml"),
                apps: vec!["viewer".into()],
                modules: vec!["spi".into()],
                config: BTreeMap::new(),
            },
            apps: BTreeMap::from([("viewer".to_string(), app)]),
            modules: BTreeMap::from([("spi".to_string(), module)]),
            components: BTreeMap::from([("camera".to_string(), component)]),
            sources: BTreeSet::new(),
        }
    }

    #[test]
    fn app_manifest_lists_components_and_bundles() {
        let model = fixture();
        let manifest = app_manifest(&model, model.app("viewer").expect("app")).expect("manifest");
        assert_eq!(manifest["name"], "viewer");
        assert_eq!(manifest["start"], "auto");
        assert_eq!(manifest["components"][0]["lib"], "lib/libcamera.so");
        assert_eq!(manifest["components"][0]["provides"][0], "camctl");
        assert_eq!(manifest["bundles"][0], "cfg/cfg.json");
    }

    #[test]
    fn module_params_carry_the_load_table() {
        let model = fixture();
        let params = module_params(model.module("spi").expect("module"));
        assert_eq!(params["object"], "spi.ko");
        assert_eq!(params["params"]["bus"], "1");
    }

    #[test]
    fn manifest_for_unknown_app_fails_with_identity() {
        let model = fixture();
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = write_app_manifest(&model, "ghost", &tmp.path().join("m.json"))
            .expect_err("must fail");
        assert!(err.to_string().contains("unknown app 'ghost'"));
    }
}
