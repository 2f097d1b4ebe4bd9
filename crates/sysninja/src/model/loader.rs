use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::model::{
    ApiInterface, App, BundledFile, Component, KernelModule, Model, StartMode, System,
};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct SystemDef {
    name: Option<String>,
    apps: Vec<String>,
    modules: Vec<String>,
    config: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct AppDef {
    components: Vec<String>,
    version: Option<String>,
    start: StartMode,
    bundles: Vec<BundleDef>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct BundleDef {
    src: String,
    dst: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ComponentDef {
    sources: Vec<String>,
    cflags: Vec<String>,
    libs: Vec<String>,
    provides: Vec<ApiDef>,
    requires: Vec<ApiDef>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ApiDef {
    name: String,
    api: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct ModuleDef {
    sources: Vec<String>,
    cflags: Vec<String>,
    params: BTreeMap<String, String>,
}

// Reads a system definition and everything it references, producing the
// resolved model one generation pass consumes. Every definition file read
// lands in `Model::sources` so the emitted script can declare them as
// inputs of its own regeneration.
pub fn load(system_def: &Path) -> Result<Model> {
    Loader::default().load_system(system_def)
}

#[derive(Default)]
struct Loader {
    sources: BTreeSet<PathBuf>,
    components: BTreeMap<String, Component>,
    // canonical definition path -> identity, so a component referenced by
    // two apps resolves to one entity instead of a duplicate-identity error
    component_paths: BTreeMap<PathBuf, String>,
}

impl Loader {
    fn load_system(mut self, path: &Path) -> Result<Model> {
        let def_file = canonical(path)
            .map_err(|e| Error::model(format!("cannot open system definition: {e}")))?;
        let def: SystemDef = self.read_def(&def_file)?;
        let name = match def.name {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => identity(&def_file)?,
        };

        let mut apps = BTreeMap::new();
        let mut app_order = Vec::new();
        for reference in &def.apps {
            let app_file = resolve_reference(&def_file, reference).map_err(|e| {
                Error::model(format!(
                    "system '{}' references missing app definition '{}': {e}",
                    name, reference
                ))
            })?;
            let app = self.load_app(app_file)?;
            if apps.contains_key(&app.name) {
                return Err(Error::model(format!(
                    "system '{}' references app '{}' more than once",
                    name, app.name
                )));
            }
            app_order.push(app.name.clone());
            apps.insert(app.name.clone(), app);
        }

        let mut modules = BTreeMap::new();
        let mut module_order = Vec::new();
        for reference in &def.modules {
            let module_file = resolve_reference(&def_file, reference).map_err(|e| {
                Error::model(format!(
                    "system '{}' references missing module definition '{}': {e}",
                    name, reference
                ))
            })?;
            let module = self.load_module(module_file)?;
            if modules.contains_key(&module.name) {
                return Err(Error::model(format!(
                    "system '{}' references kernel module '{}' more than once",
                    name, module.name
                )));
            }
            module_order.push(module.name.clone());
            modules.insert(module.name.clone(), module);
        }

        Ok(Model {
            system: System {
                name,
                def_file,
                apps: app_order,
                modules: module_order,
                config: def.config,
            },
            apps,
            modules,
            components: self.components,
            sources: self.sources,
        })
    }

    fn load_app(&mut self, def_file: PathBuf) -> Result<App> {
        let name = identity(&def_file)?;
        let def: AppDef = self.read_def(&def_file)?;
        let dir = parent_dir(&def_file);

        let mut components = Vec::new();
        for reference in &def.components {
            let comp_file = resolve_reference(&def_file, reference).map_err(|e| {
                Error::model(format!(
                    "app '{}' references missing component definition '{}': {e}",
                    name, reference
                ))
            })?;
            let comp_name = self.load_component(comp_file)?;
            if components.contains(&comp_name) {
                return Err(Error::model(format!(
                    "app '{}' references component '{}' more than once",
                    name, comp_name
                )));
            }
            components.push(comp_name);
        }

        let mut bundles = Vec::new();
        for bundle in &def.bundles {
            let src = resolve_reference(&def_file, &bundle.src).map_err(|e| {
                Error::model(format!(
                    "app '{}' bundles missing file '{}': {e}",
                    name, bundle.src
                ))
            })?;
            let dst = bundle_destination(&name, &bundle.dst)?;
            bundles.push(BundledFile { src, dst });
        }

        Ok(App {
            name,
            def_file,
            dir,
            components,
            bundles,
            version: def
                .version
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned),
            start: def.start,
        })
    }

    fn load_component(&mut self, def_file: PathBuf) -> Result<String> {
        if let Some(existing) = self.component_paths.get(&def_file) {
            return Ok(existing.clone());
        }
        let name = identity(&def_file)?;
        if let Some(other) = self.components.get(&name) {
            return Err(Error::model(format!(
                "component identity '{}' is defined by both {} and {}",
                name,
                other.def_file.display(),
                def_file.display()
            )));
        }
        let def: ComponentDef = self.read_def(&def_file)?;
        let dir = parent_dir(&def_file);

        if def.sources.is_empty() {
            return Err(Error::model(format!(
                "component '{}' ({}) declares no source files",
                name,
                def_file.display()
            )));
        }
        let sources = resolve_files(&def_file, "source file", &name, &def.sources)?;
        let provides = resolve_apis(&def_file, &name, &def.provides)?;
        let requires = resolve_apis(&def_file, &name, &def.requires)?;

        let component = Component {
            name: name.clone(),
            def_file: def_file.clone(),
            dir,
            sources,
            cflags: def.cflags,
            libs: def.libs,
            provides,
            requires,
        };
        self.component_paths.insert(def_file, name.clone());
        self.components.insert(name.clone(), component);
        Ok(name)
    }

    fn load_module(&mut self, def_file: PathBuf) -> Result<KernelModule> {
        let name = identity(&def_file)?;
        let def: ModuleDef = self.read_def(&def_file)?;
        let dir = parent_dir(&def_file);

        if def.sources.is_empty() {
            return Err(Error::model(format!(
                "kernel module '{}' ({}) declares no source files",
                name,
                def_file.display()
            )));
        }
        let sources = resolve_files(&def_file, "source file", &name, &def.sources)?;

        Ok(KernelModule {
            name,
            def_file,
            dir,
            sources,
            cflags: def.cflags,
            params: def.params,
        })
    }

    fn read_def<T: DeserializeOwned>(&mut self, path: &Path) -> Result<T> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::model(format!("failed to read definition {}: {e}", path.display())))?;
        self.sources.insert(path.to_path_buf());
        toml::from_str(&text)
            .map_err(|e| Error::model(format!("invalid definition {}: {e}", path.display())))
    }
}

fn parent_dir(def_file: &Path) -> PathBuf {
    def_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|e| Error::model(format!("{}: {e}", path.display())))
}

// References are resolved relative to the file that makes them, and must
// exist on disk at load time.
fn resolve_reference(from_file: &Path, reference: &str) -> Result<PathBuf> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(Error::model(format!(
            "empty reference in {}",
            from_file.display()
        )));
    }
    let p = PathBuf::from(reference);
    let joined = if p.is_absolute() {
        p
    } else {
        parent_dir(from_file).join(p)
    };
    canonical(&joined)
}

fn resolve_files(
    def_file: &Path,
    what: &str,
    owner: &str,
    raws: &[String],
) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for raw in raws {
        let path = resolve_reference(def_file, raw).map_err(|e| {
            Error::model(format!("'{}' lists missing {what} '{}': {e}", owner, raw))
        })?;
        out.push(path);
    }
    Ok(out)
}

fn resolve_apis(def_file: &Path, owner: &str, defs: &[ApiDef]) -> Result<Vec<ApiInterface>> {
    let mut out = Vec::new();
    for def in defs {
        let name = def.name.trim();
        if name.is_empty() {
            return Err(Error::model(format!(
                "component '{}' declares an interface without a name",
                owner
            )));
        }
        let api_file = resolve_reference(def_file, &def.api).map_err(|e| {
            Error::model(format!(
                "interface '{}' of component '{}' names missing api file '{}': {e}",
                name, owner, def.api
            ))
        })?;
        out.push(ApiInterface {
            name: name.to_string(),
            api_file,
        });
    }
    Ok(out)
}

fn identity(path: &Path) -> Result<String> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    if stem.is_empty() {
        return Err(Error::model(format!(
            "definition file {} has no usable name",
            path.display()
        )));
    }
    if !stem
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::model(format!(
            "definition name '{}' is invalid (allowed: a-zA-Z0-9_-)",
            stem
        )));
    }
    Ok(stem.to_string())
}

// Bundle destinations are target paths; they stage under the app staging
// root, so a leading '/' is accepted and stripped, '..' never is.
fn bundle_destination(app: &str, raw: &str) -> Result<String> {
    let dst = raw.trim().trim_start_matches('/');
    if dst.is_empty() {
        return Err(Error::model(format!(
            "app '{}' has a bundle with an empty destination",
            app
        )));
    }
    if Path::new(dst)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(Error::model(format!(
            "app '{}' bundle destination '{}' contains '..'",
            app, raw
        )));
    }
    Ok(dst.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, text: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, text).expect("write");
        path
    }

    fn fixture(dir: &Path) -> PathBuf {
        write(dir, "components/src/cam.c", "int main(void) { return 0; }\n");
        write(dir, "components/api/camctl.api", "FUNCTION Start();\n");
        write(
            dir,
            "components/camera.toml",
            r#"
sources = ["src/cam.c"]
libs = ["m"]

[[provides]]
name = "camctl"
api = "api/camctl.api"
"#,
        );
        write(
            dir,
            "apps/viewer.toml",
            r#"
components = ["../components/camera.toml"]
version = "1.0"
"#,
        );
        write(
            dir,
            "apps/recorder.toml",
            r#"
components = ["../components/camera.toml"]
"#,
        );
        write(dir, "modules/spidrv.c", "/* stub */\n");
        write(
            dir,
            "modules/spi.toml",
            r#"
sources = ["spidrv.c"]

[params]
bus = "1"
"#,
        );
        write(
            dir,
            "demo.toml",
            r#"
apps = ["apps/viewer.toml", "apps/recorder.toml"]
modules = ["modules/spi.toml"]

[config]
version = "2.0"
"#,
        )
    }

    #[test]
    fn loads_and_shares_components_by_identity() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let system_def = fixture(tmp.path());

        let model = load(&system_def).expect("load");
        assert_eq!(model.system.name, "demo");
        assert_eq!(model.system.apps, vec!["viewer", "recorder"]);
        assert_eq!(model.components.len(), 1, "shared component loads once");

        let camera = model.component("camera").expect("camera");
        assert_eq!(camera.provides.len(), 1);
        assert_eq!(camera.libs, vec!["m"]);

        // Definition sources cover the whole tree, each exactly once.
        assert_eq!(model.sources.len(), 5);
        assert!(model.sources.iter().any(|p| p.ends_with("camera.toml")));
    }

    #[test]
    fn missing_component_definition_names_the_app() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let system_def = write(
            tmp.path(),
            "demo.toml",
            r#"apps = ["apps/viewer.toml"]"#,
        );
        write(
            tmp.path(),
            "apps/viewer.toml",
            r#"components = ["nope.toml"]"#,
        );

        let err = load(&system_def).expect_err("must fail");
        assert!(err.to_string().contains("app 'viewer'"));
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn duplicate_component_identity_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write(tmp.path(), "a/src.c", "\n");
        write(tmp.path(), "b/src.c", "\n");
        write(tmp.path(), "a/cam.toml", r#"sources = ["src.c"]"#);
        write(tmp.path(), "b/cam.toml", r#"sources = ["src.c"]"#);
        write(
            tmp.path(),
            "app.toml",
            r#"components = ["a/cam.toml", "b/cam.toml"]"#,
        );
        let system_def = write(tmp.path(), "demo.toml", r#"apps = ["app.toml"]"#);

        let err = load(&system_def).expect_err("must fail");
        assert!(err.to_string().contains("component identity 'cam'"));
    }

    #[test]
    fn missing_source_file_is_a_model_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write(tmp.path(), "cam.toml", r#"sources = ["ghost.c"]"#);
        write(tmp.path(), "app.toml", r#"components = ["cam.toml"]"#);
        let system_def = write(tmp.path(), "demo.toml", r#"apps = ["app.toml"]"#);

        let err = load(&system_def).expect_err("must fail");
        assert!(err.to_string().contains("missing source file 'ghost.c'"));
    }

    #[test]
    fn bundle_destination_cannot_escape_staging() {
        let err = bundle_destination("viewer", "../outside").expect_err("must fail");
        assert!(err.to_string().contains("contains '..'"));
        assert_eq!(
            bundle_destination("viewer", "/cfg/app.json").expect("dst"),
            "cfg/app.json"
        );
    }
}
