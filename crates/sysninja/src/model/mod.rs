use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

pub mod loader;

// One IPC interface declared by a component. Direction (provided vs.
// required) is carried by which list the interface sits in.
#[derive(Debug, Clone)]
pub struct ApiInterface {
    pub name: String,
    pub api_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    pub def_file: PathBuf,
    pub dir: PathBuf,
    pub sources: Vec<PathBuf>,
    pub cflags: Vec<String>,
    pub libs: Vec<String>,
    pub provides: Vec<ApiInterface>,
    pub requires: Vec<ApiInterface>,
}

#[derive(Debug, Clone)]
pub struct KernelModule {
    pub name: String,
    pub def_file: PathBuf,
    pub dir: PathBuf,
    pub sources: Vec<PathBuf>,
    pub cflags: Vec<String>,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    Auto,
    Manual,
}

impl Default for StartMode {
    fn default() -> Self {
        StartMode::Auto
    }
}

impl StartMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StartMode::Auto => "auto",
            StartMode::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BundledFile {
    pub src: PathBuf,
    pub dst: String,
}

#[derive(Debug, Clone)]
pub struct App {
    pub name: String,
    pub def_file: PathBuf,
    pub dir: PathBuf,
    // Ordered; components are referenced by identity, not owned.
    pub components: Vec<String>,
    pub bundles: Vec<BundledFile>,
    pub version: Option<String>,
    pub start: StartMode,
}

#[derive(Debug, Clone)]
pub struct System {
    pub name: String,
    pub def_file: PathBuf,
    pub apps: Vec<String>,
    pub modules: Vec<String>,
    pub config: BTreeMap<String, toml::Value>,
}

// The resolved model for one generation pass. Generators hold shared
// references into it and never mutate it. `sources` is every definition
// file the model builder read; it feeds the self-regeneration statement.
#[derive(Debug, Clone)]
pub struct Model {
    pub system: System,
    pub apps: BTreeMap<String, App>,
    pub modules: BTreeMap<String, KernelModule>,
    pub components: BTreeMap<String, Component>,
    pub sources: BTreeSet<PathBuf>,
}

impl Model {
    pub fn app(&self, name: &str) -> Result<&App> {
        self.apps.get(name).ok_or_else(|| {
            Error::model(format!(
                "system '{}' references unknown app '{}'",
                self.system.name, name
            ))
        })
    }

    pub fn module(&self, name: &str) -> Result<&KernelModule> {
        self.modules.get(name).ok_or_else(|| {
            Error::model(format!(
                "system '{}' references unknown kernel module '{}'",
                self.system.name, name
            ))
        })
    }

    pub fn component(&self, name: &str) -> Result<&Component> {
        self.components.get(name).ok_or_else(|| {
            Error::model(format!("model has no component named '{}'", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_model() -> Model {
        Model {
            system: System {
                name: "unit".into(),
                def_file: PathBuf::from("unit.toml"),
                apps: Vec::new(),
                modules: Vec::new(),
                config: BTreeMap::new(),
            },
            apps: BTreeMap::new(),
            modules: BTreeMap::new(),
            components: BTreeMap::new(),
            sources: BTreeSet::new(),
        }
    }

    #[test]
    fn lookups_name_the_missing_entity() {
        let model = empty_model();

        let err = model.app("web").expect_err("must fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::Model);
        assert!(err.to_string().contains("unknown app 'web'"));

        let err = model.module("spi").expect_err("must fail");
        assert!(err.to_string().contains("unknown kernel module 'spi'"));

        let err = model.component("cam").expect_err("must fail");
        assert!(err.to_string().contains("no component named 'cam'"));
    }
}
