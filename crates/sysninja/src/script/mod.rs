use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

// Paths the generators emit live in script syntax: `$builddir/...` for
// generated artifacts, plain filesystem paths for sources. The prefix is
// what lets the emitter tell the two apart when checking statement order.
pub const BUILD_DIR: &str = "$builddir";

#[derive(Debug, Clone, Default)]
pub struct RuleDef {
    pub command: String,
    pub description: String,
    pub depfile: Option<String>,
    pub deps: Option<String>,
    pub generator: bool,
    pub restat: bool,
}

// One declared unit of work: outputs, rule, inputs. Explicit inputs feed
// command substitution; implicit and order-only inputs affect staleness
// only.
#[derive(Debug, Clone, Default)]
pub struct BuildStatement {
    pub outputs: Vec<String>,
    pub rule: String,
    pub inputs: Vec<String>,
    pub implicit: Vec<String>,
    pub order_only: Vec<String>,
    pub vars: BTreeMap<String, String>,
}

// Owns the output stream for one generation pass. The script is buffered
// in full and persisted atomically by `commit`; dropping the emitter on an
// aborted pass leaves nothing behind for the executor to mistake for a
// valid script.
pub struct ScriptEmitter {
    script_path: PathBuf,
    text: String,
    rules: BTreeSet<String>,
    outputs: BTreeSet<String>,
}

impl ScriptEmitter {
    pub fn new(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            text: String::new(),
            rules: BTreeSet::new(),
            outputs: BTreeSet::new(),
        }
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn comment(&mut self, text: &str) {
        for line in text.lines() {
            self.text.push_str("# ");
            self.text.push_str(line);
            self.text.push('\n');
        }
        if text.is_empty() {
            self.text.push_str("#\n");
        }
    }

    pub fn comment_header(&mut self, title: &str) {
        let bar = "=".repeat(title.len().max(8));
        self.comment(&bar);
        self.comment(title);
        self.comment(&bar);
    }

    pub fn blank(&mut self) {
        self.text.push('\n');
    }

    pub fn var(&mut self, name: &str, value: &str) {
        self.text.push_str(name);
        self.text.push_str(" = ");
        self.text.push_str(value);
        self.text.push('\n');
    }

    pub fn rule(&mut self, name: &str, def: &RuleDef) -> Result<()> {
        if name.trim().is_empty() || name == "phony" {
            return Err(Error::script(format!("invalid rule name '{}'", name)));
        }
        if !self.rules.insert(name.to_string()) {
            return Err(Error::script(format!("rule '{}' is defined twice", name)));
        }
        self.text.push_str("rule ");
        self.text.push_str(name);
        self.text.push('\n');
        self.text.push_str("  command = ");
        self.text.push_str(&def.command);
        self.text.push('\n');
        if !def.description.is_empty() {
            self.text.push_str("  description = ");
            self.text.push_str(&def.description);
            self.text.push('\n');
        }
        if let Some(depfile) = def.depfile.as_deref() {
            self.text.push_str("  depfile = ");
            self.text.push_str(depfile);
            self.text.push('\n');
        }
        if let Some(deps) = def.deps.as_deref() {
            self.text.push_str("  deps = ");
            self.text.push_str(deps);
            self.text.push('\n');
        }
        if def.generator {
            self.text.push_str("  generator = 1\n");
        }
        if def.restat {
            self.text.push_str("  restat = 1\n");
        }
        Ok(())
    }

    pub fn build(&mut self, stmt: &BuildStatement) -> Result<()> {
        if stmt.outputs.is_empty() {
            return Err(Error::script(format!(
                "build statement for rule '{}' has no outputs",
                stmt.rule
            )));
        }
        if stmt.rule != "phony" && !self.rules.contains(&stmt.rule) {
            return Err(Error::script(format!(
                "build statement for '{}' references undefined rule '{}'",
                stmt.outputs[0], stmt.rule
            )));
        }
        // Every generated input must already have a producing statement.
        // Tripping this is a generator defect, not a user error.
        for input in stmt
            .inputs
            .iter()
            .chain(&stmt.implicit)
            .chain(&stmt.order_only)
        {
            if input.starts_with(BUILD_DIR) && !self.outputs.contains(input) {
                return Err(Error::script(format!(
                    "statement for '{}' consumes '{}' before any statement produces it",
                    stmt.outputs[0], input
                )));
            }
        }
        for output in &stmt.outputs {
            if !self.outputs.insert(output.clone()) {
                return Err(Error::script(format!(
                    "output '{}' is produced by more than one build statement",
                    output
                )));
            }
        }

        self.text.push_str("build ");
        push_paths(&mut self.text, &stmt.outputs);
        self.text.push_str(": ");
        self.text.push_str(&stmt.rule);
        if !stmt.inputs.is_empty() {
            self.text.push(' ');
            push_paths(&mut self.text, &stmt.inputs);
        }
        if !stmt.implicit.is_empty() {
            self.text.push_str(" | ");
            push_paths(&mut self.text, &stmt.implicit);
        }
        if !stmt.order_only.is_empty() {
            self.text.push_str(" || ");
            push_paths(&mut self.text, &stmt.order_only);
        }
        self.text.push('\n');
        for (name, value) in &stmt.vars {
            self.text.push_str("  ");
            self.text.push_str(name);
            self.text.push_str(" = ");
            self.text.push_str(value);
            self.text.push('\n');
        }
        Ok(())
    }

    pub fn default_target(&mut self, target: &str) {
        self.text.push_str("default ");
        self.text.push_str(&escape_path(target));
        self.text.push('\n');
    }

    pub fn has_output(&self, path: &str) -> bool {
        self.outputs.contains(path)
    }

    // Hex SHA-256 of arbitrary content. Used where staleness must track
    // content that file timestamps cannot see (command-line flags, inline
    // configuration).
    pub fn content_signature(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }

    pub fn into_script(self) -> String {
        self.text
    }

    // Persist the buffered script, atomically, exactly once. Until this
    // succeeds the target path is untouched.
    pub fn commit(self) -> Result<PathBuf> {
        let parent = self
            .script_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("failed to create {}: {e}", parent.display())))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| Error::io(format!("failed to stage script in {}: {e}", parent.display())))?;
        tmp.write_all(self.text.as_bytes()).map_err(|e| {
            Error::io(format!(
                "failed to write {}: {e}",
                self.script_path.display()
            ))
        })?;
        tmp.persist(&self.script_path).map_err(|e| {
            Error::io(format!(
                "failed to persist {}: {e}",
                self.script_path.display()
            ))
        })?;
        Ok(self.script_path)
    }
}

// Ninja wants space and ':' escaped in paths. '$' passes through: emitted
// paths reference variables like $builddir on purpose.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        match ch {
            ' ' => out.push_str("$ "),
            ':' => out.push_str("$:"),
            _ => out.push(ch),
        }
    }
    out
}

fn push_paths(text: &mut String, paths: &[String]) {
    for (i, path) in paths.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        text.push_str(&escape_path(path));
    }
}
