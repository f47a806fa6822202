//! Generates the distribution contract from the workspace manifest.
//!
//! Every runtime dependency of the distribution members must have a
//! capability in `[workspace.metadata.distribution.capabilities]`, and every
//! capability listed there must belong to a dependency, so the descriptor
//! cannot drift from what the crates actually use.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use toml::Value;

#[derive(Deserialize)]
struct Manifest {
    workspace: Option<Workspace>,
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct Workspace {
    package: WorkspacePackage,
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    metadata: WorkspaceMetadata,
}

#[derive(Deserialize)]
struct WorkspacePackage {
    description: String,
    documentation: String,
}

#[derive(Deserialize)]
struct WorkspaceMetadata {
    distribution: DistributionTable,
}

#[derive(Deserialize)]
struct DistributionTable {
    name: String,
    members: Vec<String>,
    #[serde(default)]
    internal: Vec<String>,
    capabilities: BTreeMap<String, String>,
}

fn read_manifest(path: &Path) -> Result<Manifest, Box<dyn Error>> {
    println!("cargo:rerun-if-changed={}", path.display());
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(toml::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))?)
}

/// Version requirement of a dependency entry, or None for optional and
/// path dependencies
fn requirement(
    name: &str,
    entry: &Value,
    inherited: &BTreeMap<String, Value>,
) -> Result<Option<String>, String> {
    let table = match entry {
        Value::String(req) => return Ok(Some(req.clone())),
        Value::Table(table) => table,
        _ => return Err(format!("unsupported dependency entry for {}", name)),
    };
    if table.get("optional").and_then(Value::as_bool) == Some(true) {
        return Ok(None);
    }
    if table.get("workspace").and_then(Value::as_bool) == Some(true) {
        let entry = inherited
            .get(name)
            .ok_or_else(|| format!("{} is not in [workspace.dependencies]", name))?;
        return requirement(name, entry, inherited);
    }
    if table.contains_key("path") {
        return Ok(None);
    }
    Ok(Some(
        table.get("version").and_then(Value::as_str).unwrap_or("*").to_string(),
    ))
}

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    let root = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?).join("../..");
    let workspace = read_manifest(&root.join("Cargo.toml"))?
        .workspace
        .ok_or("root manifest has no [workspace] table")?;
    let dist = &workspace.metadata.distribution;

    let mut dependencies: Vec<(String, String, String)> = Vec::new();
    for member in &dist.members {
        let manifest = read_manifest(&root.join(member).join("Cargo.toml"))?;
        for (name, entry) in &manifest.dependencies {
            let Some(req) = requirement(name, entry, &workspace.dependencies)? else {
                continue;
            };
            let provides = dist.capabilities.get(name).ok_or_else(|| {
                format!(
                    "{} depends on {} but [workspace.metadata.distribution.capabilities] does not list it",
                    member, name
                )
            })?;
            if !dependencies.iter().any(|(n, r, _)| n == name && *r == req) {
                dependencies.push((name.clone(), req, provides.clone()));
            }
        }
    }
    if let Some(stale) = dist.capabilities.keys().find(|k| !dependencies.iter().any(|(n, _, _)| n == *k)) {
        return Err(format!("capability listed for {} which no distribution member depends on", stale).into());
    }

    let mut out = String::new();
    writeln!(out, "pub(crate) const NAME: &str = {:?};", dist.name)?;
    writeln!(out, "pub(crate) const DESCRIPTION: &str = {:?};", workspace.package.description)?;
    writeln!(out, "pub(crate) const DOCUMENTATION: &str = {:?};", workspace.package.documentation)?;
    writeln!(out, "pub(crate) const INTERNAL: &[&str] = &{:?};", dist.internal)?;
    writeln!(out, "pub(crate) const DEPENDENCIES: &[(&str, &str, &str)] = &[")?;
    for (name, req, provides) in &dependencies {
        writeln!(out, "    ({:?}, {:?}, {:?}),", name, req, provides)?;
    }
    writeln!(out, "];")?;
    fs::write(PathBuf::from(env::var("OUT_DIR")?).join("distribution.rs"), out)?;
    Ok(())
}
