//! Distribution descriptor
//!
//! Identity, dependency contract and module discovery rule of the `swn`
//! packages. The version, name and dependency list are read from Cargo at
//! compile time so that the workspace manifest stays the only place they
//! are written down.

use crate::error::{Error, Result};
use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// Person credited in the package metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: Option<String>,
}

/// A runtime dependency with its version requirement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Cargo-style requirement, `*` when unconstrained
    pub requirement: String,
    /// Capability this dependency provides
    pub provides: String,
}

impl Dependency {
    pub fn new(name: &str, requirement: &str, provides: &str) -> Self {
        Self {
            name: name.to_string(),
            requirement: requirement.to_string(),
            provides: provides.to_string(),
        }
    }

    /// Parsed version requirement
    pub fn version_req(&self) -> Result<VersionReq> {
        VersionReq::parse(&self.requirement).map_err(|e| {
            Error::Packaging(format!(
                "invalid requirement {:?} for {}: {}",
                self.requirement, self.name, e
            ))
        })
    }
}

/// Which modules belong in the distributed artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRule {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for DiscoveryRule {
    fn default() -> Self {
        Self {
            include: vec!["*".to_string()],
            exclude: vec!["tests".to_string(), "tests::*".to_string()],
        }
    }
}

impl DiscoveryRule {
    /// True when `module_path` matches an exclusion pattern.
    ///
    /// Patterns are matched against the full path and against every
    /// suffix that starts at a `::` boundary, so `tests` also excludes
    /// `network::tests`.
    pub fn is_excluded(&self, module_path: &str) -> bool {
        let segments: Vec<&str> = module_path.split("::").collect();
        (0..segments.len()).any(|i| {
            let suffix = segments[i..].join("::");
            self.exclude.iter().any(|p| pattern_matches(p, &suffix))
        })
    }

    /// True when `module_path` is included and not excluded
    pub fn admits(&self, module_path: &str) -> bool {
        self.include.iter().any(|p| pattern_matches(p, module_path)) && !self.is_excluded(module_path)
    }
}

/// Glob match where `*` spans any run of characters
fn pattern_matches(pattern: &str, text: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == text,
        Some((head, tail)) => {
            let Some(rest) = text.strip_prefix(head) else {
                return false;
            };
            if tail.is_empty() {
                return true;
            }
            (0..=rest.len())
                .filter(|&i| rest.is_char_boundary(i))
                .any(|i| pattern_matches(tail, &rest[i..]))
        }
    }
}

/// Capabilities the library needs, each provided exactly once
pub const REQUIRED_CAPABILITIES: [&str; 4] = [
    "planar geometry",
    "spatial index",
    "vector data I/O",
    "coordinate reference systems",
];

/// Contract generated by `build.rs` from `[workspace.metadata.distribution]`
mod generated {
    include!(concat!(env!("OUT_DIR"), "/distribution.rs"));
}

/// Package identity and dependency contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub authors: Vec<Author>,
    pub license: String,
    pub classifiers: Vec<String>,
    /// Label and URL pairs
    pub urls: Vec<(String, String)>,
    pub rust_version: String,
    pub dependencies: Vec<Dependency>,
    /// Capabilities implemented inside the library rather than by a dependency
    pub internal_capabilities: Vec<String>,
    pub discovery: DiscoveryRule,
}

impl PackageDescriptor {
    /// Descriptor of this build.
    ///
    /// The distribution spans several crates, so its name, summary and
    /// dependency list come from the workspace manifest. Version, license
    /// and authors are inherited by every member from `[workspace.package]`.
    pub fn current() -> Self {
        let authors = env!("CARGO_PKG_AUTHORS")
            .split(':')
            .filter(|s| !s.trim().is_empty())
            .map(parse_author)
            .collect();
        let repository = env!("CARGO_PKG_REPOSITORY");
        Self {
            name: generated::NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: generated::DESCRIPTION.to_string(),
            authors,
            license: env!("CARGO_PKG_LICENSE").to_string(),
            classifiers: vec![
                "Development Status :: 3 - Alpha".to_string(),
                "Intended Audience :: Science/Research".to_string(),
                "License :: OSI Approved :: BSD License".to_string(),
                "Programming Language :: Rust".to_string(),
                "Topic :: Scientific/Engineering :: GIS".to_string(),
                "Topic :: Scientific/Engineering :: Hydrology".to_string(),
            ],
            urls: vec![
                ("Documentation".to_string(), generated::DOCUMENTATION.to_string()),
                ("Source".to_string(), repository.to_string()),
                ("Bug Reports".to_string(), format!("{}/issues", repository)),
            ],
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            dependencies: generated::DEPENDENCIES
                .iter()
                .map(|(name, req, provides)| Dependency::new(name, req, provides))
                .collect(),
            internal_capabilities: generated::INTERNAL.iter().map(|c| c.to_string()).collect(),
            discovery: DiscoveryRule::default(),
        }
    }

    /// Build-time consistency checks
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Packaging("package name is empty".into()));
        }
        Version::parse(&self.version).map_err(|e| {
            Error::Packaging(format!("invalid version {:?}: {}", self.version, e))
        })?;
        parse_rust_version(&self.rust_version)?;

        let mut by_name: BTreeMap<&str, Vec<VersionReq>> = BTreeMap::new();
        for dep in &self.dependencies {
            let req = dep.version_req()?;
            by_name.entry(dep.name.as_str()).or_default().push(req);
        }
        for (name, reqs) in &by_name {
            if !satisfiable(reqs) {
                let listed = reqs.iter().map(ToString::to_string).collect::<Vec<_>>();
                return Err(Error::Packaging(format!(
                    "conflicting requirements for {}: {}",
                    name,
                    listed.join(" and ")
                )));
            }
        }
        self.check_capabilities()
    }

    /// Each required capability comes from exactly one dependency, or from
    /// the library itself
    fn check_capabilities(&self) -> Result<()> {
        for capability in REQUIRED_CAPABILITIES {
            let mut providers: BTreeSet<&str> = self
                .dependencies
                .iter()
                .filter(|d| d.provides == capability)
                .map(|d| d.name.as_str())
                .collect();
            if self.internal_capabilities.iter().any(|c| c == capability) {
                providers.insert(self.name.as_str());
            }
            match providers.len() {
                0 => {
                    return Err(Error::Packaging(format!(
                        "no dependency provides {}",
                        capability
                    )))
                }
                1 => {}
                _ => {
                    let listed = providers.into_iter().collect::<Vec<_>>();
                    return Err(Error::Packaging(format!(
                        "{} is provided more than once: {}",
                        capability,
                        listed.join(" and ")
                    )));
                }
            }
        }
        Ok(())
    }

    /// Render the metadata record, one `Key: value` per line
    pub fn metadata(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Metadata-Version: 2.1")?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Summary: {}", self.description)?;
        for author in &self.authors {
            match &author.email {
                Some(email) => writeln!(f, "Author: {} <{}>", author.name, email)?,
                None => writeln!(f, "Author: {}", author.name)?,
            }
        }
        writeln!(f, "License: {}", self.license)?;
        for classifier in &self.classifiers {
            writeln!(f, "Classifier: {}", classifier)?;
        }
        for (label, url) in &self.urls {
            writeln!(f, "Project-URL: {}, {}", label, url)?;
        }
        writeln!(f, "Requires-Rust: >={}", self.rust_version)?;
        for dep in &self.dependencies {
            writeln!(f, "Requires-Dist: {} ({})", dep.name, dep.requirement)?;
        }
        Ok(())
    }
}

fn parse_author(s: &str) -> Author {
    let s = s.trim();
    match s.split_once('<') {
        Some((name, rest)) => Author {
            name: name.trim().to_string(),
            email: Some(rest.trim_end_matches('>').trim().to_string()),
        },
        None => Author {
            name: s.to_string(),
            email: None,
        },
    }
}

/// `rust-version` may omit the patch (or minor) component
fn parse_rust_version(s: &str) -> Result<Version> {
    let mut parts: Vec<&str> = s.trim().split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&parts.join("."))
        .map_err(|e| Error::Packaging(format!("invalid rust-version {:?}: {}", s, e)))
}

/// Versions at and around every comparator bound; if none of them
/// satisfies all requirements, no version does.
fn candidate_versions(reqs: &[VersionReq]) -> Vec<Version> {
    let mut out = vec![Version::new(0, 0, 0)];
    for c in reqs.iter().flat_map(|r| r.comparators.iter()) {
        out.extend(comparator_bounds(c));
    }
    out
}

fn comparator_bounds(c: &Comparator) -> Vec<Version> {
    let minor = c.minor.unwrap_or(0);
    let patch = c.patch.unwrap_or(0);
    let mut out = vec![Version::new(c.major, minor, patch)];
    // Bounds at u64::MAX have no successor
    out.extend(patch.checked_add(1).map(|p| Version::new(c.major, minor, p)));
    out.extend(minor.checked_add(1).map(|m| Version::new(c.major, m, 0)));
    out.extend(c.major.checked_add(1).map(|m| Version::new(m, 0, 0)));
    if matches!(c.op, Op::Less | Op::LessEq) {
        if patch > 0 {
            out.push(Version::new(c.major, minor, patch - 1));
        } else if minor > 0 {
            out.push(Version::new(c.major, minor - 1, u64::MAX));
        } else if c.major > 0 {
            out.push(Version::new(c.major - 1, u64::MAX, u64::MAX));
        }
    }
    // A prerelease only matches a comparator on the same major.minor.patch
    // that also names a prerelease, so try the bound's own tag and the
    // next tag above it.
    if !c.pre.is_empty() {
        let with_pre = |pre: Prerelease| Version {
            pre,
            ..Version::new(c.major, minor, patch)
        };
        out.push(with_pre(c.pre.clone()));
        if let Ok(next) = Prerelease::new(&format!("{}.0", c.pre)) {
            out.push(with_pre(next));
        }
    }
    out
}

fn satisfiable(reqs: &[VersionReq]) -> bool {
    candidate_versions(reqs)
        .iter()
        .any(|v| reqs.iter().all(|r| r.matches(v)))
}

/// Walk a Rust source tree and list the module paths admitted by `rule`.
///
/// `lib.rs` and `main.rs` at the root are the crate itself; `foo.rs` and
/// `foo/mod.rs` both give `foo`.
pub fn discover_modules(src_root: &Path, rule: &DiscoveryRule) -> Result<Vec<String>> {
    let mut modules = Vec::new();
    collect_modules(src_root, &mut Vec::new(), &mut modules)?;
    let mut admitted: Vec<String> = modules.into_iter().filter(|m| rule.admits(m)).collect();
    admitted.sort();
    admitted.dedup();
    Ok(admitted)
}

fn collect_modules(dir: &Path, prefix: &mut Vec<String>, out: &mut Vec<String>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        if path.is_dir() {
            prefix.push(stem);
            out.push(prefix.join("::"));
            collect_modules(&path, prefix, out)?;
            prefix.pop();
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            let is_root = prefix.is_empty() && (stem == "lib" || stem == "main");
            if is_root || stem == "mod" {
                continue;
            }
            prefix.push(stem);
            out.push(prefix.join("::"));
            prefix.pop();
        }
    }
    Ok(())
}

/// A built distribution: metadata plus the modules it ships
#[derive(Debug, Clone, Serialize)]
pub struct Distribution {
    pub metadata: String,
    pub modules: Vec<String>,
}

impl Distribution {
    /// Validate `descriptor` and collect the modules under `src_root`
    pub fn build(descriptor: &PackageDescriptor, src_root: &Path) -> Result<Self> {
        descriptor.validate()?;
        let modules = discover_modules(src_root, &descriptor.discovery)?;
        let test_rule = DiscoveryRule::default();
        if let Some(leaked) = modules.iter().find(|m| test_rule.is_excluded(m)) {
            return Err(Error::Packaging(format!(
                "test module {} would be included in the distribution",
                leaked
            )));
        }
        tracing::debug!("{} modules in {} {}", modules.len(), descriptor.name, descriptor.version);
        Ok(Self {
            metadata: descriptor.metadata(),
            modules,
        })
    }
}
