//! Task registry and orchestration.
//!
//! The [`Orchestrator`] owns every registered [`Stage`], the named groups
//! over them, and the shared [`ChangeCache`]. Nothing here is a global:
//! callers hold the orchestrator and pass it where it is needed.
//!
//! Misconfiguration (duplicate task names, two stages writing to the same
//! destination, groups naming unknown tasks) is rejected at registration
//! time, before any stage runs.

use crate::config::SiteConfig;
use crate::pipeline::cache::ChangeCache;
use crate::pipeline::result::{GroupResult, RunResult};
use crate::pipeline::source::SourceSpec;
use crate::pipeline::stage::Stage;
use crate::pipeline::transform::{CopyFile, ImageResize, MinifyScript, Stylesheet, Template};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use thiserror::Error;

/// How a group dispatches its member stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Fan stages out across worker threads
    Parallel,
    /// Run stages one at a time, in declaration order
    Sequential,
}

/// Registry misconfiguration, reported before anything runs.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A task or group with this name already exists
    #[error("Duplicate task name '{0}'")]
    DuplicateName(String),
    /// Two stages write to the same destination directory
    #[error("Tasks '{first}' and '{second}' share destination '{}'", destination.display())]
    DuplicateDestination { first: String, second: String, destination: PathBuf },
    /// A run or group referenced a task that was never registered
    #[error("Unknown task '{0}'")]
    UnknownTask(String),
    /// A group member does not name a registered stage
    #[error("Group '{group}' references unknown task '{task}'")]
    UnknownGroupMember { group: String, task: String },
    /// A stage could not be constructed
    #[error("Failed to set up task '{name}': {message}")]
    TaskInit { name: String, message: String },
}

struct Group {
    members: Vec<String>,
    concurrency: Concurrency,
}

/// Owns the registered stages, groups, and the change cache.
pub struct Orchestrator {
    stages: Vec<Stage>,
    by_name: HashMap<String, usize>,
    groups: Vec<(String, Group)>,
    cache: ChangeCache,
}

impl Orchestrator {
    /// Create an empty orchestrator.
    pub fn new() -> Self {
        Self { stages: Vec::new(), by_name: HashMap::new(), groups: Vec::new(), cache: ChangeCache::new() }
    }

    /// Register a stage under its own name.
    ///
    /// Rejects duplicate names (including group names) and destinations
    /// already claimed by another stage. Destinations are compared after
    /// lexical normalization; distinct directories may nest, since a stage
    /// writing at a root and another writing in a subdirectory produce
    /// disjoint files.
    pub fn register(&mut self, stage: Stage) -> Result<(), RegistryError> {
        let name = stage.name().to_string();
        if self.by_name.contains_key(&name) || self.groups.iter().any(|(g, _)| *g == name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let destination = normalize(stage.destination());
        for existing in &self.stages {
            if normalize(existing.destination()) == destination {
                return Err(RegistryError::DuplicateDestination {
                    first: existing.name().to_string(),
                    second: name,
                    destination,
                });
            }
        }

        self.by_name.insert(name, self.stages.len());
        self.stages.push(stage);
        Ok(())
    }

    /// Define a named group over registered stages.
    pub fn define_group(
        &mut self,
        name: impl Into<String>,
        members: Vec<String>,
        concurrency: Concurrency,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.by_name.contains_key(&name) || self.groups.iter().any(|(g, _)| *g == name) {
            return Err(RegistryError::DuplicateName(name));
        }
        for member in &members {
            if !self.by_name.contains_key(member) {
                return Err(RegistryError::UnknownGroupMember {
                    group: name,
                    task: member.clone(),
                });
            }
        }

        self.groups.push((name, Group { members, concurrency }));
        Ok(())
    }

    /// Run a task by name: a single stage or a whole group.
    pub fn run(&self, name: &str) -> Result<GroupResult, RegistryError> {
        if let Some(group) = self.groups.iter().find(|(g, _)| g == name).map(|(_, g)| g) {
            return Ok(self.run_members(&group.members, group.concurrency));
        }

        match self.by_name.get(name) {
            Some(&idx) => {
                let start = Instant::now();
                let mut group = GroupResult::new();
                group.add(self.stages[idx].run(&self.cache));
                group.duration = start.elapsed();
                Ok(group)
            }
            None => Err(RegistryError::UnknownTask(name.to_string())),
        }
    }

    /// Run a set of registered stages with the given concurrency.
    pub fn run_group(
        &self,
        members: &[String],
        concurrency: Concurrency,
    ) -> Result<GroupResult, RegistryError> {
        for member in members {
            if !self.by_name.contains_key(member) {
                return Err(RegistryError::UnknownTask(member.clone()));
            }
        }
        Ok(self.run_members(members, concurrency))
    }

    fn run_members(&self, members: &[String], concurrency: Concurrency) -> GroupResult {
        let start = Instant::now();
        let mut result = GroupResult::new();

        let indices: Vec<usize> =
            members.iter().filter_map(|m| self.by_name.get(m).copied()).collect();

        match concurrency {
            Concurrency::Sequential => {
                for idx in indices {
                    result.add(self.stages[idx].run(&self.cache));
                }
            }
            Concurrency::Parallel => {
                for run in self.run_parallel(&indices) {
                    result.add(run);
                }
            }
        }

        result.duration = start.elapsed();
        result
    }

    /// Worker-loop dispatch: each thread pulls the next stage index off a
    /// shared counter until the list is drained.
    fn run_parallel(&self, indices: &[usize]) -> Vec<RunResult> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(indices.len())
            .max(1);

        let next = AtomicUsize::new(0);
        let results: Mutex<Vec<RunResult>> = Mutex::new(Vec::with_capacity(indices.len()));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    if i >= indices.len() {
                        break;
                    }
                    let run = self.stages[indices[i]].run(&self.cache);
                    if let Ok(mut results) = results.lock() {
                        results.push(run);
                    }
                });
            }
        });

        results.into_inner().unwrap_or_default()
    }

    /// Look up a registered stage.
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.by_name.get(name).map(|&idx| &self.stages[idx])
    }

    /// Registered stage names, in registration order.
    pub fn task_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Defined groups with their member names, in definition order.
    pub fn groups(&self) -> Vec<(&str, &[String])> {
        self.groups.iter().map(|(name, g)| (name.as_str(), g.members.as_slice())).collect()
    }

    /// Member names of a group, if defined.
    pub fn group_members(&self, name: &str) -> Option<&[String]> {
        self.groups.iter().find(|(g, _)| g == name).map(|(_, g)| g.members.as_slice())
    }

    /// The shared change cache.
    pub fn cache(&self) -> &ChangeCache {
        &self.cache
    }

    /// Build the standard task set from configuration.
    ///
    /// Roots are resolved against `project_root` (the directory holding
    /// mill.toml). Develop stages read the source root and write under the
    /// dev root; production stages read the dev root and write under the
    /// publish root.
    pub fn from_config(config: &SiteConfig, project_root: &Path) -> Result<Self, RegistryError> {
        let source = project_root.join(&config.project.source);
        let dev = project_root.join(&config.project.dev);
        let publish = project_root.join(&config.project.publish);

        let mut orch = Self::new();

        // Develop: source -> dev
        orch.register(
            Stage::new(
                "styles",
                &source,
                SourceSpec::new(config.styles.include.clone())
                    .with_excludes(config.styles.exclude.clone()),
                Box::new(Stylesheet::new()),
                dev.join(&config.styles.dest),
            )
            .with_base(pattern_base(&config.styles.include)),
        )?;

        let template = Template::new(
            &source.join(&config.templates.partials),
            &config.templates.index,
        )
        .map_err(|e| RegistryError::TaskInit { name: "markup".to_string(), message: e.to_string() })?;
        // Partials are excluded as inputs but still rerun the stage in
        // watch mode
        let partials_glob =
            format!("{}/**", config.templates.partials.to_string_lossy().replace('\\', "/"));
        orch.register(
            Stage::new(
                "markup",
                &source,
                SourceSpec::new(config.templates.include.clone())
                    .with_excludes(config.templates.exclude.clone()),
                Box::new(template),
                &dev,
            )
            .with_base(pattern_base(&config.templates.include))
            .with_triggers(SourceSpec::new(vec![partials_glob])),
        )?;

        orch.register(
            Stage::new(
                "scripts",
                &source,
                SourceSpec::new(config.scripts.include.clone())
                    .with_excludes(config.scripts.exclude.clone()),
                Box::new(CopyFile),
                dev.join(&config.scripts.dest),
            )
            .with_base(pattern_base(&config.scripts.include)),
        )?;

        orch.register(
            Stage::new(
                "fonts",
                &source,
                SourceSpec::new(config.fonts.include.clone()),
                Box::new(CopyFile),
                dev.join(&config.fonts.dest),
            )
            .with_base(pattern_base(&config.fonts.include)),
        )?;

        orch.register(
            Stage::new(
                "images",
                &source,
                SourceSpec::new(config.images.include.clone()),
                Box::new(
                    ImageResize::new(config.images.widths.clone(), config.images.quality)
                        .with_original_copy()
                        .with_lazy_suffix(config.images.lazy_suffix.clone()),
                ),
                dev.join(&config.images.dest),
            )
            .with_base(pattern_base(&config.images.include))
            .with_cache(),
        )?;

        // Production: dev -> publish
        orch.register(
            Stage::new(
                "publish-styles",
                &dev,
                SourceSpec::new(vec![format!("{}/*.css", config.styles.dest)]),
                Box::new(Stylesheet::minified()),
                publish.join(&config.styles.dest),
            )
            .with_base(&config.styles.dest),
        )?;

        orch.register(
            Stage::new(
                "publish-markup",
                &dev,
                SourceSpec::new(vec!["**/*.html".to_string()]),
                Box::new(CopyFile),
                &publish,
            ),
        )?;

        orch.register(
            Stage::new(
                "publish-scripts",
                &dev,
                SourceSpec::new(vec![format!("{}/*.js", config.scripts.dest)]),
                Box::new(MinifyScript),
                publish.join(&config.scripts.dest),
            )
            .with_base(&config.scripts.dest),
        )?;

        orch.register(
            Stage::new(
                "publish-images",
                &dev,
                SourceSpec::new(vec![
                    format!("{}/**/*.jpg", config.images.dest),
                    format!("{}/**/*.png", config.images.dest),
                    format!("{}/**/*.gif", config.images.dest),
                ]),
                Box::new(CopyFile),
                publish.join(&config.images.dest),
            )
            .with_base(&config.images.dest),
        )?;

        orch.register(
            Stage::new(
                "publish-fonts",
                &dev,
                SourceSpec::new(vec![
                    format!("{}/*.woff", config.fonts.dest),
                    format!("{}/*.woff2", config.fonts.dest),
                ]),
                Box::new(CopyFile),
                publish.join(&config.fonts.dest),
            )
            .with_base(&config.fonts.dest),
        )?;

        orch.define_group(
            "develop",
            vec![
                "styles".to_string(),
                "markup".to_string(),
                "scripts".to_string(),
                "fonts".to_string(),
                "images".to_string(),
            ],
            Concurrency::Parallel,
        )?;

        orch.define_group(
            "production",
            vec![
                "publish-styles".to_string(),
                "publish-markup".to_string(),
                "publish-scripts".to_string(),
                "publish-images".to_string(),
                "publish-fonts".to_string(),
            ],
            Concurrency::Parallel,
        )?;

        Ok(orch)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexically normalize a path for destination comparison.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// The literal directory prefix of a set of glob patterns, used as the
/// stage base. `img/**/*.jpg` yields `img`.
fn pattern_base(patterns: &[String]) -> PathBuf {
    let Some(first) = patterns.first() else {
        return PathBuf::new();
    };

    let mut base = PathBuf::new();
    for part in first.split('/') {
        if part.contains(['*', '?', '[']) {
            break;
        }
        base.push(part);
    }
    // A pattern with no glob characters names a file; its parent is the base
    if base == Path::new(first) {
        base.pop();
    }
    base
}
