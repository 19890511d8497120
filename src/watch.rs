//! Watch mode for automatic rebuilds on file changes
//!
//! Provides debounced file system watching for the `mill watch` command.
//! Each watched stage carries an explicit state machine so a change that
//! arrives while its stage is running schedules exactly one rerun instead
//! of overlapping or losing work.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::time::Duration;
use thiserror::Error;

use crate::config::WatchConfig;
use crate::pipeline::registry::{Orchestrator, RegistryError};

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(notify::Error),
    /// Channel receive error
    #[error("Watch channel error: {0}")]
    Channel(String),
    /// Source directory not found
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// The watched group is not defined
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Run state of one watched stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageState {
    /// No run in progress, no change pending
    #[default]
    Idle,
    /// A run is in progress
    Running,
    /// A change arrived during the current run; rerun when it completes
    PendingRerun,
}

impl StageState {
    /// A change event arrived. Returns the next state and whether a run
    /// should start now.
    pub fn on_event(self) -> (StageState, bool) {
        match self {
            StageState::Idle => (StageState::Running, true),
            StageState::Running | StageState::PendingRerun => (StageState::PendingRerun, false),
        }
    }

    /// The current run completed. Returns the next state and whether the
    /// stage should run again immediately.
    pub fn on_complete(self) -> (StageState, bool) {
        match self {
            StageState::PendingRerun => (StageState::Running, true),
            StageState::Running | StageState::Idle => (StageState::Idle, false),
        }
    }
}

/// Watches the source root and reruns the stages of one group on change.
pub struct WatchController<'a> {
    orchestrator: &'a Orchestrator,
    group: String,
    source_root: PathBuf,
    config: WatchConfig,
    verbose: bool,
}

impl<'a> WatchController<'a> {
    /// Create a controller for a registered group.
    pub fn new(
        orchestrator: &'a Orchestrator,
        group: impl Into<String>,
        source_root: impl Into<PathBuf>,
        config: WatchConfig,
    ) -> Self {
        Self {
            orchestrator,
            group: group.into(),
            source_root: source_root.into(),
            config,
            verbose: false,
        }
    }

    /// Enable per-file logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Map changed paths to the names of group members whose source spec
    /// or trigger patterns select them.
    pub fn affected_stages(&self, changed: &[PathBuf]) -> BTreeSet<String> {
        let members = self.orchestrator.group_members(&self.group).unwrap_or(&[]);
        let mut affected = BTreeSet::new();

        for path in changed {
            let Ok(relative) = path.strip_prefix(&self.source_root) else {
                continue;
            };
            for member in members {
                if affected.contains(member) {
                    continue;
                }
                let selected = self
                    .orchestrator
                    .stage(member)
                    .is_some_and(|stage| stage.rebuilds_on(relative));
                if selected {
                    affected.insert(member.clone());
                }
            }
        }

        affected
    }

    /// Run the full group once, then watch until the process is
    /// interrupted. Build failures never end the session.
    pub fn run(&self) -> Result<(), WatchError> {
        if !self.source_root.exists() {
            return Err(WatchError::SourceNotFound(self.source_root.clone()));
        }
        if self.orchestrator.group_members(&self.group).is_none() {
            return Err(RegistryError::UnknownTask(self.group.clone()).into());
        }

        let (tx, rx) = channel();
        let debounce = Duration::from_millis(self.config.debounce_ms as u64);
        let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::WatcherInit)?;
        debouncer
            .watcher()
            .watch(&self.source_root, RecursiveMode::Recursive)
            .map_err(WatchError::WatchPath)?;

        // Initial full run
        if self.config.clear_screen {
            clear_screen();
        }
        println!("[{}] Running '{}'...", timestamp(), self.group);
        let initial = self.orchestrator.run(&self.group)?;
        self.print_summary(&initial.summary());
        println!(
            "[{}] Watching {} for changes...",
            timestamp(),
            self.source_root.display()
        );

        let mut states: HashMap<String, StageState> = HashMap::new();

        loop {
            match rx.recv() {
                Ok(Ok(events)) => {
                    let changed = relevant_paths(&events);
                    if changed.is_empty() {
                        continue;
                    }
                    if self.verbose {
                        for path in &changed {
                            if let Some(name) = path.file_name() {
                                println!("[{}] Changed: {}", timestamp(), name.to_string_lossy());
                            }
                        }
                    }

                    let mut to_run = Vec::new();
                    for member in self.affected_stages(&changed) {
                        let state = states.entry(member.clone()).or_default();
                        let (next, start) = state.on_event();
                        *state = next;
                        if start {
                            to_run.push(member);
                        }
                    }

                    if to_run.is_empty() {
                        continue;
                    }

                    if self.config.clear_screen {
                        clear_screen();
                    }
                    self.run_stages(&to_run, &mut states, &rx);
                    println!(
                        "[{}] Watching {} for changes...",
                        timestamp(),
                        self.source_root.display()
                    );
                }
                Ok(Err(error)) => {
                    eprintln!("[{}] Watch error: {}", timestamp(), error);
                }
                Err(e) => {
                    return Err(WatchError::Channel(e.to_string()));
                }
            }
        }
    }

    /// Run stages until every state machine settles back to Idle. Events
    /// arriving mid-run are folded in through `on_event`, so a stage whose
    /// sources change while it runs goes around once more.
    fn run_stages(
        &self,
        initial: &[String],
        states: &mut HashMap<String, StageState>,
        rx: &std::sync::mpsc::Receiver<notify_debouncer_mini::DebounceEventResult>,
    ) {
        let mut queue: Vec<String> = initial.to_vec();

        while let Some(name) = queue.pop() {
            if let Some(stage) = self.orchestrator.stage(&name) {
                println!("[{}] Running '{}'...", timestamp(), name);
                let result = stage.run(self.orchestrator.cache());
                self.print_summary(&result.summary());
            }

            // Fold in anything that changed while the stage ran
            while let Ok(Ok(events)) = rx.try_recv() {
                let changed = relevant_paths(&events);
                for member in self.affected_stages(&changed) {
                    let state = states.entry(member.clone()).or_default();
                    let (next, start) = state.on_event();
                    *state = next;
                    if start {
                        queue.push(member);
                    }
                }
            }

            let state = states.entry(name.clone()).or_default();
            let (next, rerun) = state.on_complete();
            *state = next;
            if rerun {
                queue.push(name);
            }
        }
    }

    fn print_summary(&self, summary: &str) {
        for line in summary.lines() {
            println!("[{}] {}", timestamp(), line);
        }
    }
}

/// Extract the changed paths worth reacting to.
fn relevant_paths(events: &[DebouncedEvent]) -> Vec<PathBuf> {
    events
        .iter()
        .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
        .map(|e| e.path.clone())
        .collect()
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

/// Get current timestamp for logging
pub(crate) fn timestamp() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs() % 86400; // seconds since midnight
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_state_idle_event_starts_run() {
        let (next, start) = StageState::Idle.on_event();
        assert_eq!(next, StageState::Running);
        assert!(start);
    }

    #[test]
    fn test_state_running_event_sets_pending() {
        let (next, start) = StageState::Running.on_event();
        assert_eq!(next, StageState::PendingRerun);
        assert!(!start);
    }

    #[test]
    fn test_state_pending_event_stays_pending() {
        let (next, start) = StageState::PendingRerun.on_event();
        assert_eq!(next, StageState::PendingRerun);
        assert!(!start);
    }

    #[test]
    fn test_state_complete_with_pending_reruns() {
        let (next, rerun) = StageState::PendingRerun.on_complete();
        assert_eq!(next, StageState::Running);
        assert!(rerun);
    }

    #[test]
    fn test_state_complete_without_pending_idles() {
        let (next, rerun) = StageState::Running.on_complete();
        assert_eq!(next, StageState::Idle);
        assert!(!rerun);
    }

    #[test]
    fn test_state_event_during_rerun_coalesces() {
        // Two changes during one run still produce exactly one rerun
        let state = StageState::Running;
        let (state, _) = state.on_event();
        let (state, _) = state.on_event();
        assert_eq!(state, StageState::PendingRerun);

        let (state, rerun) = state.on_complete();
        assert!(rerun);
        let (state, rerun) = state.on_complete();
        assert_eq!(state, StageState::Idle);
        assert!(!rerun);
    }

    #[test]
    fn test_affected_stages_routing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let config = default_config();
        let orch = Orchestrator::from_config(&config, temp.path()).unwrap();
        let controller = WatchController::new(
            &orch,
            "develop",
            temp.path().join("src"),
            config.watch.clone(),
        );

        let affected = controller.affected_stages(&[
            temp.path().join("src/styles/main.css"),
            temp.path().join("src/scripts/app.js"),
        ]);
        assert!(affected.contains("styles"));
        assert!(affected.contains("scripts"));
        assert!(!affected.contains("markup"));
    }

    #[test]
    fn test_affected_stages_partial_change_routes_to_markup() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let config = default_config();
        let orch = Orchestrator::from_config(&config, temp.path()).unwrap();
        let controller = WatchController::new(
            &orch,
            "develop",
            temp.path().join("src"),
            config.watch.clone(),
        );

        let affected = controller
            .affected_stages(&[temp.path().join("src/templates/partials/footer.html")]);
        assert!(affected.contains("markup"));
    }

    #[test]
    fn test_affected_stages_ignores_paths_outside_root() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();

        let config = default_config();
        let orch = Orchestrator::from_config(&config, temp.path()).unwrap();
        let controller = WatchController::new(
            &orch,
            "develop",
            temp.path().join("src"),
            config.watch.clone(),
        );

        let affected = controller.affected_stages(&[PathBuf::from("/elsewhere/main.css")]);
        assert!(affected.is_empty());
    }

    #[test]
    fn test_watch_source_not_found() {
        let temp = TempDir::new().unwrap();
        let config = default_config();
        let orch = Orchestrator::from_config(&config, temp.path()).unwrap();

        let controller = WatchController::new(
            &orch,
            "develop",
            temp.path().join("missing"),
            config.watch.clone(),
        );
        let result = controller.run();
        assert!(matches!(result, Err(WatchError::SourceNotFound(_))));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.matches(':').count(), 2);
    }
}
