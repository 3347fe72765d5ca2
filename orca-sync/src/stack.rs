//! The [`Stack`] entity and its reconciliation cycle.
//!
//! One cycle runs these steps in order, stopping at the first failure:
//!
//! 1. Fetch the remote definition into `workdir/<id>`.
//! 2. Collect the working directory and load the definition bytes.
//! 3. Build the plan. A definition that does not load stops here, before
//!    anything in the target changes.
//! 4. Materialize into `targetpath/<name>`, rewriting only what differs.
//! 5. Apply, when auto-sync is on and there is drift not yet applied.
//!
//! Only [`crate::FetchError::InvalidRequest`] ends the stack's loop; every other
//! failure is reported through the returned [`CycleStatus`] and retried on the
//! next cycle.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};

use orca_compose::{load, ApplyError, ApplyOptions, ComposeProject, LoadError, Orchestrator};
use orca_core::{AutoSyncFlag, OrcaConfig, RepoConfig, StackId, StackName};

use crate::error::SyncError;
use crate::fetch::Fetcher;
use crate::store::{compose_definition, ArtifactStore};

// ---------------------------------------------------------------------------
// CycleStatus
// ---------------------------------------------------------------------------

/// Outcome of one reconciliation cycle, as shown in the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    PullError,
    ComposeError,
    StartComposeError,
    Synced,
    UpToDate,
    AutosyncOff,
}

impl CycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleStatus::PullError => "PULL ERROR",
            CycleStatus::ComposeError => "COMPOSE ERROR (SYNTAX?)",
            CycleStatus::StartComposeError => "START COMPOSE ERROR",
            CycleStatus::Synced => "SYNCED",
            CycleStatus::UpToDate => "UP TO DATE",
            CycleStatus::AutosyncOff => "AUTOSYNC OFF",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            CycleStatus::PullError | CycleStatus::ComposeError | CycleStatus::StartComposeError
        )
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// One named deployment unit and its reconciliation state.
#[derive(Debug)]
pub struct Stack {
    repo: RepoConfig,
    id: StackId,
    store: ArtifactStore,
    artifact: Vec<u8>,
    plan: Option<ComposeProject>,
    status: Option<CycleStatus>,
    /// Drift has been materialized but not yet applied successfully.
    /// Starts `true` so the first cycle after startup converges the engine.
    pending_apply: bool,
    last_synced_at: Option<DateTime<Utc>>,
}

impl Stack {
    /// Build a stack from its repository entry. Pure, no I/O.
    pub fn new(repo: RepoConfig, config: &OrcaConfig) -> Self {
        let id = StackId::from_url(&repo.url);
        let store = ArtifactStore::new(config.stack_workdir(&id), config.stack_target(&repo.name));
        Self {
            repo,
            id,
            store,
            artifact: Vec::new(),
            plan: None,
            status: None,
            pending_apply: true,
            last_synced_at: None,
        }
    }

    pub fn name(&self) -> &StackName {
        &self.repo.name
    }

    pub fn id(&self) -> &StackId {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.repo.url
    }

    pub fn workdir(&self) -> &Path {
        self.store.source_dir()
    }

    pub fn target_dir(&self) -> &Path {
        self.store.target_dir()
    }

    /// Raw bytes of the last fetched definition.
    pub fn artifact(&self) -> &[u8] {
        &self.artifact
    }

    pub fn plan(&self) -> Option<&ComposeProject> {
        self.plan.as_ref()
    }

    pub fn status(&self) -> Option<CycleStatus> {
        self.status
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Load the current artifact into a labeled project rooted at the
    /// target directory.
    pub fn build_plan(&self) -> Result<ComposeProject, LoadError> {
        load(self.target_dir(), &self.artifact, &self.repo.name.0)
    }

    /// Hand `plan` to the orchestrator, removing orphaned services.
    pub fn apply(
        &self,
        plan: &ComposeProject,
        orchestrator: &dyn Orchestrator,
    ) -> Result<(), ApplyError> {
        orchestrator.apply(
            plan,
            &ApplyOptions {
                remove_orphans: true,
            },
        )
    }

    /// Run one reconciliation cycle.
    ///
    /// `Err` is returned only when the stack can never succeed and its loop
    /// must stop.
    pub fn cycle(
        &mut self,
        fetcher: &Fetcher,
        orchestrator: &dyn Orchestrator,
        autosync: &AutoSyncFlag,
    ) -> Result<CycleStatus, SyncError> {
        match self.run_cycle(fetcher, orchestrator, autosync) {
            Ok(status) => Ok(self.finish(status)),
            Err(err) if err.is_fatal() => {
                tracing::error!(
                    target: "puller",
                    stack = %self.repo.name,
                    error = %err,
                    "stack cannot be fetched; giving up",
                );
                self.status = Some(CycleStatus::PullError);
                Err(err)
            }
            Err(err) => {
                let status = match &err {
                    SyncError::Fetch(_) | SyncError::Io { .. } => {
                        tracing::error!(
                            target: "puller",
                            stack = %self.repo.name,
                            error = %err,
                            "cycle failed",
                        );
                        CycleStatus::PullError
                    }
                    SyncError::Plan(_) => {
                        tracing::error!(
                            target: "compose",
                            stack = %self.repo.name,
                            error = %err,
                            "definition rejected",
                        );
                        CycleStatus::ComposeError
                    }
                    SyncError::Apply(_) => {
                        tracing::error!(
                            target: "compose",
                            stack = %self.repo.name,
                            error = %err,
                            "apply failed",
                        );
                        CycleStatus::StartComposeError
                    }
                };
                Ok(self.finish(status))
            }
        }
    }

    fn run_cycle(
        &mut self,
        fetcher: &Fetcher,
        orchestrator: &dyn Orchestrator,
        autosync: &AutoSyncFlag,
    ) -> Result<CycleStatus, SyncError> {
        fetcher.fetch(&self.repo.url, &self.repo.credential, self.store.source_dir())?;

        let files = self.store.collect()?;
        if let Some(definition) = compose_definition(&files) {
            self.artifact = definition.bytes.clone();
        }

        let plan = self.build_plan()?;
        let report = self.store.materialize(&files)?;
        if report.changed() {
            tracing::info!(target: "puller", stack = %self.repo.name, "drift detected");
            self.pending_apply = true;
        }

        if !autosync.is_on() {
            self.plan = Some(plan);
            return Ok(CycleStatus::AutosyncOff);
        }
        if !self.pending_apply {
            tracing::debug!(
                target: "compose",
                stack = %self.repo.name,
                last_synced_at = ?self.last_synced_at.map(|at| at.to_rfc3339()),
                "no drift to apply",
            );
            self.plan = Some(plan);
            return Ok(CycleStatus::UpToDate);
        }

        let applied = self.apply(&plan, orchestrator);
        self.plan = Some(plan);
        applied?;
        let now = Utc::now();
        self.pending_apply = false;
        self.last_synced_at = Some(now);
        tracing::debug!(
            target: "compose",
            stack = %self.repo.name,
            synced_at = %now.to_rfc3339(),
            "stack synced",
        );
        Ok(CycleStatus::Synced)
    }

    fn finish(&mut self, status: CycleStatus) -> CycleStatus {
        self.status = Some(status);
        status
    }

    /// The status line printed after each cycle.
    pub fn status_line(&self, repo_width: usize) -> String {
        let status = self.status.map_or("-", CycleStatus::as_str);
        format!(
            "===[ SERVICE: {} | REPO: {} | STATUS: {} ]===",
            self.repo.name,
            orca_core::center_display(&self.repo.url, repo_width),
            status
        )
    }
}
