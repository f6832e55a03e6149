use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use truapi_client::prelude::{ArtifactRef, ResourceId, RunRef, TestResource};
use truapi_core::prelude::{LaunchError, LaunchResult};

/// Where a workflow has got to. Each state is reached only once the step before it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Authenticating,
    Packaging,
    TestEnsured,
    ArtifactUploaded,
    ScriptEnsured,
    PolicyApplied,
    GeographyApplied,
    RunLaunched,
    HandedOff,
    Failed(String),
}

impl WorkflowState {
    /// The state that must directly precede this one.
    fn predecessor(&self) -> Option<WorkflowState> {
        use WorkflowState::*;

        match self {
            Authenticating | Failed(_) => None,
            Packaging => Some(Authenticating),
            TestEnsured => Some(Packaging),
            ArtifactUploaded => Some(TestEnsured),
            ScriptEnsured => Some(ArtifactUploaded),
            PolicyApplied => Some(ScriptEnsured),
            GeographyApplied => Some(PolicyApplied),
            RunLaunched => Some(GeographyApplied),
            HandedOff => Some(RunLaunched),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::HandedOff | WorkflowState::Failed(_))
    }
}

impl Display for WorkflowState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Failed(reason) => write!(f, "Failed({reason})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// How the script ended up attached to the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOrigin {
    /// A new script was created and linked.
    Created,
    /// The already linked script was overwritten in place.
    Reloaded,
}

/// A script and its link to the test.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptBinding {
    pub script_id: ResourceId,
    pub link_id: ResourceId,
    pub origin: ScriptOrigin,
}

/// Everything one workflow invocation has learnt so far.
///
/// Each step reads what it needs from here and the orchestrator records the step's result, which
/// moves the workflow to the next state.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    state: WorkflowState,
    artifact_path: Option<PathBuf>,
    test: Option<TestResource>,
    artifact: Option<ArtifactRef>,
    script: Option<ScriptBinding>,
    run: Option<RunRef>,
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Authenticating,
            artifact_path: None,
            test: None,
            artifact: None,
            script: None,
            run: None,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn test(&self) -> Option<&TestResource> {
        self.test.as_ref()
    }

    pub fn artifact(&self) -> Option<&ArtifactRef> {
        self.artifact.as_ref()
    }

    pub fn script(&self) -> Option<&ScriptBinding> {
        self.script.as_ref()
    }

    pub fn run(&self) -> Option<&RunRef> {
        self.run.as_ref()
    }

    /// Fail with [LaunchError::OutOfOrder] unless the workflow is exactly at `required`.
    pub fn require(&self, step: &'static str, required: WorkflowState) -> LaunchResult<()> {
        if self.state == required {
            Ok(())
        } else {
            Err(LaunchError::OutOfOrder {
                step,
                required: required.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    pub(crate) fn authenticated(&mut self) -> LaunchResult<()> {
        self.advance(WorkflowState::Packaging)
    }

    /// Packaging does not move the state on by itself: the next state needs a test as well.
    pub(crate) fn packaged(&mut self, artifact_path: PathBuf) -> LaunchResult<()> {
        self.require("record the artifact path", WorkflowState::Packaging)?;
        self.artifact_path = Some(artifact_path);
        Ok(())
    }

    pub(crate) fn test_ensured(&mut self, test: TestResource) -> LaunchResult<()> {
        if self.artifact_path.is_none() {
            return Err(LaunchError::OutOfOrder {
                step: "ensure the test",
                required: "a packaged artifact".to_string(),
                actual: self.state.to_string(),
            });
        }
        self.advance(WorkflowState::TestEnsured)?;
        self.test = Some(test);
        Ok(())
    }

    pub(crate) fn artifact_uploaded(&mut self, artifact: ArtifactRef) -> LaunchResult<()> {
        self.advance(WorkflowState::ArtifactUploaded)?;
        self.artifact = Some(artifact);
        Ok(())
    }

    pub(crate) fn script_ensured(&mut self, script: ScriptBinding) -> LaunchResult<()> {
        self.advance(WorkflowState::ScriptEnsured)?;
        self.script = Some(script);
        Ok(())
    }

    pub(crate) fn policy_applied(&mut self) -> LaunchResult<()> {
        self.advance(WorkflowState::PolicyApplied)
    }

    pub(crate) fn geography_applied(&mut self) -> LaunchResult<()> {
        self.advance(WorkflowState::GeographyApplied)
    }

    pub(crate) fn run_launched(&mut self, run: RunRef) -> LaunchResult<()> {
        self.advance(WorkflowState::RunLaunched)?;
        self.run = Some(run);
        Ok(())
    }

    pub(crate) fn handed_off(&mut self) -> LaunchResult<()> {
        self.advance(WorkflowState::HandedOff)
    }

    pub(crate) fn fail(&mut self, err: &LaunchError) {
        self.state = WorkflowState::Failed(err.to_string());
    }

    fn advance(&mut self, next: WorkflowState) -> LaunchResult<()> {
        let step = "advance the workflow";
        match next.predecessor() {
            Some(required) => self.require(step, required)?,
            None => {
                return Err(LaunchError::OutOfOrder {
                    step,
                    required: "a known predecessor".to_string(),
                    actual: self.state.to_string(),
                })
            }
        }

        log::debug!("workflow {} -> {}", self.state, next);
        self.state = next;

        Ok(())
    }

    /// Test identifier, once the test has been ensured.
    pub(crate) fn test_id(&self, step: &'static str) -> LaunchResult<&ResourceId> {
        self.test
            .as_ref()
            .map(|test| &test.id)
            .ok_or_else(|| missing(step, "an ensured test", &self.state))
    }

    pub(crate) fn artifact_id(&self, step: &'static str) -> LaunchResult<&ResourceId> {
        self.artifact
            .as_ref()
            .map(|artifact| &artifact.id)
            .ok_or_else(|| missing(step, "an uploaded artifact", &self.state))
    }

    pub(crate) fn script_binding(&self, step: &'static str) -> LaunchResult<&ScriptBinding> {
        self.script
            .as_ref()
            .ok_or_else(|| missing(step, "an ensured script", &self.state))
    }
}

fn missing(step: &'static str, required: &str, state: &WorkflowState) -> LaunchError {
    LaunchError::OutOfOrder {
        step,
        required: required.to_string(),
        actual: state.to_string(),
    }
}
