//! Scenario runner.
//!
//! A scenario is an ordered list of steps. Each step merges a declared-state
//! delta into the running declaration, converges the load balancer, reads it
//! back, and checks the live attributes against the step's expectations. The
//! resource is always torn down at the end, whatever the outcome.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ConfigError, ReconcileError, Result, SlbError};
use crate::lease::{generate_holder_id, LeaseGuard, LeaseTable};
use crate::planner::DeclaredState;
use crate::reconciler::{Reconciler, DEFAULT_CONFIRM_ATTEMPTS, DEFAULT_CONFIRM_DELAY_MS};
use crate::retry::RetryPolicy;
use crate::slb::SlbApi;

use super::attributes::{differences, flatten, AttributeMap};
use super::expect::{compare, ExpectedAttributeMap, ExpectedValue, Mismatch};

/// Placeholder replaced by a random 4-digit number when a scenario is loaded.
pub const RAND_PLACEHOLDER: &str = "${rand}";

/// Default number of reads used to confirm teardown.
pub const DEFAULT_TEARDOWN_ATTEMPTS: u32 = 10;

/// Error a step may expect instead of success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// The declaration violated a joint constraint.
    InvalidDeclaration,
    /// The declaration changed an immutable field.
    ImmutableFieldChanged,
    /// The create could not be completed.
    CreateFailed,
    /// The update did not converge.
    NotConverged,
    /// The control plane rejected the request.
    Validation,
    /// The credentials lack permission.
    PermissionDenied,
}

impl StepErrorKind {
    /// Classifies an error, if it is one a step can expect.
    #[must_use]
    pub const fn of(error: &SlbError) -> Option<Self> {
        match error {
            SlbError::Reconcile(ReconcileError::InvalidDeclaration { .. }) => {
                Some(Self::InvalidDeclaration)
            }
            SlbError::Reconcile(ReconcileError::ImmutableFieldChanged { .. }) => {
                Some(Self::ImmutableFieldChanged)
            }
            SlbError::Reconcile(ReconcileError::CreateFailed { .. }) => Some(Self::CreateFailed),
            SlbError::Reconcile(ReconcileError::NotConverged { .. }) => Some(Self::NotConverged),
            SlbError::Api(ApiError::Validation { .. }) => Some(Self::Validation),
            SlbError::Api(ApiError::PermissionDenied { .. }) => Some(Self::PermissionDenied),
            _ => None,
        }
    }
}

/// One scenario step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepSpec {
    /// Free-form label used in logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Delta merged into the running declaration.
    pub declare: DeclaredState,
    /// Expected live attributes after the step.
    pub expect: ExpectedAttributeMap,
    /// Error the step must fail with. On that error the declaration is
    /// rolled back and `expect` is checked against the unchanged record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect_error: Option<StepErrorKind>,
    /// Re-read the record by id instead of reconciling, and require it to
    /// match the previous step's attributes exactly.
    pub import_verify: bool,
}

/// A scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Scenario name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps in order.
    pub steps: Vec<StepSpec>,
}

impl ScenarioFile {
    /// Parses a scenario from YAML, substituting [`RAND_PLACEHOLDER`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let suffix = Uuid::new_v4().as_u128() % 9000 + 1000;
        let content = content.replace(RAND_PLACEHOLDER, &suffix.to_string());

        serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                message: e.to_string(),
                location: e.location().map(|l| format!("line {}, column {}", l.line(), l.column())),
            }
            .into()
        })
    }

    /// Loads a scenario file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// How teardown ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// No resource was created.
    NotNeeded,
    /// The resource was deleted and reads as not found.
    Released,
    /// The resource could not be released.
    Failed(String),
}

/// Result of a scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Whether every step and the teardown passed.
    pub passed: bool,
    /// Steps started.
    pub steps_run: usize,
    /// 1-based number of the step that failed.
    pub failed_step: Option<usize>,
    /// Every mismatch of the failed step.
    pub mismatches: Vec<Mismatch>,
    /// Error that stopped the run, if not a mismatch.
    pub failure: Option<String>,
    /// Identifier of the resource the scenario operated on.
    pub resource_id: Option<String>,
    /// Teardown result.
    pub teardown: TeardownOutcome,
}

/// Mutable state carried from one step to the next.
#[derive(Default)]
struct RunState {
    declared: DeclaredState,
    resource_id: Option<String>,
    lease: Option<LeaseGuard>,
    snapshot: Option<AttributeMap>,
}

/// Runs scenarios against a control plane.
pub struct ScenarioRunner<'a> {
    api: &'a dyn SlbApi,
    retry: RetryPolicy,
    cancel: CancellationToken,
    confirm_attempts: u32,
    confirm_delay: Duration,
    teardown_attempts: u32,
    leases: LeaseTable,
    holder: String,
}

impl<'a> ScenarioRunner<'a> {
    /// Creates a runner with default settings.
    #[must_use]
    pub fn new(api: &'a dyn SlbApi) -> Self {
        Self {
            api,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
            confirm_delay: Duration::from_millis(DEFAULT_CONFIRM_DELAY_MS),
            teardown_attempts: DEFAULT_TEARDOWN_ATTEMPTS,
            leases: LeaseTable::new(),
            holder: generate_holder_id(),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how mutations and teardown are confirmed.
    #[must_use]
    pub const fn with_confirmation(mut self, attempts: u32, delay: Duration) -> Self {
        self.confirm_attempts = attempts;
        self.teardown_attempts = attempts;
        self.confirm_delay = delay;
        self
    }

    /// Sets the cancellation token for the steps. Teardown ignores it.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Shares a lease table with a sweep engine.
    #[must_use]
    pub fn with_leases(mut self, leases: LeaseTable) -> Self {
        self.leases = leases;
        self
    }

    /// Runs every step, stopping at the first failing one, then tears down.
    pub async fn run_scenario(&self, steps: &[StepSpec]) -> ScenarioResult {
        let reconciler = Reconciler::new(self.api)
            .with_retry(self.retry)
            .with_cancellation(self.cancel.clone())
            .with_confirmation(self.confirm_attempts, self.confirm_delay);

        let mut state = RunState::default();
        let mut result = ScenarioResult {
            passed: true,
            steps_run: 0,
            failed_step: None,
            mismatches: Vec::new(),
            failure: None,
            resource_id: None,
            teardown: TeardownOutcome::NotNeeded,
        };

        for (index, step) in steps.iter().enumerate() {
            let number = index + 1;
            result.steps_run = number;
            info!(
                "Step {number}/{}{}",
                steps.len(),
                step.description
                    .as_deref()
                    .map(|d| format!(": {d}"))
                    .unwrap_or_default()
            );

            match self.run_step(&reconciler, step, number, &mut state).await {
                Ok(mismatches) if mismatches.is_empty() => {}
                Ok(mismatches) => {
                    for mismatch in &mismatches {
                        error!("{mismatch}");
                    }
                    result.mismatches = mismatches;
                    result.failed_step = Some(number);
                    break;
                }
                Err(message) => {
                    error!("Step {number} failed: {message}");
                    result.failure = Some(message);
                    result.failed_step = Some(number);
                    break;
                }
            }
        }

        result.resource_id.clone_from(&state.resource_id);
        result.teardown = self.teardown(&reconciler, state.resource_id.as_deref()).await;
        drop(state.lease.take());

        result.passed = result.failed_step.is_none()
            && !matches!(result.teardown, TeardownOutcome::Failed(_));
        result
    }

    async fn run_step(
        &self,
        reconciler: &Reconciler<'_>,
        step: &StepSpec,
        number: usize,
        state: &mut RunState,
    ) -> std::result::Result<Vec<Mismatch>, String> {
        if step.import_verify {
            return self.verify_import(reconciler, step, number, state).await;
        }

        let mut next = state.declared.clone();
        next.merge(&step.declare);

        // Held until the new record's id is leased in `track`.
        let _reservation = match (state.resource_id.as_deref(), next.effective_name()) {
            (None, name) if !name.is_empty() => Some(
                self.leases
                    .reserve_name(name, &self.holder)
                    .map_err(|e| e.to_string())?,
            ),
            _ => None,
        };

        let outcome = reconciler.converge(state.resource_id.as_deref(), &next).await;

        match (outcome, step.expect_error) {
            (Ok(applied), None) => {
                self.track(state, applied.id())?;
                state.declared = next;
            }
            (Ok(applied), Some(kind)) => {
                self.track(state, applied.id())?;
                return Err(format!("expected {kind:?} but the step succeeded"));
            }
            (Err(e), Some(kind)) if StepErrorKind::of(&e) == Some(kind) => {
                info!("Step {number} failed as expected: {e}");
            }
            (Err(e), _) => return Err(e.to_string()),
        }

        let attributes = match state.resource_id.as_deref() {
            Some(id) => flatten(&reconciler.read(id).await.map_err(|e| e.to_string())?),
            None => AttributeMap::new(),
        };

        let mismatches = compare(number, &step.expect, &attributes);
        state.snapshot = Some(attributes);
        Ok(mismatches)
    }

    /// Records the resource id and leases it on first sight.
    fn track(&self, state: &mut RunState, id: &str) -> std::result::Result<(), String> {
        if state.resource_id.as_deref() != Some(id) {
            state.lease = None;
            state.resource_id = Some(id.to_string());
            let lease = self
                .leases
                .acquire(id, &self.holder)
                .map_err(|e| e.to_string())?;
            state.lease = Some(lease);
        }
        Ok(())
    }

    async fn verify_import(
        &self,
        reconciler: &Reconciler<'_>,
        step: &StepSpec,
        number: usize,
        state: &mut RunState,
    ) -> std::result::Result<Vec<Mismatch>, String> {
        let (Some(id), Some(previous)) = (state.resource_id.as_deref(), state.snapshot.as_ref())
        else {
            return Err(String::from("import verification needs a resource from an earlier step"));
        };

        let imported = flatten(&reconciler.read(id).await.map_err(|e| e.to_string())?);

        let mut mismatches: Vec<Mismatch> = differences(previous, &imported)
            .into_iter()
            .map(|(path, (before, after))| Mismatch {
                step: number,
                path,
                expected: before.map_or(ExpectedValue::Absent, ExpectedValue::Literal),
                actual: after,
            })
            .collect();
        mismatches.extend(compare(number, &step.expect, &imported));

        state.snapshot = Some(imported);
        Ok(mismatches)
    }

    /// Deletes the resource and waits until it reads as not found.
    async fn teardown(&self, reconciler: &Reconciler<'_>, id: Option<&str>) -> TeardownOutcome {
        let Some(id) = id else {
            return TeardownOutcome::NotNeeded;
        };

        info!("Tearing down {id}");
        let cleanup = reconciler.detached();

        if let Err(e) = cleanup.force_delete(id).await {
            error!("Teardown of {id} failed: {e}");
            return TeardownOutcome::Failed(e.to_string());
        }

        for attempt in 1..=self.teardown_attempts.max(1) {
            match cleanup.read(id).await {
                Err(e) if e.is_not_found() => return TeardownOutcome::Released,
                Err(e) => return TeardownOutcome::Failed(e.to_string()),
                Ok(_) => {
                    warn!("{id} still readable after delete (read {attempt})");
                    tokio::time::sleep(self.confirm_delay).await;
                }
            }
        }

        TeardownOutcome::Failed(format!(
            "{id} still readable after {} reads",
            self.teardown_attempts.max(1)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slb::MemorySlb;

    const FOUR_STEPS: &str = r#"
name: lifecycle
steps:
  - description: create internet load balancer
    declare:
      name: tf-testAccSlb${rand}
      address_type: internet
    expect:
      address_type: internet
      master_zone_id: {set: true}
  - description: address type is immutable
    declare:
      address_type: intranet
    expect_error: immutable_field_changed
    expect:
      address_type: internet
  - description: add a tag
    declare:
      tags:
        a: "1"
    expect:
      tags.%: "1"
      tags.a: "1"
  - description: remove tags
    declare:
      tags: ~
    expect:
      tags.%: {absent: true}
"#;

    fn runner(api: &MemorySlb) -> ScenarioRunner<'_> {
        ScenarioRunner::new(api)
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(5)))
            .with_confirmation(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_four_step_scenario_passes() {
        let api = MemorySlb::new("cn-test");
        let scenario = ScenarioFile::from_yaml(FOUR_STEPS).unwrap();

        let result = runner(&api).run_scenario(&scenario.steps).await;

        assert!(result.passed, "{result:?}");
        assert_eq!(result.steps_run, 4);
        assert_eq!(result.teardown, TeardownOutcome::Released);
        assert!(api.is_empty());
    }

    #[test]
    fn test_rand_placeholder_is_substituted() {
        let scenario = ScenarioFile::from_yaml(FOUR_STEPS).unwrap();
        let name = scenario.steps[0].declare.effective_name();

        assert!(name.starts_with("tf-testAccSlb"));
        assert_eq!(name.len(), "tf-testAccSlb".len() + 4);
    }

    #[tokio::test]
    async fn test_every_mismatch_is_reported_and_run_stops() {
        let api = MemorySlb::new("cn-test");
        let steps: Vec<StepSpec> = serde_yaml::from_str(
            r#"
- declare:
    name: tf-testAccSlb
  expect:
    name: other
    address_type: intranet
    vswitch_id: {set: true}
- declare:
    name: never-applied
"#,
        )
        .unwrap();

        let result = runner(&api).run_scenario(&steps).await;

        assert!(!result.passed);
        assert_eq!(result.failed_step, Some(1));
        assert_eq!(result.mismatches.len(), 3);
        assert_eq!(result.steps_run, 1);
        assert_eq!(result.teardown, TeardownOutcome::Released);
    }

    #[tokio::test]
    async fn test_unexpected_success_fails_step() {
        let api = MemorySlb::new("cn-test");
        let steps = vec![StepSpec {
            declare: serde_yaml::from_str("name: tf-testAccSlb").unwrap(),
            expect_error: Some(StepErrorKind::ImmutableFieldChanged),
            ..Default::default()
        }];

        let result = runner(&api).run_scenario(&steps).await;

        assert!(!result.passed);
        assert!(result.failure.is_some());
        assert_eq!(result.teardown, TeardownOutcome::Released);
        assert!(api.is_empty());
    }

    #[tokio::test]
    async fn test_import_verify_matches_previous_step() {
        let api = MemorySlb::new("cn-test");
        let steps: Vec<StepSpec> = serde_yaml::from_str(
            r"
- declare:
    name: tf-testAccSlb
    delete_protection: on
- import_verify: true
",
        )
        .unwrap();

        let result = runner(&api).run_scenario(&steps).await;
        assert!(result.passed, "{result:?}");
    }

    #[tokio::test]
    async fn test_resource_is_leased_during_run() {
        let api = MemorySlb::new("cn-test");
        let leases = LeaseTable::new();
        let steps: Vec<StepSpec> =
            serde_yaml::from_str("- declare:\n    name: tf-testAccSlb\n").unwrap();

        let result = runner(&api)
            .with_leases(leases.clone())
            .run_scenario(&steps)
            .await;

        assert!(result.passed);
        let id = result.resource_id.unwrap();
        assert!(!leases.is_leased(&id));
    }

    #[tokio::test]
    async fn test_name_is_reserved_before_create() {
        let api = MemorySlb::new("cn-test");
        let leases = LeaseTable::new();
        let _other = leases.reserve_name("tf-testAccSlb", "other-run").unwrap();
        let steps: Vec<StepSpec> =
            serde_yaml::from_str("- declare:\n    name: tf-testAccSlb\n").unwrap();

        let result = runner(&api)
            .with_leases(leases.clone())
            .run_scenario(&steps)
            .await;

        assert!(!result.passed);
        assert_eq!(result.failed_step, Some(1));
        assert!(result.failure.unwrap().contains("other-run"));
        assert_eq!(api.calls("create"), 0);
        assert_eq!(result.teardown, TeardownOutcome::NotNeeded);
    }
}
