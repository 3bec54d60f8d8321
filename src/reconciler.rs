//! Reconciler for maintaining desired state.
//!
//! This module drives one load balancer through create, read, update and
//! delete until the live record matches its [`DeclaredState`]. Every remote
//! call goes through the configured [`RetryPolicy`], and cancellation is
//! honored at call boundaries.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ReconcileError, Result, SlbError};
use crate::planner::{DeclaredState, Diff};
use crate::retry::RetryPolicy;
use crate::slb::{DeleteProtection, FieldUpdate, LoadBalancer, SlbApi, UpdateLoadBalancerRequest};

/// Default number of reads used to confirm a mutation.
pub const DEFAULT_CONFIRM_ATTEMPTS: u32 = 10;

/// Default delay between confirmation reads in milliseconds.
pub const DEFAULT_CONFIRM_DELAY_MS: u64 = 1_000;

/// Lifecycle phase of a reconciled resource.
///
/// `Present` is the only resting phase; the others are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePhase {
    /// No remote record exists.
    Absent,
    /// A create call is in flight or being confirmed.
    Creating,
    /// The record exists and matches its declaration.
    Present,
    /// An update is in flight or being confirmed.
    Updating,
    /// A delete is in flight.
    Deleting,
}

/// Result of applying a declaration.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// A new record was created.
    Created {
        /// The confirmed record.
        record: LoadBalancer,
    },
    /// An existing record was updated in place.
    Updated {
        /// The confirmed record.
        record: LoadBalancer,
        /// Fields that were changed.
        fields: Vec<String>,
    },
    /// The record already matched; no mutation was issued.
    Unchanged {
        /// The live record.
        record: LoadBalancer,
    },
}

impl ApplyOutcome {
    /// The record after the apply.
    #[must_use]
    pub const fn record(&self) -> &LoadBalancer {
        match self {
            Self::Created { record } | Self::Updated { record, .. } | Self::Unchanged { record } => {
                record
            }
        }
    }

    /// Identifier of the record.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.record().id
    }
}

/// Reconciler for one region's load balancers.
pub struct Reconciler<'a> {
    /// Control plane.
    api: &'a dyn SlbApi,
    /// Retry policy for every remote call.
    retry: RetryPolicy,
    /// Cancellation signal checked at call boundaries.
    cancel: CancellationToken,
    /// Reads used to confirm a mutation.
    confirm_attempts: u32,
    /// Delay between confirmation reads.
    confirm_delay: Duration,
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(api: &'a dyn SlbApi) -> Self {
        Self {
            api,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            confirm_attempts: DEFAULT_CONFIRM_ATTEMPTS,
            confirm_delay: Duration::from_millis(DEFAULT_CONFIRM_DELAY_MS),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets how mutations are confirmed.
    #[must_use]
    pub const fn with_confirmation(mut self, attempts: u32, delay: Duration) -> Self {
        self.confirm_attempts = attempts;
        self.confirm_delay = delay;
        self
    }

    /// Returns a reconciler with the same settings that ignores this one's
    /// cancellation. Used for cleanup that must run after a cancelled step.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            api: self.api,
            retry: self.retry,
            cancel: CancellationToken::new(),
            confirm_attempts: self.confirm_attempts,
            confirm_delay: self.confirm_delay,
        }
    }

    fn transition(id: &str, from: ResourcePhase, to: ResourcePhase) {
        debug!("{id}: {from} -> {to}");
    }

    fn cancelled(operation: &str) -> SlbError {
        ReconcileError::Cancelled {
            operation: operation.to_string(),
        }
        .into()
    }

    /// Waits between confirmation reads, stopping early on cancellation.
    async fn pause(&self, operation: &str) -> Result<()> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(Self::cancelled(operation)),
            () = tokio::time::sleep(self.confirm_delay) => Ok(()),
        }
    }

    /// Creates a load balancer and waits until it reads back as declared.
    ///
    /// A fresh client token is used so a retried create call cannot create a
    /// second record. If the record cannot be confirmed, or the reconciler is
    /// cancelled once the create call has returned, it is deleted again.
    ///
    /// # Errors
    ///
    /// - `InvalidDeclaration` if the declaration violates a joint constraint
    /// - `CreateFailed` if the create call or its confirmation fails
    /// - `Cancelled` if cancelled; any record already created is rolled back
    pub async fn create(&self, declared: &DeclaredState) -> Result<LoadBalancer> {
        declared.validate()?;

        let token = Uuid::new_v4().to_string();
        let request = declared.to_create_request(&token);

        info!(
            "Creating load balancer '{}' ({})",
            declared.effective_name(),
            request.address_type
        );
        Self::transition("(new)", ResourcePhase::Absent, ResourcePhase::Creating);

        let id = match self
            .retry
            .run("create load balancer", &self.cancel, || self.api.create(&request))
            .await
        {
            Ok(id) => id,
            Err(e @ SlbError::Reconcile(ReconcileError::Cancelled { .. })) => return Err(e),
            Err(e) => {
                error!("Create call failed: {e}");
                return Err(ReconcileError::CreateFailed {
                    reason: e.to_string(),
                }
                .into());
            }
        };

        match self.confirm(&id, declared).await {
            Ok(record) => {
                Self::transition(&id, ResourcePhase::Creating, ResourcePhase::Present);
                info!("Created load balancer {id}");
                Ok(record)
            }
            Err(e) => {
                warn!("Could not confirm load balancer {id}, rolling back: {e}");
                if let Err(rollback) = self.rollback(&id, declared).await {
                    error!("Rollback of {id} failed: {rollback}");
                }
                if matches!(e, SlbError::Reconcile(ReconcileError::Cancelled { .. })) {
                    return Err(e);
                }
                Err(ReconcileError::CreateFailed {
                    reason: format!("{id} was not confirmed: {e}"),
                }
                .into())
            }
        }
    }

    /// Deletes a record whose create could not be confirmed.
    ///
    /// The record may not be readable yet, so protection is lifted based on
    /// the declaration rather than on a read.
    async fn rollback(&self, id: &str, declared: &DeclaredState) -> Result<()> {
        let cleanup = self.detached();
        if declared.effective_delete_protection() == DeleteProtection::On {
            cleanup.unprotect(id).await?;
        }
        cleanup.delete(id).await
    }

    /// Reads until the record exists and matches the declaration.
    async fn confirm(&self, id: &str, declared: &DeclaredState) -> Result<LoadBalancer> {
        let operation = format!("confirm {id}");
        let mut residual = Vec::new();

        for attempt in 1..=self.confirm_attempts.max(1) {
            if attempt > 1 {
                self.pause(&operation).await?;
            }

            match self.read(id).await {
                Ok(record) => {
                    let diff = Diff::compute(declared, &record);
                    if diff.is_empty() {
                        return Ok(record);
                    }
                    residual = diff.fields();
                    debug!("{id} not yet converged on {}", residual.join(", "));
                }
                Err(e) if e.is_not_found() => {
                    debug!("{id} not yet visible (read {attempt})");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ReconcileError::NotConverged {
            id: id.to_string(),
            fields: residual,
        }
        .into())
    }

    /// Reads the live record.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the record does not exist, which
    /// callers may treat as recoverable.
    pub async fn read(&self, id: &str) -> Result<LoadBalancer> {
        self.retry
            .run(&format!("describe {id}"), &self.cancel, || self.api.describe(id))
            .await
    }

    /// Updates a record in place to match the declaration.
    ///
    /// # Errors
    ///
    /// - `ImmutableFieldChanged` naming every immutable field that differs;
    ///   no mutation is issued in that case
    /// - `NotConverged` if a re-read still differs after the update
    pub async fn update(&self, id: &str, declared: &DeclaredState) -> Result<ApplyOutcome> {
        declared.validate()?;
        let live = self.read(id).await?;
        self.apply_update(live, declared).await
    }

    async fn apply_update(
        &self,
        live: LoadBalancer,
        declared: &DeclaredState,
    ) -> Result<ApplyOutcome> {
        let id = live.id.clone();
        let diff = Diff::compute(declared, &live);

        let immutable = diff.immutable_fields();
        if !immutable.is_empty() {
            warn!("{id}: immutable field(s) changed: {}", immutable.join(", "));
            return Err(ReconcileError::ImmutableFieldChanged { fields: immutable }.into());
        }

        if diff.is_empty() {
            debug!("{id} is up to date");
            return Ok(ApplyOutcome::Unchanged { record: live });
        }

        let fields = diff.fields();
        info!("Updating {id}: {}", fields.join(", "));
        Self::transition(&id, ResourcePhase::Present, ResourcePhase::Updating);

        let request = diff.update_request();
        self.retry
            .run(&format!("update {id}"), &self.cancel, || self.api.update(&id, request))
            .await?;

        let record = self.confirm(&id, declared).await?;
        Self::transition(&id, ResourcePhase::Updating, ResourcePhase::Present);

        Ok(ApplyOutcome::Updated { record, fields })
    }

    /// Creates the record if it does not exist, otherwise updates it.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::create`] or [`Self::update`].
    pub async fn converge(
        &self,
        current_id: Option<&str>,
        declared: &DeclaredState,
    ) -> Result<ApplyOutcome> {
        declared.validate()?;

        if let Some(id) = current_id {
            match self.read(id).await {
                Ok(live) => return self.apply_update(live, declared).await,
                Err(e) if e.is_not_found() => {
                    info!("{id} no longer exists, creating a replacement");
                }
                Err(e) => return Err(e),
            }
        }

        let record = self.create(declared).await?;
        Ok(ApplyOutcome::Created { record })
    }

    /// Deletes a record. A record that is already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns `DeleteFailed` if the delete is rejected or retries run out,
    /// or `Cancelled`.
    pub async fn delete(&self, id: &str) -> Result<()> {
        info!("Deleting load balancer {id}");
        Self::transition(id, ResourcePhase::Present, ResourcePhase::Deleting);

        match self
            .retry
            .run(&format!("delete {id}"), &self.cancel, || self.api.delete(id))
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!("{id} was already deleted"),
            Err(e @ SlbError::Reconcile(ReconcileError::Cancelled { .. })) => return Err(e),
            Err(e) => {
                error!("Failed to delete {id}: {e}");
                return Err(ReconcileError::DeleteFailed {
                    id: id.to_string(),
                    source: Box::new(e),
                }
                .into());
            }
        }

        Self::transition(id, ResourcePhase::Deleting, ResourcePhase::Absent);
        Ok(())
    }

    /// Deletes a record, switching delete protection off first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if protection cannot be lifted or the delete fails.
    pub async fn force_delete(&self, id: &str) -> Result<()> {
        let live = match self.read(id).await {
            Ok(live) => live,
            Err(e) if e.is_not_found() => {
                debug!("{id} was already deleted");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if live.is_delete_protected() {
            self.unprotect(id).await?;
        }

        self.delete(id).await
    }

    async fn unprotect(&self, id: &str) -> Result<()> {
        info!("Disabling delete protection on {id}");
        let request = UpdateLoadBalancerRequest {
            delete_protection: Some(FieldUpdate::Set(DeleteProtection::Off)),
            ..Default::default()
        };
        self.retry
            .run(&format!("unprotect {id}"), &self.cancel, || {
                self.api.update(id, &request)
            })
            .await
    }
}

impl std::fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
        };
        write!(f, "{s}")
    }
}
