//! Service layer for the tire request workflow
//!
//! Every call receives the caller's [`ActorContext`] explicitly. Drafts are
//! validated before anything reaches the store, role actions go through the
//! approval state machine before the store re-checks them, and notifications
//! are sent only after the mutation is stored.
use super::approval::{self, Action, ApprovalStatus, Role, StatusChange};
use super::config::{AppConfig, ApprovalConfig, DeleteScope, NotificationConfig};
use super::error::{ActionFailure, OrchestratorError, RepositoryError};
use super::notify::{self, LogNotifier, Notification, Notifier};
use super::photo::{FallbackChain, PhotoResolver};
use super::repository::{PhotoUpload, RequestRepository, SledRepository};
use super::request::{RequestDraft, RequestId, TireReplacementRequest};
use super::validation::{DatePolicy, FormValidator};
use chrono::Utc;
use tracing::{error, info, warn};

/// Who is calling. The role label comes from the login layer as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub actor: String,
    pub role: Role,
}

impl ActorContext {
    pub fn new(actor: impl Into<String>, role: &str) -> Self {
        Self {
            actor: actor.into(),
            role: Role::from_label(role),
        }
    }
}

/// Who may delete which requests. Deletion bypasses the state machine, so it
/// is limited to the configured roles and to statuses in the configured scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePolicy {
    roles: Vec<Role>,
    scope: DeleteScope,
}

impl DeletePolicy {
    pub fn new(roles: Vec<Role>, scope: DeleteScope) -> Self {
        Self { roles, scope }
    }

    pub fn from_config(config: &ApprovalConfig) -> Self {
        Self::new(
            config
                .delete_roles
                .iter()
                .map(|label| Role::from_label(label))
                .collect(),
            config.delete_scope,
        )
    }

    pub fn permits(&self, role: &Role, status: ApprovalStatus) -> bool {
        let in_scope = match self.scope {
            DeleteScope::Any => true,
            DeleteScope::PendingOnly => status == ApprovalStatus::Pending,
            DeleteScope::PendingOrTerminal => {
                status == ApprovalStatus::Pending || status.is_terminal()
            }
        };
        in_scope && self.roles.contains(role)
    }
}

impl Default for DeletePolicy {
    fn default() -> Self {
        Self::from_config(&ApprovalConfig::default())
    }
}

/// A role's dashboard: requests waiting on it and everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleQueue {
    pub pending: Vec<TireReplacementRequest>,
    pub processed: Vec<TireReplacementRequest>,
}

pub struct RequestOrchestrator<R, N> {
    repository: R,
    notifier: N,
    resolver: PhotoResolver,
    date_policy: DatePolicy,
    delete_policy: DeletePolicy,
    notifications: NotificationConfig,
}

impl RequestOrchestrator<SledRepository, LogNotifier> {
    /// Sled store at the configured path, notifications to the log.
    pub fn open(config: &AppConfig) -> Result<Self, RepositoryError> {
        let repository = SledRepository::open(&config.storage.path)?;
        Ok(Self::new(repository, LogNotifier, config))
    }
}

impl<R: RequestRepository, N: Notifier> RequestOrchestrator<R, N> {
    pub fn new(repository: R, notifier: N, config: &AppConfig) -> Self {
        Self {
            repository,
            notifier,
            resolver: PhotoResolver::new(&config.photos),
            date_policy: config.validation.date_policy,
            delete_policy: DeletePolicy::from_config(&config.approvals),
            notifications: config.notifications.clone(),
        }
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn resolver(&self) -> &PhotoResolver {
        &self.resolver
    }

    /// Validator anchored to today's date.
    pub fn validator(&self) -> FormValidator {
        FormValidator::new(self.date_policy, Utc::now().date_naive())
    }

    /// Validate a new request, store it as pending, then tell the manager.
    pub fn submit(
        &self,
        ctx: &ActorContext,
        draft: &RequestDraft,
        photos: &[PhotoUpload],
    ) -> Result<TireReplacementRequest, ActionFailure> {
        let validator = self.validator();
        let errors = validator.validate_with_photos(draft, photos.len());
        if !errors.is_empty() {
            info!(actor = %ctx.actor, failed = errors.len(), "submission failed validation");
            return Err(ActionFailure::not_persisted(errors));
        }
        let details = validator.finalise(draft).map_err(ActionFailure::not_persisted)?;

        let request = self
            .repository
            .create(details, photos)
            .map_err(|err| self.store_failure(err, "create"))?;

        info!(
            request_id = %request.id,
            actor = %ctx.actor,
            role = %ctx.role,
            photos = request.photos.len(),
            "request submitted"
        );
        self.dispatch(notify::for_submission(&request, &self.notifications));

        Ok(request)
    }

    /// Re-validate and store edited details. Only pending requests can be
    /// edited; an empty photo list keeps the photos already stored.
    pub fn update(
        &self,
        ctx: &ActorContext,
        id: &RequestId,
        draft: &RequestDraft,
        photos: &[PhotoUpload],
    ) -> Result<TireReplacementRequest, ActionFailure> {
        let validator = self.validator();
        let errors = validator.validate_with_photos(draft, photos.len());
        if !errors.is_empty() {
            return Err(ActionFailure::not_persisted(errors));
        }
        let details = validator.finalise(draft).map_err(ActionFailure::not_persisted)?;

        let current = self
            .repository
            .get(id)
            .map_err(|err| self.store_failure(err, "update"))?;
        if current.status != ApprovalStatus::Pending {
            warn!(request_id = %id, status = %current.status, "edit refused");
            return Err(ActionFailure::not_persisted(OrchestratorError::NotEditable {
                id: id.clone(),
                status: current.status,
            }));
        }

        let replacement = (!photos.is_empty()).then_some(photos);
        let request = self
            .repository
            .update(id, details, replacement)
            .map_err(|err| self.store_failure(err, "update"))?;

        info!(request_id = %id, actor = %ctx.actor, "request updated");
        Ok(request)
    }

    /// Apply a role action. The state machine runs here first so an illegal
    /// action never reaches the store; the store then re-checks it against
    /// the status it actually holds.
    pub fn act(
        &self,
        ctx: &ActorContext,
        id: &RequestId,
        action: Action,
        reason: Option<&str>,
    ) -> Result<TireReplacementRequest, ActionFailure> {
        let current = self
            .repository
            .get(id)
            .map_err(|err| self.store_failure(err, "act"))?;

        let change = StatusChange::record(
            ctx.actor.clone(),
            ctx.role.clone(),
            action,
            current.status,
            reason,
        )
        .map_err(|err| {
            warn!(request_id = %id, role = %ctx.role, %action, error = %err, "action refused");
            ActionFailure::not_persisted(err)
        })?;

        let stored = self
            .repository
            .apply_change(id, change.clone())
            .map_err(|err| self.store_failure(err, "act"))?;

        info!(
            request_id = %id,
            actor = %ctx.actor,
            role = %ctx.role,
            from = %change.from,
            to = %change.to,
            "status changed"
        );

        // read back before anyone renders the new status
        let request = self.repository.get(id).map_err(|err| ActionFailure {
            persisted: true,
            ..self.store_failure(err, "read back")
        })?;
        if request.status != stored.status {
            warn!(request_id = %id, stored = %stored.status, read = %request.status, "status moved on after write");
        }

        if let Some(notification) = notify::for_transition(&request, &change, &self.notifications) {
            self.dispatch(notification);
        }

        Ok(request)
    }

    pub fn approve(
        &self,
        ctx: &ActorContext,
        id: &RequestId,
    ) -> Result<TireReplacementRequest, ActionFailure> {
        self.act(ctx, id, Action::Approve, None)
    }

    pub fn reject(
        &self,
        ctx: &ActorContext,
        id: &RequestId,
        reason: &str,
    ) -> Result<TireReplacementRequest, ActionFailure> {
        self.act(ctx, id, Action::Reject, Some(reason))
    }

    /// Remove a request outright, subject to the delete policy.
    pub fn delete(&self, ctx: &ActorContext, id: &RequestId) -> Result<(), ActionFailure> {
        let current = self
            .repository
            .get(id)
            .map_err(|err| self.store_failure(err, "delete"))?;

        if !self.delete_policy.permits(&ctx.role, current.status) {
            warn!(request_id = %id, role = %ctx.role, status = %current.status, "delete refused");
            return Err(ActionFailure::not_persisted(OrchestratorError::Forbidden {
                role: ctx.role.clone(),
                status: current.status,
            }));
        }

        self.repository
            .delete(id)
            .map_err(|err| self.store_failure(err, "delete"))?;
        info!(request_id = %id, actor = %ctx.actor, role = %ctx.role, "request deleted");

        Ok(())
    }

    pub fn get(&self, id: &RequestId) -> Result<TireReplacementRequest, ActionFailure> {
        self.repository
            .get(id)
            .map_err(|err| self.store_failure(err, "get"))
    }

    pub fn list(&self) -> Result<Vec<TireReplacementRequest>, ActionFailure> {
        self.repository
            .list()
            .map_err(|err| self.store_failure(err, "list"))
    }

    /// Splits all requests into the caller's pending table and the rest.
    pub fn queue(&self, ctx: &ActorContext) -> Result<RoleQueue, ActionFailure> {
        let waiting_on = ctx.role.queue();
        let (pending, processed) = self
            .list()?
            .into_iter()
            .partition(|request| waiting_on.contains(&request.status));

        Ok(RoleQueue { pending, processed })
    }

    /// Actions the caller's dashboard should enable for this request.
    pub fn available_actions(
        &self,
        ctx: &ActorContext,
        request: &TireReplacementRequest,
    ) -> Vec<Action> {
        approval::available_actions(request.status, &ctx.role)
    }

    /// One fallback chain per stored photo, in photo order.
    pub fn photo_chains(&self, request: &TireReplacementRequest) -> Vec<FallbackChain> {
        self.resolver.resolve_all(&request.photos)
    }

    fn dispatch(&self, notification: Notification) {
        if let Err(err) = self.notifier.notify(&notification) {
            warn!(
                request_id = %notification.request_id,
                error = %err,
                "notification failed, request is unaffected"
            );
        }
    }

    fn store_failure(&self, err: RepositoryError, operation: &str) -> ActionFailure {
        match &err {
            RepositoryError::Unavailable(message) => {
                error!(operation, %message, "request store unavailable");
            }
            RepositoryError::Codec(message) => {
                error!(operation, %message, "stored request is unreadable");
            }
            other => warn!(operation, error = %other, "request store refused"),
        }
        ActionFailure::not_persisted(err)
    }
}
