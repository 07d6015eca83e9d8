//! End-to-end scenarios for the request workflow
//!
//! Each test drives a [`RequestOrchestrator`] over a real sled store, the way
//! the dashboards do: submit a form, walk it through the approval chain and
//! check what is stored and who gets told.

use std::sync::{Arc, Mutex};

use tempfile::tempdir;
use tire_approval::{
    approval::{Action, ApprovalStatus, Role, StatusChange},
    config::{AppConfig, DeleteScope},
    error::{OrchestratorError, RepositoryError, TransitionError},
    notify::{Notification, Notifier, Recipient},
    orchestrator::{ActorContext, DeletePolicy, RequestOrchestrator},
    photo::{PhotoClass, PhotoReference},
    repository::{PhotoUpload, RequestRepository, SledRepository},
    request::{RequestDetails, RequestDraft, RequestId, TireReplacementRequest},
    validation::{Field, KM_ORDER, TOO_MANY_PHOTOS},
};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _: &Notification) -> anyhow::Result<()> {
        anyhow::bail!("mail relay refused the connection")
    }
}

/// A store that is never reachable.
struct OfflineRepository;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("connection refused".to_string())
}

impl RequestRepository for OfflineRepository {
    fn create(
        &self,
        _: RequestDetails,
        _: &[PhotoUpload],
    ) -> Result<TireReplacementRequest, RepositoryError> {
        Err(offline())
    }

    fn update(
        &self,
        _: &RequestId,
        _: RequestDetails,
        _: Option<&[PhotoUpload]>,
    ) -> Result<TireReplacementRequest, RepositoryError> {
        Err(offline())
    }

    fn delete(&self, _: &RequestId) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn get(&self, _: &RequestId) -> Result<TireReplacementRequest, RepositoryError> {
        Err(offline())
    }

    fn list(&self) -> Result<Vec<TireReplacementRequest>, RepositoryError> {
        Err(offline())
    }

    fn apply_change(
        &self,
        _: &RequestId,
        _: StatusChange,
    ) -> Result<TireReplacementRequest, RepositoryError> {
        Err(offline())
    }

    fn photo(&self, _: &PhotoReference) -> Result<Option<Vec<u8>>, RepositoryError> {
        Err(offline())
    }
}

fn valid_draft() -> RequestDraft {
    RequestDraft::new()
        .set(Field::VehicleNo, "ABC-1234")
        .set(Field::VehicleType, "Truck")
        .set(Field::VehicleBrand, "Isuzu")
        .set(Field::VehicleModel, "NPR")
        .set(Field::UserSection, "Transport Department")
        .set(Field::ReplacementDate, "2024-01-15")
        .set(Field::ExistingMake, "Bridgestone")
        .set(Field::TireSize, "195/65R15")
        .set(Field::NoOfTires, "4")
        .set(Field::NoOfTubes, "0")
        .set(Field::CostCenter, "1001")
        .set(Field::PresentKm, "45000")
        .set(Field::PreviousKm, "40000")
        .set(Field::WearIndicator, "Yes")
        .set(Field::WearPattern, "Center")
        .set(Field::OfficerServiceNo, "SVC-77")
        .set(Field::Comments, "Front tires worn past the indicator")
        .set(Field::Email, "transport@company.com")
}

fn sled_repository(dir: &tempfile::TempDir, name: &str) -> anyhow::Result<SledRepository> {
    // Sled uses file-based locking to prevent concurrent access, so every test
    // opens its own database under a temp directory for simplified cleanup.
    let db = sled::open(dir.path().join(name))?;
    Ok(SledRepository::new(Arc::new(db))?)
}

fn actor(role: &str) -> ActorContext {
    ActorContext::new(format!("{role}_1"), role)
}

#[test]
fn tto_rejection_ends_the_chain() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "tto_rejection.db")?,
        notifier.clone(),
        &AppConfig::default(),
    );

    let request = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;
    assert_eq!(request.status, ApprovalStatus::Pending);
    assert_eq!(request.details.present_km, 45000);
    assert_eq!(request.details.previous_km, 40000);
    assert_eq!(request.details.no_of_tires, 4);

    let request = orchestrator.approve(&actor("manager"), &request.id)?;
    assert_eq!(request.status, ApprovalStatus::ManagerApproved);

    let request = orchestrator.reject(&actor("tto"), &request.id, "tire size mismatch")?;
    assert_eq!(request.status, ApprovalStatus::TtoRejected);
    assert_eq!(request.reject_reason.as_deref(), Some("tire size mismatch"));
    assert_eq!(request.history.len(), 2);
    assert_eq!(request.history[1].role, Role::Tto);

    for role in ["manager", "tto", "engineer", "seller", "user"] {
        for action in [Action::Approve, Action::Reject] {
            let failure = orchestrator
                .act(&actor(role), &request.id, action, Some("late"))
                .unwrap_err();
            assert!(matches!(
                failure.transition_error(),
                Some(TransitionError::IllegalTransition { .. })
            ));
            assert!(!failure.persisted);
        }
    }

    let stored = orchestrator.get(&request.id)?;
    assert_eq!(stored.status, ApprovalStatus::TtoRejected);
    assert_eq!(stored.history.len(), 2);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 3);
    assert!(matches!(
        &sent[0].recipient,
        Recipient::Stage { role: Role::Manager, .. }
    ));
    assert_eq!(sent[0].subject, "New Tire Request Submitted - ABC-1234");
    assert!(matches!(
        &sent[1].recipient,
        Recipient::Stage { role: Role::Tto, .. }
    ));
    assert_eq!(
        sent[2].recipient,
        Recipient::Requester("transport@company.com".to_string())
    );
    assert!(sent[2].body.contains("tire size mismatch"));

    Ok(())
}

#[test]
fn full_chain_reaches_fulfilled() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "full_chain.db")?,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let request = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;
    let id = request.id;

    orchestrator.approve(&actor("manager"), &id)?;
    orchestrator.approve(&actor("tto"), &id)?;
    orchestrator.approve(&actor("engineer"), &id)?;
    let ordered = orchestrator.approve(&actor("seller"), &id)?;
    assert_eq!(ordered.status, ApprovalStatus::Ordered);

    let fulfilled = orchestrator.approve(&actor("seller"), &id)?;
    assert_eq!(fulfilled.status, ApprovalStatus::Fulfilled);
    assert_eq!(fulfilled.reject_reason, None);
    assert_eq!(
        fulfilled
            .history
            .iter()
            .map(|change| change.to)
            .collect::<Vec<_>>(),
        vec![
            ApprovalStatus::ManagerApproved,
            ApprovalStatus::TtoApproved,
            ApprovalStatus::EngineerApproved,
            ApprovalStatus::Ordered,
            ApprovalStatus::Fulfilled,
        ]
    );
    assert!(
        orchestrator
            .available_actions(&actor("seller"), &fulfilled)
            .is_empty()
    );

    Ok(())
}

#[test]
fn roles_cannot_skip_their_turn() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "skip_turn.db")?,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let request = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;

    let failure = orchestrator.approve(&actor("engineer"), &request.id).unwrap_err();
    assert!(failure.transition_error().is_some());

    let failure = orchestrator.approve(&actor("auditor"), &request.id).unwrap_err();
    assert!(failure.transition_error().is_some());

    assert_eq!(
        orchestrator.get(&request.id)?.status,
        ApprovalStatus::Pending
    );

    Ok(())
}

#[test]
fn rejection_needs_a_reason() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "reject_reason.db")?,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let request = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;

    for reason in [None, Some(""), Some("   ")] {
        let failure = orchestrator
            .act(&actor("manager"), &request.id, Action::Reject, reason)
            .unwrap_err();
        assert_eq!(
            failure.transition_error(),
            Some(&TransitionError::MissingReason)
        );
        assert!(failure.user_message().contains("reason"));
    }

    let stored = orchestrator.get(&request.id)?;
    assert_eq!(stored.status, ApprovalStatus::Pending);
    assert!(stored.history.is_empty());

    Ok(())
}

#[test]
fn invalid_draft_is_never_stored() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "invalid_draft.db")?,
        notifier.clone(),
        &AppConfig::default(),
    );

    let draft = valid_draft()
        .set(Field::PreviousKm, "50000")
        .set(Field::Email, "transport@company");

    let failure = orchestrator
        .submit(&actor("user"), &draft, &[])
        .unwrap_err();
    let errors = failure.validation_errors().expect("validation failure");
    assert_eq!(errors.get(Field::PreviousKm), Some(KM_ORDER));
    assert_eq!(errors.get(Field::PresentKm), Some(KM_ORDER));
    assert!(errors.contains(Field::Email));
    assert!(!failure.persisted);

    let photos: Vec<PhotoUpload> = (0..6)
        .map(|i| PhotoUpload::new(format!("tire{i}.jpg"), vec![i as u8; 4]))
        .collect();
    let failure = orchestrator
        .submit(&actor("user"), &valid_draft(), &photos)
        .unwrap_err();
    assert_eq!(
        failure
            .validation_errors()
            .and_then(|errors| errors.get(Field::TirePhotos)),
        Some(TOO_MANY_PHOTOS)
    );

    assert!(orchestrator.list()?.is_empty());
    assert!(notifier.sent().is_empty());

    Ok(())
}

#[test]
fn edits_only_while_pending() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "edits.db")?,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let uploads = vec![PhotoUpload::new("front.jpg", b"front tire".to_vec())];
    let request = orchestrator.submit(&actor("user"), &valid_draft(), &uploads)?;
    assert_eq!(request.photos.len(), 1);

    let edited = RequestDraft::from_details(&request.details).set(Field::NoOfTires, "2");
    let updated = orchestrator.update(&actor("user"), &request.id, &edited, &[])?;
    assert_eq!(updated.details.no_of_tires, 2);
    assert_eq!(updated.photos, request.photos);

    orchestrator.approve(&actor("manager"), &request.id)?;

    let failure = orchestrator
        .update(&actor("user"), &request.id, &edited.set(Field::NoOfTires, "6"), &[])
        .unwrap_err();
    assert!(matches!(
        failure.error,
        OrchestratorError::NotEditable {
            status: ApprovalStatus::ManagerApproved,
            ..
        }
    ));
    assert_eq!(orchestrator.get(&request.id)?.details.no_of_tires, 2);

    Ok(())
}

#[test]
fn delete_follows_policy() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "delete.db")?,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let first = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;
    let second = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;

    let failure = orchestrator.delete(&actor("engineer"), &first.id).unwrap_err();
    assert!(matches!(failure.error, OrchestratorError::Forbidden { .. }));

    orchestrator.approve(&actor("manager"), &second.id)?;
    let failure = orchestrator.delete(&actor("manager"), &second.id).unwrap_err();
    assert!(matches!(
        failure.error,
        OrchestratorError::Forbidden {
            status: ApprovalStatus::ManagerApproved,
            ..
        }
    ));

    orchestrator.delete(&actor("manager"), &first.id)?;
    let failure = orchestrator.get(&first.id).unwrap_err();
    assert!(matches!(failure.error, OrchestratorError::NotFound(_)));
    assert_eq!(orchestrator.list()?.len(), 1);

    let orchestrator = orchestrator
        .with_delete_policy(DeletePolicy::new(vec![Role::Manager], DeleteScope::Any));
    orchestrator.delete(&actor("manager"), &second.id)?;
    assert!(orchestrator.list()?.is_empty());

    Ok(())
}

#[test]
fn failed_notification_keeps_the_change() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "notify_failure.db")?,
        FailingNotifier,
        &AppConfig::default(),
    );

    let request = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;
    let request = orchestrator.approve(&actor("manager"), &request.id)?;

    assert_eq!(request.status, ApprovalStatus::ManagerApproved);
    assert_eq!(
        orchestrator.get(&request.id)?.status,
        ApprovalStatus::ManagerApproved
    );

    Ok(())
}

#[test]
fn unreachable_store_is_retryable() {
    let orchestrator = RequestOrchestrator::new(
        OfflineRepository,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let failure = orchestrator
        .submit(&actor("user"), &valid_draft(), &[])
        .unwrap_err();
    assert!(failure.is_retryable());
    assert!(!failure.persisted);
    assert!(failure.user_message().ends_with("Your change was not saved."));

    let failure = orchestrator
        .approve(&actor("manager"), &RequestId::new("treq1missing"))
        .unwrap_err();
    assert!(matches!(failure.error, OrchestratorError::Unavailable(_)));
}

#[test]
fn store_refuses_stale_changes() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let repository = sled_repository(&temp_dir, "stale_change.db")?;

    let details = tire_approval::validation::FormValidator::default()
        .finalise(&valid_draft())
        .map_err(|errors| anyhow::anyhow!("{errors}"))?;
    let request = repository.create(details, &[])?;

    let change = StatusChange::record(
        "manager_1",
        Role::Manager,
        Action::Approve,
        ApprovalStatus::Pending,
        None,
    )?;
    repository.apply_change(&request.id, change.clone())?;

    // the same change again was recorded against a status the store no longer holds
    let result = repository.apply_change(&request.id, change);
    assert!(matches!(
        result,
        Err(RepositoryError::Rejected(TransitionError::IllegalTransition { .. }))
    ));
    assert_eq!(repository.get(&request.id)?.history.len(), 1);

    Ok(())
}

#[test]
fn uploaded_photos_are_stored_and_resolvable() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "photos.db")?,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let uploads = vec![
        PhotoUpload::new("front.PNG", b"front tire".to_vec()),
        PhotoUpload::new("rear", b"rear tire".to_vec()),
    ];
    let request = orchestrator.submit(&actor("user"), &valid_draft(), &uploads)?;

    assert_eq!(request.photos.len(), 2);
    assert!(request.photos[0].as_str().starts_with("uploads/"));
    assert!(request.photos[0].as_str().ends_with(".png"));
    assert!(request.photos[1].as_str().ends_with(".jpg"));

    let stored = orchestrator.repository().photo(&request.photos[0])?;
    assert_eq!(stored.as_deref(), Some(b"front tire".as_slice()));
    assert_eq!(
        orchestrator
            .repository()
            .photo(&PhotoReference::new("https://cdn/x.jpg"))?,
        None
    );

    let chains = orchestrator.photo_chains(&request);
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].class(), PhotoClass::Stored);
    assert_eq!(
        chains[0].sources()[0],
        format!("/{}", request.photos[0].as_str())
    );
    assert_eq!(chains[0].placeholder(), "/images/tire1.jpeg");
    assert_eq!(chains[1].placeholder(), "/images/tire2.jpeg");

    Ok(())
}

#[test]
fn replaced_and_deleted_photos_are_removed() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "photo_cleanup.db")?,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let old = vec![PhotoUpload::new("old.jpg", b"old".to_vec())];
    let request = orchestrator.submit(&actor("user"), &valid_draft(), &old)?;
    let twin = orchestrator.submit(&actor("user"), &valid_draft(), &old)?;
    let old_ref = request.photos[0].clone();
    assert_ne!(old_ref, twin.photos[0]);

    let new = vec![PhotoUpload::new("new.jpg", b"new".to_vec())];
    let draft = RequestDraft::from_details(&request.details);
    let updated = orchestrator.update(&actor("user"), &request.id, &draft, &new)?;
    let new_ref = updated.photos[0].clone();

    let repository = orchestrator.repository();
    assert_eq!(repository.photo(&old_ref)?, None);
    assert_eq!(repository.photo(&new_ref)?.as_deref(), Some(b"new".as_slice()));
    assert_eq!(repository.photo(&twin.photos[0])?.as_deref(), Some(b"old".as_slice()));

    orchestrator.delete(&actor("user"), &request.id)?;
    assert_eq!(orchestrator.repository().photo(&new_ref)?, None);
    assert_eq!(
        orchestrator.repository().photo(&twin.photos[0])?.as_deref(),
        Some(b"old".as_slice())
    );

    Ok(())
}

#[test]
fn refused_edit_keeps_the_photos() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "refused_edit.db")?,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let uploads = vec![PhotoUpload::new("front.jpg", b"front tire".to_vec())];
    let request = orchestrator.submit(&actor("user"), &valid_draft(), &uploads)?;
    orchestrator.approve(&actor("manager"), &request.id)?;

    let replacement = vec![PhotoUpload::new("other.jpg", b"other".to_vec())];
    let draft = RequestDraft::from_details(&request.details);
    let failure = orchestrator
        .repository()
        .update(&request.id, request.details.clone(), Some(&replacement))
        .unwrap_err();
    assert!(matches!(failure, RepositoryError::NotEditable { .. }));
    assert!(orchestrator.update(&actor("user"), &request.id, &draft, &replacement).is_err());

    let stored = orchestrator.get(&request.id)?;
    assert_eq!(stored.photos, request.photos);
    assert_eq!(
        orchestrator.repository().photo(&request.photos[0])?.as_deref(),
        Some(b"front tire".as_slice())
    );

    Ok(())
}

#[test]
fn queues_split_by_role() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let orchestrator = RequestOrchestrator::new(
        sled_repository(&temp_dir, "queues.db")?,
        Arc::new(RecordingNotifier::default()),
        &AppConfig::default(),
    );

    let waiting = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;
    let moved = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;
    orchestrator.approve(&actor("manager"), &moved.id)?;

    let manager = orchestrator.queue(&actor("manager"))?;
    assert_eq!(manager.pending.len(), 1);
    assert_eq!(manager.pending[0].id, waiting.id);
    assert_eq!(manager.processed.len(), 1);

    let tto = orchestrator.queue(&actor("tto"))?;
    assert_eq!(tto.pending.len(), 1);
    assert_eq!(tto.pending[0].id, moved.id);
    assert_eq!(
        orchestrator.available_actions(&actor("tto"), &tto.pending[0]),
        vec![Action::Approve, Action::Reject]
    );

    let stranger = orchestrator.queue(&actor("auditor"))?;
    assert!(stranger.pending.is_empty());
    assert_eq!(stranger.processed.len(), 2);

    Ok(())
}

#[test]
fn open_uses_configured_storage_path() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let mut config = AppConfig::default();
    config.storage.path = temp_dir.path().join("configured.db");

    let orchestrator = RequestOrchestrator::open(&config)?;
    let request = orchestrator.submit(&actor("user"), &valid_draft(), &[])?;
    orchestrator.repository().flush()?;

    assert!(config.storage.path.exists());
    assert_eq!(orchestrator.list()?.len(), 1);
    assert_eq!(orchestrator.get(&request.id)?.details.vehicle_no, "ABC-1234");

    Ok(())
}
