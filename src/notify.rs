//! Best-effort notifications to the next stage of the approval chain
use super::approval::{Action, ApprovalStatus, Role, StatusChange};
use super::config::NotificationConfig;
use super::request::{RequestId, TireReplacementRequest};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// A stage of the chain, with its configured address if there is one
    Stage { role: Role, address: Option<String> },
    /// The requester's own email from the form
    Requester(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub request_id: RequestId,
    pub recipient: Recipient,
    pub subject: String,
    pub body: String,
    pub link: Option<String>,
}

/// Delivery is external. Failures are reported, never retried here.
pub trait Notifier {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        (**self).notify(notification)
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        (**self).notify(notification)
    }
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            request_id = %notification.request_id,
            recipient = ?notification.recipient,
            subject = %notification.subject,
            link = ?notification.link,
            "notification"
        );
        Ok(())
    }
}

fn stage(role: Role, config: &NotificationConfig) -> Recipient {
    let address = match role {
        Role::Manager => config.manager.clone(),
        Role::Tto => config.tto.clone(),
        Role::Engineer => config.engineer.clone(),
        Role::Seller => config.seller.clone(),
        Role::Requester | Role::Unrecognized(_) => None,
    };
    Recipient::Stage { role, address }
}

fn dashboard_link(role: &Role, id: &RequestId, config: &NotificationConfig) -> Option<String> {
    config.dashboard_base_url.as_ref().map(|base| {
        format!(
            "{}/{}?requestId={}",
            base.trim_end_matches('/'),
            role.label(),
            id
        )
    })
}

fn summary(request: &TireReplacementRequest) -> String {
    let details = &request.details;
    format!(
        "Vehicle Number: {}\nVehicle Type: {}\nBrand/Model: {} {}\nSection: {}\nTire Size: {}\n\
         Number of Tires: {}\nNumber of Tubes: {}\nPresent KM: {}\nOfficer Service No: {}\nComments: {}",
        details.vehicle_no,
        details.vehicle_type,
        details.vehicle_brand,
        details.vehicle_model,
        details.user_section.label(),
        details.tire_size,
        details.no_of_tires,
        details.no_of_tubes,
        details.present_km,
        details.officer_service_no,
        details.comments,
    )
}

/// Tells the manager a new request is waiting.
pub fn for_submission(
    request: &TireReplacementRequest,
    config: &NotificationConfig,
) -> Notification {
    Notification {
        request_id: request.id.clone(),
        recipient: stage(Role::Manager, config),
        subject: format!(
            "New Tire Request Submitted - {}",
            request.details.vehicle_no
        ),
        body: format!(
            "A new tire replacement request requires your approval.\n\n{}",
            summary(request)
        ),
        link: dashboard_link(&Role::Manager, &request.id, config),
    }
}

/// After an approval the next stage is told; after a rejection the requester
/// is. A fulfilled request needs nobody's attention.
pub fn for_transition(
    request: &TireReplacementRequest,
    change: &StatusChange,
    config: &NotificationConfig,
) -> Option<Notification> {
    let vehicle_no = &request.details.vehicle_no;

    match change.action {
        Action::Reject => Some(Notification {
            request_id: request.id.clone(),
            recipient: Recipient::Requester(request.details.email.clone()),
            subject: format!("Tire Request Rejected - {vehicle_no}"),
            body: format!(
                "Your request was rejected by the {}.\nReason: {}\n\n{}",
                change.role,
                change.reason.as_deref().unwrap_or_default(),
                summary(request)
            ),
            link: None,
        }),
        Action::Approve => {
            let next = change.to.next_stage()?;
            let subject = if change.to == ApprovalStatus::Ordered {
                format!("Tire Order Placed - {vehicle_no}")
            } else {
                format!("Tire Request Awaiting Approval - {vehicle_no}")
            };
            Some(Notification {
                request_id: request.id.clone(),
                link: dashboard_link(&next, &request.id, config),
                recipient: stage(next, config),
                subject,
                body: format!(
                    "The request is now {} and needs your attention.\n\n{}",
                    change.to.label(),
                    summary(request)
                ),
            })
        }
    }
}
