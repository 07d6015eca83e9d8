//! Approval chain state machine
//!
//! A request moves Manager -> TTO -> Engineer -> Seller. Every stage may
//! approve (move forward) or reject (move to that stage's terminal rejected
//! state, with a reason). Nothing ever moves backwards and terminal states
//! accept no further action.
use super::error::TransitionError;
use super::request::TimeStamp;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApprovalStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    ManagerApproved,
    #[n(2)]
    ManagerRejected,
    #[n(3)]
    TtoApproved,
    #[n(4)]
    TtoRejected,
    #[n(5)]
    EngineerApproved,
    #[n(6)]
    EngineerRejected,
    #[n(7)]
    Ordered,
    #[n(8)]
    Fulfilled,
    #[n(9)]
    FulfillmentRejected,
}

/// Caller role. Unknown labels are kept verbatim and are never allowed to act.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    Requester,
    #[n(1)]
    Manager,
    #[n(2)]
    Tto,
    #[n(3)]
    Engineer,
    #[n(4)]
    Seller,
    #[n(5)]
    Unrecognized(#[n(0)] String),
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    #[n(0)]
    Approve,
    #[n(1)]
    Reject,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 10] = [
        ApprovalStatus::Pending,
        ApprovalStatus::ManagerApproved,
        ApprovalStatus::ManagerRejected,
        ApprovalStatus::TtoApproved,
        ApprovalStatus::TtoRejected,
        ApprovalStatus::EngineerApproved,
        ApprovalStatus::EngineerRejected,
        ApprovalStatus::Ordered,
        ApprovalStatus::Fulfilled,
        ApprovalStatus::FulfillmentRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::ManagerApproved => "MANAGER_APPROVED",
            ApprovalStatus::ManagerRejected => "MANAGER_REJECTED",
            ApprovalStatus::TtoApproved => "TTO_APPROVED",
            ApprovalStatus::TtoRejected => "TTO_REJECTED",
            ApprovalStatus::EngineerApproved => "ENGINEER_APPROVED",
            ApprovalStatus::EngineerRejected => "ENGINEER_REJECTED",
            ApprovalStatus::Ordered => "ORDERED",
            ApprovalStatus::Fulfilled => "FULFILLED",
            ApprovalStatus::FulfillmentRejected => "FULFILLMENT_REJECTED",
        }
    }

    /// Status badge text, e.g. `MANAGER APPROVED`.
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            ApprovalStatus::ManagerRejected
                | ApprovalStatus::TtoRejected
                | ApprovalStatus::EngineerRejected
                | ApprovalStatus::FulfillmentRejected
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.is_rejected() || *self == ApprovalStatus::Fulfilled
    }

    /// The role whose turn it is, if any.
    pub fn next_stage(&self) -> Option<Role> {
        match self {
            ApprovalStatus::Pending => Some(Role::Manager),
            ApprovalStatus::ManagerApproved => Some(Role::Tto),
            ApprovalStatus::TtoApproved => Some(Role::Engineer),
            ApprovalStatus::EngineerApproved | ApprovalStatus::Ordered => Some(Role::Seller),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Role {
    /// Classifies the role string handed over by the login layer. Never fails.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "manager" => Role::Manager,
            "tto" | "transport-technical-officer" | "transport_technical_officer" => Role::Tto,
            "engineer" => Role::Engineer,
            "seller" | "fulfillment" | "vendor" => Role::Seller,
            "user" | "employee" | "requester" => Role::Requester,
            _ => Role::Unrecognized(label.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Role::Requester => "requester",
            Role::Manager => "manager",
            Role::Tto => "tto",
            Role::Engineer => "engineer",
            Role::Seller => "seller",
            Role::Unrecognized(label) => label,
        }
    }

    /// Statuses that land in this role's "pending" dashboard table.
    pub fn queue(&self) -> &'static [ApprovalStatus] {
        match self {
            Role::Manager => &[ApprovalStatus::Pending],
            Role::Tto => &[ApprovalStatus::ManagerApproved],
            Role::Engineer => &[ApprovalStatus::TtoApproved],
            Role::Seller => &[ApprovalStatus::EngineerApproved, ApprovalStatus::Ordered],
            Role::Requester => &[ApprovalStatus::Pending],
            Role::Unrecognized(_) => &[],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Approve => f.write_str("approve"),
            Action::Reject => f.write_str("reject"),
        }
    }
}

fn transition(current: ApprovalStatus, role: &Role, action: Action) -> Option<ApprovalStatus> {
    use Action::*;
    use ApprovalStatus::*;

    let next = match (role, current, action) {
        (Role::Manager, Pending, Approve) => ManagerApproved,
        (Role::Manager, Pending, Reject) => ManagerRejected,
        (Role::Tto, ManagerApproved, Approve) => TtoApproved,
        (Role::Tto, ManagerApproved, Reject) => TtoRejected,
        (Role::Engineer, TtoApproved, Approve) => EngineerApproved,
        (Role::Engineer, TtoApproved, Reject) => EngineerRejected,
        (Role::Seller, EngineerApproved, Approve) => Ordered,
        (Role::Seller, Ordered, Approve) => Fulfilled,
        (Role::Seller, EngineerApproved | Ordered, Reject) => FulfillmentRejected,
        _ => return None,
    };
    Some(next)
}

/// Applies a role action to a status.
///
/// Legality is checked before the reason, so an action that could never be
/// taken reports [`TransitionError::IllegalTransition`] even without a reason.
pub fn apply(
    current: ApprovalStatus,
    role: &Role,
    action: Action,
    reason: Option<&str>,
) -> Result<ApprovalStatus, TransitionError> {
    let next = transition(current, role, action).ok_or_else(|| {
        TransitionError::IllegalTransition {
            from: current,
            role: role.clone(),
            action,
        }
    })?;

    if action == Action::Reject && reason.map(str::trim).is_none_or(str::is_empty) {
        return Err(TransitionError::MissingReason);
    }

    Ok(next)
}

/// Actions the UI may offer this role for a request in `current`.
pub fn available_actions(current: ApprovalStatus, role: &Role) -> Vec<Action> {
    [Action::Approve, Action::Reject]
        .into_iter()
        .filter(|action| transition(current, role, *action).is_some())
        .collect()
}

/// One entry of a request's status history.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct StatusChange {
    #[n(0)]
    pub actor: String, // opaque user reference from the login layer
    #[n(1)]
    pub role: Role,
    #[n(2)]
    pub action: Action,
    #[n(3)]
    pub from: ApprovalStatus,
    #[n(4)]
    pub to: ApprovalStatus,
    #[n(5)]
    pub reason: Option<String>,
    #[n(6)]
    pub at: TimeStamp<Utc>,
}

impl StatusChange {
    /// Runs the state machine and stamps the result.
    pub fn record(
        actor: impl Into<String>,
        role: Role,
        action: Action,
        from: ApprovalStatus,
        reason: Option<&str>,
    ) -> Result<Self, TransitionError> {
        let to = apply(from, &role, action, reason)?;
        let reason = match action {
            Action::Reject => reason.map(|r| r.trim().to_string()),
            Action::Approve => None,
        };

        Ok(Self {
            actor: actor.into(),
            role,
            action,
            from,
            to,
            reason,
            at: TimeStamp::new(),
        })
    }

    /// Re-runs the state machine for this change against `current`, the way the
    /// store checks an incoming action against what it actually holds.
    pub fn replay(&self, current: ApprovalStatus) -> Result<ApprovalStatus, TransitionError> {
        let to = apply(current, &self.role, self.action, self.reason.as_deref())?;
        if current != self.from || to != self.to {
            return Err(TransitionError::IllegalTransition {
                from: current,
                role: self.role.clone(),
                action: self.action,
            });
        }
        Ok(to)
    }
}
