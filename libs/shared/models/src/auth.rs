use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The acting user and the clinic the request is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub clinic_id: Uuid,
}

impl Identity {
    pub fn new(user_id: Uuid, clinic_id: Uuid) -> Self {
        Self { user_id, clinic_id }
    }

    /// Identity used by the scheduler when no user triggered the change.
    pub fn system(clinic_id: Uuid) -> Self {
        Self {
            user_id: Uuid::nil(),
            clinic_id,
        }
    }

    pub fn is_system(&self) -> bool {
        self.user_id.is_nil()
    }
}
