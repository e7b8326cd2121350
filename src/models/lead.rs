use serde::{Deserialize, Serialize};

use crate::models::phone::normalize_phone;

/// Notification recipient, owned by the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub organization_id: i64,
    pub email: Option<String>,
    pub phone: String,
    pub language_code: Option<String>,
}

impl Lead {
    pub fn normalized_phone(&self) -> String {
        normalize_phone(&self.phone)
    }
}
