use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NEW_COURIER_RATING: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Courier,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub role: Role,
    pub rating: Option<f64>,
    pub license_verified: Option<bool>,
    pub vehicle_docs_verified: Option<bool>,
    pub banned: bool,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Profile written at sign-up. Couriers start unverified with a full rating.
    pub fn signed_up(id: Uuid, name: String, phone: String, role: Role) -> Self {
        let courier = role == Role::Courier;
        Self {
            id,
            name,
            phone,
            role,
            rating: courier.then_some(NEW_COURIER_RATING),
            license_verified: courier.then_some(false),
            vehicle_docs_verified: courier.then_some(false),
            banned: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_verified_courier(&self) -> bool {
        self.role == Role::Courier
            && self.license_verified == Some(true)
            && self.vehicle_docs_verified == Some(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub license_verified: Option<bool>,
    pub vehicle_docs_verified: Option<bool>,
    pub banned: Option<bool>,
}

impl ProfilePatch {
    pub fn apply(&self, profile: &mut UserProfile) {
        if let Some(name) = &self.name {
            profile.name = name.clone();
        }
        if let Some(phone) = &self.phone {
            profile.phone = phone.clone();
        }
        if let Some(verified) = self.license_verified {
            profile.license_verified = Some(verified);
        }
        if let Some(verified) = self.vehicle_docs_verified {
            profile.vehicle_docs_verified = Some(verified);
        }
        if let Some(banned) = self.banned {
            profile.banned = banned;
        }
    }
}
