use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::Gateway;
use crate::models::profile::{Role, UserProfile};

/// Backend auth result. Passed to every gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: Uuid,
    pub access_token: String,
}

/// The signed-in user of this instance.
#[derive(Debug, Clone)]
pub struct Session {
    pub credentials: Credentials,
    pub profile: UserProfile,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.credentials.user_id
    }

    pub fn role(&self) -> Role {
        self.profile.role
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignIn {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub user_id: Uuid,
    pub profile: UserProfile,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id(),
            profile: session.profile.clone(),
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

pub async fn sign_in(gateway: &dyn Gateway, request: &SignIn) -> Result<Session, AppError> {
    require("email", &request.email)?;
    require("password", &request.password)?;

    let credentials = gateway
        .authenticate(request.email.trim(), &request.password)
        .await?;
    let profile = gateway
        .profile(&credentials, credentials.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("profile {} not found", credentials.user_id)))?;

    if profile.banned {
        let _ = gateway.revoke(&credentials).await;
        return Err(AppError::Forbidden("account is banned".to_string()));
    }

    info!(user_id = %profile.id, role = ?profile.role, "signed in");
    Ok(Session {
        credentials,
        profile,
    })
}

pub async fn sign_up(gateway: &dyn Gateway, request: &SignUp) -> Result<Session, AppError> {
    require("email", &request.email)?;
    require("password", &request.password)?;
    require("name", &request.name)?;
    require("phone", &request.phone)?;

    let credentials = gateway
        .register(request.email.trim(), &request.password)
        .await?;
    let profile = UserProfile::signed_up(
        credentials.user_id,
        request.name.trim().to_string(),
        request.phone.trim().to_string(),
        request.role,
    );
    gateway.insert_profile(&credentials, &profile).await?;

    info!(user_id = %profile.id, role = ?profile.role, "signed up");
    Ok(Session {
        credentials,
        profile,
    })
}

#[cfg(test)]
mod tests {
    use super::{sign_in, sign_up, SignIn, SignUp};
    use crate::error::AppError;
    use crate::gateway::memory::MemoryGateway;
    use crate::gateway::Gateway;
    use crate::models::profile::{ProfilePatch, Role};

    fn courier_sign_up() -> SignUp {
        SignUp {
            email: "joao@example.com".to_string(),
            password: "secret".to_string(),
            name: "João".to_string(),
            phone: "+55 11 90000-0000".to_string(),
            role: Role::Courier,
        }
    }

    #[tokio::test]
    async fn courier_starts_unverified_with_full_rating() {
        let gateway = MemoryGateway::new(8);
        let session = sign_up(&gateway, &courier_sign_up()).await.unwrap();

        assert_eq!(session.role(), Role::Courier);
        assert_eq!(session.profile.rating, Some(5.0));
        assert_eq!(session.profile.license_verified, Some(false));
        assert!(!session.profile.is_verified_courier());
    }

    #[tokio::test]
    async fn sign_in_loads_profile() {
        let gateway = MemoryGateway::new(8);
        let created = sign_up(&gateway, &courier_sign_up()).await.unwrap();

        let session = sign_in(
            &gateway,
            &SignIn {
                email: "joao@example.com".to_string(),
                password: "secret".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(session.user_id(), created.user_id());
        assert_eq!(session.profile.name, "João");
    }

    #[tokio::test]
    async fn banned_user_cannot_sign_in() {
        let gateway = MemoryGateway::new(8);
        let created = sign_up(&gateway, &courier_sign_up()).await.unwrap();
        gateway
            .update_profile(
                &created.credentials,
                created.user_id(),
                &ProfilePatch {
                    banned: Some(true),
                    ..ProfilePatch::default()
                },
            )
            .await
            .unwrap();

        let result = sign_in(
            &gateway,
            &SignIn {
                email: "joao@example.com".to_string(),
                password: "secret".to_string(),
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let gateway = MemoryGateway::new(8);
        let mut request = courier_sign_up();
        request.name = "  ".to_string();

        let result = sign_up(&gateway, &request).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
