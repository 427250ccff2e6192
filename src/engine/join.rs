use std::collections::HashMap;

use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::Gateway;
use crate::models::profile::UserProfile;
use crate::session::Credentials;

/// Loads the profiles referenced by a set of rides in one round trip.
pub async fn profiles_for<I>(
    gateway: &dyn Gateway,
    auth: &Credentials,
    ids: I,
) -> Result<HashMap<Uuid, UserProfile>, AppError>
where
    I: IntoIterator<Item = Uuid>,
{
    let mut wanted: Vec<Uuid> = ids.into_iter().collect();
    wanted.sort_unstable();
    wanted.dedup();

    if wanted.is_empty() {
        return Ok(HashMap::new());
    }

    let profiles = gateway.profiles_by_ids(auth, &wanted).await?;
    Ok(profiles
        .into_iter()
        .map(|profile| (profile.id, profile))
        .collect())
}
