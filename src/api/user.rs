use std::str::FromStr;

use axum::{
    extract::{Path, State},
    Json,
};
use bson::oid::ObjectId;
use tap::TapFallible;

use crate::error::Error;

use super::auth::{UserCollection, UserJson};

pub async fn index(State(users): State<UserCollection>) -> Result<Json<Vec<UserJson>>, Error> {
    let users = users.find_all().await?;

    Ok(Json(users.into_iter().map(Into::into).collect()))
}

pub async fn show(
    State(users): State<UserCollection>,
    Path(user_id): Path<String>,
) -> Result<Json<UserJson>, Error> {
    let user_id = ObjectId::from_str(&user_id)
        .map_err(|_| Error::NoResource)
        .tap_err(|_| tracing::debug!("tried accessing user with malformed id"))?;

    let user = users
        .get_one_by_id(user_id)
        .await?
        .ok_or(Error::NoResource)?;

    Ok(Json(user.into()))
}

/// Diagnostic leftover: dumps every user's phone/password(hash)/role to the
/// server log and acknowledges with static text.
pub async fn debug_all(State(users): State<UserCollection>) -> Result<&'static str, Error> {
    let users = users.find_all().await?;

    tracing::info!("{} users in store", users.len());
    for (index, user) in users.iter().enumerate() {
        tracing::info!(
            "#{} phone: {} password: {} role: {}",
            index + 1,
            user.phone,
            user.password,
            user.role,
        );
    }

    Ok("All users printed in terminal")
}
