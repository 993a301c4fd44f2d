use argon2::Argon2;
use axum::{extract::State, Json};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tap::TapFallible;

use crate::{
    error::{Error, UnauthorizedType},
    mongo_ext::{self, Collection},
    util::{hash_password, verify_password, ObjectIdString, PhoneString},
};

pub const DEFAULT_ROLE: &str = "customer";

#[derive(Clone)]
pub struct UserCollection(pub Collection<UserModel>);

impl std::ops::Deref for UserCollection {
    type Target = Collection<UserModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Stored shape. Everything except phone, password and role is optional
/// free text copied from whatever the client submitted at registration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub phone: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_type: Option<String>,

    /// Argon2 PHC string, never the submitted clear text.
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Response shape: the stored document with `_id` rendered as a plain
/// string the way the frontend expects it.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserJson {
    #[serde(rename = "_id")]
    pub id: ObjectIdString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub phone: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_type: Option<String>,

    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl From<UserModel> for UserJson {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id.into(),
            user_id: user.user_id,
            role: user.role,
            name: user.name,
            email: user.email,
            phone: user.phone,
            worker_type: user.worker_type,
            password: user.password,
            city: user.city,
            district: user.district,
            state: user.state,
            address: user.address,
            location: user.location,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub phone: PhoneString,
    pub password: String,

    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub worker_type: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterResponse {
    pub message: String,
}

pub async fn create_user(
    users: UserCollection,
    argon: Argon2<'_>,
    request: RegisterRequest,
) -> Result<UserModel, Error> {
    let model = UserModel {
        id: ObjectId::new(),
        user_id: request.user_id,
        role: request.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        name: request.name,
        email: request.email,
        phone: request.phone.into(),
        worker_type: request.worker_type,
        password: hash_password(&argon, &request.password)?,
        city: request.city,
        district: request.district,
        state: request.state,
        address: request.address,
        location: request.location,
    };

    match users.insert_one(&model, None).await {
        Ok(_) => Ok(model),
        Err(err) if mongo_ext::is_duplicate_key(&err) => Err(Error::PhoneAlreadyRegistered)
            .tap_err(|_| tracing::debug!("registration with already registered phone")),
        Err(err) => Err(err.into()),
    }
}

#[tracing::instrument(skip_all)]
pub async fn register(
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, Error> {
    let user = create_user(users, argon, request).await?;

    Ok(Json(RegisterResponse {
        message: format!("{} registered successfully", user.role),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub phone: PhoneString,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserJson,
}

pub async fn login(
    State(users): State<UserCollection>,
    State(argon): State<Argon2<'static>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Error> {
    let user = users
        .find_one(
            bson::doc! {
                "phone": request.phone.as_str(),
            },
            None,
        )
        .await?
        .ok_or(Error::Unauthorized(UnauthorizedType::UnknownPhone))
        .tap_err(|_| tracing::debug!("login attempt with unknown phone"))?;

    if !verify_password(&argon, &request.password, &user.password) {
        return Err(Error::Unauthorized(UnauthorizedType::WrongPassword))
            .tap_err(|_| tracing::debug!("login attempt with wrong password"));
    }

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user: user.into(),
    }))
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use axum::Json;

    use crate::{
        api::tests::{bootstrap, register_request},
        error::{Error, UnauthorizedType},
    };

    #[tokio::test]
    async fn test_register_defaults_role() {
        let Some(bootstrap) = bootstrap().await else {
            return;
        };

        let Json(response) = super::register(
            bootstrap.user_collection(),
            bootstrap.argon(),
            Json(register_request("9876543210", "password")),
        )
        .await
        .unwrap();

        assert_eq!(response.message, "customer registered successfully");

        let user = bootstrap
            .app_state
            .user_collection
            .find_one(bson::doc! { "phone": "9876543210" }, None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(user.role, super::DEFAULT_ROLE);
        assert_ne!(user.password, "password");
        assert!(user.password.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn test_register_keeps_submitted_role() {
        let Some(bootstrap) = bootstrap().await else {
            return;
        };

        let mut request = register_request("9876543210", "password");
        request.role = Some("worker".to_string());

        let Json(response) = super::register(
            bootstrap.user_collection(),
            bootstrap.argon(),
            Json(request),
        )
        .await
        .unwrap();

        assert_eq!(response.message, "worker registered successfully");
    }

    #[tokio::test]
    async fn test_register_duplicate_phone() {
        let Some(bootstrap) = bootstrap().await else {
            return;
        };

        let _ = super::register(
            bootstrap.user_collection(),
            bootstrap.argon(),
            Json(register_request("9876543210", "password")),
        )
        .await
        .unwrap();

        let err = super::register(
            bootstrap.user_collection(),
            bootstrap.argon(),
            Json(register_request("9876543210", "other password")),
        )
        .await
        .unwrap_err();

        assert_matches!(err, Error::PhoneAlreadyRegistered);
    }

    #[tokio::test]
    async fn test_login() {
        let Some(bootstrap) = bootstrap().await else {
            return;
        };

        let _ = super::register(
            bootstrap.user_collection(),
            bootstrap.argon(),
            Json(register_request("9876543210", "password")),
        )
        .await
        .unwrap();

        let err = super::login(
            bootstrap.user_collection(),
            bootstrap.argon(),
            Json(super::LoginRequest {
                phone: "1111111111".into(),
                password: "password".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Unauthorized(UnauthorizedType::UnknownPhone));

        let err = super::login(
            bootstrap.user_collection(),
            bootstrap.argon(),
            Json(super::LoginRequest {
                phone: "9876543210".into(),
                password: "wrongpassword".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_matches!(err, Error::Unauthorized(UnauthorizedType::WrongPassword));

        let Json(response) = super::login(
            bootstrap.user_collection(),
            bootstrap.argon(),
            Json(super::LoginRequest {
                phone: "9876543210".into(),
                password: "password".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.message, "Login successful");
        assert_eq!(response.user.phone, "9876543210");
        assert_eq!(response.user.name.as_deref(), Some("name"));
        assert!(response.user.password.starts_with("$argon2"));
    }

    #[test]
    fn register_request_accepts_numeric_phone() {
        let request: super::RegisterRequest = serde_json::from_value(serde_json::json!({
            "phone": 9876543210u64,
            "password": "password",
        }))
        .unwrap();

        assert_eq!(request.phone.as_str(), "9876543210");
        assert!(request.role.is_none());
    }

    #[test]
    fn user_json_renders_id_as_string() {
        let user = super::UserModel {
            id: bson::oid::ObjectId::new(),
            user_id: None,
            role: "customer".to_string(),
            name: None,
            email: None,
            phone: "9876543210".to_string(),
            worker_type: None,
            password: "$argon2id$stub".to_string(),
            city: None,
            district: None,
            state: None,
            address: None,
            location: None,
        };
        let id = user.id;

        let value = serde_json::to_value(super::UserJson::from(user)).unwrap();

        assert_eq!(value["_id"], serde_json::json!(id.to_string()));
        assert_eq!(value["phone"], serde_json::json!("9876543210"));
        // optional fields that were never submitted stay absent
        assert!(value.get("name").is_none());
    }
}
