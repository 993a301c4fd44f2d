use axum::{extract::State, Json};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    error::Error,
    mongo_ext::Collection,
    notify::{self, NotificationLogCollection, Notifier},
    util::{FormattedDateTime, ObjectIdString},
};

pub const DEFAULT_STATUS: &str = "pending";

#[derive(Clone)]
pub struct BookingCollection(pub Collection<BookingModel>);

impl std::ops::Deref for BookingCollection {
    type Target = Collection<BookingModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Customer and worker name/phone are denormalized copies taken from the
/// request; nothing checks them against the users collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    pub date: bson::DateTime,
    pub status: String,
    pub payment_received: bool,
    pub rating: Option<f64>,
    pub feedback: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookingJson {
    #[serde(rename = "_id")]
    pub id: ObjectIdString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    pub date: FormattedDateTime,
    pub status: String,
    pub payment_received: bool,
    pub rating: Option<f64>,
    pub feedback: String,
}

impl From<BookingModel> for BookingJson {
    fn from(booking: BookingModel) -> Self {
        Self {
            id: booking.id.into(),
            customer_id: booking.customer_id,
            customer_name: booking.customer_name,
            customer_phone: booking.customer_phone,
            worker_id: booking.worker_id,
            worker_name: booking.worker_name,
            worker_phone: booking.worker_phone,
            service: booking.service,
            date: booking.date.into(),
            status: booking.status,
            payment_received: booking.payment_received,
            rating: booking.rating,
            feedback: booking.feedback,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub worker_name: Option<String>,
    #[serde(default)]
    pub worker_phone: Option<String>,
    #[serde(default)]
    pub service: Option<String>,

    #[serde(default)]
    pub date: Option<FormattedDateTime>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_received: Option<bool>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateResponse {
    pub message: String,
    pub booking: BookingJson,
}

#[tracing::instrument(skip_all)]
pub async fn create(
    State(bookings): State<BookingCollection>,
    State(notifier): State<Notifier>,
    State(notification_log): State<NotificationLogCollection>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, Error> {
    let model = BookingModel {
        id: ObjectId::new(),
        customer_id: request.customer_id,
        customer_name: request.customer_name,
        customer_phone: request.customer_phone,
        worker_id: request.worker_id,
        worker_name: request.worker_name,
        worker_phone: request.worker_phone,
        service: request.service,
        date: request
            .date
            .map(Into::into)
            .unwrap_or_else(|| OffsetDateTime::now_utc().into()),
        status: request
            .status
            .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        payment_received: request.payment_received.unwrap_or(false),
        rating: request.rating,
        feedback: request.feedback.unwrap_or_default(),
    };

    tracing::debug!("saving booking {:#?}", model);
    bookings.insert_one(&model, None).await?;

    notify::spawn_booking_alert(notifier, notification_log, model.clone());

    Ok(Json(CreateResponse {
        message: "Booking saved".to_string(),
        booking: model.into(),
    }))
}

pub async fn index(
    State(bookings): State<BookingCollection>,
) -> Result<Json<Vec<BookingJson>>, Error> {
    let bookings = bookings.find_all().await?;

    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use axum::Json;

    use crate::{
        api::tests::bootstrap,
        notify::{self, Channel, DeliveryStatus},
    };

    fn minimal_request() -> super::CreateRequest {
        serde_json::from_value(serde_json::json!({
            "customerName": "Asha",
            "customerPhone": "9876543210",
            "workerName": "Ravi",
            "workerPhone": "9123456780",
            "service": "Plumbing",
        }))
        .unwrap()
    }

    #[test]
    fn create_request_defaults_are_empty() {
        let request: super::CreateRequest =
            serde_json::from_value(serde_json::json!({})).unwrap();

        assert!(request.customer_id.is_none());
        assert!(request.date.is_none());
        assert!(request.status.is_none());
        assert!(request.payment_received.is_none());
        assert!(request.rating.is_none());
        assert!(request.feedback.is_none());
    }

    #[test]
    fn booking_json_keeps_null_rating() {
        let request = minimal_request();
        let model = super::BookingModel {
            id: bson::oid::ObjectId::new(),
            customer_id: request.customer_id,
            customer_name: request.customer_name,
            customer_phone: request.customer_phone,
            worker_id: request.worker_id,
            worker_name: request.worker_name,
            worker_phone: request.worker_phone,
            service: request.service,
            date: time::OffsetDateTime::now_utc().into(),
            status: super::DEFAULT_STATUS.to_string(),
            payment_received: false,
            rating: None,
            feedback: String::new(),
        };

        let value = serde_json::to_value(super::BookingJson::from(model)).unwrap();

        assert_eq!(value["status"], serde_json::json!("pending"));
        assert_eq!(value["paymentReceived"], serde_json::json!(false));
        assert_eq!(value["rating"], serde_json::Value::Null);
        assert_eq!(value["feedback"], serde_json::json!(""));
        assert!(value.get("customerId").is_none());
    }

    #[tokio::test]
    async fn test_create_booking_applies_defaults() {
        let Some(bootstrap) = bootstrap().await else {
            return;
        };

        // notification endpoints are unreachable in tests; the save must
        // still succeed
        let Json(response) = super::create(
            bootstrap.booking_collection(),
            bootstrap.notifier(),
            bootstrap.notification_log(),
            Json(minimal_request()),
        )
        .await
        .unwrap();

        assert_eq!(response.message, "Booking saved");
        assert_eq!(response.booking.status, super::DEFAULT_STATUS);
        assert!(!response.booking.payment_received);
        assert!(response.booking.rating.is_none());
        assert_eq!(response.booking.feedback, "");

        let stored = bootstrap
            .app_state
            .booking_collection
            .get_one_by_id(response.booking.id.0)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored.customer_name.as_deref(), Some("Asha"));
        assert_eq!(stored.status, super::DEFAULT_STATUS);
    }

    #[tokio::test]
    async fn test_index_returns_saved_bookings() {
        let Some(bootstrap) = bootstrap().await else {
            return;
        };

        let Json(bookings) = super::index(bootstrap.booking_collection()).await.unwrap();
        assert!(bookings.is_empty());

        let _ = super::create(
            bootstrap.booking_collection(),
            bootstrap.notifier(),
            bootstrap.notification_log(),
            Json(minimal_request()),
        )
        .await
        .unwrap();

        let Json(bookings) = super::index(bootstrap.booking_collection()).await.unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].service.as_deref(), Some("Plumbing"));
    }

    #[tokio::test]
    async fn test_failed_whatsapp_is_recorded_and_email_skipped() {
        let Some(bootstrap) = bootstrap().await else {
            return;
        };

        let Json(response) = super::create(
            bootstrap.booking_collection(),
            bootstrap.notifier(),
            bootstrap.notification_log(),
            Json(minimal_request()),
        )
        .await
        .unwrap();

        // drive the dispatch directly instead of racing the spawned task
        let stored = bootstrap
            .app_state
            .booking_collection
            .get_one_by_id(response.booking.id.0)
            .await
            .unwrap()
            .unwrap();
        notify::dispatch_booking_alert(
            &bootstrap.app_state.notifier,
            &bootstrap.app_state.notification_log,
            &stored,
        )
        .await;

        let outcomes: Vec<_> = bootstrap
            .app_state
            .notification_log
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .filter(|it| it.booking_id == stored.id)
            .collect();

        assert!(!outcomes.is_empty());
        let whatsapp = outcomes
            .iter()
            .find(|it| it.channel == Channel::WhatsApp)
            .unwrap();
        assert_matches!(whatsapp.status, DeliveryStatus::Failed);
        assert!(whatsapp.error.is_some());

        // email is attempted only after a successful whatsapp delivery
        assert!(outcomes.iter().all(|it| it.channel != Channel::Email));
    }
}
