use std::time::Duration;

use bson::oid::ObjectId;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;

use crate::{api::booking::BookingModel, mongo_ext::Collection};

pub const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

const SMTP_RELAY: &str = "smtp.gmail.com";

/// Upper bound for a single delivery attempt. A slow external API must not
/// hold the dispatch task indefinitely.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

const BOOKING_DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    time::macros::format_description!("[month]/[day]/[year], [hour]:[minute]:[second]");

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("{0}")]
    Mail(#[from] lettre::error::Error),

    #[error("{0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("delivery timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub whatsapp_api_base: String,
    pub whatsapp_phone_id: String,
    pub whatsapp_token: String,
    pub admin_whatsapp: String,
    pub admin_email: String,
    pub admin_email_pass: String,
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        fn required(key: &str) -> String {
            std::env::var(key)
                .unwrap_or_else(|_| panic!("Missing required environment variable: {}", key))
        }

        Self {
            whatsapp_api_base: GRAPH_API_BASE.to_string(),
            whatsapp_phone_id: required("WHATSAPP_PHONE_ID"),
            whatsapp_token: required("WHATSAPP_TOKEN"),
            admin_whatsapp: required("ADMIN_WHATSAPP"),
            admin_email: required("ADMIN_EMAIL"),
            admin_email_pass: required("ADMIN_EMAIL_PASS"),
        }
    }
}

#[derive(Serialize, Debug)]
struct WhatsAppMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    r#type: &'static str,
    text: WhatsAppText<'a>,
}

#[derive(Serialize, Debug)]
struct WhatsAppText<'a> {
    body: &'a str,
}

impl<'a> WhatsAppMessage<'a> {
    fn text(to: &'a str, body: &'a str) -> Self {
        Self {
            messaging_product: "whatsapp",
            to,
            r#type: "text",
            text: WhatsAppText { body },
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    http: reqwest::Client,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    config: NotifyConfig,
}

impl Notifier {
    pub fn new(config: NotifyConfig) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .build()?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(SMTP_RELAY)?
            .credentials(Credentials::new(
                config.admin_email.clone(),
                config.admin_email_pass.clone(),
            ))
            .build();

        Ok(Self {
            http,
            mailer,
            config,
        })
    }

    pub async fn send_whatsapp(&self, body: &str) -> Result<(), NotifyError> {
        let url = format!(
            "{}/{}/messages",
            self.config.whatsapp_api_base, self.config.whatsapp_phone_id
        );

        let request = self
            .http
            .post(url)
            .bearer_auth(&self.config.whatsapp_token)
            .json(&WhatsAppMessage::text(&self.config.admin_whatsapp, body));

        tokio::time::timeout(OUTBOUND_TIMEOUT, request.send())
            .await??
            .error_for_status()?;

        Ok(())
    }

    pub async fn send_admin_email(&self, body: &str) -> Result<(), NotifyError> {
        let admin: Mailbox = format!("KaamKarwalo <{}>", self.config.admin_email).parse()?;

        let message = Message::builder()
            .from(admin.clone())
            .to(admin)
            .subject("New Booking Alert")
            .body(body.to_string())?;

        tokio::time::timeout(OUTBOUND_TIMEOUT, self.mailer.send(message)).await??;

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    WhatsApp,
    Email,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One delivery attempt per document, queryable by the operator.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NotificationModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub booking_id: ObjectId,
    pub channel: Channel,
    pub status: DeliveryStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: bson::DateTime,
}

#[derive(Clone)]
pub struct NotificationLogCollection(pub Collection<NotificationModel>);

impl std::ops::Deref for NotificationLogCollection {
    type Target = Collection<NotificationModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl NotificationLogCollection {
    async fn record(
        &self,
        booking_id: ObjectId,
        channel: Channel,
        outcome: &Result<(), NotifyError>,
    ) {
        let model = NotificationModel {
            id: ObjectId::new(),
            booking_id,
            channel,
            status: match outcome {
                Ok(()) => DeliveryStatus::Sent,
                Err(_) => DeliveryStatus::Failed,
            },
            error: outcome.as_ref().err().map(|err| err.to_string()),
            created_at: OffsetDateTime::now_utc().into(),
        };

        if let Err(err) = self.insert_one(&model, None).await {
            tracing::error!("failed to record notification outcome: {}", err);
        }
    }
}

pub fn booking_message(booking: &BookingModel) -> String {
    format!(
        "New Booking Received:\n\
         Customer: {} ({})\n\
         Service: {}\n\
         Worker: {} ({})\n\
         Date: {}",
        booking.customer_name.as_deref().unwrap_or(""),
        booking.customer_phone.as_deref().unwrap_or(""),
        booking.service.as_deref().unwrap_or(""),
        booking.worker_name.as_deref().unwrap_or(""),
        booking.worker_phone.as_deref().unwrap_or(""),
        format_booking_date(booking.date),
    )
}

fn format_booking_date(date: bson::DateTime) -> String {
    OffsetDateTime::from(date)
        .format(BOOKING_DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// WhatsApp first, admin email only after the WhatsApp call succeeded. Both
/// outcomes land in the notification log; neither can fail the booking.
pub async fn dispatch_booking_alert(
    notifier: &Notifier,
    log: &NotificationLogCollection,
    booking: &BookingModel,
) {
    let message = booking_message(booking);

    let sent = notifier
        .send_whatsapp(&message)
        .await
        .tap_ok(|_| tracing::info!(booking = %booking.id, "whatsapp notification sent"))
        .tap_err(|err| tracing::warn!(booking = %booking.id, "whatsapp send failed: {}", err));
    log.record(booking.id, Channel::WhatsApp, &sent).await;

    if sent.is_err() {
        return;
    }

    let mailed = notifier
        .send_admin_email(&format!(
            "{}\n\nPlease check the dashboard for more details.",
            message
        ))
        .await
        .tap_ok(|_| tracing::info!(booking = %booking.id, "admin email sent"))
        .tap_err(|err| tracing::warn!(booking = %booking.id, "admin email failed: {}", err));
    log.record(booking.id, Channel::Email, &mailed).await;
}

/// Detached from the request: the booking response does not wait for, and
/// cannot be failed by, the outbound calls.
pub fn spawn_booking_alert(
    notifier: Notifier,
    log: NotificationLogCollection,
    booking: BookingModel,
) {
    tokio::spawn(async move {
        dispatch_booking_alert(&notifier, &log, &booking).await;
    });
}
