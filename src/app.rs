use axum::extract::FromRef;

use crate::{
    api::{auth::UserCollection, booking::BookingCollection},
    migrate::MigrationCollection,
    notify::{NotificationLogCollection, Notifier, NotifyConfig},
};

#[derive(FromRef, Clone)]
pub struct AppState {
    pub argon: argon2::Argon2<'static>,

    pub mongo_client: mongodb::Client,
    pub migrate_collection: MigrationCollection,
    pub user_collection: UserCollection,
    pub booking_collection: BookingCollection,
    pub notification_log: NotificationLogCollection,

    pub notifier: Notifier,
}

impl AppState {
    pub async fn new(
        mongo_url: &str,
        database_name: &str,
        notify: NotifyConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let argon = argon2::Argon2::default();

        let mongo_client_opt = mongodb::options::ClientOptions::parse(mongo_url).await?;
        let mongo_client = mongodb::Client::with_options(mongo_client_opt)?;

        let notifier = Notifier::new(notify)?;

        let db = mongo_client.database(database_name);
        Ok(Self {
            argon,

            mongo_client,
            migrate_collection: MigrationCollection(db.collection("migrations").into()),
            user_collection: UserCollection(db.collection("users").into()),
            booking_collection: BookingCollection(db.collection("bookings").into()),
            notification_log: NotificationLogCollection(db.collection("notifications").into()),

            notifier,
        })
    }

    pub async fn new_from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mongo_url =
            std::env::var("MONGO_URI").expect("Missing required environment variable: MONGO_URI");

        Self::new(&mongo_url, "kaamkarwalo", NotifyConfig::from_env()).await
    }
}
