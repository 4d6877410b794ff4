pub mod store;
#[cfg(test)]
pub mod memory;

pub use store::ClinicStore;

use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::time::Duration;

use crate::utils::AppError;

pub const USERS: &str = "users";
pub const DOCTORS: &str = "doctors";
pub const APPOINTMENTS: &str = "appointments";
pub const SLOT_BOOKINGS: &str = "slot_bookings";

const DEFAULT_DB_NAME: &str = "prescripto";

#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, AppError> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        // Connection pool
        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(Duration::from_secs(300));

        client_options.connect_timeout = Some(Duration::from_secs(5));
        client_options.server_selection_timeout = Some(Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        let db_name = database_name(uri);
        let db = client.database(&db_name);

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { db };
        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Creates the indexes the booking flows rely on. The unique index on
    /// `slot_bookings` is what rejects a second booking of the same slot.
    async fn ensure_indexes(&self) -> Result<(), AppError> {
        log::info!("🔧 Creating database indexes...");

        for spec in index_plan() {
            let description = spec.description();
            let options = spec.unique.then(|| IndexOptions::builder().unique(true).build());
            let model = IndexModel::builder().keys(spec.keys.clone()).options(options).build();

            match self.collection::<Document>(spec.collection).create_index(model).await {
                Ok(_) => log::info!("   ✅ Index ready: {}", description),
                Err(e) => on_index_error(&spec, &e.to_string())?,
            }
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

struct IndexSpec {
    collection: &'static str,
    keys: Document,
    unique: bool,
}

impl IndexSpec {
    fn description(&self) -> String {
        format!("{}({})", self.collection, self.keys.keys().cloned().collect::<Vec<_>>().join(", "))
    }
}

fn index_plan() -> Vec<IndexSpec> {
    let spec = |collection, keys, unique| IndexSpec { collection, keys, unique };
    vec![
        spec(USERS, doc! { "email": 1 }, true),
        spec(DOCTORS, doc! { "email": 1 }, true),
        spec(APPOINTMENTS, doc! { "userId": 1 }, false),
        spec(APPOINTMENTS, doc! { "docId": 1 }, false),
        spec(APPOINTMENTS, doc! { "payuTxnId": 1 }, false),
        spec(SLOT_BOOKINGS, doc! { "doctor_id": 1, "slot_date": 1, "slot_time": 1 }, true),
    ]
}

/// A unique index that cannot be created (stored duplicates, options clash)
/// leaves its guard missing, which stops startup. Lookup indexes only log.
fn on_index_error(spec: &IndexSpec, error: &str) -> Result<(), AppError> {
    if spec.unique {
        return Err(AppError::Database(format!(
            "Cannot create unique index {}: {}",
            spec.description(),
            error
        )));
    }
    log::debug!("   ℹ️  Index {} not created: {}", spec.description(), error);
    Ok(())
}

/// Database name from the URI path, e.g. `mongodb://host/prescripto?x=y`.
fn database_name(uri: &str) -> String {
    uri.split("://")
        .nth(1)
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, path)| path.split('?').next().unwrap_or(""))
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DB_NAME)
        .to_string()
}

/// True for MongoDB duplicate key errors (code 11000).
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}
