use std::sync::Arc;

use crate::appointments::repo::AppointmentRepo;
use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, StorageBackend};
use crate::db::{self, PgStore};
use crate::memory::MemoryStore;
use crate::patients::repo::PatientRepo;
use crate::professionals::repo::ProfessionalRepo;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
    pub patients: Arc<dyn PatientRepo>,
    pub professionals: Arc<dyn ProfessionalRepo>,
    pub appointments: Arc<dyn AppointmentRepo>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        match config.storage {
            StorageBackend::Postgres => {
                let pool = db::connect(&config).await?;
                let store = Arc::new(PgStore::new(pool));
                Ok(Self::from_parts(config, clock, store.clone(), store.clone(), store))
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage; data is lost on restart");
                let store = Arc::new(MemoryStore::new(clock.clone()));
                Ok(Self::from_parts(config, clock, store.clone(), store.clone(), store))
            }
        }
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        clock: Arc<dyn Clock>,
        patients: Arc<dyn PatientRepo>,
        professionals: Arc<dyn ProfessionalRepo>,
        appointments: Arc<dyn AppointmentRepo>,
    ) -> Self {
        Self {
            config,
            clock,
            patients,
            professionals,
            appointments,
        }
    }

    /// In-memory state driven by a test clock.
    #[cfg(test)]
    pub fn fake(clock: Arc<crate::clock::FixedClock>) -> Self {
        let clock = clock as Arc<dyn Clock>;
        let config = Arc::new(AppConfig {
            storage: StorageBackend::Memory,
            database_url: None,
            max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
        });
        let store = Arc::new(MemoryStore::new(clock.clone()));
        Self::from_parts(config, clock, store.clone(), store.clone(), store)
    }

    pub fn now(&self) -> time::OffsetDateTime {
        self.clock.now()
    }
}
