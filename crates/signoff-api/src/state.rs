//! Application state wiring all services together.
//!
//! Services are generic over repository and hasher traits; AppState pins
//! them to the SQLite implementations. Used by both CLI commands and REST
//! API handlers.

use std::path::PathBuf;
use std::sync::Arc;

use signoff_core::clock::{Clock, SystemClock};
use signoff_core::engine::{SlaSweeper, StepExecutor};
use signoff_core::event::EventBus;
use signoff_core::service::audit::AuditRecorder;
use signoff_core::service::definition::DefinitionStore;
use signoff_core::service::directory::DirectoryService;
use signoff_core::service::instance::InstanceManager;
use signoff_core::service::tasks::TaskQueryService;
use signoff_infra::config::{database_url, load_global_config, resolve_data_dir};
use signoff_infra::hash::Sha256TokenHasher;
use signoff_infra::sqlite::audit::SqliteAuditRepository;
use signoff_infra::sqlite::definition::SqliteDefinitionRepository;
use signoff_infra::sqlite::directory::SqliteDirectoryRepository;
use signoff_infra::sqlite::instance::SqliteInstanceRepository;
use signoff_infra::sqlite::pool::DatabasePool;
use signoff_types::config::GlobalConfig;

pub type ConcreteDefinitionStore = DefinitionStore<SqliteDefinitionRepository>;
pub type ConcreteInstanceManager =
    InstanceManager<SqliteDefinitionRepository, SqliteInstanceRepository>;
pub type ConcreteExecutor = StepExecutor<SqliteInstanceRepository>;
pub type ConcreteTaskService = TaskQueryService<SqliteInstanceRepository>;
pub type ConcreteSweeper = SlaSweeper<SqliteInstanceRepository>;
pub type ConcreteAuditRecorder = AuditRecorder<SqliteAuditRepository>;
pub type ConcreteDirectory = DirectoryService<SqliteDirectoryRepository, Sha256TokenHasher>;

#[derive(Clone)]
pub struct AppState {
    pub definitions: Arc<ConcreteDefinitionStore>,
    pub instances: Arc<ConcreteInstanceManager>,
    pub executor: Arc<ConcreteExecutor>,
    pub tasks: Arc<ConcreteTaskService>,
    pub sweeper: Arc<ConcreteSweeper>,
    pub audit: Arc<ConcreteAuditRecorder>,
    pub directory: Arc<ConcreteDirectory>,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Resolve the data directory, load `signoff.toml`, open the database
    /// (running migrations) and wire the services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_global_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        Ok(Self::from_parts(db_pool, config, data_dir, Arc::new(SystemClock)))
    }

    /// Wire services over an already opened pool.
    pub fn from_parts(
        db_pool: DatabasePool,
        config: GlobalConfig,
        data_dir: PathBuf,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = EventBus::default();
        let definitions_repo = || SqliteDefinitionRepository::new(db_pool.clone());
        let instances_repo = || SqliteInstanceRepository::new(db_pool.clone());

        let definitions = DefinitionStore::new(definitions_repo(), clock.clone());
        let instances = InstanceManager::new(
            definitions_repo(),
            instances_repo(),
            clock.clone(),
            events.clone(),
        );
        let executor = StepExecutor::new(instances_repo(), clock.clone(), events.clone());
        let tasks = TaskQueryService::new(instances_repo(), clock.clone());
        let sweeper = SlaSweeper::new(
            instances_repo(),
            clock.clone(),
            events.clone(),
            config.sla.escalate_instances,
        );
        let audit = AuditRecorder::new(SqliteAuditRepository::new(db_pool.clone()));
        let directory = DirectoryService::new(
            SqliteDirectoryRepository::new(db_pool.clone()),
            Sha256TokenHasher,
            clock.clone(),
            config.auth.admin_role.clone(),
        );

        Self {
            definitions: Arc::new(definitions),
            instances: Arc::new(instances),
            executor: Arc::new(executor),
            tasks: Arc::new(tasks),
            sweeper: Arc::new(sweeper),
            audit: Arc::new(audit),
            directory: Arc::new(directory),
            events,
            clock,
            config: Arc::new(config),
            data_dir,
            db_pool,
        }
    }
}
