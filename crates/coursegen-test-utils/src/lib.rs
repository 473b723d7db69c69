//! PostgreSQL fixtures for coursegen integration tests.
//!
//! Every [`TestDb`] is a fresh, fully migrated database on one server shared
//! by the whole test binary. The server is `COURSEGEN_TEST_PG_URL` when set,
//! otherwise a `postgres:17` container started on first use.

use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use coursegen_db::config::DbConfig;
use coursegen_db::models::{Course, CoursePlan};
use coursegen_db::pool;
use coursegen_db::queries::{courses, plans};

struct Server {
    base_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn start_server() -> Server {
    if let Ok(url) = std::env::var("COURSEGEN_TEST_PG_URL") {
        return Server {
            base_url: url.trim_end_matches('/').to_string(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("17")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("container port");

    Server {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

async fn server_config(db_name: &str) -> DbConfig {
    let server = SERVER.get_or_init(start_server).await;
    DbConfig::new(format!("{}/{db_name}", server.base_url))
}

/// A throwaway coursegen database.
pub struct TestDb {
    pub pool: PgPool,
    config: DbConfig,
}

impl TestDb {
    /// Create and migrate a uniquely named database.
    pub async fn create() -> Self {
        let name = format!("coursegen_test_{}", Uuid::new_v4().simple());
        let config = server_config(&name).await.with_max_connections(5);

        let created = pool::ensure_database_exists(&config)
            .await
            .unwrap_or_else(|e| panic!("failed to create {name}: {e:#}"));
        assert!(created, "{name} already existed");

        let pool = pool::create_pool(&config)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to {name}: {e:#}"));
        pool::run_migrations(&pool)
            .await
            .expect("migrations should apply to a fresh database");

        Self { pool, config }
    }

    /// Insert a course created by `creator_uid` and one plan under it.
    pub async fn seed_plan(&self, creator_uid: &str, direction: Option<&str>) -> (Course, CoursePlan) {
        let course = courses::insert_course(&self.pool, creator_uid, "Knitting 101")
            .await
            .expect("seed course");
        let plan = plans::insert_plan(&self.pool, &course.id, direction)
            .await
            .expect("seed plan");
        (course, plan)
    }

    /// Close the pool and drop the database, disconnecting stragglers.
    pub async fn teardown(self) {
        self.pool.close().await;

        let Some(name) = self.config.database_name().map(str::to_owned) else {
            return;
        };
        let Ok(maint) = pool::create_pool(&self.config.maintenance()).await else {
            return;
        };
        let terminate = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = '{name}' AND pid <> pg_backend_pid()"
        );
        let _ = maint.execute(terminate.as_str()).await;
        let drop_stmt = format!("DROP DATABASE IF EXISTS {name}");
        let _ = maint.execute(drop_stmt.as_str()).await;
        maint.close().await;
    }
}
