mod api;
mod dao;
mod import;
mod model;
mod service;

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::api::endpoints::configure;
use crate::api::middleware::timing_middleware;
use crate::api::security::JwtSecurityService;
use crate::api::state::AppState;
use crate::dao::geography::GeographyDao;
use crate::dao::users::UserDao;
use crate::import::PostalCodeImporter;
use crate::import::store::PgImportBackend;
use crate::model::apperror::{ApplicationError, ErrorType};
use crate::model::config::{ApplicationArguments, Command, Config, DatabaseType, HttpsConfig, LoggingConfig};
use crate::service::auth::AuthService;
use crate::service::geography::GeographyService;

use actix_web::middleware::from_fn;
use actix_web::{App, HttpServer, web};
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use clap::Parser;
use prometheus::IntGauge;
use rustls::pki_types::PrivateKeyDer;
use rustls::{ServerConfig, SupportedProtocolVersion};
use rustls_pemfile::{certs, pkcs8_private_keys};
use sqlx::{Pool, Postgres, pool};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = ApplicationArguments::parse();

    let config = get_config(&args.config_file)?;

    let _log_guard = init_tracing(&config.logging)?;

    let (connection_pool, run_migrations) = create_pool(&config).await?;

    match args.command {
        Command::Migrate => migrate(&connection_pool).await,
        Command::Import { file, header_lines } => {
            if run_migrations {
                migrate(&connection_pool).await?;
            }
            run_import(&config, connection_pool, &file, header_lines).await
        }
        Command::Serve => {
            if run_migrations {
                migrate(&connection_pool).await?;
            }
            serve(&config, connection_pool).await
        }
    }
}

/**
 * Runs the HTTP server until it is stopped.
 *
 * #Arguments
 * `config`: The application configuration.
 * `connection_pool`: The database connection pool shared by all workers.
 */
async fn serve(config: &Config, connection_pool: Pool<Postgres>) -> std::io::Result<()> {
    let jwt_service = JwtSecurityService::new(&config.security.jwt_secret, &config.security.algorithm, config.security.token_ttl_secs)
        .map_err(|err| std::io::Error::other(format!("Failed to create JWT security service: {err}")))?;

    let auth_service = AuthService::new(UserDao::new(), jwt_service, Some(connection_pool.clone()));
    let geography_service = GeographyService::new(GeographyDao::new(), Some(connection_pool.clone()));

    let state = web::Data::new(AppState::new(auth_service, geography_service));

    let prometheus = PrometheusMetricsBuilder::new("")
        .endpoint("/metrics")
        .mask_unmatched_patterns("UNKNOWN")
        .build()
        .map_err(|err| std::io::Error::other(format!("Failed to create Prometheus metrics: {err}")))?;

    let max_connections_gauge = IntGauge::new("max_connections", "Connection pool maximum").map_err(|err| std::io::Error::other(format!("Failed to create max_connections gauge: {err}")))?;
    let min_connections_gauge = IntGauge::new("min_connections", "Connection pool minimum").map_err(|err| std::io::Error::other(format!("Failed to create min_connections gauge: {err}")))?;
    let active_connections_gauge = IntGauge::new("active_connections", "Connection pool active").map_err(|err| std::io::Error::other(format!("Failed to create active_connections gauge: {err}")))?;
    let idle_connections_gauge = IntGauge::new("idle_connections", "Connection pool idle").map_err(|err| std::io::Error::other(format!("Failed to create idle_connections gauge: {err}")))?;
    register_prometheus_metrics(&prometheus, &max_connections_gauge)?;
    register_prometheus_metrics(&prometheus, &min_connections_gauge)?;
    register_prometheus_metrics(&prometheus, &active_connections_gauge)?;
    register_prometheus_metrics(&prometheus, &idle_connections_gauge)?;

    gather_db_metrics(max_connections_gauge, min_connections_gauge, active_connections_gauge, idle_connections_gauge, connection_pool);

    let server_init = HttpServer::new(move || App::new().wrap(prometheus.clone()).wrap(from_fn(timing_middleware)).app_data(state.clone()).configure(configure));

    let server_init = if let Some(http_port) = &config.server.http_port { server_init.bind(("127.0.0.1", *http_port))? } else { server_init };
    let server_init = if let Some(https_config) = &config.server.https_config {
        let ssl_builder = ssl_builder(https_config).map_err(|err| std::io::Error::other(format!("Failed to create SSL/TLS configuration: {err}")))?;
        server_init.bind_rustls_0_23("127.0.0.1:".to_string() + &https_config.port.to_string(), ssl_builder).map_err(|err| std::io::Error::other(format!("Failed to bind HTTPS server: {err}")))?
    } else {
        server_init
    };

    tracing::info!("Starting server with {} workers", config.server.workers);
    server_init.workers(config.server.workers).run().await
}

/**
 * Imports a postal code CSV file and prints the report.
 *
 * #Arguments
 * `config`: The application configuration.
 * `connection_pool`: The database connection pool.
 * `file`: Path to the CSV file.
 * `header_lines`: Header line count overriding the configured one.
 *
 * #Returns
 * An error when the import was rolled back.
 */
async fn run_import(config: &Config, connection_pool: Pool<Postgres>, file: &str, header_lines: Option<usize>) -> std::io::Result<()> {
    let mut import_config = config.import.clone();
    if let Some(header_lines) = header_lines {
        import_config.header_lines = header_lines;
    }
    let importer = PostalCodeImporter::new(PgImportBackend::new(connection_pool, GeographyDao::new()), import_config);
    let report = importer.import_file(Path::new(file)).await.map_err(|err| std::io::Error::other(format!("Import failed: {err}")))?;
    println!("Created: {}", report.created);
    println!("Duplicates: {}", report.duplicates);
    println!("Skipped: {}", report.skipped);
    println!("Counties created: {}", report.counties_created);
    println!("Cities created: {}", report.cities_created);
    Ok(())
}

async fn migrate(connection_pool: &Pool<Postgres>) -> std::io::Result<()> {
    sqlx::migrate!("./sqlx-postgresql-migration/migrations")
        .run(connection_pool)
        .await
        .map_err(|err| std::io::Error::other(format!("Failed to run migrations: {err}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/**
 * Creates the database connection pool.
 *
 * #Returns
 * The pool and whether migrations should run on startup.
 */
async fn create_pool(config: &Config) -> std::io::Result<(Pool<Postgres>, bool)> {
    match &config.database.db_type {
        DatabaseType::Postgresql { connection_string, max_connections, min_connections, acquire_timeout, acquire_slow_threshold, idle_timeout, max_lifetime, run_migrations } => {
            let connection_pool = pool::PoolOptions::new()
                .max_connections(*max_connections)
                .min_connections(*min_connections)
                .acquire_timeout(Duration::from_millis(*acquire_timeout))
                .acquire_slow_threshold(Duration::from_millis(*acquire_slow_threshold))
                .idle_timeout(Duration::from_millis(*idle_timeout))
                .max_lifetime(Duration::from_millis(*max_lifetime))
                .connect(connection_string.as_str())
                .await
                .map_err(|err| std::io::Error::other(format!("Failed to create database pool: {err}")))?;
            Ok((connection_pool, *run_migrations))
        }
    }
}

/**
 * Initializes logging for the application.
 *
 * #Arguments
 * `logging`: The logging configuration. `RUST_LOG` sets the base filter, the configured directives are added on top.
 *
 * #Returns
 * The guard that flushes the non-blocking writer. It must live until the process exits.
 */
fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard, std::io::Error> {
    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in &logging.directives {
        let directive: Directive = directive.parse().map_err(|err| std::io::Error::other(format!("Invalid log directive {directive}: {err}")))?;
        env_filter = env_filter.add_directive(directive);
    }
    let (writer, guard) = match &logging.logfile {
        Some(logfile) => {
            let path = Path::new(logfile);
            let file_name = path.file_name().ok_or_else(|| std::io::Error::other(format!("Log file {logfile} has no file name")))?;
            let directory = path.parent().filter(|parent| !parent.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(logging.target)
        .with_thread_ids(logging.thread_ids)
        .with_thread_names(logging.thread_names)
        .with_line_number(logging.line_number)
        .with_level(logging.level)
        .with_ansi(logging.ansi && logging.logfile.is_none())
        .with_file(logging.file)
        .with_writer(writer);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| std::io::Error::other(format!("Failed to initialize logging: {err}")))?;
    Ok(guard)
}

/**
 * Registers custom Prometheus metrics.
 *
 * #Arguments
 * `prometheus_metrics`: The Prometheus metrics instance to register the gauge with.
 * `gauge`: The gauge to register.
 */
fn register_prometheus_metrics(prometheus_metrics: &PrometheusMetrics, gauge: &IntGauge) -> Result<(), std::io::Error> {
    prometheus_metrics.registry.register(Box::new(gauge.clone())).map_err(|err| std::io::Error::other(format!("Failed to register Prometheus gauge: {err}")))?;
    Ok(())
}

/**
 * Samples connection pool metrics every second in a separate thread.
 */
fn gather_db_metrics(max_connections_gauge: IntGauge, min_connections_gauge: IntGauge, active_connections_gauge: IntGauge, idle_connections_gauge: IntGauge, connection_pool: Pool<Postgres>) {
    thread::spawn(move || {
        loop {
            max_connections_gauge.set(i64::from(connection_pool.options().get_max_connections()));
            min_connections_gauge.set(i64::from(connection_pool.options().get_min_connections()));
            active_connections_gauge.set(i64::from(connection_pool.size()));
            #[allow(clippy::cast_possible_wrap)]
            idle_connections_gauge.set(connection_pool.num_idle() as i64);
            thread::sleep(Duration::from_secs(1));
        }
    });
}

/**
 * Initializes the SSL/TLS configuration for the server.
 *
 * #Arguments
 * `https_config`: The HTTPS configuration containing the certificate and private key files.
 *
 * #Returns
 * A `Result` containing the initialized `ServerConfig` or an `ApplicationError` if initialization fails.
 */
fn ssl_builder(https_config: &HttpsConfig) -> Result<ServerConfig, ApplicationError> {
    let config_builder = ServerConfig::builder_with_protocol_versions(&get_protocol_versions());
    let cert_file = &mut std::io::BufReader::new(
        std::fs::File::open(&https_config.certificate_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read certificate file: {err}")))?,
    );
    let key_file = &mut std::io::BufReader::new(
        std::fs::File::open(&https_config.private_key_file).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to read private key file: {err}")))?,
    );
    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>().map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert certificate to der: {err}")))?;
    let key = pkcs8_private_keys(key_file)
        .map(|key| key.map(PrivateKeyDer::Pkcs8))
        .next()
        .ok_or_else(|| ApplicationError::new(ErrorType::Initialization, "No private key found".to_string()))?
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to convert private key to der: {err}")))?;
    let config = config_builder
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create server config: {err}")))?;
    Ok(config)
}

/**
 * Returns the supported TLS protocol versions.
 */
fn get_protocol_versions() -> Vec<&'static SupportedProtocolVersion> {
    vec![&rustls::version::TLS13]
}

/**
 * Reads the configuration from the specified file.
 *
 * #Arguments
 * `config_file`: The path to the configuration file.
 *
 * #Returns
 * A `Result` containing the parsed `Config` or an `std::io::Error` if reading or parsing fails.
*/
fn get_config(config_file: &str) -> Result<Config, std::io::Error> {
    let config_str: String = std::fs::read_to_string(config_file).map_err(|err| std::io::Error::other(format!("Failed to read config file: {err}")))?;
    let config: Config = toml::from_str(&config_str).map_err(|err| std::io::Error::other(format!("Failed to parse config file: {err}")))?;
    Ok(config)
}
