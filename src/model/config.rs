use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

/**
 * Command-line arguments for the application.
 */
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct ApplicationArguments {
    /**
     * Path to the configuration file.
     */
    #[arg(short, long)]
    pub config_file: String,
    /**
     * Command to run.
     */
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /**
     * Run the HTTP server.
     */
    Serve,
    /**
     * Import postal codes from a CSV file of code, city name and county name.
     */
    Import {
        /**
         * Path to the CSV file.
         */
        file: String,
        /**
         * Number of leading lines to discard. Overrides the configured value.
         */
        #[arg(long)]
        header_lines: Option<usize>,
    },
    /**
     * Apply database migrations and exit.
     */
    Migrate,
}

/**
 * Represents the configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /**
     * Logging configuration for the application.
     */
    pub logging: LoggingConfig,
    /**
     * Security configuration for the application.
     */
    pub security: AppSecurity,
    /**
     * Server configuration for the application.
     */
    pub server: Server,
    /**
     * Database configuration for the application.
     */
    pub database: Database,
    /**
     * CSV import configuration.
     */
    #[serde(default)]
    pub import: ImportConfig,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /**
     * Whether to log the target of the log message.
     */
    pub target: bool,
    /**
     * Whether to log thread IDs .
     */
    pub thread_ids: bool,
    /**
     * Whether to log thread names.
     */
    pub thread_names: bool,
    /**
     * Whether to log line numbers.
     */
    pub line_number: bool,
    /**
     * Whether to log the log level.
     */
    pub level: bool,
    /**
     * Whether to use ANSI colors in logs.
     */
    pub ansi: bool,
    /**
     * Whether to log the source file.
     */
    pub file: bool,
    /**
     * Optional path to a log file. Logs go to stdout when absent.
     */
    pub logfile: Option<String>,
    /**
     * Additional directives for logging configuration.
     */
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            target: true,
            thread_ids: true,
            thread_names: true,
            line_number: true,
            level: true,
            ansi: true,
            file: true,
            logfile: Some("/tmp/geography_api.log".to_string()),
            directives: vec![],
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /**
     * Type of the database (e.g., `PostgreSQL`).
     */
    pub db_type: DatabaseType,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseType {
    /**
     * `PostgreSQL` database type. Timeouts and lifetimes are in milliseconds.
     */
    #[serde(rename_all = "camelCase")]
    Postgresql {
        connection_string: String,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: u64,
        acquire_slow_threshold: u64,
        idle_timeout: u64,
        max_lifetime: u64,
        #[serde(default)]
        run_migrations: bool,
    },
}

/**
 * Token issuing and verification settings.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSecurity {
    /**
     * Shared secret used to sign and verify access tokens.
     */
    pub jwt_secret: String,
    /**
     * HMAC algorithm name, one of HS256, HS384 or HS512.
     */
    pub algorithm: String,
    /**
     * Lifetime of issued tokens in seconds.
     */
    pub token_ttl_secs: i64,
}

/**
 * Represents the server configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /**
     * Number of worker threads for the server.
     */
    pub workers: usize,
    /**
     * HTTP port for the server.
     */
    pub http_port: Option<u16>,
    /**
     * HTTPS configuration for the server.
     */
    pub https_config: Option<HttpsConfig>,
}

/**
 * Represents the HTTPS configuration for the server.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpsConfig {
    /**
     * Port for the HTTPS server.
     */
    pub port: u16,
    /**
     * Path to the certificate file.
     */
    pub certificate_file: String,
    /**
     * Path to the private key file.
     */
    pub private_key_file: String,
}

/**
 * Settings for the CSV postal code import.
 */
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    /**
     * Number of leading lines discarded before data rows.
     */
    pub header_lines: usize,
    /**
     * A progress line is logged every this many processed rows.
     */
    pub progress_interval: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig { header_lines: 1, progress_interval: 100 }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = Config {
            logging: LoggingConfig::default(),
            database: Database {
                db_type: DatabaseType::Postgresql {
                    connection_string: "".to_string(),
                    max_connections: 5,
                    min_connections: 1,
                    acquire_timeout: 30,
                    acquire_slow_threshold: 60,
                    idle_timeout: 300,
                    max_lifetime: 3600,
                    run_migrations: true,
                },
            },
            security: AppSecurity { jwt_secret: "secret".to_string(), algorithm: "HS256".to_string(), token_ttl_secs: 3600 },
            server: Server { workers: 4, http_port: Some(8080), https_config: None },
            import: ImportConfig { header_lines: 2, progress_interval: 500 },
        };
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config.logging.target, deserialized.logging.target);
        assert_eq!(config.logging.thread_ids, deserialized.logging.thread_ids);
        assert_eq!(config.logging.line_number, deserialized.logging.line_number);
        assert_eq!(config.logging.logfile, deserialized.logging.logfile);
        assert_eq!(config.logging.directives, deserialized.logging.directives);
        assert_eq!(config.server.workers, deserialized.server.workers);
        assert_eq!(config.server.http_port, deserialized.server.http_port);
        assert!(deserialized.server.https_config.is_none());
        assert_eq!(deserialized.security.algorithm, "HS256");
        assert_eq!(deserialized.security.token_ttl_secs, 3600);
        assert_eq!(deserialized.import, ImportConfig { header_lines: 2, progress_interval: 500 });
        let DatabaseType::Postgresql { run_migrations, max_connections, .. } = deserialized.database.db_type;
        assert!(run_migrations);
        assert_eq!(max_connections, 5);
    }

    #[test]
    fn test_import_section_defaults_when_missing() {
        let config_str = r#"
            [logging]
            target = true
            threadIds = false
            threadNames = false
            lineNumber = true
            level = true
            ansi = false
            file = false
            directives = []

            [server]
            workers = 2
            httpPort = 8080

            [database.dbType.postgresql]
            connectionString = "postgres://localhost/geography"
            maxConnections = 5
            minConnections = 1
            acquireTimeout = 1000
            acquireSlowThreshold = 1000
            idleTimeout = 1000
            maxLifetime = 1000

            [security]
            jwtSecret = "secret"
            algorithm = "HS512"
            tokenTtlSecs = 60
        "#;
        let config: Config = toml::from_str(config_str).unwrap();
        assert_eq!(config.import, ImportConfig::default());
        assert!(config.logging.logfile.is_none());
        let DatabaseType::Postgresql { run_migrations, .. } = config.database.db_type;
        assert!(!run_migrations);
    }

    #[test]
    fn test_arguments_import_command() {
        let args = ApplicationArguments::parse_from(["geography_api", "--config-file", "app.toml", "import", "codes.csv", "--header-lines", "2"]);
        assert_eq!(args.config_file, "app.toml");
        assert_eq!(args.command, Command::Import { file: "codes.csv".to_string(), header_lines: Some(2) });
    }

    #[test]
    fn test_arguments_serve_command() {
        let args = ApplicationArguments::parse_from(["geography_api", "-c", "app.toml", "serve"]);
        assert_eq!(args.command, Command::Serve);
    }
}
