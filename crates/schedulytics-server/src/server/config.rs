use anyhow::{Context, bail};
use clap::Parser;
use core::{fmt, time::Duration};
use mongodb::options::{ClientOptions, Credential, ServerAddress};

/// Runtime configuration for the `schedulytics-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first). Only the database password has no default.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "schedulytics-server",
    version,
    about = "A gRPC service for managing jobs stored in MongoDB"
)]
pub struct CliArgs {
    /// Password of the MongoDB user.
    ///
    /// Environment variable: `MONGO_PW`
    #[arg(long, env = "MONGO_PW", hide_env_values = true)]
    pub mongo_password: String,

    /// MongoDB user to authenticate as.
    ///
    /// Environment variable: `MONGO_USER`
    #[arg(long, env = "MONGO_USER", default_value_t = String::from("schedulytics"))]
    pub mongo_user: String,

    /// MongoDB host and port.
    ///
    /// Environment variable: `MONGO_HOST`
    #[arg(long, env = "MONGO_HOST", default_value_t = String::from("mongodb:27017"))]
    pub mongo_host: String,

    /// Database holding the job collection. Also used as the authentication
    /// source for the user.
    ///
    /// Environment variable: `MONGO_DATABASE`
    #[arg(long, env = "MONGO_DATABASE", default_value_t = String::from("schedulytics"))]
    pub mongo_database: String,

    /// Collection the jobs are stored in.
    ///
    /// Environment variable: `MONGO_COLLECTION`
    #[arg(long, env = "MONGO_COLLECTION", default_value_t = String::from("job"))]
    pub mongo_collection: String,

    /// Application name reported to the MongoDB server.
    ///
    /// Environment variable: `MONGO_APP_NAME`
    #[arg(long, env = "MONGO_APP_NAME", default_value_t = String::from("schedulytics-server"))]
    pub mongo_app_name: String,

    /// Seconds to wait for a connection or a suitable server before a
    /// database operation fails.
    ///
    /// Environment variable: `MONGO_TIMEOUT_SECS`
    #[arg(long, env = "MONGO_TIMEOUT_SECS", default_value_t = 10)]
    pub mongo_timeout_secs: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:8010" or "/tmp/schedulytics.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8010"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub mongo_user: String,
    pub mongo_password: String,
    pub mongo_host: ServerAddress,
    pub mongo_database: String,
    pub mongo_collection: String,
    pub mongo_app_name: String,
    pub mongo_timeout: Duration,
    pub server_addr: String,
    pub uds: bool,
}

impl ServerConfig {
    /// Driver options for connecting to the configured deployment.
    ///
    /// Credentials go through [`Credential`] rather than the connection
    /// string so they never end up in a logged URI.
    pub fn client_options(&self) -> ClientOptions {
        let credential = Credential::builder()
            .username(self.mongo_user.clone())
            .password(self.mongo_password.clone())
            .source(self.mongo_database.clone())
            .build();

        ClientOptions::builder()
            .hosts(vec![self.mongo_host.clone()])
            .app_name(self.mongo_app_name.clone())
            .default_database(self.mongo_database.clone())
            .connect_timeout(self.mongo_timeout)
            .server_selection_timeout(self.mongo_timeout)
            .credential(credential)
            .build()
    }
}

// Hand written so the password never reaches the startup log.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("mongo_user", &self.mongo_user)
            .field("mongo_password", &"<redacted>")
            .field("mongo_host", &self.mongo_host)
            .field("mongo_database", &self.mongo_database)
            .field("mongo_collection", &self.mongo_collection)
            .field("mongo_app_name", &self.mongo_app_name)
            .field("mongo_timeout", &self.mongo_timeout)
            .field("server_addr", &self.server_addr)
            .field("uds", &self.uds)
            .finish()
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.mongo_password.is_empty() {
            bail!("MONGO_PW must not be empty");
        }

        if args.mongo_user.is_empty() {
            bail!("MONGO_USER must not be empty");
        }

        if args.mongo_database.is_empty() {
            bail!("MONGO_DATABASE must not be empty");
        }

        if args.mongo_collection.is_empty() {
            bail!("MONGO_COLLECTION must not be empty");
        }

        if args.mongo_timeout_secs == 0 {
            bail!("MONGO_TIMEOUT_SECS must be greater than 0");
        }

        let mongo_host = ServerAddress::parse(&args.mongo_host)
            .with_context(|| format!("invalid MONGO_HOST `{}`", args.mongo_host))?;

        Ok(Self {
            mongo_user: args.mongo_user,
            mongo_password: args.mongo_password,
            mongo_host,
            mongo_database: args.mongo_database,
            mongo_collection: args.mongo_collection,
            mongo_app_name: args.mongo_app_name,
            mongo_timeout: Duration::from_secs(args.mongo_timeout_secs),
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}
