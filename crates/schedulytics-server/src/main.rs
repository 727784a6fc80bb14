#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use futures::Stream;
use mongodb::Client;
use schedulytics_core::{
    bson::{Document, doc},
    proto::{
        FILE_DESCRIPTOR_SET, hello_service_server::HelloServiceServer,
        job_service_server::JobServiceServer,
    },
};
use server::config::{CliArgs, ServerConfig};
use server::service::{handler::JobHandler, hello::HelloHandler};
use server::store::mongo::MongoJobStore;
use server::telemetry::{TelemetryProviders, init_telemetry};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

type JobServer = JobServiceServer<JobHandler<MongoJobStore>>;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let client = connect(&config).await?;
    let store = MongoJobStore::new(
        client
            .database(&config.mongo_database)
            .collection::<Document>(&config.mongo_collection),
    );

    let res = if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(providers, incoming, store).await;
            // A panic might still leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path)
            .await
            .with_context(|| format!("failed to listen on {tcp_path}"))?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(providers, incoming, store).await
    };

    #[cfg(feature = "tracing")]
    tracing::info!("Closing MongoDB connection");
    client.shutdown().await;

    res
}

/// Connects to MongoDB and pings the job database so a bad host or bad
/// credentials stop the process before it starts listening.
async fn connect(config: &ServerConfig) -> anyhow::Result<Client> {
    #[cfg(feature = "tracing")]
    tracing::info!(
        host = %config.mongo_host,
        database = %config.mongo_database,
        "Connecting to MongoDB"
    );

    let client = Client::with_options(config.client_options())
        .context("invalid MongoDB client options")?;
    client
        .database(&config.mongo_database)
        .run_command(doc! { "ping": 1 })
        .await
        .context("Could not connect to MongoDB")?;

    #[cfg(feature = "tracing")]
    tracing::info!("Connected to MongoDB");
    Ok(client)
}

async fn run_server_with_incoming<I, IO, IE>(
    providers: TelemetryProviders,
    incoming: I,
    store: MongoJobStore,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter.set_serving::<JobServer>().await;
    health_reporter
        .set_serving::<HelloServiceServer<HelloHandler>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_job_service(JobHandler::new(store)))
        .add_service(build_hello_service())
        .serve_with_incoming_shutdown(incoming, shutdown_signal(health_reporter, providers))
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Server stopped");
    Ok(())
}

fn log_startup_info(_addr: &str, _config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting job service on {} with full config: {:#?}",
            _addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting job service on {} (collection {}.{})",
            _addr,
            _config.mongo_database,
            _config.mongo_collection
        );
    }
}

fn build_job_service(handler: JobHandler<MongoJobStore>) -> JobServer {
    JobServiceServer::new(handler)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

fn build_hello_service() -> HelloServiceServer<HelloHandler> {
    HelloServiceServer::new(HelloHandler)
        .send_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Gzip)
}

async fn shutdown_signal(health_reporter: HealthReporter, providers: TelemetryProviders) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {_e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {_e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Stopping the server...");

    health_reporter.set_not_serving::<JobServer>().await;
    health_reporter
        .set_not_serving::<HelloServiceServer<HelloHandler>>()
        .await;

    providers.shutdown();
}
