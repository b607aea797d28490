// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of inkpot.
//
// inkpot is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// inkpot is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with inkpot.  If not,
// see <http://www.gnu.org/licenses/>.

//! # inkpotd
//!
//! The inkpot blogging service.
//!
//! `inkpotd` runs in the foreground; it reads a versioned TOML configuration file, binds its
//! public address & serves the inkpot REST API until it receives `SIGTERM`. `SIGHUP` causes it to
//! re-read its configuration, rebuild its connections & re-open its log file (if it has one).

use std::{
    env,
    future::IntoFuture,
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use axum::Router;
use chrono::Duration;
use clap::{Arg, ArgAction, Command, crate_authors, crate_version, value_parser};
use http::{HeaderName, HeaderValue};
use serde::Deserialize;
use snafu::{IntoError, prelude::*};
use tap::Pipe;
use tokio::{
    net::TcpListener,
    signal::unix::{SignalKind, signal},
    sync::{Mutex as AsyncMutex, Notify, mpsc},
};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, error, info};
use tracing_subscriber::{
    Layer, Registry,
    filter::EnvFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
};
use url::Url;

use inkpot::{
    counters::{Configuration as CountersConfiguration, CounterCache},
    http::make_router,
    images::{LocalStore, MediaConfig, ObjectStore, S3Store},
    inkpot::Inkpot,
    metrics::{Instruments, check_metric_registrations},
    peppers::Peppers,
    signing_keys::SigningKeys,
    storage::Backend as StorageBackend,
    util::Credentials,
};

/// The inkpotd application error type
///
/// `main()` returns `Result<(), Error>`; the Rust runtime will print the `Debug` representation of
/// any error, so `Debug` is implemented in terms of `Display` below.
#[derive(Snafu)]
pub enum Error {
    #[snafu(display("Failed to bind to {addr}: {source}"))]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("Unable to read configuration file {pth:?}: {source}"))]
    ConfigNotFound {
        pth: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Error parsing configuration file {pth:?}: {source}"))]
    ConfigParse {
        pth: PathBuf,
        source: toml::de::Error,
    },
    #[snafu(display("Couldn't resolve the present working directory: {source}"))]
    CurrentDir { source: std::io::Error },
    #[snafu(display("Failed to connect to DynamoDB: {source}"))]
    Dynamo { source: inkpot::dynamodb::Error },
    #[snafu(display("Failed to parse RUST_LOG: {source}"))]
    EnvFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },
    #[snafu(display("Failed to open the inkpot log file: {source}"))]
    LogFile { source: std::io::Error },
    #[snafu(display("Failed to HUP the logfile: {source}"))]
    LogHup {
        source: tokio::sync::mpsc::error::SendError<PathBuf>,
    },
    #[snafu(display("Failed to create the media directory {pth:?}: {source}"))]
    MediaRoot {
        pth: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: inkpot::metrics::Error },
    #[snafu(display("Failed to install a signal handler: {source}"))]
    Signal { source: std::io::Error },
    #[snafu(display("Failed to set the tracing subscriber: {source}"))]
    Subscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
    #[snafu(display("Failed to instantiate a Tokio runtime: {source}"))]
    TokioRuntime { source: std::io::Error },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

/// Logging-related options read from the command line or the environment
struct LogOpts {
    pub plain: bool,
    pub level: Level,
}

impl LogOpts {
    fn new(matches: &clap::ArgMatches) -> LogOpts {
        LogOpts {
            plain: matches.get_flag("plain"),
            level: match (
                matches.get_flag("debug"),
                matches.get_flag("verbose"),
                matches.get_flag("quiet"),
            ) {
                (true, _, _) => Level::TRACE,
                (false, true, _) => Level::DEBUG,
                (false, false, true) => Level::ERROR,
                (_, _, _) => Level::INFO,
            },
        }
    }
}

/// Configuration options read from the CLI (or the environment)
struct CliOpts {
    pub log_opts: LogOpts,
    pub cfg: Option<PathBuf>,
}

impl CliOpts {
    fn new(matches: clap::ArgMatches) -> Result<CliOpts> {
        let here = env::current_dir().context(CurrentDirSnafu)?;
        Ok(CliOpts {
            log_opts: LogOpts::new(&matches),
            cfg: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .map(|p| here.join(p)),
        })
    }
}

/// inkpot datastore configuration
// Deserialize only; there are secrets in here
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageConfig {
    /// DynamoDB (or anything speaking its protocol)
    Dynamo {
        /// AWS credentials; if not given, the SDK's default credential chain will be consulted
        credentials: Option<Credentials>,
        /// A region, or one or more endpoint URLs
        #[serde(default)]
        location: inkpot::dynamodb::Location,
    },
    /// Everything in process memory; gone on restart
    #[default]
    Memory,
}

/// inkpot configuration, version one
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct ConfigV1 {
    /// If given, log here rather than to stdout
    log_file: Option<PathBuf>,
    /// Local address at which to listen for requests; specify as "address:port"
    public_address: SocketAddr,
    /// The origin at which this inkpot instance may be reached from the public internet
    public_origin: Url,
    storage_config: StorageConfig,
    media_config: MediaConfig,
    pepper: Peppers,
    signing_keys: SigningKeys,
    /// Lifetime of issued tokens, in seconds
    token_lifetime: u64,
    counters: CountersConfiguration,
    blog_page_size: usize,
    discovery_page_size: usize,
    max_upload_bytes: usize,
}

impl Default for ConfigV1 {
    fn default() -> Self {
        ConfigV1 {
            log_file: None,
            public_address: "0.0.0.0:20679".parse::<SocketAddr>().unwrap(/* known good */),
            public_origin: Url::parse("http://localhost:20679").unwrap(/* known good */),
            storage_config: StorageConfig::default(),
            media_config: MediaConfig::default(),
            pepper: Peppers::default(),
            signing_keys: SigningKeys::default(),
            token_lifetime: 24 * 60 * 60,
            counters: CountersConfiguration::default(),
            blog_page_size: 10,
            discovery_page_size: 9,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "version")] // tag "internally"
enum Configuration {
    #[serde(rename = "1")]
    V1(ConfigV1),
}

/// Parse the inkpot configuration file
///
/// If no file was named & the default location doesn't exist, use defaults. If a file was named,
/// it's an error for it to be missing.
fn parse_config(cfg: &Option<PathBuf>) -> Result<ConfigV1> {
    let (pth, defaulted): (PathBuf, bool) = cfg.as_ref().map_or_else(
        || (PathBuf::from_str("/etc/inkpot.toml").unwrap(/* known good */), true),
        |p| (p.clone(), false),
    );
    match std::fs::read_to_string(&pth) {
        Ok(text) => match toml::from_str::<Configuration>(&text) {
            Ok(Configuration::V1(cfg)) => Ok(cfg),
            Err(err) => Err(ConfigParseSnafu { pth }.into_error(err)),
        },
        Err(err) => {
            if defaulted {
                Ok(ConfigV1::default())
            } else {
                Err(ConfigNotFoundSnafu { pth }.into_error(err))
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            logging                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A tracing-compatible log file that can be closed & re-opened
///
/// `Arc<Mutex<W>>` doesn't implement [MakeWriter], so we hand the whole thing off to the tracing
/// [Layer] & ask it to re-open the file over a channel when we get a `SIGHUP`.
struct LogFile {
    fd: Arc<Mutex<std::fs::File>>,
}

impl LogFile {
    /// Open a file at `pth`; return a [LogFile] instance along with the send side of a channel
    /// the caller can use to close & re-open the file.
    pub fn open(pth: &Path) -> StdResult<(LogFile, mpsc::Sender<PathBuf>), std::io::Error> {
        let (tx, rx) = mpsc::channel::<PathBuf>(1);
        let fd = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(pth)
            .map(|fd| Arc::new(Mutex::new(fd)))?;
        tokio::spawn(LogFile::rehup(fd.clone(), rx));
        Ok((LogFile { fd }, tx))
    }
    /// Close & re-open the file
    async fn rehup(fd: Arc<Mutex<std::fs::File>>, mut rx: mpsc::Receiver<PathBuf>) {
        while let Some(ref pbuf) = rx.recv().await {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(pbuf)
            {
                Ok(f) => match fd.lock() {
                    Ok(mut guard) => *guard = f,
                    Err(err) => error!("Log file lock poisoned: {}", err),
                },
                Err(err) => error!("Failed to open {:?} ({}).", pbuf, err),
            }
        }
    }
}

pub struct LogFileWriter<'a>(MutexGuard<'a, std::fs::File>);

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter<'a>;
    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter(self.fd.lock().unwrap_or_else(|err| err.into_inner()))
    }
}

impl io::Write for LogFileWriter<'_> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }

    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.write_all(buf)
    }
}

/// Configure inkpot logging
///
/// Log to the configured log file if there is one, stdout otherwise; JSON unless `--plain`. If
/// logging to file, return the sender side of a channel that can be used to have the file closed
/// & re-opened.
#[allow(clippy::type_complexity)]
fn configure_logging(
    logopts: &LogOpts,
    logfile: Option<&Path>,
) -> Result<(
    Box<dyn Layer<Registry> + Send + Sync>,
    EnvFilter,
    Option<mpsc::Sender<PathBuf>>,
)> {
    let filter = EnvFilter::builder()
        .with_default_directive(logopts.level.into())
        .from_env()
        .context(EnvFilterSnafu)?;

    // `json()` & `with_writer()` produce builders of different types, hence the boxing
    let mut tx = None;
    let formatter: Box<dyn Layer<Registry> + Send + Sync> = match logfile {
        Some(logfile) => {
            let (log_file, tx_inner) = LogFile::open(logfile).context(LogFileSnafu)?;
            tx = Some(tx_inner);
            if logopts.plain {
                Box::new(
                    fmt::Layer::default()
                        .compact()
                        .with_ansi(false)
                        .with_writer(log_file),
                )
            } else {
                Box::new(
                    fmt::Layer::default()
                        .json()
                        .with_current_span(true)
                        .with_writer(log_file),
                )
            }
        }
        None => {
            if logopts.plain {
                Box::new(fmt::Layer::default().compact().with_writer(io::stdout))
            } else {
                Box::new(
                    fmt::Layer::default()
                        .json()
                        .with_current_span(true)
                        .with_writer(io::stdout),
                )
            }
        }
    };

    Ok((formatter, filter, tx))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           the server                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Request IDs are just a counter; readable, & a rough gauge of uptime
#[derive(Clone, Debug, Default)]
struct RequestIdGenerator {
    counter: Arc<AtomicU64>,
}

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &axum::extract::Request<B>) -> Option<RequestId> {
        self.counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
            .pipe(|s| RequestId::new(HeaderValue::from_str(&s).unwrap(/* known good */)))
            .pipe(Some)
    }
}

/// Wrap the application router in request ID & tracing layers
///
/// Requests hit `SetRequestIdLayer` first, so it's applied last:
///
/// ```text
///                 requests
///                    |
///                    v
/// +---------  SetRequestIdLayer      ---------+
/// | +-----      TraceLayer         -----+     |
/// | | +--- PropagateRequestIdLayer ---+ |     |
/// | | |          handler              | |     |
/// | | +--- PropagateRequestIdLayer ---+ |     |
/// | +-----      TraceLayer         -----+     |
/// +---------   SetRequestIdLayer     ---------+
///                    |
///                    v
///                responses
/// ```
fn make_world_router(state: Arc<Inkpot>, cfg: &ConfigV1) -> Router {
    let media_root = match &cfg.media_config {
        MediaConfig::Local { root, .. } => Some(root.clone()),
        MediaConfig::S3 { .. } => None,
    };
    make_router(state, media_root, cfg.max_upload_bytes)
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            RequestIdGenerator::default(),
        ))
}

async fn select_storage(config: &StorageConfig) -> Result<Arc<dyn StorageBackend + Send + Sync>> {
    match config {
        StorageConfig::Dynamo {
            credentials,
            location,
        } => Ok(Arc::new(
            inkpot::dynamodb::Client::new(location, credentials.as_ref())
                .await
                .context(DynamoSnafu)?,
        )),
        StorageConfig::Memory => {
            info!("Using in-memory storage; nothing will survive a restart.");
            Ok(Arc::new(inkpot::memory::Storage::new()))
        }
    }
}

async fn select_media(config: &MediaConfig) -> Result<Arc<dyn ObjectStore + Send + Sync>> {
    match config {
        MediaConfig::S3 {
            bucket,
            region,
            endpoint,
            credentials,
            url_base,
        } => Ok(Arc::new(
            S3Store::new(
                bucket,
                region.as_deref(),
                endpoint.as_ref(),
                credentials.as_ref(),
                url_base.clone(),
            )
            .await,
        )),
        MediaConfig::Local { root, url_base } => {
            tokio::fs::create_dir_all(root)
                .await
                .context(MediaRootSnafu { pth: root.clone() })?;
            Ok(Arc::new(LocalStore::new(root.clone(), url_base.clone())))
        }
    }
}

/// Serve inkpot API requests
#[tracing::instrument(skip(opts, cfg, log_file_hup, instruments))]
async fn serve(
    opts: CliOpts,
    mut cfg: ConfigV1,
    log_file_hup: Option<mpsc::Sender<PathBuf>>,
    instruments: Arc<Instruments>,
) -> Result<()> {
    async fn shutdown_signal(nfy: Arc<Notify>) {
        nfy.notified().await
    }

    fn log_on_err<T, E>(x: StdResult<T, E>)
    where
        E: std::error::Error + std::fmt::Debug,
    {
        if let Err(err) = x {
            error!("{:?}", err);
        }
    }

    let mut sighup = signal(SignalKind::hangup()).context(SignalSnafu)?;
    let mut sigterm = signal(SignalKind::terminate()).context(SignalSnafu)?;

    // Loop forever, handling SIGHUPs, until asked to terminate:
    loop {
        // Re-build our connections each pass, in case configuration values have changed:
        let storage = select_storage(&cfg.storage_config).await?;
        let media = select_media(&cfg.media_config).await?;

        let state = Arc::new(Inkpot {
            origin: cfg.public_origin.clone(),
            storage,
            instruments: instruments.clone(),
            pepper: cfg.pepper.clone(),
            token_lifetime: Duration::seconds(cfg.token_lifetime as i64),
            signing_keys: cfg.signing_keys.clone(),
            counters: AsyncMutex::new(CounterCache::new(
                cfg.counters.capacity,
                std::time::Duration::from_secs(cfg.counters.likes_ttl),
                std::time::Duration::from_secs(cfg.counters.views_ttl),
            )),
            media,
            blog_page_size: cfg.blog_page_size.max(1),
            discovery_page_size: cfg.discovery_page_size.max(1),
        });

        let nfy = Arc::new(Notify::new());
        let listener = TcpListener::bind(cfg.public_address)
            .await
            .context(BindSnafu {
                addr: cfg.public_address,
            })?;
        info!("Listening on {}", cfg.public_address);
        let mut server = std::pin::pin!(
            axum::serve(listener, make_world_router(state, &cfg))
                .with_graceful_shutdown(shutdown_signal(nfy.clone()))
                .into_future()
        );

        tokio::select! {
            res = &mut server => {
                // The server shouldn't exit on its own
                error!("The server exited unexpectedly with {:?}; shutting-down.", res);
                break;
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP; re-reading configuration.");
                nfy.notify_one();
                log_on_err(server.await);
                // On failure, keep going with the last known-good configuration
                cfg = match parse_config(&opts.cfg) {
                    Ok(cfg) => cfg,
                    Err(err) => {
                        error!("Failed to re-read configuration ({}); keeping the old.", err);
                        cfg
                    }
                };
                if let (Some(lfh), Some(log_file)) = (&log_file_hup, &cfg.log_file) {
                    // logrotate & friends rename the file out from under us, then HUP us
                    lfh.send(log_file.clone()).await.context(LogHupSnafu)?;
                    info!("Started new log file.");
                }
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM; terminating.");
                nfy.notify_one();
                log_on_err(server.await);
                break;
            }
        }
    }

    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    main() & process startup                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Parse configuration, configure logging & serve
///
/// Logging is configured before `serve()` is entered, since `serve()` is instrumented.
async fn go_async(
    opts: CliOpts,
    bootstrap_logging_guard: tracing::dispatcher::DefaultGuard,
) -> Result<()> {
    #[allow(clippy::type_complexity)]
    fn go_async1(
        opts: &CliOpts,
    ) -> Result<(
        ConfigV1,
        Box<dyn Layer<Registry> + Send + Sync>,
        EnvFilter,
        Option<mpsc::Sender<PathBuf>>,
    )> {
        let cfg = parse_config(&opts.cfg)?;
        let (formatter, filter, log_file_hup) =
            configure_logging(&opts.log_opts, cfg.log_file.as_deref())?;
        Ok((cfg, formatter, filter, log_file_hup))
    }

    match go_async1(&opts) {
        Ok((cfg, formatter, filter, log_file_hup)) => {
            // Can only be invoked once
            tracing::subscriber::set_global_default(
                Registry::default().with(formatter).with(filter),
            )
            .context(SubscriberSnafu)?;
            drop(bootstrap_logging_guard);

            info!("inkpot version {} starting.", crate_version!());

            check_metric_registrations().context(MetricsSnafu)?;
            let instruments = Arc::new(Instruments::new("inkpot").context(MetricsSnafu)?);

            serve(opts, cfg, log_file_hup, instruments).await
        }
        Err(err) => {
            error!("While configuring logging: {err:?}");
            Err(err)
        }
    }
}

fn main() -> Result<()> {
    // Most configuration comes from file; the command line says where to find it & how to log
    // until we've read it.
    let opts = CliOpts::new(
        Command::new("inkpotd")
            .version(crate_version!())
            .author(crate_authors!())
            .about("A multi-user blogging service")
            .long_about("`inkpotd` serves the inkpot REST API.")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .num_args(1)
                    .value_parser(value_parser!(PathBuf))
                    .env("INKPOT_CONFIG")
                    .help(
                        "path (absolute or relative to the process' current directory) to a \
                       configuration file",
                    ),
            )
            .arg(
                Arg::new("debug")
                    .short('D')
                    .long("debug")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("INKPOT_DEBUG")
                    .help("produce debug output"),
            )
            .arg(
                Arg::new("plain")
                    .short('p')
                    .long("plain")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("INKPOT_PLAIN")
                    .help("log in human-readable format, not JSON/structured logging"),
            )
            .arg(
                Arg::new("quiet")
                    .short('q')
                    .long("quiet")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("INKPOT_QUIET")
                    .help("produce only error output"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("INKPOT_VERBOSE")
                    .help("produce prolix output"),
            )
            .get_matches(),
    )?;

    // Until the configuration file's been read, log to stderr
    let bootstrap_subscriber = Registry::default()
        .with(fmt::Layer::default().with_writer(io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(opts.log_opts.level.into())
                .from_env()
                .context(EnvFilterSnafu)?,
        );
    let bootstrap_logging_guard = tracing::subscriber::set_default(bootstrap_subscriber);
    debug!("Temporarily logging to stderr while initializing.");

    tokio::runtime::Runtime::new()
        .context(TokioRuntimeSnafu)?
        .block_on(go_async(opts, bootstrap_logging_guard))
}

#[cfg(test)]
mod test {
    use super::*;

    use std::num::NonZeroUsize;

    #[test]
    fn configuration() {
        let cfg = toml::from_str::<Configuration>(
            r#"
version = "1"
public-address = "127.0.0.1:8080"
public-origin = "https://blog.example.com"
storage-config = "memory"
blog-page-size = 5
token-lifetime = 600

[media-config.local]
root = "/tmp/inkpot-media"
url-base = "https://blog.example.com/media/"

[counters]
capacity = 16
likes-ttl = 30
views-ttl = 60
"#,
        )
        .unwrap();
        let Configuration::V1(cfg) = cfg;
        assert_eq!(
            cfg.public_address,
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert!(matches!(cfg.storage_config, StorageConfig::Memory));
        assert!(matches!(cfg.media_config, MediaConfig::Local { .. }));
        assert_eq!(cfg.blog_page_size, 5);
        assert_eq!(cfg.discovery_page_size, 9);
        assert_eq!(cfg.token_lifetime, 600);
        assert_eq!(cfg.counters.capacity, NonZeroUsize::new(16).unwrap());
        assert_eq!(cfg.counters.views_ttl, 60);
        assert!(cfg.log_file.is_none());

        let cfg = toml::from_str::<Configuration>(
            r#"
version = "1"

[storage-config.dynamo]
location = "us-east-1"
"#,
        )
        .unwrap();
        let Configuration::V1(cfg) = cfg;
        assert!(matches!(cfg.storage_config, StorageConfig::Dynamo { .. }));

        assert!(toml::from_str::<Configuration>("version = \"2\"").is_err());
    }
}
