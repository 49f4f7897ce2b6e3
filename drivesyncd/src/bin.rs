use std::{
    fs,
    io::{self, Write},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use camino::Utf8PathBuf;
use clap::Parser;
use drivesync::{config::DEFAULT_INTERVAL, loc, RunConfig};
use drivesyncd::{
    oauth2,
    storage::{self, drive::GoogleDrive},
    DirectoryLevel, PersistCache, Schedule, SyncDriver,
};

#[cfg(unix)]
mod posix;

#[derive(Parser)]
#[command(name = "drivesyncd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local folder to keep in sync with Google Drive
    #[arg(long)]
    folder: Utf8PathBuf,

    /// OAuth2 client secret file of an "installed" application.
    /// Copied to the config directory for later runs.
    #[arg(long)]
    credentials: Option<Utf8PathBuf>,

    /// Run a single synchronization pass and exit
    #[arg(long)]
    once: bool,

    /// Seconds to wait between two passes
    #[arg(long, default_value_t = DEFAULT_INTERVAL.as_secs())]
    interval: u64,
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            log::error!("Could not start the runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let folder = loc::expand_user(cli.folder.as_str())?;
    let credentials = match &cli.credentials {
        Some(path) => Some(loc::expand_user(path.as_str())?),
        None => None,
    };
    let config = RunConfig::resolve(
        &folder,
        credentials.as_deref(),
        &loc::config_dir()?,
        cli.once,
        Duration::from_secs(cli.interval),
    )
    .await?;
    log::trace!("{config:?}");

    let secret = drivesync::oauth2::load_google_secret(&config.credentials_path).await?;
    log::info!(
        "Initializing Google Drive storage with client-id {}",
        secret.client_id.as_str()
    );

    let client = reqwest::Client::builder().build()?;
    let auth = oauth2::Client::new(
        secret,
        oauth2::TokenPersist::MemoryAndDisk(loc::token_cache_file()?),
        Some(client.clone()),
    )
    .await?;
    let drive = Arc::new(GoogleDrive::new(auth, client).await?);

    let remote_id = storage::find_or_create_folder(&*drive, &config.remote_folder).await?;
    let driver = SyncDriver::new(
        drive.clone(),
        DirectoryLevel::new(config.local_root.clone(), remote_id),
        Schedule::from(&config),
    );

    let res = tokio::select! {
        res = driver.run() => res.map_err(anyhow::Error::from),
        res = shutdown_signal() => res,
    };

    if let Err(err) = drive.persist_cache().await {
        log::error!("Could not save the token cache: {err:#}");
    }
    res
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    posix::shutdown_signal().await
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    log::warn!("received Ctrl-C");
    Ok(())
}

#[cfg(unix)]
fn init_journal() -> bool {
    posix::init_journal()
}

#[cfg(not(unix))]
fn init_journal() -> bool {
    false
}

fn init_logging() {
    if init_journal() {
        return;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match open_log_file() {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
        }
        Err(err) => eprintln!("Logging to stderr only: {err:#}"),
    }
    builder.init();
}

fn open_log_file() -> anyhow::Result<fs::File> {
    let path = loc::log_file()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    Ok(fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}

/// Writes log records to stdout and to the log file
struct Tee {
    file: fs::File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}
