mod config;
mod consts;
mod extract;
mod filestore;
mod session;
mod util;
use crate::config::SessionConfig;
use crate::consts::DEFAULT_HOST;
use crate::extract::{extracted_name, gunzip_file};
use crate::filestore::{DownloadedArtifact, FileStore};
use crate::session::PlatformSession;
use anyhow::Context;
use clap::Parser;
use std::io::{stderr, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::{filter::Targets, fmt::time::OffsetTime, prelude::*};

/// Download a bulk data file from the RDP Client File Store
///
/// Authenticates against the platform gateway, walks the file-store catalog
/// (bucket, package, file-set), and downloads the first file the chain
/// leads to.
#[derive(Parser)]
#[command(version)]
struct Arguments {
    /// Application key, used as the OAuth2 client id
    #[arg(long, env = "RDP_APP_KEY", hide_env_values = true)]
    app_key: String,

    /// Decompress the downloaded file after writing it.  Files that do not
    /// end in `.gz` are left alone.
    #[arg(long)]
    extract: bool,

    /// Platform gateway to authenticate and resolve against
    #[arg(long, env = "RDP_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Set logging level
    #[arg(
        short,
        long,
        default_value = "INFO",
        value_name = "ERROR|WARN|INFO|DEBUG|TRACE"
    )]
    log_level: Level,

    /// Directory in which to write the downloaded file.  Defaults to the
    /// current working directory.
    #[arg(short, long, default_value = ".")]
    outdir: PathBuf,

    /// Known package id; skips the package-listing step of the resolution
    /// chain
    #[arg(long, env = "RDP_PACKAGE_ID")]
    package_id: Option<String>,

    /// Account password
    #[arg(long, env = "RDP_PASSWORD", hide_env_values = true)]
    password: String,

    /// Machine or user account name
    #[arg(long, env = "RDP_USERNAME")]
    username: String,

    /// The bucket whose first available file should be downloaded
    bucket: String,
}

// See
// <https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/time/struct.OffsetTime.html#method.local_rfc_3339>
// for an explanation of the main + #[tokio::main]run thing
fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();
    let timer =
        OffsetTime::local_rfc_3339().context("failed to determine local timezone offset")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_ansi(stderr().is_terminal())
                .with_writer(stderr),
        )
        .with(
            Targets::new()
                .with_target(env!("CARGO_CRATE_NAME"), args.log_level)
                .with_default(Level::INFO.min(args.log_level)),
        )
        .init();
    run(args)
}

#[tokio::main]
async fn run(args: Arguments) -> anyhow::Result<()> {
    let config = SessionConfig {
        app_key: args.app_key.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
        host: args.host.clone(),
    };
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; aborting");
            watcher.cancel();
        }
    });
    tracing::info!(host = %args.host, "Opening platform session ...");
    let session = PlatformSession::open(&config).await?;
    tracing::info!("Session opened");
    let outcome = fetch(&args, &session, &cancel).await;
    tracing::info!("Closing platform session ...");
    session.close();
    outcome
}

async fn fetch(
    args: &Arguments,
    session: &PlatformSession,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let store = FileStore::new(session);
    tracing::info!(bucket = %args.bucket, "Resolving bucket ...");
    let artifact = match args.package_id {
        Some(ref package_id) => {
            store
                .run_with_package(&args.bucket, package_id, cancel)
                .await?
        }
        None => store.run(&args.bucket, cancel).await?,
    };
    anyhow::ensure!(
        !artifact.filename.is_empty(),
        "file URL for bucket {:?} does not end in a usable filename",
        args.bucket
    );
    tracing::info!(
        filename = %artifact.filename,
        size = artifact.bytes.len(),
        "Download complete"
    );
    let path = write_artifact(&args.outdir, &artifact)?;
    tracing::info!(path = %path.display(), "File written");
    if args.extract {
        if let Some(name) = extracted_name(&artifact.filename) {
            let dest = args.outdir.join(name);
            let size = gunzip_file(&path, &dest).context("failed to decompress downloaded file")?;
            tracing::info!(path = %dest.display(), size, "File decompressed");
        } else {
            tracing::warn!(
                filename = %artifact.filename,
                "File does not look gzipped; skipping extraction"
            );
        }
    }
    Ok(())
}

fn write_artifact(outdir: &Path, artifact: &DownloadedArtifact) -> anyhow::Result<PathBuf> {
    fs_err::create_dir_all(outdir)?;
    let path = outdir.join(&artifact.filename);
    let fp = tempfile::Builder::new()
        .prefix(".cfsget.")
        .tempfile_in(outdir)
        .with_context(|| format!("failed to create temporary file for {}", path.display()))?;
    fp.as_file()
        .write_all(&artifact.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    fp.persist(&path)
        .with_context(|| format!("failed to persist downloaded file to {}", path.display()))?;
    Ok(path)
}
