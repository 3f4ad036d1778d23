//! src/main.rs
//! Headless viewer: resolves a target, drives the texture cache frame by frame
//! and reports each image once its decode has settled.
//!
//! Usage: `fsv <target> [steps]`

use std::{
    ffi::OsString,
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use tracing::info;

use fsv_core::{
    Config, Navigator,
    cache::{DecodeStatus, TextureCache},
    fs::LocalFileSystem,
    image::StandardCodec,
    logging::init_logging_with_config,
    render::SoftwareRenderer,
};

const FRAME: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    let (target, steps) = parse_args(std::env::args_os().skip(1))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("fsv-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    let config = runtime
        .block_on(Config::load())
        .context("Failed to load configuration")?;
    config.validate()?;

    let _guard =
        init_logging_with_config(config.logging.clone()).context("Failed to initialize logging")?;

    let mut cache = TextureCache::new(
        &config,
        runtime.handle().clone(),
        Arc::new(LocalFileSystem::new()),
        Arc::new(StandardCodec::new(config.decode.band_rows)),
        Arc::new(SoftwareRenderer::new()),
    )?;
    let mut navigator = Navigator::new(config.cache.prefetch);

    if navigator.open(&mut cache, &target).is_none() {
        bail!("No decodable image found at {}", target.display());
    }
    show_current(&mut cache, &mut navigator);

    for _ in 0..steps {
        navigator.advance(&mut cache, 1);
        show_current(&mut cache, &mut navigator);
    }

    let stats = cache.stats();
    info!(
        marker = "CACHE_OPERATION",
        operation_type = "session_summary",
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        load_exceptions = stats.load_exceptions,
        hit_rate = stats.hit_rate(),
        "Viewer exited cleanly"
    );

    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<(PathBuf, usize)> {
    let target = args
        .next()
        .map(PathBuf::from)
        .context("usage: fsv <target> [steps]")?;

    let steps = match args.next() {
        Some(raw) => raw
            .to_str()
            .context("steps must be valid UTF-8")?
            .parse()
            .context("steps must be a non-negative number")?,
        None => 0,
    };

    Ok((target, steps))
}

/// Drains updates once per frame until the current image stops decoding, then prints it.
fn show_current(cache: &mut TextureCache, navigator: &mut Navigator) {
    let started = Instant::now();
    let index = navigator.current();
    let mut uploaded = 0;

    loop {
        uploaded += cache.drain_updates();

        match cache.status(index) {
            Some(status) if !status.is_terminal() => thread::sleep(FRAME),
            _ => break,
        }
    }
    uploaded += cache.drain_updates();

    let texture = navigator.refresh(cache);
    let line = navigator.status_line(cache);

    match cache.status(index) {
        Some(status) => println!(
            "{line}  {}x{}  {:>3.0}%  {}  ({uploaded} regions, {} ms)",
            texture.width,
            texture.height,
            cache.progress(index).unwrap_or(0.0) * 100.0,
            describe(&status),
            started.elapsed().as_millis()
        ),
        None => println!("{line}  unreadable"),
    }
}

fn describe(status: &DecodeStatus) -> String {
    match status {
        DecodeStatus::Decoding => "decoding".to_string(),
        DecodeStatus::Complete => "complete".to_string(),
        DecodeStatus::Cancelled => "cancelled".to_string(),
        DecodeStatus::Failed(reason) => format!("failed: {reason}"),
    }
}
