use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sensehat", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Play one movie file on the device and wait for it to finish.
    Play(PlayArgs),
    /// Blank the display.
    Clear(ClearArgs),
    /// Write the scroll animation as a movie file.
    Scroll(ScrollArgs),
    /// Convert a horizontal PNG sprite strip into a movie file.
    Convert(ConvertArgs),
}

#[derive(Parser, Debug)]
struct DisplayArgs {
    /// Framebuffer device of the LED matrix.
    #[arg(long, default_value = "/dev/fb1")]
    device: PathBuf,

    #[arg(long, default_value_t = 8)]
    width: u8,

    #[arg(long, default_value_t = 8)]
    height: u8,

    #[arg(long, value_enum, default_value_t = FormatChoice::Rgb565)]
    format: FormatChoice,

    /// Log frames instead of writing to the device.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Config JSON; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured listen address.
    #[arg(long)]
    listen: Option<String>,

    /// Log frames instead of writing to the device.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    #[command(flatten)]
    display: DisplayArgs,

    /// Movie file to play.
    #[arg(long)]
    movie: PathBuf,
}

#[derive(Parser, Debug)]
struct ClearArgs {
    #[command(flatten)]
    display: DisplayArgs,
}

#[derive(Parser, Debug)]
struct ScrollArgs {
    /// Output movie path.
    #[arg(long)]
    out: PathBuf,

    /// Bar color as `RRGGBB` or `#RRGGBB`.
    #[arg(long, default_value = "FF0000")]
    color: String,

    #[arg(long, default_value_t = 67)]
    wait_ms: u64,

    #[arg(long, default_value_t = 8)]
    width: u8,

    #[arg(long, default_value_t = 8)]
    height: u8,

    #[arg(long, value_enum, default_value_t = FormatChoice::Rgb565)]
    format: FormatChoice,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Input PNG strip.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output movie path.
    #[arg(long)]
    out: PathBuf,

    /// Width of one frame in the strip.
    #[arg(long)]
    frame_width: u8,

    #[arg(long, default_value_t = 100)]
    wait_ms: u64,

    #[arg(long, value_enum, default_value_t = FormatChoice::Rgb565)]
    format: FormatChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Rgb565,
    Rgb444,
}

impl From<FormatChoice> for sensehat::PixelFormat {
    fn from(c: FormatChoice) -> Self {
        match c {
            FormatChoice::Rgb565 => sensehat::PixelFormat::Rgb565,
            FormatChoice::Rgb444 => sensehat::PixelFormat::Rgb444,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Serve(args) => cmd_serve(args),
        Command::Play(args) => cmd_play(args),
        Command::Clear(args) => cmd_clear(args),
        Command::Scroll(args) => cmd_scroll(args),
        Command::Convert(args) => cmd_convert(args),
    }
}

/// Sink events a dry run keeps; older ones are dropped.
const DRY_RUN_EVENTS: usize = 64;

fn open_service(
    display: sensehat::DisplayConfig,
    device: &Path,
    dry_run: bool,
) -> anyhow::Result<sensehat::DisplayService> {
    if dry_run {
        tracing::info!("dry run: frames are recorded, not written");
        return Ok(sensehat::DisplayService::new(
            display,
            Box::new(sensehat::InMemorySink::capped(DRY_RUN_EVENTS)),
        )?);
    }
    sensehat::DisplayService::open(display, device)
        .with_context(|| format!("open display '{}'", device.display()))
}

fn service_from_args(args: &DisplayArgs) -> anyhow::Result<sensehat::DisplayService> {
    let display = sensehat::DisplayConfig {
        width: args.width,
        height: args.height,
        format: args.format.into(),
    };
    open_service(display, &args.device, args.dry_run)
}

fn finish(handle: sensehat::JobHandle) -> anyhow::Result<()> {
    match handle.wait() {
        sensehat::JobStatus::Failed(msg) => anyhow::bail!("playback failed: {msg}"),
        status => {
            tracing::info!(?status, "done");
            Ok(())
        }
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut cfg = match &args.config {
        Some(path) => sensehat::AppConfig::from_path(path)?,
        None => sensehat::AppConfig::default(),
    };
    if let Some(listen) = args.listen {
        cfg.listen = listen;
    }
    cfg.validate()?;

    let service = open_service(cfg.display(), &cfg.device, args.dry_run)?;
    let ctx = sensehat::server::AppContext::new(service, sensehat::Storage::new(&cfg.storage_root));
    sensehat::server::serve(&cfg.listen, &ctx)?;
    Ok(())
}

fn cmd_play(args: PlayArgs) -> anyhow::Result<()> {
    let service = service_from_args(&args.display)?;
    let movie = sensehat::Movie::from_path(&args.movie)?;
    tracing::info!(
        frames = movie.frame_count(),
        width = movie.width(),
        height = movie.height(),
        "playing"
    );
    finish(service.play(movie)?)?;
    service.shutdown();
    Ok(())
}

fn cmd_clear(args: ClearArgs) -> anyhow::Result<()> {
    let service = service_from_args(&args.display)?;
    finish(service.clear()?)?;
    service.shutdown();
    Ok(())
}

fn cmd_scroll(args: ScrollArgs) -> anyhow::Result<()> {
    let color = sensehat::Color::parse_hex(args.format.into(), &args.color)
        .with_context(|| format!("invalid color '{}'", args.color))?;
    let movie = sensehat::authoring::scroll_movie(
        args.width,
        args.height,
        color,
        Duration::from_millis(args.wait_ms),
    )?;
    movie.save_to_path(&args.out)?;
    tracing::info!(frames = movie.frame_count(), out = %args.out.display(), "wrote movie");
    Ok(())
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.in_path)
        .with_context(|| format!("read strip '{}'", args.in_path.display()))?;
    let strip = sensehat::authoring::decode_strip(&bytes)?;
    let movie = sensehat::authoring::movie_from_strip(
        &strip,
        args.frame_width,
        Duration::from_millis(args.wait_ms),
        args.format.into(),
    )?;
    movie.save_to_path(&args.out)?;
    tracing::info!(frames = movie.frame_count(), out = %args.out.display(), "wrote movie");
    Ok(())
}
