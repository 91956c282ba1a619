use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lottie_engine::{render_frame, Backend, LottiePlayer, RenderedFrame};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print frame count, frame rate and size
    Info {
        #[arg(value_name = "ANIMATION")]
        file: PathBuf,
    },
    /// Rasterise one frame, or every frame, to PNG
    Render {
        #[arg(value_name = "ANIMATION")]
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = BackendArg::TinySkia)]
        backend: BackendArg,

        /// Frame index; past the end renders the last frame
        #[arg(long, default_value_t = 0, conflicts_with = "all")]
        frame: u32,

        /// Render every frame into the output directory
        #[arg(long)]
        all: bool,

        /// Output width; defaults to the animation's width
        #[arg(long)]
        width: Option<u32>,

        /// Output height; defaults to the animation's height
        #[arg(long)]
        height: Option<u32>,

        /// PNG path, or a directory with --all
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum BackendArg {
    Skia,
    TinySkia,
    VelloCpu,
    Null,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Skia => Backend::Skia,
            BackendArg::TinySkia => Backend::TinySkia,
            BackendArg::VelloCpu => Backend::VelloCpu,
            BackendArg::Null => Backend::Null,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_logging(level: LogLevel, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.to_string().parse()?)
        .from_env_lossy();

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_format)?;

    match cli.command {
        Command::Info { file } => {
            let player = load(&file)?;
            let (width, height) = player.size();
            println!("file:   {}", file.display());
            if let Some(name) = player.animation().name() {
                println!("name:   {}", name);
            }
            println!("frames: {}", player.frame_count());
            println!("fps:    {} ({:.3})", player.frames_per_second(), player.frame_rate());
            println!("size:   {}x{}", width, height);
            Ok(())
        }
        Command::Render {
            file,
            backend,
            frame,
            all,
            width,
            height,
            output,
        } => {
            let mut player = load(&file)?;
            let (natural_w, natural_h) = player.size();
            let size = (width.unwrap_or(natural_w), height.unwrap_or(natural_h));
            let backend = Backend::from(backend);
            if !backend.is_available() {
                bail!("backend {} was not compiled into this binary", backend);
            }

            if all {
                let dir = output.unwrap_or_else(|| file.with_extension(""));
                fs::create_dir_all(&dir)
                    .with_context(|| format!("creating output directory {}", dir.display()))?;
                let started = Instant::now();
                for index in 0..player.frame_count() {
                    player.set_frame(index);
                    let path = dir.join(format!("frame_{:05}.png", index));
                    render_one(&player, backend, size, &path)?;
                }
                info!(
                    frames = player.frame_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "rendered all frames"
                );
            } else {
                let applied = player.set_frame(frame);
                let path = output.unwrap_or_else(|| default_output(&file, applied));
                render_one(&player, backend, size, &path)?;
                info!(frame = applied, output = %path.display(), "rendered frame");
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<LottiePlayer> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let player = LottiePlayer::load(&bytes)
        .with_context(|| format!("loading animation {}", path.display()))?;
    debug!(frames = player.frame_count(), size = ?player.size(), "animation loaded");
    Ok(player)
}

fn default_output(file: &Path, frame: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("frame");
    file.with_file_name(format!("{}_{:05}.png", stem, frame))
}

fn render_one(player: &LottiePlayer, backend: Backend, (width, height): (u32, u32), path: &Path) -> Result<()> {
    let tree = player.render_tree();
    let frame = render_frame(&tree, backend, width, height)
        .with_context(|| format!("rendering frame {}", player.current_frame()))?;
    write_png(&frame, path)
}

fn write_png(frame: &RenderedFrame, path: &Path) -> Result<()> {
    let Some(view) = frame.view() else {
        debug!(nodes = frame.stats.nodes_visited, "null backend, nothing written");
        return Ok(());
    };
    let rgba = view.to_buffer().to_straight_rgba();
    let image = image::RgbaImage::from_raw(view.width(), view.height(), rgba)
        .context("pixel buffer does not match its dimensions")?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
