// SPDX-License-Identifier: MPL-2.0
use lens_player::config::{self, Config};
use lens_player::error::{Error, Result};
use lens_player::video_player::{FfmpegBackend, MonotonicClock, PlaybackSummary, Player, SyncMode};
use std::convert::Infallible;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const USAGE: &str = "\
Usage: lens_player [OPTIONS] [--] <FILE>

Plays the video and audio streams of a media file.
Press Escape or close the window to stop.

Options:
      --sync <video|audio>  Clock that paces video (default: video)
      --config <PATH>       Read settings from PATH instead of the default location
      --no-audio            Play video only
  -V, --version             Print version
  -h, --help                Print this help
";

#[derive(Debug, Default)]
struct Args {
    help: bool,
    version: bool,
    sync: Option<SyncMode>,
    config: Option<PathBuf>,
    no_audio: bool,
    file: Option<PathBuf>,
}

/// Parses the command line (without the program name). Everything after a
/// `--` separator is taken as a file name, even if it starts with `-`.
fn parse_args(mut raw: Vec<OsString>) -> Result<Args> {
    let trailing = match raw.iter().position(|arg| arg.as_os_str() == "--") {
        Some(separator) => {
            let trailing = raw.split_off(separator + 1);
            raw.truncate(separator);
            trailing
        }
        None => Vec::new(),
    };
    let mut args = pico_args::Arguments::from_vec(raw);

    let help = args.contains(["-h", "--help"]);
    let version = args.contains(["-V", "--version"]);
    if help || version {
        return Ok(Args {
            help,
            version,
            ..Args::default()
        });
    }

    let mut parsed = Args {
        sync: args.opt_value_from_str("--sync")?,
        config: args.opt_value_from_os_str("--config", |s: &OsStr| {
            Ok::<_, Infallible>(PathBuf::from(s))
        })?,
        no_audio: args.contains("--no-audio"),
        ..Args::default()
    };

    let mut free = args.finish();
    if let Some(unknown) = free.iter().find(|arg| arg.to_string_lossy().starts_with('-')) {
        return Err(Error::Config(format!(
            "unknown option '{}'",
            unknown.to_string_lossy()
        )));
    }
    free.extend(trailing);

    let mut free = free.into_iter();
    parsed.file = free.next().map(PathBuf::from);
    if let Some(extra) = free.next() {
        return Err(Error::Config(format!(
            "unexpected argument '{}'",
            extra.to_string_lossy()
        )));
    }
    Ok(parsed)
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => config::load_from_path(path)?,
        None => config::load().unwrap_or_else(|e| {
            log::warn!("Using default settings: {e}");
            Config::default()
        }),
    };

    if let Some(sync) = args.sync {
        config.sync_mode = Some(sync);
    }
    if args.no_audio {
        config.audio_enabled = Some(false);
    }
    Ok(config)
}

fn play(args: &Args, file: &Path) -> Result<PlaybackSummary> {
    let settings = load_config(args)?.playback_settings();
    log::debug!("Playback settings: {settings:?}");
    Player::new(&FfmpegBackend, settings).play(file, &MonotonicClock::new())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match parse_args(std::env::args_os().skip(1).collect()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("lens_player: {e}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        print!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    if args.version {
        println!("lens_player {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    let Some(file) = args.file.as_ref() else {
        print!("{USAGE}");
        return ExitCode::SUCCESS;
    };

    match play(&args, file) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lens_player: {e}");
            ExitCode::FAILURE
        }
    }
}
