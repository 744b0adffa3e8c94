use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mpv_handler::mpv::{launch_player, resolve_mpv};
use mpv_handler::{select_base_url, AppConfig, AuthCredential, PlayerEvent};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mpv-handler", version, about)]
struct Cli {
  /// Config file (defaults to the per-user config directory).
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Play an mpv:// or mpvs:// link and print position updates.
  Play {
    uri: String,
    /// HTTP Basic-Auth login for the media server.
    #[arg(long, env = "MPV_HANDLER_LOGIN", default_value = "")]
    login: String,
    /// HTTP Basic-Auth password for the media server.
    #[arg(long, env = "MPV_HANDLER_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,
  },
  /// Print the server base URL to use: local when reachable, else public.
  Probe {
    #[arg(long)]
    local: Option<String>,
    #[arg(long)]
    public: Option<String>,
  },
}

fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, String> {
  let path = match path {
    Some(path) => path.to_path_buf(),
    None => match AppConfig::default_path() {
      Some(path) => path,
      None => {
        log::warn!("No config directory available, using defaults");
        return Ok(AppConfig::default());
      }
    },
  };
  AppConfig::load(&path).map_err(|e| format!("{}: {}", path.display(), e))
}

async fn play(config: &AppConfig, uri: &str, credential: AuthCredential) -> Result<ExitCode, String> {
  let executable = resolve_mpv(config.mpv_path().as_deref()).map_err(|e| e.to_string())?;
  let options = config.player_options(executable);

  let (events_tx, events_rx) = async_channel::unbounded();
  let printer = tokio::spawn(async move {
    while let Ok(event) = events_rx.recv().await {
      match event {
        PlayerEvent::PositionChanged(position) => println!("position {}", position),
        PlayerEvent::Exited(Some(code)) => println!("exited {}", code),
        PlayerEvent::Exited(None) => println!("exited"),
      }
    }
  });

  let mut handle =
    launch_player(uri, &credential, &options, events_tx).map_err(|e| e.to_string())?;

  let code = tokio::select! {
    code = handle.wait() => code,
    _ = tokio::signal::ctrl_c() => {
      log::info!("Interrupted, stopping MPV");
      handle.kill().await;
      Some(130)
    }
  };

  // Dropping the handle closes the event channel and ends the printer.
  drop(handle);
  let _ = printer.await;

  Ok(match code {
    Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
    None => ExitCode::FAILURE,
  })
}

async fn probe(config: &AppConfig, local: Option<String>, public: Option<String>) -> Result<ExitCode, String> {
  let local = local
    .or_else(|| config.local_url.clone())
    .ok_or("No local URL given (--local or localUrl in config)")?;
  let public = public
    .or_else(|| config.public_url.clone())
    .ok_or("No public URL given (--public or publicUrl in config)")?;

  let url = select_base_url(&local, &public, config.probe_timeout()).await;
  println!("{}", url);
  Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
  init_logging();
  let cli = Cli::parse();

  let result = match load_config(cli.config.as_deref()) {
    Ok(config) => match cli.command {
      Command::Play {
        uri,
        login,
        password,
      } => play(&config, &uri, AuthCredential::new(login, password)).await,
      Command::Probe { local, public } => probe(&config, local, public).await,
    },
    Err(e) => Err(e),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      log::error!("{}", e);
      eprintln!("mpv-handler: {}", e);
      ExitCode::FAILURE
    }
  }
}
