//! castctl: drive one Cast receiver from the terminal.
//!
//! Usage: `castctl <host> [port]` or `castctl --config castlink.yaml`.
//! One command per line: u/d volume, f/b seek +-10s, p or space play/pause,
//! s stop, q status, x quit.

use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use castlink_client::config::{self, ClientConfig};
use castlink_client::Controller;
use castlink_core::error::{CastError, Result};

const SEEK_STEP_SECS: f64 = 10.0;
const FLUSH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let cfg = match parse_args(std::env::args().skip(1).collect()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("castctl: {e}");
            eprintln!("usage: castctl <host> [port] | castctl --config <file.yaml>");
            return ExitCode::from(2);
        }
    };

    match run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("castctl: {e} ({})", e.code().as_str());
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<ClientConfig> {
    match args.as_slice() {
        [flag, path] if flag == "--config" => config::load_from_file(path),
        [host] => checked(ClientConfig::for_device(host.as_str(), castlink_core::protocol::namespace::DEFAULT_PORT)),
        [host, port] => {
            let port = port
                .parse::<u16>()
                .map_err(|e| CastError::Config(format!("invalid port {port}: {e}")))?;
            checked(ClientConfig::for_device(host.as_str(), port))
        }
        _ => Err(CastError::Config("expected a host or --config".into())),
    }
}

fn checked(cfg: ClientConfig) -> Result<ClientConfig> {
    cfg.validate()?;
    Ok(cfg)
}

async fn run(cfg: ClientConfig) -> Result<()> {
    let ctl = Controller::connect(&cfg).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            reason = ctl.link().closed() => return Err(reason.into_error()),
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => return Err(CastError::Internal(format!("stdin: {e}"))),
                };
                if !handle_key(&ctl, &line)? {
                    break;
                }
            }
        }
    }

    // Say goodbye on every virtual connection before the runtime stops.
    if tokio::time::timeout(FLUSH_TIMEOUT, ctl.link().close_and_flush()).await.is_err() {
        tracing::warn!("link did not flush before exit");
    }
    Ok(())
}

/// Returns `false` to quit.
fn handle_key(ctl: &Controller, line: &str) -> Result<bool> {
    let key = match line.trim() {
        "" if line.contains(' ') => " ",
        key => key,
    };

    match key {
        "u" => {
            ctl.volume_up()?;
        }
        "d" => {
            ctl.volume_down()?;
        }
        "f" => {
            ctl.seek_relative(SEEK_STEP_SECS)?;
        }
        "b" => {
            ctl.seek_relative(-SEEK_STEP_SECS)?;
        }
        "p" | " " => {
            ctl.toggle_pause()?;
        }
        "s" => {
            ctl.stop()?;
        }
        "q" => println!("{}", status_line(ctl)),
        "x" => return Ok(false),
        _ => {}
    }
    Ok(true)
}

fn status_line(ctl: &Controller) -> String {
    let app = ctl
        .application()
        .map(|a| a.display_name)
        .unwrap_or_else(|| "-".into());
    let volume = ctl
        .volume()
        .map(|v| format!("{:.0}%", v * 100.0))
        .unwrap_or_else(|| "?".into());
    let muted = if ctl.muted() == Some(true) { " (muted)" } else { "" };

    let position = match (ctl.current_position(), ctl.duration()) {
        (Some(p), Some(d)) => format!("{p:.1}/{d:.1}s"),
        (Some(p), None) => format!("{p:.1}s"),
        _ => "-".into(),
    };
    let title = ctl
        .media()
        .and_then(|m| m.title().map(str::to_owned))
        .unwrap_or_default();

    format!(
        "[{app}] {} {position} vol {volume}{muted} {title}",
        ctl.state().as_str()
    )
}
