//! `gemini-voice` terminal client.
//!
//! stdout carries only the conversation (`You: ...` / `AI: ...`); logs go
//! to stderr through `tracing-subscriber`, filtered by `RUST_LOG`.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use gemini_voice_core::audio::device::{list_devices, Direction};
use gemini_voice_core::{
    AudioBackend, Config, ErrorKind, SessionController, ShutdownSignal, VoiceError,
    WebSocketTransport,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use cli::Args;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemini_voice_core=info,gemini_voice_cli=info".into()),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let Some(api_key) = args.api_key.filter(|k| !k.trim().is_empty()) else {
        bail!("API key not set. Pass --api-key <KEY> or set GEMINI_API_KEY");
    };

    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    config.enable_search |= args.enable_search;
    config.log_summary();

    let audio = if args.dummy_audio {
        info!("dummy audio mode: sending silence, discarding playback");
        AudioBackend::dummy(&config)
    } else {
        AudioBackend::cpal(args.input_device, args.output_device, &config)
    };

    let transport = Arc::new(WebSocketTransport::live_api(&api_key));
    let controller = SessionController::new(config, transport, audio);

    let printer = spawn_printer(&controller)?;
    spawn_ctrl_c_handler(controller.shutdown_signal())?;

    if let Err(e) = controller.start() {
        if matches!(e, VoiceError::ShutdownRequested) {
            info!("interrupted before the session became active");
            return Ok(());
        }
        if e.kind() == ErrorKind::Device {
            eprintln!("Hint: use --dummy-audio to run without audio devices");
        }
        return Err(e).context("failed to start session");
    }
    println!("Connected. Speak now, Ctrl+C to quit.");

    let outcome = controller.wait();
    drop(controller);
    if printer.join().is_err() {
        warn!("transcript printer panicked");
    }

    match outcome {
        Ok(()) => {
            info!("session ended");
            Ok(())
        }
        Err(e @ VoiceError::Transport(_)) => Err(e).context("session ended with a connection error"),
        Err(e) => Err(e.into()),
    }
}

/// Print finished utterances until the session's channels close.
fn spawn_printer(controller: &SessionController) -> Result<thread::JoinHandle<()>> {
    let mut utterances = controller.subscribe_transcripts();
    let handle = thread::Builder::new()
        .name("gemini-voice-printer".into())
        .spawn(move || loop {
            match utterances.blocking_recv() {
                Ok(event) => println!("{}: {}", event.role.label(), event.text),
                Err(RecvError::Lagged(missed)) => warn!(missed, "transcript printer lagged"),
                Err(RecvError::Closed) => break,
            }
        })
        .context("failed to spawn printer thread")?;
    Ok(handle)
}

fn spawn_ctrl_c_handler(shutdown: ShutdownSignal) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    thread::Builder::new()
        .name("gemini-voice-signal".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("interrupt received, shutting down");
                        shutdown.trigger();
                    }
                    Err(e) => error!(error = %e, "cannot listen for Ctrl+C"),
                }
            });
        })
        .context("failed to spawn signal thread")?;
    Ok(())
}

fn print_devices() {
    let devices = list_devices();
    if devices.is_empty() {
        println!("No audio devices found.");
        return;
    }
    for direction in [Direction::Input, Direction::Output] {
        println!(
            "{}:",
            match direction {
                Direction::Input => "Input devices",
                Direction::Output => "Output devices",
            }
        );
        for device in devices.iter().filter(|d| d.direction == direction) {
            let mut tags = Vec::new();
            if device.is_default {
                tags.push("default");
            }
            if device.is_loopback_like {
                tags.push("loopback?");
            }
            if tags.is_empty() {
                println!("  {}", device.name);
            } else {
                println!("  {} [{}]", device.name, tags.join(", "));
            }
        }
    }
}
