//! CLI binary for fala.

use clap::{Parser, Subcommand};
use fala::audio::{AudioSink, CpalSink, StdoutTextSink, TextSink};
use fala::commands::CommandRouter;
use fala::conversation::EchoConversation;
use fala::emotion::EmotionTable;
use fala::intent::IntentDetector;
use fala::tts::{EngineKind, EngineSelector, build_adapters};
use fala::{Assistant, FalaConfig, SessionDeps, SpeechController};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fala: spoken-language assistant with emotional speech.
#[derive(Parser)]
#[command(name = "fala", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print replies as text instead of synthesizing audio.
    #[arg(long)]
    text_only: bool,

    /// Output device name (default device when omitted).
    #[arg(long)]
    output_device: Option<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Read utterances from stdin and answer them.
    Chat,

    /// Speak one text and exit.
    Say {
        text: String,
        /// Emotion profile name.
        #[arg(short, long)]
        emotion: Option<String>,
    },

    /// List available audio output devices.
    Devices,

    /// Write the built-in defaults to the config path.
    InitConfig {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fala=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(FalaConfig::default_config_path);

    match cli.command {
        Some(Command::Devices) => list_devices(),
        Some(Command::InitConfig { force }) => init_config(&config_path, force),
        Some(Command::Say { ref text, ref emotion }) => {
            let config = load_config(&cli, &config_path);
            let speech = start_speech(&config, &cli).await?;
            match emotion {
                Some(emotion) => speech.speak(text, emotion),
                None => speech.speak_default(text),
            };
            let wait = Duration::from_millis(config.processing.playback_wait_ms);
            if !speech.wait_idle_for(wait).await {
                anyhow::bail!("speech did not finish within {} ms", wait.as_millis());
            }
            speech.shutdown().await;
            Ok(())
        }
        Some(Command::Chat) | None => {
            let config = load_config(&cli, &config_path);
            run_chat(config, &cli).await
        }
    }
}

fn load_config(cli: &Cli, path: &std::path::Path) -> FalaConfig {
    let mut config = FalaConfig::load_or_default(path);
    if cli.text_only {
        config.engines.chain = vec![EngineKind::TextOnly];
    }
    config
}

async fn start_speech(config: &FalaConfig, cli: &Cli) -> anyhow::Result<Arc<SpeechController>> {
    let text_sink: Arc<dyn TextSink> = Arc::new(StdoutTextSink);
    let adapters = build_adapters(config, text_sink, None);
    let selector = Arc::new(EngineSelector::probe(adapters).await?);
    info!(engine = %selector.current().kind, "speech engine selected");

    let sink: Arc<dyn AudioSink> = Arc::new(CpalSink::new(cli.output_device.clone()));
    let emotions = Arc::new(EmotionTable::from_config(&config.emotions));
    let deps =
        SessionDeps::new(selector, emotions, sink).with_processing(config.processing.clone());
    Ok(Arc::new(SpeechController::spawn(deps)))
}

async fn run_chat(config: FalaConfig, cli: &Cli) -> anyhow::Result<()> {
    let started = Instant::now();
    println!("Fala v{}", env!("CARGO_PKG_VERSION"));

    let speech = start_speech(&config, cli).await?;
    let router = CommandRouter::standard(&config, Arc::clone(&speech), started)?;
    let assistant = Assistant::new(
        IntentDetector::new()?,
        router,
        Arc::new(EchoConversation),
        Arc::clone(&speech),
    );
    let echo_replies = speech.selector().current().kind != EngineKind::TextOnly;

    println!("Digite uma mensagem (\"sair\" para encerrar).");
    let (line_tx, mut line_rx) = mpsc::channel::<String>(config.processing.queue_size.max(1));
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut interrupted = false;
    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line.to_lowercase().as_str(), "sair" | "exit" | "quit") {
                    break;
                }
                let reply = assistant.handle(line).await;
                if echo_replies {
                    println!("{}", reply.text());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }

    if interrupted {
        speech.cancel();
    } else {
        speech
            .wait_idle_for(Duration::from_millis(config.processing.playback_wait_ms))
            .await;
    }
    speech.shutdown().await;
    println!("Até logo!");
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Output devices:");
    for name in CpalSink::list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to replace it)",
            path.display()
        );
    }
    FalaConfig::default().save_to_file(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
