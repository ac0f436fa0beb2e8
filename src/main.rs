use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};

use astric_voice::VoiceConfig;
use astric_voice::core::realtime::gemini::is_prebuilt_voice;

/// Astric Voice - Realtime voice assistant for Gemini Live
#[derive(Parser, Debug)]
#[command(name = "astric-voice")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configuration, then print the effective settings
    CheckConfig,

    /// Run one voice session on the default microphone and speaker until Ctrl-C
    #[cfg(feature = "device-audio")]
    Talk,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = &cli.config {
        println!("Loading configuration from {}", config_path.display());
        VoiceConfig::from_file(config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        VoiceConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    match cli.command {
        Commands::CheckConfig => check_config(&config),
        #[cfg(feature = "device-audio")]
        Commands::Talk => talk::run(&config).await,
    }
}

fn check_config(config: &VoiceConfig) -> anyhow::Result<()> {
    let settings = config
        .session_settings()
        .map_err(|e| anyhow!(e.to_string()))?;

    println!("Configuration OK");
    println!("  api key:          {}", if config.require_api_key().is_ok() { "set" } else { "MISSING" });
    println!("  model:            {}", settings.model);
    println!(
        "  voice:            {}{}",
        settings.voice,
        if is_prebuilt_voice(&settings.voice) { "" } else { " (not a known prebuilt voice)" }
    );
    println!("  input rate:       {} Hz", settings.input_sample_rate);
    println!("  output rate:      {} Hz", settings.output_sample_rate);
    println!("  frame size:       {} samples", settings.frame_size);
    println!("  capture queue:    {} frames", settings.capture_queue_capacity);
    println!("  speaker:          {}", if settings.speaker_enabled { "on" } else { "off" });
    println!("  connect timeout:  {:?}", settings.connect_timeout);
    println!("  tool timeout:     {:?}", settings.tool_timeout);
    println!(
        "  knowledge:        {}",
        config
            .knowledge_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );
    println!(
        "  lead delivery:    {}",
        if config.lead_webhook_url.is_some() { "webhook" } else { "log" }
    );

    #[cfg(feature = "device-audio")]
    match astric_voice::core::audio::CpalBackend::list_input_devices() {
        Ok(devices) if devices.is_empty() => println!("  input devices:    none found"),
        Ok(devices) => println!("  input devices:    {}", devices.join(", ")),
        Err(e) => println!("  input devices:    unavailable ({e})"),
    }
    Ok(())
}

#[cfg(feature = "device-audio")]
mod talk {
    use std::sync::Arc;

    use anyhow::anyhow;
    use tokio_util::sync::CancellationToken;
    use tracing::info;

    use astric_voice::core::audio::CpalBackend;
    use astric_voice::core::realtime::{NoticeLevel, SessionNotice, TranscriptUpdate};
    use astric_voice::{
        GeminiLiveTransport, SessionContext, SessionMachine, SubmitOrderTool, ToolRegistry,
        VoiceConfig,
    };

    pub async fn run(config: &VoiceConfig) -> anyhow::Result<()> {
        let settings = config
            .session_settings()
            .map_err(|e| anyhow!(e.to_string()))?;
        let gemini = config.gemini_config().map_err(|e| anyhow!(e.to_string()))?;
        let sink = config.lead_sink().map_err(|e| anyhow!(e.to_string()))?;

        let transport = Arc::new(GeminiLiveTransport::new(gemini)?);

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SubmitOrderTool::new(sink)));

        let mut machine = SessionMachine::new(
            settings,
            transport,
            Arc::new(CpalBackend::new()),
            Arc::new(registry),
        );

        machine.on_transcript(Arc::new(|update: TranscriptUpdate| {
            Box::pin(async move {
                if update.is_final {
                    println!("[{}] {}", update.role, update.text);
                }
            })
        }));
        machine.on_notice(Arc::new(|notice: SessionNotice| {
            Box::pin(async move {
                match notice.level {
                    NoticeLevel::Error => eprintln!("error: {}", notice.message),
                    _ => println!("* {}", notice.message),
                }
            })
        }));

        let shutdown = CancellationToken::new();
        let ctrl_c = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, ending session");
                ctrl_c.cancel();
            }
        });

        let mut ctx = SessionContext::new();
        machine.start(&mut ctx).await?;
        machine.run_until(&mut ctx, &shutdown).await;

        info!(
            entries = ctx.transcript().history().len(),
            "Session ended"
        );
        Ok(())
    }
}
