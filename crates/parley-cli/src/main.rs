//! Parley binary — runs one interactive voice session.
//!
//! Loads configuration, wires the real audio/transport/tool components into
//! a session manager, starts a session and ends it on SIGINT/SIGTERM.

mod config;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use parley_audio::{CpalMicrophone, MicConstraints, Microphone, PlaybackSink, RodioPlayback};
use parley_session::{
    HandlerMap, InstructionSources, MemoryTranscriptStore, SessionManager, SessionNotice,
    SessionSettings,
};
use parley_tools::{HttpTranscriptStore, ToolRegistry};
use parley_transport::{NegotiationSettings, TransportFactory, WebRtcConnector};
use parley_types::TranscriptStore;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PARLEY_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn session_settings(config: &config::Config) -> SessionSettings {
    let mut settings = SessionSettings {
        negotiation: NegotiationSettings {
            credential_endpoint: config.endpoints.credential.clone(),
            realtime_endpoint: config.endpoints.realtime.clone(),
            model: config.session.model.clone(),
            voice: config.session.voice.clone(),
            language: config.session.language.clone(),
            ice_servers: config.endpoints.ice_servers.clone(),
            capture_sample_rate: config.audio.sample_rate,
            preferred_output_device: config.audio.output_device.clone(),
            ..Default::default()
        },
        instructions: InstructionSources {
            persona: config.session.persona.clone(),
            memory_context: config.session.memory_context.clone(),
            recent_summaries: config.session.recent_summaries.clone(),
            language: config.session.language.clone(),
        },
        greeting_enabled: config.session.greeting,
        barge_in_enabled: config.session.barge_in,
        mic: MicConstraints {
            sample_rate: config.audio.sample_rate,
            voice_optimized: config.audio.voice_optimized,
            input_device: config.audio.input_device.clone(),
            ..Default::default()
        },
        ..Default::default()
    };
    if let Some(ref pattern) = config.session.stop_pattern {
        settings.stop_pattern = pattern.clone();
    }
    settings
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("parley.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — parley cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Assemble the real components.
    let playback = RodioPlayback::new()
        .expect("failed to open audio output — parley needs a playback device");
    let sink: Arc<dyn PlaybackSink> = Arc::new(playback);
    let microphone: Arc<dyn Microphone> = Arc::new(CpalMicrophone);
    let factory: Arc<dyn TransportFactory> = Arc::new(WebRtcConnector);

    let registry = ToolRegistry::new(&config.services.endpoints());
    let handlers: Arc<dyn HandlerMap> = Arc::new(registry);

    let store: Arc<dyn TranscriptStore> = match config.services.transcripts {
        Some(ref base) => Arc::new(HttpTranscriptStore::new(base.clone())),
        None => {
            tracing::info!("no transcript service configured, keeping transcripts in memory");
            Arc::new(MemoryTranscriptStore::new())
        }
    };

    let manager = SessionManager::new(factory, microphone, sink, handlers, store);

    // Log notices as they stream by so a headless run is observable.
    let mut notices = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(SessionNotice::PhaseChanged(phase)) => {
                    tracing::info!(%phase, "session phase")
                }
                Ok(SessionNotice::Ready { via_ack }) => tracing::info!(via_ack, "session ready"),
                Ok(SessionNotice::BargeIn) => tracing::info!("barge-in"),
                Ok(SessionNotice::SearchInProgress { call_id }) => {
                    tracing::info!(%call_id, "searching...")
                }
                Ok(SessionNotice::StopIntent { matched }) => {
                    tracing::info!(%matched, "stop intent")
                }
                Ok(SessionNotice::Error(message)) => tracing::warn!(%message, "session error"),
                Ok(SessionNotice::Ended) => tracing::info!("session ended"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "notice stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let settings = session_settings(&config);
    tracing::info!(
        model = %settings.negotiation.model,
        voice = %settings.negotiation.voice,
        "starting voice session"
    );

    let handle = match manager.start(settings).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "session start failed");
            std::process::exit(1);
        }
    };

    shutdown_signal().await;
    tracing::info!("shutting down");
    handle.end().await;
    manager.end_current().await;
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
