use anyhow::{Context, Result};
use chantier_feedback::audio::{SimulatedCaptureEngine, SimulatedPlaybackEngine};
use chantier_feedback::deletion::Answered;
use chantier_feedback::integration::{FeedbackConfig, FeedbackView};
use chantier_feedback::messages::{MemoryFeedbackStore, MessageBody, MessageScope};
use chantier_feedback::names::{MapNameResolver, ReservedNameResolver, TEAM_AUTHOR_ID};
use chantier_feedback::session::StaticSession;
use chantier_feedback::upload::MemoryBlobStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chantier_feedback=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => FeedbackConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => FeedbackConfig::default(),
    };

    info!("Starting feedback demo session");

    let store = MemoryFeedbackStore::new();
    let blobs = MemoryBlobStore::new("https://storage.example/chantiers");
    let session = Arc::new(StaticSession::signed_in("u-marie"));
    let capture = Arc::new(SimulatedCaptureEngine::new(
        config.recording_dir.clone(),
        config.capture_sample_rate,
    ));
    let player = SimulatedPlaybackEngine::new();
    let names = ReservedNameResolver::new(
        MapNameResolver::new().with_name("u-marie", "Marie Dupont"),
        &config,
    );

    let view = FeedbackView::builder(MessageScope::phase("chantier-12", "gros-oeuvre"))
        .with_config(config)
        .with_store(Arc::new(store.clone()))
        .with_blobs(Arc::new(blobs.clone()))
        .with_session(session.clone())
        .with_capture_engine(capture)
        .with_playback_engine(Arc::new(player.clone()))
        .build()?;

    let mut subscription = view.subscribe(|messages| {
        info!("Feed now has {} message(s)", messages.len());
    });

    view.composer().set_draft("Bonjour, la dalle est coulée.");
    view.composer().send_text().await?;

    view.composer().press_to_record().await?;
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let voice_id = view
        .composer()
        .release_to_send()
        .await?
        .context("voice note was not recorded")?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    for message in subscription.latest() {
        let author = names.display_name(&message.author_id).await;
        match &message.body {
            MessageBody::Text { body } => info!("{}: {}", author, body),
            MessageBody::Voice {
                duration_seconds, ..
            } => info!("{}: voice note ({:.1}s)", author, duration_seconds),
        }
    }
    info!("Team label: {}", names.display_name(TEAM_AUTHOR_ID).await);

    let voice = subscription
        .latest()
        .into_iter()
        .find(|m| m.id == voice_id)
        .context("voice note missing from feed")?;
    if let Some(url) = voice.audio_url() {
        view.playback().play(voice.id, url).await;
        player.finish(url);
    }

    if view.deletion().can_delete(&voice) {
        let outcome = view
            .deletion()
            .delete_message(&voice.chantier_id, voice.id, voice.audio_url(), &Answered(true))
            .await?;
        info!("Deletion outcome: {:?}", outcome);
    }

    for notice in view.notices().drain() {
        warn!("Unacknowledged notice: {:?}", notice);
    }

    subscription.unsubscribe();
    view.teardown().await;
    info!(
        "Demo finished: {} message(s), {} blob(s) remain",
        store.len(),
        blobs.len()
    );
    Ok(())
}
