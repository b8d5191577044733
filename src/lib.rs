use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn, Level};
use url::Url;

pub mod archive;
pub mod classification;
pub mod config;
pub mod crew;
pub mod engine;
pub mod enrich;
pub mod esi;
pub mod matcher;
pub mod models;
pub mod probability;
pub mod redis_q;
pub mod snapshot;

fn generate_queue_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub async fn run() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Campwatch...");

    // --- Load all configurations ---
    let app_config = match config::load_app_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load application configuration: {}", e);
            return;
        }
    };
    let feed_url = match Url::parse(&app_config.redisq_url) {
        Ok(url) => url,
        Err(e) => {
            error!("Invalid redisq_url '{}': {}", app_config.redisq_url, e);
            return;
        }
    };

    let detection = Arc::new(config::load_detection_config("config/"));
    let adjacency = config::load_adjacency("config/adjacency.json").unwrap_or_else(|e| {
        warn!(
            "Failed to load adjacency.json: {}. Starting with an empty map.",
            e
        );
        HashMap::new()
    });

    // --- Initialize engine and pipeline ---
    let engine = Arc::new(Mutex::new(engine::ActivityEngine::new(
        detection,
        adjacency,
    )));
    let enricher = enrich::Enricher::new(esi::EsiClient::new(), config::default_group_categories());
    let archive_writer = archive::ArchiveWriter::new(&app_config.archive_path);

    // --- Periodic tick: age members, decay probabilities, expire crews ---
    let tick_engine = engine.clone();
    let snapshot_path = app_config.snapshot_path.clone();
    let tick_interval = app_config.tick_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_interval));
        loop {
            interval.tick().await;
            let now = now_ms();
            let (expired, snap) = {
                let mut eng = tick_engine.lock().unwrap();
                let changed = eng.tick(now);
                (eng.drain_archive(), changed.then(|| eng.snapshot(now)))
            };
            archive_writer.append(&expired);
            if let Some(snap) = snap {
                config::save_to_json_file(&snapshot_path, &snap);
            }
        }
    });

    // --- Main killmail processing loop ---
    let queue_id = generate_queue_id();
    let listener = redis_q::RedisQListener::new(&feed_url, &queue_id);
    info!("Listening for killmails from RedisQ...");

    loop {
        match listener.listen().await {
            Ok(Some(mut kill)) => {
                info!("[Kill: {}] Received", kill.kill_id);
                enricher.enrich(&mut kill).await;
                engine.lock().unwrap().ingest(&kill, now_ms());
            }
            Ok(None) => {
                // No new data, continue loop
            }
            Err(e) => {
                error!("Error listening for killmails: {}", e);
                // Wait a bit before retrying to avoid spamming logs on persistent errors
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
