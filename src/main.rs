use anyhow::Result;
use std::sync::Arc;

use museroute::providers::demo::DemoClient;
use museroute::{
    CapabilityIndex, GenerationRequest, MemoryStore, ProviderCapability, ProviderInfo, Router,
    RouterConfig, TaskKind,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let prompt: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let prompt = if prompt.is_empty() {
        "an upbeat jazz melody with rich chords and a driving beat".to_string()
    } else {
        prompt
    };

    let config = RouterConfig::load()?;
    let store = Arc::new(MemoryStore::new());
    let request = GenerationRequest::new(prompt);
    let request_id = request.id;
    store.insert_request(request).await;

    let router = Router::new(
        Arc::new(demo_index()),
        Arc::new(DemoClient::new()),
        store,
        config,
    );

    router.analyze_and_route(request_id).await?;
    let result = router.execute_all(request_id).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    let snapshot = router.get_status(request_id).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}

// A small provider directory so the binary works without any real backends.
fn demo_index() -> CapabilityIndex {
    let mut index = CapabilityIndex::new();

    for (id, name) in [
        ("melodium", "Melodium"),
        ("harmonia", "Harmonia"),
        ("pulsegen", "PulseGen"),
    ] {
        index.register(ProviderInfo {
            id: id.to_string(),
            display_name: name.to_string(),
            active: true,
        });
    }

    let rows = [
        ("melodium", TaskKind::MelodyGeneration, 0.95, 2_000),
        ("melodium", TaskKind::StyleTransfer, 0.72, 2_500),
        ("harmonia", TaskKind::ChordProgression, 0.92, 1_200),
        ("harmonia", TaskKind::Orchestration, 0.78, 3_000),
        ("pulsegen", TaskKind::RhythmGeneration, 0.88, 800),
        ("pulsegen", TaskKind::MelodyGeneration, 0.71, 900),
    ];
    for (provider_id, kind, confidence, latency_ms) in rows {
        index.declare(ProviderCapability {
            provider_id: provider_id.to_string(),
            kind,
            confidence,
            latency_ms,
            cost_per_call: Some(0.002),
            max_input_len: 8_192,
        });
    }

    index
}
