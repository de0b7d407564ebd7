//! OmniJourney — customer journey orchestration across owned channels.
//!
//! Main entry point that wires the channel registry, capping engine,
//! personalization, attribution, and the cooperative scheduler.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use omnijourney_channels::{ChannelRegistry, InMemoryGateway};
use omnijourney_core::config::AppConfig;
use omnijourney_core::event_bus::noop_sink;
use omnijourney_delivery::{CapException, CappingScope, FrequencyCapEngine, FrequencyRule};
use omnijourney_journey::{InMemoryTemplateStore, JourneyOrchestrator, OrchestratorRuntime};
use omnijourney_personalization::{
    ExperienceCandidate, RealTimePersonalizationEngine, RuleBasedScoring,
};
use omnijourney_reporting::attribution::AttributionEngine;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "omnijourney")]
#[command(about = "Customer journey orchestration engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "OMNIJOURNEY__NODE_ID")]
    node_id: Option<String>,

    /// Step scheduler tick in milliseconds (overrides config)
    #[arg(long, env = "OMNIJOURNEY__SCHEDULER__STEP_TICK_MS")]
    step_tick_ms: Option<u64>,

    /// Seed demo channels, rules, and templates on startup
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omnijourney=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("OmniJourney starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(tick) = cli.step_tick_ms {
        config.scheduler.step_tick_ms = tick;
    }

    info!(
        node_id = %config.node_id,
        step_tick_ms = config.scheduler.step_tick_ms,
        "Configuration loaded"
    );

    let sink = noop_sink();

    let registry = Arc::new(ChannelRegistry::new().with_event_sink(sink.clone()));
    registry.seed_default_channels();

    let capping = Arc::new(FrequencyCapEngine::new(default_capping_rules()));
    let gateway = Arc::new(InMemoryGateway::new());
    let templates = Arc::new(InMemoryTemplateStore::new());
    let realtime = Arc::new(
        RealTimePersonalizationEngine::new(Arc::new(RuleBasedScoring))
            .with_event_sink(sink.clone()),
    );
    if cli.seed_demo {
        templates.seed_demo_templates();
        seed_demo_experiences(&realtime);
        info!("Seeded demo journey templates and experiences");
    }

    let orchestrator = Arc::new(
        JourneyOrchestrator::new(registry, capping, gateway, templates)
            .with_event_sink(sink.clone())
            .with_attribution(Arc::new(AttributionEngine::new().with_event_sink(sink)))
            .with_realtime(realtime)
            .with_config(config.journey.clone()),
    );

    let runtime = OrchestratorRuntime::new(orchestrator, config.scheduler.clone());
    let handle = tokio::spawn(runtime.run());

    info!("Orchestrator running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    handle.abort();
    info!("Shutting down");

    Ok(())
}

fn seed_demo_experiences(realtime: &RealTimePersonalizationEngine) {
    realtime.register_experience(ExperienceCandidate {
        id: "flash_sale_push".to_string(),
        channel: "push".to_string(),
        content: "Flash sale ends tonight".to_string(),
        base_value: 0.4,
        real_time: true,
        active: true,
    });
    realtime.register_experience(ExperienceCandidate {
        id: "weekly_digest_email".to_string(),
        channel: "email".to_string(),
        content: "Your weekly picks are in".to_string(),
        base_value: 0.3,
        real_time: false,
        active: true,
    });
}

/// Conservative defaults: a global burst rule plus a tighter SMS cap with
/// a champion-tier exception.
fn default_capping_rules() -> Vec<FrequencyRule> {
    vec![
        FrequencyRule {
            id: Uuid::new_v4(),
            name: "global_daily".to_string(),
            scope: CappingScope::Global,
            time_window_hours: 24,
            max_exposures: 10,
            channels: Vec::new(),
            priority: 1,
            exceptions: Vec::new(),
        },
        FrequencyRule {
            id: Uuid::new_v4(),
            name: "sms_daily".to_string(),
            scope: CappingScope::Channel,
            time_window_hours: 24,
            max_exposures: 2,
            channels: vec!["sms".to_string()],
            priority: 5,
            exceptions: vec![CapException {
                condition: "{{loyalty_tier}} == \"champion\"".to_string(),
                multiplier: 1.5,
                description: "Champion-tier customers tolerate more volume".to_string(),
            }],
        },
    ]
}
