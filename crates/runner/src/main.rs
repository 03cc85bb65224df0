use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use defcon_bridge_core::BridgeConfig;
use defcon_bridge_core::agent::{AnalysisPrompt, DecisionContexts, DecisionMaker, TurnLoop};
use defcon_bridge_core::config::DEFAULT_CONFIG_FILE;
use defcon_bridge_core::llm::{OllamaChat, OllamaConfig};
use defcon_bridge_core::wire::StructureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Turn loop until Ctrl-C.
    Run,
    /// Print the messages the next turn would send, without calling the model.
    Preview,
    /// One advisory query over the current state.
    Analyze(AnalysisPrompt),
}

fn parse_mode(args: &[String]) -> anyhow::Result<Mode> {
    match args.first().map(String::as_str) {
        None | Some("run") => Ok(Mode::Run),
        Some("preview") => Ok(Mode::Preview),
        Some("analyze") => Ok(Mode::Analyze(AnalysisPrompt::AnalyzeGameState)),
        Some("targets") => Ok(Mode::Analyze(AnalysisPrompt::SuggestNukeTargets)),
        Some("placement") => {
            let kind = match args.get(1).map(String::as_str) {
                None | Some("Silo") => StructureKind::Silo,
                Some("RadarStation") => StructureKind::RadarStation,
                Some("AirBase") => StructureKind::AirBase,
                Some(other) => anyhow::bail!("unknown structure kind {other}"),
            };
            Ok(Mode::Analyze(AnalysisPrompt::SuggestStructurePlacement(kind)))
        }
        Some(other) => {
            anyhow::bail!("unknown mode {other}; expected run, preview, analyze, targets, placement")
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_contexts(cfg: &BridgeConfig) -> anyhow::Result<DecisionContexts> {
    let baseline = cfg.protocol.baseline_level;
    match &cfg.turn.contexts_path {
        Some(path) => DecisionContexts::load(path, baseline),
        None => {
            tracing::info!("bridge.contexts.builtin");
            Ok(DecisionContexts::builtin(baseline))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = parse_mode(&args)?;

    let cfg = BridgeConfig::load(DEFAULT_CONFIG_FILE)?;
    let contexts = load_contexts(&cfg)?;
    let llm = OllamaChat::new(OllamaConfig::from(&cfg.llm));
    let mut agent = TurnLoop::from_config(&cfg, contexts).context("build bridge session")?;

    match mode {
        Mode::Preview => {
            println!("{}", agent.preview_prompt().await?);
        }
        Mode::Analyze(prompt) => {
            let snapshot = agent.session.game_state().await?;
            let answer = llm.decide(prompt.messages(&snapshot.text)).await?;
            println!("{answer}");
        }
        Mode::Run => {
            agent
                .session
                .start()
                .await
                .context("reset outbound command file")?;
            tracing::info!(
                outbound = %agent.session.channel().outbound_path().display(),
                inbound = %agent.session.channel().inbound_path().display(),
                model = %llm.config().model,
                "bridge.started"
            );
            tokio::select! {
                _ = agent.run(&llm) => {}
                res = tokio::signal::ctrl_c() => {
                    res.context("listen for ctrl-c")?;
                    tracing::info!(turns = agent.history.len(), "bridge.shutdown");
                }
            }
        }
    }
    Ok(())
}
