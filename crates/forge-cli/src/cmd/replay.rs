use crate::output::{print_json, print_table, truncate};
use anyhow::Context;
use forge_core::{
    parse_events, ActionStatus, ArtifactRegistry, ArtifactSnapshot, EngineConfig, EngineEvent,
    ParserEvent,
};
use forge_sandbox::LocalSandbox;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// How long to keep draining engine events after the registry is gone.
/// Background processes may hold the output side open indefinitely.
const FOLLOW_DRAIN: Duration = Duration::from_millis(500);

pub fn run(
    root: &Path,
    config_path: &Path,
    input: &str,
    follow: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = EngineConfig::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let text = read_input(input)?;
    let events = parse_events(&text).context("failed to parse event stream")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(replay(root, &config, events, follow, json))
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read events from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))
}

async fn replay(
    root: &Path,
    config: &EngineConfig,
    events: Vec<ParserEvent>,
    follow: bool,
    json: bool,
) -> anyhow::Result<()> {
    let sandbox = LocalSandbox::new(root, &config.workdir)
        .with_context(|| format!("failed to prepare sandbox under {}", root.display()))?;
    let registry = ArtifactRegistry::new(Arc::new(sandbox), config)?;

    let follower = follow.then(|| {
        let stream = BroadcastStream::new(registry.subscribe());
        tokio::spawn(print_events(stream, json))
    });

    let mut rejected = Vec::new();
    for (idx, event) in events.into_iter().enumerate() {
        let artifact_id = event.artifact_id().to_string();
        if let Err(e) = registry.apply(event) {
            tracing::warn!(artifact = %artifact_id, error = %e, "event rejected");
            rejected.push(format!("event {}: {e}", idx + 1));
        }
    }

    registry.settle_all().await;
    let artifacts = registry.artifacts();
    drop(registry);

    if let Some(handle) = follower {
        if tokio::time::timeout(FOLLOW_DRAIN, handle).await.is_err() {
            tracing::debug!("event follower still open; detaching");
        }
    }

    if json {
        let value = serde_json::json!({
            "artifacts": artifacts,
            "rejected": rejected,
        });
        print_json(&value)?;
    } else {
        print_summary(&artifacts);
        for message in &rejected {
            eprintln!("rejected {message}");
        }
    }

    if !rejected.is_empty() {
        anyhow::bail!("{} event(s) rejected", rejected.len());
    }
    Ok(())
}

async fn print_events(mut stream: BroadcastStream<EngineEvent>, json: bool) {
    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "event follower fell behind");
                continue;
            }
        };
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode event"),
            }
            continue;
        }
        match event {
            EngineEvent::ArtifactAdded { artifact_id, title } => {
                println!("[{artifact_id}] artifact added: {title}")
            }
            EngineEvent::ArtifactUpdated {
                artifact_id,
                title,
                closed,
            } => println!("[{artifact_id}] artifact updated: {title} (closed: {closed})"),
            EngineEvent::ActionUpdated {
                artifact_id,
                action_id,
                status,
            } => println!("[{artifact_id}/{action_id}] {status}"),
            EngineEvent::Output {
                artifact_id,
                action_id,
                line,
            } => println!("[{artifact_id}/{action_id}] | {line}"),
        }
    }
}

fn print_summary(artifacts: &[ArtifactSnapshot]) {
    if artifacts.is_empty() {
        println!("No artifacts.");
        return;
    }
    for artifact in artifacts {
        let closed = if artifact.closed { " (closed)" } else { "" };
        println!("{}: {}{closed}", artifact.id, artifact.title);
        let rows = artifact
            .actions
            .iter()
            .map(|action| {
                let status = match &action.status {
                    ActionStatus::Failed { reason } => format!("failed: {}", truncate(reason, 48)),
                    other => other.as_str().to_string(),
                };
                vec![
                    action.id.clone(),
                    action.descriptor.kind().to_string(),
                    status,
                    truncate(&action.descriptor.summary(), 48),
                ]
            })
            .collect();
        print_table(&["ACTION", "KIND", "STATUS", "DETAIL"], rows);
        println!();
    }
}
