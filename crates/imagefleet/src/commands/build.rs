use crate::BuildArgs;
use colored::Colorize;
use imagefleet_build::{BuildFlags, BuildProgress, DockerExecutor, DryRunExecutor};
use imagefleet_core::{DependencyGraph, ImageDescriptor};
use imagefleet_orchestrator::{
    BuildExecutor, NodeError, NodeStatus, Orchestrator, RunOptions, RunOutcome, RunReport,
    cancellation, default_concurrency,
};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

/// ビルドを実行し、全イメージが成功したかを返す
pub async fn handle(file: Option<&Path>, args: &BuildArgs) -> anyhow::Result<bool> {
    let (loaded, mut descriptors) = super::load_descriptors(file)?;
    let settings = &loaded.manifest.settings;

    if args.no_push {
        descriptors = descriptors
            .into_iter()
            .map(ImageDescriptor::without_push)
            .collect();
    }

    let mut graph = DependencyGraph::build(descriptors)?;
    if !args.targets.is_empty() {
        graph = graph.select(&args.targets)?;
    }

    let options = RunOptions {
        concurrency: args
            .concurrency
            .or(settings.concurrency)
            .unwrap_or_else(default_concurrency),
        tag_failure: args
            .tag_failure
            .or(settings.tag_failure)
            .unwrap_or_default(),
    };

    tracing::debug!(
        manifest = %loaded.path.display(),
        concurrency = options.concurrency,
        tag_failure = %options.tag_failure,
        dry_run = args.dry_run,
        "Run options"
    );

    if !args.json {
        println!(
            "{} {}個のイメージ (並列数: {})",
            "ビルド開始:".blue().bold(),
            graph.len(),
            options.concurrency
        );
    }

    let executor: Arc<dyn BuildExecutor> = if args.dry_run {
        Arc::new(DryRunExecutor::new())
    } else {
        let flags = BuildFlags {
            no_cache: args.no_cache,
            pull: args.pull,
        };
        let progress = BuildProgress::new(!args.json && std::io::stderr().is_terminal());
        Arc::new(DockerExecutor::connect(flags, progress).await?)
    };

    let (handle, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "中断しています... 実行中のビルドの完了を待ちます".yellow()
            );
            handle.cancel();
        }
    });

    let report = Orchestrator::new(executor, options)
        .run_graph(graph, signal)
        .await?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report);
    }

    Ok(report.is_success())
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "ビルド結果:".bold());

    for image in &report.images {
        match image.status {
            NodeStatus::Succeeded => {
                let id = image
                    .image_id
                    .as_deref()
                    .map(short_id)
                    .unwrap_or_default();
                println!("  {} {} {}", "✓".green(), image.name.cyan(), id.dimmed());
                for tag in &image.tagged {
                    let pushed = if image.pushed.contains(tag) {
                        " (pushed)"
                    } else {
                        ""
                    };
                    println!("      {}{}", tag, pushed.dimmed());
                }
            }
            NodeStatus::Failed => {
                let message = image.error_message().unwrap_or_default();
                println!("  {} {} {}", "✗".red(), image.name.cyan(), message.red());
            }
            NodeStatus::Skipped => {
                let reason = match &image.error {
                    Some(NodeError::UpstreamFailed { root }) => {
                        format!("スキップ ({} の失敗)", root)
                    }
                    Some(NodeError::Cancelled) => "スキップ (中断)".to_string(),
                    Some(other) => format!("スキップ ({})", other),
                    None => "スキップ".to_string(),
                };
                println!("  {} {} {}", "-".yellow(), image.name.cyan(), reason.yellow());
            }
            other => {
                println!("  ? {} {}", image.name, other);
            }
        }
    }

    println!();
    let summary = format!(
        "成功 {} / 失敗 {} / スキップ {}",
        report.count(NodeStatus::Succeeded),
        report.count(NodeStatus::Failed),
        report.count(NodeStatus::Skipped)
    );
    match report.outcome {
        RunOutcome::Succeeded => println!("{}", format!("✓ {}", summary).green().bold()),
        RunOutcome::Failed => println!("{}", format!("✗ {}", summary).red().bold()),
        RunOutcome::Cancelled => println!("{}", format!("中断 {}", summary).yellow().bold()),
    }
}

fn short_id(id: &str) -> String {
    let hex = id.strip_prefix("sha256:").unwrap_or(id);
    hex.chars().take(12).collect()
}
