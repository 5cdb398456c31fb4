//! Threadflow CLI - execute a graph export from the command line

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use threadflow::prelude::*;

#[derive(Parser)]
#[command(name = "threadflow", about = "Workflow graph execution engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a graph JSON export
    Run {
        /// Path to the graph file ({"nodes": [...], "edges": [...]})
        graph: PathBuf,

        /// Start node id; defaults to the graph's single start node
        #[arg(long)]
        start: Option<String>,

        /// Simulate prompt nodes instead of calling the API
        #[arg(long)]
        dev: bool,

        /// OpenAI API key for prompt nodes
        #[arg(long, env = "OPENAI_API_KEY")]
        api_key: Option<String>,

        /// Fail nodes stuck on a join barrier after this many seconds
        #[arg(long)]
        join_timeout_secs: Option<u64>,

        /// Cap on concurrently running nodes
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Print state transitions and log entries as they happen
        #[arg(long)]
        follow: bool,
    },

    /// List the node types the editor palette can add
    Nodes,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Cli::parse()).await {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Command::Nodes => {
            let registry = NodeRegistry::builtin();
            for metadata in registry.addable_metadata() {
                println!(
                    "{:<14} {:<20} {}",
                    metadata.kind.to_string(),
                    metadata.name,
                    metadata.description
                );
            }
            Ok(true)
        }
        Command::Run {
            graph,
            start,
            dev,
            api_key,
            join_timeout_secs,
            max_concurrency,
            follow,
        } => {
            let json = std::fs::read_to_string(&graph)
                .with_context(|| format!("reading {}", graph.display()))?;
            let graph = Graph::from_json(&json).context("parsing graph export")?;
            let start_id = match start {
                Some(id) => id,
                None => find_start(&graph)?,
            };

            let mut config = RunConfig::new().with_dev_mode(dev);
            if let Some(key) = api_key {
                config = config.with_api_key(key);
            }
            if let Some(secs) = join_timeout_secs {
                config = config.with_join_timeout(Duration::from_secs(secs));
            }
            if let Some(limit) = max_concurrency {
                config = config.with_max_concurrency(limit);
            }

            let walker = Walker::new(Arc::new(NodeRegistry::builtin()), config);
            let printer = follow.then(|| {
                let events = walker.events();
                tokio::spawn(async move {
                    let mut events = std::pin::pin!(events);
                    while let Some(event) = events.next().await {
                        match event {
                            RunEvent::StateChanged { node_id, from, to, .. } => {
                                println!("  {} {} -> {}", node_id, from, to);
                            }
                            RunEvent::Log(entry) => {
                                println!("  #{} {}: {}", entry.seq, entry.node_id, entry.message);
                            }
                        }
                    }
                })
            });

            let result = walker.run(&graph, &start_id).await?;
            if let Some(printer) = printer {
                printer.abort();
            }

            print_summary(&result);
            Ok(result.success)
        }
    }
}

fn find_start(graph: &Graph) -> anyhow::Result<String> {
    let starts: Vec<&Node> = graph
        .nodes()
        .iter()
        .filter(|node| node.kind == NodeKind::Start)
        .collect();
    match starts.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => anyhow::bail!("graph has no start node; pass --start"),
        _ => anyhow::bail!("graph has multiple start nodes; pass --start"),
    }
}

fn print_summary(result: &RunResult) {
    println!("run:       {}", result.run_id);
    println!(
        "status:    {}",
        match (result.success, result.cancelled) {
            (_, true) => "cancelled",
            (true, _) => "success",
            (false, _) => "failed",
        }
    );

    let mut states: Vec<(&String, &NodeState)> = result.states.iter().collect();
    states.sort_by(|a, b| a.0.cmp(b.0));
    for (id, state) in states {
        println!("  {:<24} {}", id, state);
    }

    println!(
        "tokens:    {} in / {} out",
        result.stats.tokens_in, result.stats.tokens_out
    );
    println!("amount:    ${:.6}", result.stats.amount);
    println!("log:       {} entries", result.stats.log.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DEV_GRAPH: &str = r#"{
        "nodes": [
            {"id": "start-1", "type": "start", "data": {}},
            {"id": "p1", "type": "prompt", "data": {"prompt": "hello", "name": "Greeter"}}
        ],
        "edges": [
            {"id": "e1", "source": "start-1", "target": "p1"}
        ]
    }"#;

    #[tokio::test]
    async fn test_run_command_executes_graph_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEV_GRAPH.as_bytes()).unwrap();

        let success = run(Cli {
            command: Command::Run {
                graph: file.path().to_path_buf(),
                start: None,
                dev: true,
                api_key: None,
                join_timeout_secs: None,
                max_concurrency: None,
                follow: false,
            },
        })
        .await
        .unwrap();

        assert!(success);
    }

    #[test]
    fn test_find_start_requires_exactly_one() {
        let graph = Graph::from_json(DEV_GRAPH).unwrap();
        assert_eq!(find_start(&graph).unwrap(), "start-1");

        let no_start = Graph::new(vec![Node::new("p", NodeKind::Prompt)], vec![]).unwrap();
        assert!(find_start(&no_start).is_err());
    }
}
