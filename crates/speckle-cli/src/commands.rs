use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use speckle_api::{
    BranchCreateInput, BranchDeleteInput, Client, Commit, CommitCreateInput, CommitReceivedInput,
    StreamCreateInput,
};
use speckle_ops::{NoProgress, Operations, ProgressEvent, SendReport};
use speckle_serializer::{to_plain_json, Deserializer};
use speckle_server::{ServerConfig, SpeckleServer};
use speckle_transport::{DiskTransport, ServerTransport, Transport};
use speckle_types::{CancellationToken, NodeRef, SchemaRegistry};

use crate::cli::*;
use crate::config::CliConfig;

const SOURCE_APPLICATION: &str = "speckle-cli";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::resolve(cli.config.as_deref(), cli.server.as_deref(), cli.token.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(args, &config).await,
        Command::Send(args) => cmd_send(args, &config, format).await,
        Command::Receive(args) => cmd_receive(args, &config).await,
        Command::Stream(args) => cmd_stream(args, &config, format).await,
        Command::Branch(args) => cmd_branch(args, &config, format).await,
        Command::Commit(args) => cmd_commit(args, &config, format).await,
        Command::Flatten(args) => cmd_flatten(args, format),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Token cancelled on Ctrl-C, so long transfers stop between batches.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });
    token
}

fn cache_dir(config: &CliConfig, disabled: bool) -> Option<&Path> {
    if disabled {
        None
    } else {
        config.cache_dir.as_deref()
    }
}

fn read_graph(path: &Path, registry: &SchemaRegistry) -> anyhow::Result<NodeRef> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not JSON", path.display()))?;
    Deserializer::new(registry)
        .import_json(&json)
        .with_context(|| format!("importing {}", path.display()))
}

async fn cmd_serve(args: ServeArgs, config: &CliConfig) -> anyhow::Result<()> {
    let mut server_config = match &args.server_config {
        Some(path) => ServerConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        server_config.bind_addr = bind;
    }
    if args.data_dir.is_some() {
        server_config.data_dir = args.data_dir;
    }
    if server_config.users.is_empty() {
        match &config.token {
            Some(token) => server_config = server_config.with_user("local", "Local User", token),
            None => warn!("no users configured, only public streams will be readable"),
        }
    }
    println!(
        "{} Serving on {}",
        "✓".green().bold(),
        server_config.bind_addr.to_string().bold()
    );
    SpeckleServer::new(server_config)
        .serve()
        .await
        .context("server stopped")
}

/// Send `root` to the stream (and the local cache, if any) and commit it.
async fn send_graph(
    ops: &Operations,
    client: &Client,
    root: &NodeRef,
    args: &SendArgs,
    cache: Option<&Path>,
    cancel: &CancellationToken,
) -> anyhow::Result<(SendReport, String)> {
    let account = client.account();
    let mut transports: Vec<Arc<dyn Transport>> = vec![Arc::new(ServerTransport::new(
        &account.server_url,
        &args.stream,
        Some(&account.token),
    )?)];
    if let Some(dir) = cache {
        transports.push(Arc::new(DiskTransport::open(dir)?));
    }

    let progress = |event: ProgressEvent| {
        debug!(stage = ?event.stage, done = event.done, total = event.total, "progress");
    };
    let report = ops
        .send(root, &transports, &progress, cancel)
        .await
        .context("send failed")?;

    let mut input = CommitCreateInput::new(&args.stream, &args.branch, report.root_id).with_message(&args.message);
    input.source_application = Some(SOURCE_APPLICATION.into());
    let commit_id = client.commit_create(&input).await.context("creating commit")?;
    Ok((report, commit_id))
}

async fn cmd_send(args: SendArgs, config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let client = Client::new(config.account()?)?;
    let ops = Operations::default();
    let root = read_graph(&args.file, ops.registry())?;
    let cache = cache_dir(config, args.no_cache);
    let (report, commit_id) = send_graph(&ops, &client, &root, &args, cache, &cancel_on_ctrl_c()).await?;

    if format == OutputFormat::Json {
        return print_json(&json!({
            "objectId": report.root_id,
            "commitId": commit_id,
            "records": report.total_records,
            "bytes": report.total_bytes,
            "cacheHits": report.cache_hits,
        }));
    }
    println!(
        "{} Sent {} records ({} bytes, {} cache hits)",
        "✓".green().bold(),
        report.total_records.to_string().bold(),
        report.total_bytes,
        report.cache_hits
    );
    println!("  Object: {}", report.root_id.to_string().cyan());
    println!("  Commit: {} on {}", commit_id.yellow(), args.branch.green());
    Ok(())
}

/// Resolve the commit to receive and rehydrate its object graph.
async fn receive_commit(
    ops: &Operations,
    client: &Client,
    args: &ReceiveArgs,
    cache: Option<&Path>,
    cancel: &CancellationToken,
) -> anyhow::Result<(Commit, NodeRef)> {
    let commit = match &args.commit {
        Some(id) => client.commit_get(&args.stream, id).await?,
        None => client
            .branch_get(&args.stream, &args.branch, 1)
            .await?
            .commits
            .and_then(|page| page.items.into_iter().next())
            .with_context(|| format!("branch '{}' has no commits", args.branch))?,
    };

    let account = client.account();
    let remote = ServerTransport::new(&account.server_url, &args.stream, Some(&account.token))?;
    let local = cache.map(DiskTransport::open).transpose()?;
    let root = ops
        .receive(
            &commit.referenced_object,
            &remote,
            local.as_ref().map(|t| t as &dyn Transport),
            &NoProgress,
            cancel,
        )
        .await
        .with_context(|| format!("receiving commit {}", commit.id))?;

    let ack = CommitReceivedInput {
        stream_id: args.stream.clone(),
        commit_id: commit.id.clone(),
        source_application: Some(SOURCE_APPLICATION.into()),
        message: None,
    };
    if let Err(e) = client.commit_received(&ack).await {
        warn!(error = %e, "could not acknowledge receive");
    }
    Ok((commit, root))
}

async fn cmd_receive(args: ReceiveArgs, config: &CliConfig) -> anyhow::Result<()> {
    let client = Client::new(config.account()?)?;
    let ops = Operations::default();
    let cache = cache_dir(config, args.no_cache);
    let (commit, root) = receive_commit(&ops, &client, &args, cache, &cancel_on_ctrl_c()).await?;
    debug!(commit = %commit.id, object = %commit.referenced_object, "received");
    print_json(&to_plain_json(&root)?)
}

async fn cmd_stream(args: StreamArgs, config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let client = Client::new(config.account()?)?;
    match args.action {
        StreamAction::Create { name, description, public } => {
            let input = StreamCreateInput {
                name: name.clone(),
                description,
                is_public: public,
            };
            let id = client.stream_create(&input).await?;
            match format {
                OutputFormat::Json => print_json(&json!({ "id": id }))?,
                OutputFormat::Text => println!("{} Created stream {} ({})", "✓".green().bold(), name.bold(), id.cyan()),
            }
        }
        StreamAction::List { limit } => {
            let page = client.stream_list(limit, None).await?;
            if format == OutputFormat::Json {
                return print_json(&page);
            }
            if page.items.is_empty() {
                println!("No streams.");
            }
            for stream in &page.items {
                let role = stream.role.map(|r| r.to_string()).unwrap_or_default();
                println!("{}  {}  {}", stream.id.cyan(), stream.name.bold(), role.dimmed());
            }
        }
        StreamAction::Get { id } => {
            let stream = client.stream_get(&id, 20, 1).await?;
            if format == OutputFormat::Json {
                return print_json(&stream);
            }
            println!("{} {}", stream.name.bold(), stream.id.cyan());
            if let Some(description) = &stream.description {
                println!("  {description}");
            }
            let visibility = if stream.is_public { "public" } else { "private" };
            println!("  Visibility: {visibility}");
            for collaborator in &stream.collaborators {
                println!("  {} {}", collaborator.name, collaborator.role.to_string().dimmed());
            }
            for branch in stream.branches.iter().flat_map(|page| page.items.iter()) {
                let latest = branch
                    .commits
                    .as_ref()
                    .and_then(|page| page.items.first())
                    .map(|c| format!("{} {}", c.id, c.message))
                    .unwrap_or_else(|| "no commits".into());
                println!("  {} {}", branch.name.yellow(), latest.dimmed());
            }
        }
        StreamAction::Delete { id } => {
            client.stream_delete(&id).await?;
            println!("Deleted stream {}", id.cyan());
        }
    }
    Ok(())
}

async fn cmd_branch(args: BranchArgs, config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let client = Client::new(config.account()?)?;
    match args.action {
        BranchAction::Create { stream, name, description } => {
            let input = BranchCreateInput {
                stream_id: stream,
                name: name.clone(),
                description,
            };
            client.branch_create(&input).await?;
            println!("Created branch {}", name.yellow());
        }
        BranchAction::List { stream } => {
            let page = client.branch_list(&stream, 100, None).await?;
            if format == OutputFormat::Json {
                return print_json(&page);
            }
            for branch in &page.items {
                println!("* {}", branch.name.green());
            }
        }
        BranchAction::Delete { stream, name } => {
            let branch = client.branch_get(&stream, &name, 1).await?;
            client
                .branch_delete(&BranchDeleteInput {
                    stream_id: stream,
                    id: branch.id,
                })
                .await?;
            println!("Deleted branch {}", name.yellow());
        }
    }
    Ok(())
}

async fn cmd_commit(args: CommitArgs, config: &CliConfig, format: OutputFormat) -> anyhow::Result<()> {
    let client = Client::new(config.account()?)?;
    match args.action {
        CommitAction::List { stream, limit } => {
            let page = client.commit_list(&stream, limit, None).await?;
            if format == OutputFormat::Json {
                return print_json(&page);
            }
            if page.items.is_empty() {
                println!("No commits.");
            }
            for commit in &page.items {
                println!(
                    "{} {} {} {}",
                    commit.id.yellow(),
                    commit.branch_name.green(),
                    commit.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    commit.message
                );
                println!("    object {} by {}", commit.referenced_object.short_hex(), commit.author_name);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlattenSummary {
    object_id: String,
    records: usize,
    nodes_visited: usize,
    total_bytes: usize,
    largest_record: usize,
}

fn flatten_file(path: &Path) -> anyhow::Result<FlattenSummary> {
    let ops = Operations::default();
    let root = read_graph(path, ops.registry())?;
    let (root_id, table) = ops.flatten(&root)?;
    Ok(FlattenSummary {
        object_id: root_id.to_hex(),
        records: table.len(),
        nodes_visited: table.stats().nodes_visited,
        total_bytes: table.total_bytes(),
        largest_record: table.largest_record(),
    })
}

fn cmd_flatten(args: FlattenArgs, format: OutputFormat) -> anyhow::Result<()> {
    let summary = flatten_file(&args.file)?;
    if format == OutputFormat::Json {
        return print_json(&summary);
    }
    println!("Object  {}", summary.object_id.cyan());
    println!("  Records: {}", summary.records.to_string().bold());
    println!("  Nodes visited: {}", summary.nodes_visited);
    println!("  Bytes: {} (largest record {})", summary.total_bytes, summary.largest_record);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use speckle_api::Account;

    use super::*;

    fn write_model(dir: &Path) -> PathBuf {
        let path = dir.join("model.json");
        let model = json!({
            "speckle_type": "Speckle.Core.Models.Collection",
            "name": "level 1",
            "elements": [
                { "speckle_type": "Objects.Geometry.Point", "x": 0.0, "y": 1.0, "z": 2.0 },
                { "speckle_type": "Objects.Geometry.Point", "x": 3.0, "y": 4.0, "z": 5.0 }
            ]
        });
        std::fs::write(&path, model.to_string()).unwrap();
        path
    }

    #[test]
    fn flatten_reports_records() {
        let dir = tempfile::tempdir().unwrap();
        let summary = flatten_file(&write_model(dir.path())).unwrap();
        assert!(summary.records >= 1);
        assert_eq!(summary.object_id.len(), 64);
        assert!(summary.largest_record <= summary.total_bytes);
    }

    #[test]
    fn unreadable_graphs_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = flatten_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn send_then_receive_through_a_local_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_config = ServerConfig::default().with_user("local", "Local User", "cli-token");
        tokio::spawn(SpeckleServer::new(server_config).serve_with_listener(listener));

        let client = Client::new(Account::new(format!("http://{addr}"), "cli-token")).unwrap();
        let stream = client
            .stream_create(&StreamCreateInput {
                name: "cli".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let model = write_model(dir.path());
        let cache = dir.path().join("cache");
        let ops = Operations::default();
        let root = read_graph(&model, ops.registry()).unwrap();
        let send = SendArgs {
            file: model,
            stream: stream.clone(),
            branch: "main".into(),
            message: "from the cli".into(),
            no_cache: false,
        };
        let token = CancellationToken::new();
        let (report, commit_id) = send_graph(&ops, &client, &root, &send, Some(&cache), &token)
            .await
            .unwrap();

        let receive = ReceiveArgs {
            stream,
            commit: None,
            branch: "main".into(),
            no_cache: false,
        };
        let (commit, received) = receive_commit(&ops, &client, &receive, Some(&cache), &token)
            .await
            .unwrap();
        assert_eq!(commit.id, commit_id);
        assert_eq!(commit.referenced_object, report.root_id);
        assert_eq!(commit.source_application.as_deref(), Some(SOURCE_APPLICATION));
        assert_eq!(received, root);
    }
}
