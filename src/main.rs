//! CLI binary for reading Kinesis streams.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kinesis_reader::monitoring::{MetricsAggregator, MonitoringConfig};
use kinesis_reader::{
    parse_timestamp, Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
    IteratorStatus, KinesisClientTrait, OutputFormat, ReaderConfig, RetryConfig, ShardClient,
    StreamReader, WriteMode, WriterSink,
};

#[derive(Parser)]
#[command(name = "kinesis-reader")]
#[command(about = "Read records from AWS Kinesis streams with resumable checkpoints")]
struct Cli {
    #[command(flatten)]
    aws: AwsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct AwsArgs {
    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Named profile from the shared AWS config
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Override the Kinesis endpoint (for local emulators)
    #[arg(long, global = true, env = "KINESIS_READER_ENDPOINT_URL")]
    endpoint_url: Option<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CheckpointMode {
    Append,
    Replace,
}

impl From<CheckpointMode> for WriteMode {
    fn from(mode: CheckpointMode) -> Self {
        match mode {
            CheckpointMode::Append => WriteMode::Append,
            CheckpointMode::Replace => WriteMode::Replace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Read records from a stream to stdout
    Read {
        /// Stream name
        stream: String,

        /// Read only these shards (repeatable); defaults to every shard
        #[arg(long = "shard")]
        shards: Vec<String>,

        /// Start time for shards without a checkpoint (e.g. -15m, 2024-03-01, RFC 3339)
        #[arg(long)]
        since: Option<String>,

        /// Stop at records that arrived after this time
        #[arg(long)]
        until: Option<String>,

        /// Output format: raw, text, base64, hex or json
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// JSON lines file to resume from and record progress in
        #[arg(long)]
        checkpoint_file: Option<PathBuf>,

        /// How checkpoints are written to the checkpoint file
        #[arg(long, value_enum, default_value = "append")]
        checkpoint_mode: CheckpointMode,

        /// Maximum number of shards read at once
        #[arg(long)]
        max_concurrent_shards: Option<u32>,

        /// Retries per request before giving up on a shard
        #[arg(long, default_value = "10")]
        max_retries: u32,

        /// Keep polling after reaching the tip of the stream
        #[arg(long)]
        follow: bool,

        /// Log per-shard statistics when done
        #[arg(long)]
        stats: bool,
    },

    /// List the shards of a stream
    ListShards {
        /// Stream name
        stream: String,
    },

    /// Check whether a shard position is readable and how far behind it is
    CheckIterator {
        /// Stream name
        stream: String,

        /// Shard ID
        shard: String,

        /// Position right after this sequence number
        #[arg(long, conflicts_with = "since")]
        sequence_number: Option<String>,

        /// Position at this time
        #[arg(long)]
        since: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries records, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kinesis_reader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = build_client(&cli.aws).await;

    match cli.command {
        Commands::Read {
            stream,
            shards,
            since,
            until,
            format,
            checkpoint_file,
            checkpoint_mode,
            max_concurrent_shards,
            max_retries,
            follow,
            stats,
        } => {
            let now = Utc::now();
            let config = ReaderConfig {
                stream_name: stream,
                shard_ids: shards,
                since: since.map(|s| parse_timestamp(&s, now)).transpose()?,
                until: until.map(|s| parse_timestamp(&s, now)).transpose()?,
                retry: RetryConfig {
                    max_retries,
                    ..Default::default()
                },
                max_concurrent_shards,
                follow,
                monitoring: MonitoringConfig {
                    enabled: stats,
                    ..Default::default()
                },
                ..Default::default()
            };

            match checkpoint_file {
                Some(path) => {
                    let store = FileCheckpointStore::new(path, checkpoint_mode.into());
                    read_stream(client, store, config, format).await?;
                }
                None => read_stream(client, InMemoryCheckpointStore::new(), config, format).await?,
            }
        }
        Commands::ListShards { stream } => {
            list_shards(&client, &stream).await?;
        }
        Commands::CheckIterator {
            stream,
            shard,
            sequence_number,
            since,
        } => {
            let checkpoint = match (sequence_number, since) {
                (Some(sequence), _) => Checkpoint::after_sequence_number(sequence),
                (None, Some(since)) => Checkpoint::at_timestamp(parse_timestamp(&since, Utc::now())?),
                (None, None) => Checkpoint::start_of_shard(),
            };
            check_iterator(client, &stream, &shard, &checkpoint).await?;
        }
    }

    Ok(())
}

async fn build_client(args: &AwsArgs) -> aws_sdk_kinesis::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &args.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    if let Some(profile) = &args.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint) = &args.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;
    aws_sdk_kinesis::Client::new(&sdk_config)
}

async fn read_stream<S: CheckpointStore + 'static>(
    client: aws_sdk_kinesis::Client,
    store: S,
    config: ReaderConfig,
    format: OutputFormat,
) -> Result<()> {
    let (reader, monitoring_rx) = StreamReader::new(config, client, store);
    let aggregator = monitoring_rx.map(|rx| tokio::spawn(MetricsAggregator::new().run(rx)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, finishing current batches");
            let _ = shutdown_tx.send(true);
        }
    });

    let sink = Arc::new(WriterSink::new(BufWriter::new(std::io::stdout()), format));
    let summary = reader.run(sink, shutdown_rx).await?;

    // the aggregator finishes once the reader's event senders are gone
    drop(reader);
    if let Some(handle) = aggregator {
        handle.await.context("Metrics aggregator failed")?.emit_metrics();
    }

    let failed: Vec<_> = summary.failed().collect();
    if !failed.is_empty() {
        for (shard_id, error) in &failed {
            tracing::error!(shard_id = %shard_id, error = %error, "Shard did not complete");
        }
        anyhow::bail!("{} of {} shard(s) failed", failed.len(), summary.shards.len());
    }
    Ok(())
}

async fn list_shards(client: &aws_sdk_kinesis::Client, stream: &str) -> Result<()> {
    // the SDK client has an inherent `list_shards` builder method
    let shards = KinesisClientTrait::list_shards(client, stream).await?;
    for shard in shards {
        println!(
            "{}\t{}",
            shard.shard_id(),
            shard.parent_shard_id().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn check_iterator(
    client: aws_sdk_kinesis::Client,
    stream: &str,
    shard: &str,
    checkpoint: &Checkpoint,
) -> Result<()> {
    let shard_client = ShardClient::new(
        Arc::new(client),
        stream,
        shard,
        Arc::default(),
        RetryConfig::default(),
    );

    match shard_client.check_iterator(checkpoint).await? {
        IteratorStatus::Valid {
            millis_behind_latest,
        } => println!("valid\t{}ms behind latest", millis_behind_latest),
        IteratorStatus::Invalid { reason } => println!("invalid\t{}", reason),
    }
    Ok(())
}
