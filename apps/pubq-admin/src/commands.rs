use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use pubq_core::{MsgId, Score, Timestamp};
use pubq_node::{Broker, NewMessage};
use pubq_store::Store;
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish one message into a topic backlog
    Publish {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        publisher: String,
        /// Message payload (UTF-8)
        payload: String,
        /// Message identifier; generated when omitted
        #[arg(long)]
        id: Option<String>,
        /// Ordering score; defaults to the publish time in milliseconds
        #[arg(long)]
        score: Option<f64>,
        /// Lifetime such as "30m" or "2h"; defaults to the configured ttl
        #[arg(long, value_parser = parse_duration)]
        ttl: Option<Duration>,
    },
    /// Move a backlog batch into consumer queues
    Dispatch {
        #[arg(long)]
        topic: String,
        #[arg(long = "consumer", required = true)]
        consumers: Vec<String>,
    },
    /// Lease a batch of messages for a consumer
    Lease {
        #[arg(long)]
        consumer: String,
    },
    /// Hand leased messages back to the consumer queue
    Reject {
        #[arg(long)]
        consumer: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Acknowledge leased messages
    Ack {
        #[arg(long)]
        consumer: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete expired messages tracked for a consumer
    Sweep {
        #[arg(long)]
        consumer: String,
        /// Other consumers whose queues should drop the expired ids
        #[arg(long = "peer")]
        peers: Vec<String>,
    },
    /// Remove ids from a consumer queue and tracking list
    Purge {
        #[arg(long)]
        consumer: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Reject leases older than the lease timeout
    Reclaim {
        #[arg(long)]
        consumer: String,
        /// Overrides the configured lease timeout
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },
    /// Show broker state
    Inspect {
        #[command(subcommand)]
        target: InspectTarget,
    },
}

#[derive(Subcommand, Debug)]
pub enum InspectTarget {
    /// Body, expiry, and unacked count of one message
    Message { id: String },
    /// Queue, in-flight, and tracking sizes of one consumer
    Consumer { name: String },
    /// Backlog size and last publish time of one topic
    Topic { name: String },
    /// Last publish time of one producer
    Producer { name: String },
}

impl Commands {
    /// Whether the command changes broker state and needs a snapshot.
    pub fn mutates(&self) -> bool {
        !matches!(self, Commands::Inspect { .. })
    }
}

/// Settings the commands read beyond the broker config.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub now: DateTime<Utc>,
    pub lease_timeout: Duration,
    pub default_ttl: Duration,
}

fn parse_duration(raw: &str) -> Result<Duration, humantime_serde::re::humantime::DurationError> {
    humantime_serde::re::humantime::parse_duration(raw)
}

fn parse_ids(raw: &[String]) -> Result<Vec<MsgId>> {
    pubq_node::parse_ids(raw).context("invalid message id")
}

fn shift(now: DateTime<Utc>, by: Duration, forward: bool) -> Result<Timestamp> {
    let by = chrono::Duration::from_std(by).context("duration out of range")?;
    let at = if forward {
        now.checked_add_signed(by)
    } else {
        now.checked_sub_signed(by)
    };
    match at {
        Some(at) => Ok(Timestamp::from_datetime(at)),
        None => bail!("timestamp out of range"),
    }
}

fn show_ids(label: &str, ids: &[MsgId]) -> String {
    let joined: Vec<&str> = ids.iter().map(MsgId::as_str).collect();
    format!("{label} {}: {}", ids.len(), joined.join(" "))
}

/// Runs one command against `broker` and returns the lines to print.
pub fn execute<S: Store>(
    broker: &Broker<S>,
    command: &Commands,
    ctx: &CommandContext,
) -> Result<Vec<String>> {
    let now = Timestamp::from_datetime(ctx.now);
    let lines = match command {
        Commands::Publish {
            topic,
            publisher,
            payload,
            id,
            score,
            ttl,
        } => {
            let id = match id {
                Some(raw) => MsgId::parse(raw.as_str()).context("invalid message id")?,
                None => MsgId::generate(),
            };
            let score = score.unwrap_or(ctx.now.timestamp_millis() as f64);
            let message = NewMessage {
                id,
                score: Score(score),
                payload: payload.as_bytes().to_vec(),
                expire_at: shift(ctx.now, ttl.unwrap_or(ctx.default_ttl), true)?,
            };
            let expire_at = message.expire_at.clone();
            let id = broker.publish(topic, publisher, message, &now)?;
            vec![format!("published {id} to {topic} (expires {expire_at})")]
        }
        Commands::Dispatch { topic, consumers } => {
            let outcome = broker.dispatch(topic, consumers.as_slice())?;
            vec![
                show_ids("dispatched", &outcome.ids),
                format!("queue inserts: {}", outcome.pushes),
            ]
        }
        Commands::Lease { consumer } => broker
            .lease(consumer, &now)?
            .into_iter()
            .map(|leased| match leased.payload {
                Some(body) => format!("{}\t{}", leased.id, String::from_utf8_lossy(&body)),
                None => format!("{}\t<collected>", leased.id),
            })
            .collect(),
        Commands::Reject { consumer, ids } => {
            let requeued = broker.reject(consumer, &parse_ids(ids)?)?;
            vec![format!("requeued {requeued}")]
        }
        Commands::Ack { consumer, ids } => {
            let outcome = broker.ack(consumer, &parse_ids(ids)?)?;
            vec![
                show_ids("acked", &outcome.acked),
                show_ids("collected", &outcome.collected),
            ]
        }
        Commands::Sweep { consumer, peers } => {
            let expired = broker.sweep_and_propagate(consumer, peers.as_slice(), &now)?;
            vec![show_ids("expired", &expired)]
        }
        Commands::Purge { consumer, ids } => {
            let removed = broker.purge(consumer, &parse_ids(ids)?)?;
            vec![format!("removed {removed}")]
        }
        Commands::Reclaim { consumer, timeout } => {
            let cutoff = shift(ctx.now, timeout.unwrap_or(ctx.lease_timeout), false)?;
            let reclaimed = broker.reclaim(consumer, &cutoff)?;
            vec![show_ids("reclaimed", &reclaimed)]
        }
        Commands::Inspect { target } => inspect(broker, target)?,
    };
    Ok(lines)
}

fn inspect<S: Store>(broker: &Broker<S>, target: &InspectTarget) -> Result<Vec<String>> {
    let lines = match target {
        InspectTarget::Message { id } => {
            let record = broker.message(&MsgId::parse(id.as_str()).context("invalid message id")?)?;
            if record.is_collected() {
                vec![format!("{id}: collected")]
            } else {
                vec![
                    format!(
                        "body: {}",
                        record
                            .body
                            .as_deref()
                            .map(String::from_utf8_lossy)
                            .unwrap_or_default()
                    ),
                    format!(
                        "expire_at: {}",
                        record.expire_at.as_ref().map(Timestamp::as_str).unwrap_or("-")
                    ),
                    format!(
                        "unacked: {}",
                        record.unacked.map(|n| n.to_string()).unwrap_or_else(|| "-".into())
                    ),
                ]
            }
        }
        InspectTarget::Consumer { name } => {
            let depth = broker.depth(name)?;
            vec![format!(
                "queued {} in-flight {} tracked {}",
                depth.queued, depth.in_flight, depth.tracked
            )]
        }
        InspectTarget::Topic { name } => {
            let backlog = broker.backlog_len(name)?;
            let last = broker.topic_last_published(name)?;
            vec![format!(
                "backlog {backlog} last-publish {}",
                last.as_ref().map(Timestamp::as_str).unwrap_or("-")
            )]
        }
        InspectTarget::Producer { name } => {
            let last = broker.producer_last_seen(name)?;
            vec![format!(
                "last-seen {}",
                last.as_ref().map(Timestamp::as_str).unwrap_or("-")
            )]
        }
    };
    Ok(lines)
}
