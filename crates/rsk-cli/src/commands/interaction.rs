//! Request-response, request-stream and fire-and-forget commands

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::channel::mpsc;
use futures::stream::{self, StreamExt};
use rsk_client::transport::transport_for_url;
use rsk_client::{PayloadStream, RSocketClient, ReconnectingClient};
use rsk_core::config::ClientConfig;
use rsk_core::traits::NoopResponder;
use rsk_core::RSocketError;
use rsk_protocol::Payload;

use super::payload::{build_payload, PayloadArgs};
use crate::output::{format_payload, print_info, print_warning};

async fn connect(url: &str, config: &ClientConfig) -> Result<RSocketClient> {
    let transport = transport_for_url(url)?;
    tracing::debug!("Connecting to {}", url);
    RSocketClient::connect(
        transport.as_ref(),
        config.connection.clone(),
        Arc::new(NoopResponder),
    )
    .await
    .with_context(|| format!("Failed to connect to {}", url))
}

/// Send one request and print the response
pub async fn request_command(config: &ClientConfig, args: &PayloadArgs) -> Result<()> {
    let url = args.resolve_url(config)?;
    let payload = build_payload(args)?;
    let client = connect(&url, config).await?;

    let result = client.request_response(payload).await;
    client.close().await;

    let response = result.context("Request failed")?;
    println!("{}", format_payload(&response));
    Ok(())
}

/// Send a fire-and-forget request
pub async fn fnf_command(config: &ClientConfig, args: &PayloadArgs) -> Result<()> {
    let url = args.resolve_url(config)?;
    let payload = build_payload(args)?;
    let client = connect(&url, config).await?;

    let result = client.request_fnf(payload);
    // Closing flushes the queued request
    client.close().await;
    result.context("Request failed")?;
    Ok(())
}

/// How many items a stream command asks for
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamLimits {
    /// Stop after this many items
    pub take: Option<usize>,
    /// Request items in batches of this size instead of all at once
    pub batch: Option<u32>,
}

/// Why a stream subscription ended
enum StreamEnd {
    Completed,
    Interrupted,
    Failed(RSocketError),
}

/// Request a stream and print its items as they arrive.
///
/// With reconnection enabled in the config file, the stream is requested
/// again on a fresh connection whenever the connection drops.
pub async fn stream_command(
    config: &ClientConfig,
    args: &PayloadArgs,
    limits: StreamLimits,
) -> Result<()> {
    let url = args.resolve_url(config)?;
    let payload = build_payload(args)?;

    if !config.reconnect.enabled {
        let client = connect(&url, config).await?;
        let mut received = 0;
        let end = consume(&client, payload, limits, &mut received).await;
        client.close().await;
        return match end {
            StreamEnd::Failed(err) => Err(err).context("Stream failed"),
            _ => Ok(()),
        };
    }

    let transport = transport_for_url(&url)?;
    let reconnecting = ReconnectingClient::spawn(
        transport,
        config.connection.clone(),
        Arc::new(NoopResponder),
        config.reconnect.delay,
    );
    let mut received = 0;
    let result = loop {
        let client = tokio::select! {
            client = reconnecting.connected() => client,
            _ = tokio::signal::ctrl_c() => break Ok(()),
        };
        let Some(client) = client else {
            break Err(anyhow::anyhow!("Gave up reconnecting to {}", url));
        };
        match consume(&client, payload.clone(), limits, &mut received).await {
            StreamEnd::Completed | StreamEnd::Interrupted => break Ok(()),
            StreamEnd::Failed(err) if err.is_connection_closed() => {
                print_warning(&format!("{}; resubscribing after reconnect", err));
            }
            StreamEnd::Failed(err) => break Err(err).context("Stream failed"),
        }
    };
    reconnecting.close().await;
    result
}

/// Start the stream; with batching, also return the handle granting more demand
fn subscribe(
    client: &RSocketClient,
    payload: Payload,
    limits: StreamLimits,
) -> (PayloadStream, Option<mpsc::UnboundedSender<u32>>) {
    match (limits.batch, limits.take) {
        (Some(batch), _) if batch > 0 => {
            let (demand, demand_rx) = mpsc::unbounded();
            let _ = demand.unbounded_send(batch);
            (client.request_stream_with_demand(payload, demand_rx), Some(demand))
        }
        (_, Some(take)) => {
            let initial = u32::try_from(take).unwrap_or(u32::MAX);
            (
                client.request_stream_with_demand(payload, stream::once(async move { initial })),
                None,
            )
        }
        _ => (client.request_stream(payload), None),
    }
}

async fn consume(
    client: &RSocketClient,
    payload: Payload,
    limits: StreamLimits,
    received: &mut usize,
) -> StreamEnd {
    let (mut items, demand) = subscribe(client, payload, limits);
    let mut in_batch = 0u32;

    loop {
        if limits.take.is_some_and(|take| *received >= take) {
            return StreamEnd::Completed;
        }
        let item = tokio::select! {
            item = items.next() => item,
            _ = tokio::signal::ctrl_c() => {
                print_info("Interrupted");
                return StreamEnd::Interrupted;
            }
        };
        match item {
            Some(Ok(payload)) => {
                println!("{}", format_payload(&payload));
                *received += 1;
                in_batch += 1;
                if let (Some(demand), Some(batch)) = (&demand, limits.batch) {
                    if in_batch == batch {
                        in_batch = 0;
                        let _ = demand.unbounded_send(batch);
                    }
                }
            }
            Some(Err(err)) => return StreamEnd::Failed(err),
            None => return StreamEnd::Completed,
        }
    }
}
