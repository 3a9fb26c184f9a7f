#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::process::ExitCode;

use anyhow::Context;
use args::Args;
use clap::Parser;
use futures_util::StreamExt;
use http::{HeaderMap, HeaderValue};
use nexusgate_config::Config;
use nexusgate_core::{HttpError, PROVIDER_HEADER, REQUEST_ID_HEADER, RequestContext};
use nexusgate_llm::{Gateway, GatewayReply};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let outcome = tokio::select! {
        outcome = run(&args) => outcome,
        () = shutdown.cancelled() => Err(anyhow::anyhow!("interrupted")),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Serve the request; `Ok(false)` when the upstream rejected it
async fn run(args: &Args) -> anyhow::Result<bool> {
    let config = Config::load(&args.config)?;
    nexusgate_telemetry::init(&config.telemetry)?;

    tracing::debug!(config_path = %args.config.display(), format = args.format.as_str(), "starting nexusgate");

    let body = read_request(&args.request).await?;
    let gateway = Gateway::from_config(&config.llm)?;
    let ctx = RequestContext::new(context_headers(args)?);

    let reply = match gateway.handle(args.format.as_str(), body, &ctx).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!(error = %e, "request failed");
            eprintln!("{} {}", e.status_code(), e.error_body());
            return Ok(false);
        }
    };

    let mut stdout = tokio::io::stdout();

    match reply {
        GatewayReply::Json(value) => {
            let rendered = serde_json::to_string_pretty(&value)?;
            stdout.write_all(rendered.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        GatewayReply::Stream(mut frames) => {
            while let Some(frame) = frames.next().await {
                stdout.write_all(&frame).await?;
                stdout.flush().await?;
            }
        }
        GatewayReply::Upstream { status, body, .. } => {
            eprintln!("upstream returned {status}");
            stdout.write_all(&body).await?;
            stdout.flush().await?;
            return Ok(false);
        }
    }

    stdout.flush().await?;
    Ok(true)
}

async fn read_request(source: &str) -> anyhow::Result<serde_json::Value> {
    let raw = if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("failed to read request from stdin")?;
        raw
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("failed to read request file {source}"))?
    };

    serde_json::from_str(&raw).context("request is not valid JSON")
}

fn context_headers(args: &Args) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    if let Some(pin) = &args.provider {
        headers.insert(PROVIDER_HEADER, HeaderValue::from_str(pin).context("invalid provider pin")?);
    }
    if let Some(id) = &args.request_id {
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(id).context("invalid request id")?);
    }

    Ok(headers)
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::debug!("shutdown signal received");
}
