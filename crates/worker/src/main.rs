use std::io::Read;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rebate_core::cancel::CancellationToken;
use rebate_core::coordinator::RecommendationCoordinator;
use rebate_core::domain::context::RecommendationRequest;

#[derive(Debug, Parser)]
#[command(name = "rebate_worker")]
struct Args {
    /// Recommendation request JSON file, or `-` to read stdin.
    #[arg(long, required_unless_present = "providers")]
    request: Option<String>,

    /// Print the configured provider chain with live availability and exit.
    #[arg(long)]
    providers: bool,

    /// Skip the LLM chain and score deterministically for this run.
    #[arg(long)]
    disable_ai: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = rebate_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if args.disable_ai {
        settings.ai_enabled = false;
    }

    let coordinator = RecommendationCoordinator::from_settings(&settings)?;

    if args.providers {
        let providers = coordinator.describe_providers().await;
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(());
    }

    let source = args.request.as_deref().context("--request is required")?;
    let request = read_request(source)?;
    request.validate().context("invalid recommendation request")?;

    let ctx = coordinator.build_context(request);
    tracing::info!(
        customer = %ctx.customer.code,
        currency = %ctx.currency,
        as_of_date = %ctx.as_of_date,
        history = ctx.history.len(),
        "generating recommendation"
    );

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling recommendation");
            on_interrupt.cancel();
        }
    });

    match coordinator.generate_with_cancel(&ctx, &token).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(customer = %ctx.customer.code, error = %err, "recommendation run failed");
            Err(err)
        }
    }
}

fn read_request(source: &str) -> anyhow::Result<RecommendationRequest> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read request from stdin failed")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("read {source} failed"))?
    };
    serde_json::from_str(&raw).with_context(|| format!("parse request JSON from {source} failed"))
}

fn init_sentry(settings: &rebate_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
