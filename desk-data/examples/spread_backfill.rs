use chrono::{TimeDelta, Utc};
use desk_data::{
    SeriesEngine, SeriesOutput,
    config::SupabaseConfig,
    sample::{Sample, SourceId},
    store::{RangeQuery, memory::InMemoryStore, supabase::SupabaseStore},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Hours of history to backfill.
const HOURS: f64 = 6.0;

#[tokio::main]
async fn main() {
    // Initialise INFO Tracing log subscriber
    init_logging();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    // Read from Supabase when credentials are configured, otherwise from synthetic ticks
    let store: Arc<dyn RangeQuery> = match SupabaseConfig::from_env().and_then(SupabaseStore::new)
    {
        Ok(store) => {
            info!("backfilling from Supabase");
            Arc::new(store)
        }
        Err(error) => {
            warn!(%error, "Supabase not configured, backfilling synthetic ticks");
            Arc::new(synthetic_store())
        }
    };

    let engine = SeriesEngine::new(store);
    let bitkub = SourceId::from(SourceId::BITKUB);
    let maxbit = SourceId::from(SourceId::MAXBIT);
    let sources = [
        bitkub.clone(),
        SourceId::from(SourceId::BINANCE_TH),
        maxbit.clone(),
        SourceId::from(SourceId::FX),
    ];

    let spread = engine.get_spread(&bitkub, &maxbit, HOURS, &cancel).await;
    print_output("Spread bitkub - maxbit", &spread);

    let comparison = engine.get_comparison(&sources, HOURS, &cancel).await;
    print_output("Comparison", &comparison);
}

fn print_output<Point: Serialize>(title: &str, output: &SeriesOutput<Point>) {
    println!("\n═══ {title} ({} buckets, {} points) ═══", output.resolution, output.points.len());

    for report in &output.reports {
        println!(
            "  {:<12} fetched={:<6} pages={:<4} end={:?}",
            report.selector, report.fetched, report.pages, report.end
        );
    }
    if output.is_partial() {
        println!("  ⚠ partial result");
    }

    for point in output.points.iter().rev().take(5).rev() {
        match serde_json::to_string(point) {
            Ok(json) => println!("  {json}"),
            Err(error) => warn!(%error, "failed to serialise point"),
        }
    }
}

/// Ticks every 20s per source over the backfill window, with sources drifting around 35 THB.
fn synthetic_store() -> InMemoryStore {
    let now = Utc::now();
    let ticks = (HOURS * 180.0) as i64;

    let feeds: [(&str, Decimal, i64); 4] = [
        (SourceId::BITKUB, dec!(35.20), 0),
        (SourceId::BINANCE_TH, dec!(35.18), 5),
        (SourceId::MAXBIT, dec!(35.05), 10),
        (SourceId::FX, dec!(35.00), 15),
    ];

    InMemoryStore::with_samples(feeds.into_iter().flat_map(|(source, base, offset)| {
        (0..ticks).map(move |tick| {
            let drift = Decimal::new((tick * 7 + offset) % 41 - 20, 3);
            Sample::new(
                now - TimeDelta::seconds(tick * 20 + offset),
                SourceId::from(source),
                base + drift,
            )
        })
    }))
}

fn init_logging() {
    tracing_subscriber::fmt()
        // Filter messages based on the INFO level
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        // Use colored output in debug mode
        .with_ansi(cfg!(debug_assertions))
        // Install this Tracing subscriber as global default
        .init()
}
