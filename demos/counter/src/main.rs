//! Counter example binary
//!
//! Demonstrates the Uniflow effect runtime with a counter: plain actions, a
//! delayed increment, a cancellable ticker and a debounced save.

use counter::{CounterAction, CounterEnvironment, CounterReducer, initial_state};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uniflow_core::environment::SystemClock;
use uniflow_runtime::metrics::MetricsRecorder;
use uniflow_runtime::{Store, StoreConfig, TracingDiagnostics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,uniflow_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsRecorder::new();
    if let Err(error) = metrics.install() {
        tracing::warn!(%error, "Running without metrics");
    }

    println!("=== Counter Example: Uniflow ===\n");

    let mut env = CounterEnvironment::new(SystemClock);
    env.tick_period = Duration::from_millis(200);
    env.save_delay = Duration::from_millis(100);

    let config = StoreConfig::default().with_diagnostics(Arc::new(TracingDiagnostics));
    let store = Store::with_config(initial_state(), CounterReducer::new(), env, config);

    println!("Initial count: {}", store.state(|s| s.count)?);

    println!("\n>>> Sending: Increment, Increment, Decrement");
    let _ = store.send(CounterAction::Increment);
    let _ = store.send(CounterAction::Increment);
    let _ = store.send(CounterAction::Decrement);
    println!("Count: {}", store.state(|s| s.count)?);

    println!("\n>>> Sending: IncrementLater(50ms)");
    store
        .send_and_wait(CounterAction::IncrementLater(Duration::from_millis(50)))
        .await?;
    println!("Count after delay: {}", store.state(|s| s.count)?);

    println!("\n>>> Sending: StartTicking {{ ticks: 10 }}, stopping after ~650ms");
    let _ = store.send(CounterAction::StartTicking { ticks: 10 });
    tokio::time::sleep(Duration::from_millis(650)).await;
    let _ = store.send(CounterAction::StopTicking);
    let ticks = store.reducer_state(|p| p.ticks)?;
    println!("Ticks received: {ticks}, count: {}", store.state(|s| s.count)?);

    println!("\n>>> Sending: Save x3 (debounced)");
    for _ in 0..3 {
        let _ = store.send(CounterAction::Save);
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    let saved = store.with_container(|c| c.get("last_saved"))??;
    println!("last_saved via field table: {saved}");

    println!("\n>>> Sending: Reset");
    let _ = store.send(CounterAction::Reset);
    println!("Count after Reset: {}", store.state(|s| s.count)?);

    store.shutdown(Duration::from_secs(5)).await?;

    if let Some(rendered) = metrics.render() {
        println!("\n=== Metrics ===\n{rendered}");
    }

    Ok(())
}
