use std::collections::BTreeSet;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use werkbeleg::core::*;
use werkbeleg::store::{MemoryStore, NumberGenerator};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let store = MemoryStore::new();
    let config = EngineConfigBuilder::new().retry_backoff_ms(2).build();
    let numbers = NumberGenerator::new(Arc::new(store.clone()), &config);

    // The first ten commits hit a conflict and are retried
    store.fail_next_commits(10);

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let numbers = numbers.clone();
            tokio::spawn(async move { numbers.issue_number(DocumentType::Invoice, 2025).await })
        })
        .collect();

    let mut issued = BTreeSet::new();
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(number) => {
                issued.insert(number);
            }
            Err(e) => eprintln!("failed: {e}"),
        }
    }

    println!("{} distinct numbers issued", issued.len());
    if let (Some(first), Some(last)) = (issued.first(), issued.last()) {
        println!("first {first}, last {last}");
    }
}
