// EsoxSolutions.ResourcePool
// Runs 10 000 tasks against a database pool backed by an in-memory connector.
// Run the usage examples with: cargo run --example basic

use esox_resourcepool::{Connector, DbConfig, DbPool, FactoryError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

const TASKS: usize = 10_000;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

struct InMemory {
    opened: AtomicUsize,
}

struct Session {
    id: usize,
}

impl Session {
    async fn add(&self, a: u32, b: u32) -> u32 {
        tokio::task::yield_now().await;
        a + b
    }
}

#[async_trait::async_trait]
impl Connector for InMemory {
    type Connection = Session;

    async fn connect(&self, _dsn: &str, _user: &str, _password: &str) -> Result<Session, FactoryError> {
        Ok(Session {
            id: self.opened.fetch_add(1, Ordering::Relaxed),
        })
    }
}

async fn query(pool: DbPool<Session>, n: usize) -> Result<usize, BoxError> {
    let session = pool.acquire().await?;
    let (a, b) = ((n % 100) as u32, (n % 7) as u32);
    if session.add(a, b).await != a + b {
        return Err("bad result".into());
    }
    Ok(session.id)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BoxError> {
    let config = DbConfig::new()
        .with_host("127.0.0.1")
        .with_port(3306)
        .with_dbname("test")
        .with_charset("utf8")
        .with_username("root")
        .with_password("root");
    let pool = DbPool::new(config, InMemory { opened: AtomicUsize::new(0) })?;

    let started = Instant::now();
    let tasks: Vec<_> = (0..TASKS)
        .map(|n| tokio::spawn(query(pool.clone(), n)))
        .collect();

    let mut sessions = HashSet::new();
    for task in tasks {
        sessions.insert(task.await??);
    }

    println!(
        "Used {:?} for {} queries over {} connections",
        started.elapsed(),
        TASKS,
        sessions.len()
    );
    println!("{:#?}", pool.get_metrics());
    Ok(())
}
