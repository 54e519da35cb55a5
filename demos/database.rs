//! Database pool example with a fake connector

use esox_resourcepool::{Connector, DbConfig, DbPool, FactoryError};
use std::collections::HashMap;

struct FakeMysql;

#[derive(Debug)]
struct Connection {
    dsn: String,
}

impl Connection {
    async fn select_sum(&self, a: i64, b: i64) -> i64 {
        a + b
    }
}

#[async_trait::async_trait]
impl Connector for FakeMysql {
    type Connection = Connection;

    async fn connect(&self, dsn: &str, username: &str, _password: &str) -> Result<Connection, FactoryError> {
        println!("   Connecting to {} as {}", dsn, username);
        Ok(Connection { dsn: dsn.to_string() })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== EsoxSolutions.ResourcePool - Database Pool ===\n");
    
    let config = DbConfig::new()
        .with_host("127.0.0.1")
        .with_port(3306)
        .with_dbname("test")
        .with_charset("utf8")
        .with_username("root")
        .with_password("root");
    println!("1. Config: {:?}", config);
    
    let pool = DbPool::with_size(config, FakeMysql, 4).unwrap();
    
    println!("\n2. Queries:");
    for (a, b) in [(1, 2), (40, 2)] {
        let conn = pool.acquire().await.unwrap();
        println!("   {} + {} = {} on {}", a, b, conn.select_sum(a, b).await, conn.dsn);
    }
    
    println!("\n3. Prometheus:");
    let mut tags = HashMap::new();
    tags.insert("service".to_string(), "orders".to_string());
    print!("{}", pool.export_metrics_prometheus("mysql", Some(&tags)));
}
