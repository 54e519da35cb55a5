//! Async usage examples

use esox_resourcepool::{FactoryError, Pool, PoolConfiguration};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== EsoxSolutions.ResourcePool - Async Examples ===\n");
    
    // Example 1: Acquire with timeout
    acquire_with_timeout().await;
    
    // Example 2: Warmup
    warmup().await;
    
    // Example 3: Concurrent access
    concurrent_access().await;
    
    // Example 4: Closing
    closing().await;
}

fn slow_pool(capacity: usize) -> Pool<&'static str> {
    Pool::new(
        || async {
            println!("   Creating new resource...");
            sleep(Duration::from_millis(5)).await;
            Ok::<_, FactoryError>("resource")
        },
        PoolConfiguration::new().with_max_pool_size(capacity),
    )
    .unwrap()
}

async fn acquire_with_timeout() {
    println!("1. Acquire with Timeout:");
    let pool = slow_pool(1);
    
    // Take the only resource
    let _obj = pool.acquire().await.unwrap();
    
    // Try to get another (should time out)
    match pool.acquire_timeout(Duration::from_millis(100)).await {
        Ok(_) => println!("   Got resource"),
        Err(e) => println!("   Error: {}", e),
    }
    
    println!();
}

async fn warmup() {
    println!("2. Warmup:");
    let pool = slow_pool(10);
    
    println!("   Warming up pool with 5 resources...");
    let created = pool.warmup(5).await.unwrap();
    println!("   Created {}, idle {}", created, pool.idle_count());
    
    // Should not create a new one
    {
        let obj = pool.acquire().await.unwrap();
        println!("   Got pre-created resource: {}", obj);
    }
    
    println!();
}

async fn concurrent_access() {
    println!("3. Concurrent Access:");
    let pool = slow_pool(3);
    
    let mut handles = vec![];
    
    for i in 0..10 {
        let pool = pool.clone();
        let handle = tokio::spawn(async move {
            let obj = pool.acquire().await.unwrap();
            println!("   Task {} got {} ({})", i, *obj, obj.id());
            sleep(Duration::from_millis(20)).await;
        });
        handles.push(handle);
    }
    
    for handle in handles {
        handle.await.unwrap();
    }
    
    println!("   Created: {}, idle: {}\n", pool.created_count(), pool.idle_count());
}

async fn closing() {
    println!("4. Closing:");
    let pool = slow_pool(1);
    let held = pool.acquire().await.unwrap();
    
    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire().await.map(|_| ()) }
    });
    tokio::task::yield_now().await;
    
    pool.close();
    println!("   Waiter: {:?}", waiter.await.unwrap());
    
    drop(held);
    println!("   Created after last return: {}", pool.created_count());
}
