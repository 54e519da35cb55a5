//! Basic usage examples for Pool

use esox_resourcepool::{FactoryError, Pool, PoolConfiguration};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== EsoxSolutions.ResourcePool - Basic Examples ===\n");
    
    // Example 1: Automatic return
    simple_pool().await;
    
    // Example 2: Manual leases
    manual_leases().await;
    
    // Example 3: Discarding broken resources
    discard_broken().await;
    
    // Example 4: Metrics
    metrics().await;
}

fn numbered_pool(capacity: usize) -> Pool<usize> {
    let next = Arc::new(AtomicUsize::new(1));
    Pool::new(
        move || {
            let next = Arc::clone(&next);
            async move { Ok::<_, FactoryError>(next.fetch_add(1, Ordering::Relaxed)) }
        },
        PoolConfiguration::new().with_max_pool_size(capacity),
    )
    .unwrap()
}

async fn simple_pool() {
    println!("1. Simple Pool:");
    let pool = numbered_pool(3);
    
    {
        let obj = pool.acquire().await.unwrap();
        println!("   Got resource: {}", obj);
        // Resource automatically returned when dropped
    }
    
    println!("   Idle after return: {}\n", pool.idle_count());
}

async fn manual_leases() {
    println!("2. Manual Leases:");
    let pool = numbered_pool(3);
    
    let lease = pool.lease().await.unwrap();
    println!("   Leased {} ({})", *lease, lease.id());
    
    pool.release(lease).unwrap();
    println!("   Released, idle: {}", pool.idle_count());

    // A lease handed to the wrong pool is rejected
    let other = numbered_pool(1);
    let lease = pool.lease().await.unwrap();
    match other.release(lease) {
        Ok(()) => println!("   Released to the wrong pool?"),
        Err(e) => println!("   Wrong pool: {}", e),
    }

    // A lease dropped without release is discarded, freeing its slot
    {
        let _forgotten = pool.lease().await.unwrap();
    }
    println!("   Created after a dropped lease: {}", pool.created_count());
    println!();
}

async fn discard_broken() {
    println!("3. Discarding Broken Resources:");
    let pool = numbered_pool(1);
    
    let conn = pool.acquire().await.unwrap();
    println!("   Resource {} is broken, discarding", conn);
    conn.discard().unwrap();
    
    let fresh = pool.acquire().await.unwrap();
    println!("   Replacement: {}\n", fresh);
}

async fn metrics() {
    println!("4. Metrics:");
    let pool = numbered_pool(5);
    pool.warmup(2).await.unwrap();
    
    {
        let _obj1 = pool.acquire().await.unwrap();
        let _obj2 = pool.acquire().await.unwrap();
        let metrics = pool.get_metrics();
        println!("   Utilization: {:.1}%", metrics.utilization * 100.0);
        println!("   Outstanding: {}, Idle: {}", metrics.outstanding_resources, metrics.idle_resources);
    }
    
    let mut metrics: Vec<_> = pool.export_metrics().into_iter().collect();
    metrics.sort();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
}
