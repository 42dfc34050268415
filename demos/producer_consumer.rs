//! One producer and one consumer sharing a stack, each sleeping a random
//! delay between operations.
//!
//! `cargo run --example producer_consumer -- 20`

use popstack::Stack;
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let rounds: usize = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(20);

    let stack = Arc::new(Stack::new());

    let consumer = {
        let stack = stack.clone();
        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for _ in 0..rounds {
                let delay = rng.gen_range(1..=10);
                if let Some(v) = stack.pop() {
                    info!("stack -> {}", v);
                }
                thread::sleep(Duration::from_millis(delay * 10));
            }
        })
    };

    let producer = {
        let stack = stack.clone();
        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for _ in 0..rounds {
                let v: u64 = rng.gen_range(1..=10);
                stack.push(v);
                info!("stack <- {}", v);
                thread::sleep(Duration::from_millis(v * 10));
            }
        })
    };

    consumer.join().unwrap();
    producer.join().unwrap();

    let mut left = 0;
    while stack.pop().is_some() {
        left += 1;
    }
    info!(left, "done");
}
