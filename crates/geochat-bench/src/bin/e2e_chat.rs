//! End-to-end chat throughput benchmark for GeoChat.
//!
//! Connects N clients to a running server, puts them all in one channel and
//! counts the chat frames they receive while every client sends as fast as
//! it can.

use futures_util::{SinkExt, StreamExt};
use geochat_protocol::{codec, ClientFrame, ServerFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SERVER_URL: &str = "ws://127.0.0.1:8080/ws";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

// Somewhere in Lisbon; any shared coordinate works.
const LATITUDE: f64 = 38.7223;
const LONGITUDE: f64 = -9.1393;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("GeoChat end-to-end chat benchmark");
    println!("Make sure the server is running: cargo run --release --bin geochat");
    println!();

    run_chat_benchmark(num_clients).await;
}

async fn run_chat_benchmark(num_clients: usize) {
    println!("Chat benchmark: {} clients in one channel", num_clients);
    println!("  Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);

    let received = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let handles: Vec<_> = (0..num_clients)
        .map(|client_id| {
            let received = Arc::clone(&received);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                if let Err(e) = run_client(received, barrier).await {
                    eprintln!("Client {} error: {}", client_id, e);
                }
            })
        })
        .collect();

    barrier.wait().await;
    println!("All {} clients joined", num_clients);

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    received.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total = received.load(Ordering::SeqCst);
    let per_sec = total as f64 / elapsed.as_secs_f64();

    println!();
    println!("Results");
    println!("  Clients:            {:>10}", num_clients);
    println!("  Duration:           {:>10.2}s", elapsed.as_secs_f64());
    println!("  Frames delivered:   {:>10}", total);
    println!("  Throughput:         {:>10.0} frames/s", per_sec);
    println!(
        "  Per client:         {:>10.0} frames/s",
        per_sec / num_clients as f64
    );

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    received: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (ws, _) = connect_async(SERVER_URL).await?;
    let (mut sender, mut receiver) = ws.split();

    // connected
    receiver.next().await;

    let join = codec::encode_json(&ClientFrame::join_room(LATITUDE, LONGITUDE))?;
    sender.send(Message::Text(join)).await?;

    barrier.wait().await;

    let chat = Message::Text(codec::encode_json(&ClientFrame::chat_message("benchmark"))?);

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(Message::Text(text))) = receiver.next().await {
            if let Ok(ServerFrame::ChatMessage { .. }) = codec::decode_json::<ServerFrame>(&text) {
                received.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    while sender.send(chat.clone()).await.is_ok() {
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
