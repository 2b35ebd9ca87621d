//! End-to-end load generator for Parlor.
//!
//! Connects a number of chat clients to a running server, has each of them
//! send messages in a loop, and reports how many `ReceiveMessage` events the
//! clients saw per second.
//!
//! ```bash
//! chat_load [clients] [url]
//! ```

use futures_util::{SinkExt, StreamExt};
use parlor_protocol::{codec, ClientFrame, ServerFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const DEFAULT_URL: &str = "ws://127.0.0.1:8080/chatHub";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;
const SEND_INTERVAL: Duration = Duration::from_millis(10);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let url = args.get(2).cloned().unwrap_or_else(|| DEFAULT_URL.to_string());

    println!("Parlor chat load: {num_clients} clients against {url}");
    println!("Warmup: {WARMUP_SECS}s, measurement: {BENCH_SECS}s");

    let received = Arc::new(AtomicU64::new(0));
    let sent = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let mut handles = Vec::new();
    for client_id in 0..num_clients {
        let received = Arc::clone(&received);
        let sent = Arc::clone(&sent);
        let barrier = Arc::clone(&barrier);
        let url = url.clone();

        handles.push(tokio::spawn(async move {
            if let Err(e) = run_client(client_id, &url, received, sent, barrier).await {
                eprintln!("Client {client_id} error: {e}");
            }
        }));
    }

    barrier.wait().await;
    println!("All {num_clients} clients joined");

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    received.store(0, Ordering::SeqCst);
    sent.store(0, Ordering::SeqCst);
    let start = Instant::now();

    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed().as_secs_f64();
    let received = received.load(Ordering::SeqCst);
    let sent = sent.load(Ordering::SeqCst);

    println!();
    println!("Clients:        {num_clients:>10}");
    println!("Duration:       {elapsed:>10.2}s");
    println!("Sent:           {sent:>10} ({:.0} msg/s)", sent as f64 / elapsed);
    println!("Delivered:      {received:>10} ({:.0} msg/s)", received as f64 / elapsed);

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    client_id: usize,
    url: &str,
    received: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let username = format!("load-{client_id}");
    let (ws, _) = connect_async(format!("{url}?username={username}")).await?;
    let (mut sender, mut receiver) = ws.split();

    // Wait until the join is acknowledged with a user list
    while let Some(message) = receiver.next().await {
        if let Message::Text(text) = message? {
            if let ServerFrame::UserListUpdated { .. } = codec::decode_text::<ServerFrame>(&text)? {
                break;
            }
        }
    }

    barrier.wait().await;

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Text(text) = message {
                if let Ok(ServerFrame::ReceiveMessage { .. }) = codec::decode_text::<ServerFrame>(&text) {
                    received.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    });

    let frame = codec::encode_text(&ClientFrame::send_message(&username, "load test message"))?;
    let mut interval = tokio::time::interval(SEND_INTERVAL);
    loop {
        interval.tick().await;
        if sender.send(Message::Text(frame.clone())).await.is_err() {
            break;
        }
        sent.fetch_add(1, Ordering::Relaxed);
    }

    recv_task.abort();
    Ok(())
}
