// benches/dispatch_throughput.rs

use chatcore::{Broker, BrokerConfig, ChatError, Mailbox, Message, QueuePolicy};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

// --- Benchmarking Constants ---
const NUM_MESSAGES: usize = 1000;
const BENCH_INBOUND_CAPACITY: usize = 4096;
const BENCH_MAILBOX_CAPACITY: usize = NUM_MESSAGES;

// --- Setup Function ---
fn start_broker(users: usize) -> Result<(Broker, Vec<Mailbox>, JoinHandle<Result<(), ChatError>>), ChatError> {
  let config = BrokerConfig::default()
    .inbound_capacity(BENCH_INBOUND_CAPACITY)
    .full_queue_policy(QueuePolicy::Block);
  let broker = Broker::new(config)?;
  let mailboxes = (0..users)
    .map(|i| broker.register(&format!("user{}", i), BENCH_MAILBOX_CAPACITY))
    .collect::<Result<Vec<_>, _>>()?;
  let runner = {
    let broker = broker.clone();
    tokio::spawn(async move { broker.run().await })
  };
  Ok((broker, mailboxes, runner))
}

async fn drain(mailbox: &Mailbox, expected: usize) {
  for _ in 0..expected {
    match mailbox.recv().await {
      Ok(msg) => {
        black_box(msg.content());
      }
      Err(e) => panic!("[Receiver] {} failed after shutdown: {}", mailbox.user_id(), e),
    }
  }
}

// --- Benchmark Functions ---
fn direct_throughput(c: &mut Criterion) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let mut group = c.benchmark_group("Direct_Throughput");
  group.measurement_time(Duration::from_secs(5)).sample_size(20);
  group.throughput(Throughput::Elements(NUM_MESSAGES as u64));

  group.bench_function("one_to_one", |b| {
    b.to_async(&rt).iter_custom(|iters| async move {
      let mut total = Duration::ZERO;
      for _ in 0..iters {
        let (broker, mailboxes, runner) = start_broker(2).expect("Bench broker setup failed");
        let start = Instant::now();
        for i in 0..NUM_MESSAGES {
          let msg = Message::direct("user0", "user1", black_box(format!("payload {}", i)));
          broker.submit(msg).await.expect("submit failed");
        }
        drain(&mailboxes[1], NUM_MESSAGES).await;
        total += start.elapsed();

        broker.shutdown().await.expect("Broker shutdown failed");
        runner.await.expect("Dispatcher task panicked").expect("Dispatcher failed");
      }
      total
    });
  });
  group.finish();
}

fn broadcast_fanout(c: &mut Criterion) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let mut group = c.benchmark_group("Broadcast_Fanout");
  group.measurement_time(Duration::from_secs(5)).sample_size(20);

  for users in [1usize, 8, 64].iter() {
    group.throughput(Throughput::Elements((NUM_MESSAGES * users) as u64));
    group.bench_with_input(BenchmarkId::from_parameter(format!("{}users", users)), users, |b, &users| {
      b.to_async(&rt).iter_custom(|iters| async move {
        let mut total = Duration::ZERO;
        for _ in 0..iters {
          let (broker, mailboxes, runner) = start_broker(users).expect("Bench broker setup failed");
          let start = Instant::now();
          for i in 0..NUM_MESSAGES {
            broker
              .submit(Message::broadcast("user0", black_box(format!("payload {}", i))))
              .await
              .expect("submit failed");
          }
          for mailbox in &mailboxes {
            drain(mailbox, NUM_MESSAGES).await;
          }
          total += start.elapsed();

          broker.shutdown().await.expect("Broker shutdown failed");
          runner.await.expect("Dispatcher task panicked").expect("Dispatcher failed");
        }
        total
      });
    });
  }
  group.finish();
}

criterion_group!(benches, direct_throughput, broadcast_fanout);
criterion_main!(benches);
