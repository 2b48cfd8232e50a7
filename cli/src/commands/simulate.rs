use crate::cli::SimulateArgs;
use anyhow::{bail, Context, Result};
use chatcore::{Broker, BrokerConfig, ChatError, Mailbox, Message, User, UserManager};
use rand::Rng;
use std::time::Instant;

/// One user's planned outgoing traffic, generated up front so the sender
/// tasks never hold an RNG across an await.
fn plan_messages(sender: &str, user_ids: &[String], count: usize, broadcast_percent: u8) -> Vec<Message> {
  let mut rng = rand::rng();
  let others: Vec<&String> = user_ids.iter().filter(|id| id.as_str() != sender).collect();
  (0..count)
    .map(|seq| {
      let content = format!("{} #{}", sender, seq);
      if others.is_empty() || rng.random_range(0..100u8) < broadcast_percent {
        Message::broadcast(sender, content)
      } else {
        let recipient = others[rng.random_range(0..others.len())];
        Message::direct(sender, recipient.as_str(), content)
      }
    })
    .collect()
}

async fn read_until_closed(mailbox: Mailbox) -> (String, u64) {
  let mut received = 0u64;
  loop {
    match mailbox.recv().await {
      Ok(_) => received += 1,
      Err(ChatError::BrokerClosed) => break,
      Err(e) => {
        tracing::warn!(user_id = %mailbox.user_id(), error = %e, "Reader stopped on unexpected error");
        break;
      }
    }
  }
  (mailbox.user_id().to_string(), received)
}

pub async fn run_simulation(args: SimulateArgs) -> Result<()> {
  if args.users == 0 {
    bail!("--users must be at least 1");
  }
  if args.idle_readers > args.users {
    bail!("--idle-readers ({}) cannot exceed --users ({})", args.idle_readers, args.users);
  }

  let config = BrokerConfig::default()
    .inbound_capacity(args.inbound_capacity)
    .mailbox_capacity(args.mailbox_capacity)
    .full_queue_policy(args.queue_policy)
    .full_mailbox_policy(args.mailbox_policy)
    .drain_policy(args.drain_policy);
  let broker = Broker::new(config).context("Invalid broker configuration")?;

  let directory = UserManager::with_cancellation(broker.cancellation_token());
  for i in 0..args.users {
    directory
      .add_user(User::new(format!("user{}", i), format!("User {}", i), format!("user{}@chat.example", i)))
      .with_context(|| format!("Failed to add user{} to the directory", i))?;
  }
  let user_ids: Vec<String> = directory.list().into_iter().map(|u| u.id).collect();

  let dispatcher = {
    let broker = broker.clone();
    tokio::spawn(async move { broker.run().await })
  };

  let mut readers = Vec::new();
  let mut idle = Vec::new();
  for (i, user_id) in user_ids.iter().enumerate() {
    let mailbox = broker.register_default(user_id)?;
    if i < args.idle_readers {
      idle.push(mailbox);
    } else {
      readers.push(tokio::spawn(read_until_closed(mailbox)));
    }
  }

  println!(
    "Simulating {} users x {} messages (broadcast {}%, mailbox policy {})",
    args.users, args.messages, args.broadcast_percent, args.mailbox_policy
  );
  let start = Instant::now();

  let senders: Vec<_> = user_ids
    .iter()
    .map(|user_id| {
      let plan = plan_messages(user_id, &user_ids, args.messages, args.broadcast_percent);
      let broker = broker.clone();
      tokio::spawn(async move {
        let mut rejected = 0u64;
        for msg in plan {
          match broker.submit(msg).await {
            Ok(()) => {}
            Err(ChatError::QueueFull) => rejected += 1,
            Err(e) if e.is_terminal() => break,
            Err(e) => return Err(e),
          }
        }
        Ok(rejected)
      })
    })
    .collect();

  let mut rejected = 0u64;
  tokio::select! {
    _ = tokio::signal::ctrl_c() => {
      println!("Interrupted, cancelling broker");
      broker.cancel();
    }
    _ = async {
      for sender in senders {
        match sender.await {
          Ok(Ok(count)) => rejected += count,
          Ok(Err(e)) => tracing::warn!(error = %e, "Sender failed"),
          Err(e) => tracing::warn!(error = %e, "Sender task panicked"),
        }
      }
    } => {}
  }

  broker.shutdown().await?;
  dispatcher.await.context("Dispatcher task panicked")??;
  let elapsed = start.elapsed();

  let mut per_user = Vec::new();
  for reader in readers {
    per_user.push(reader.await.context("Reader task panicked")?);
  }
  for mailbox in &idle {
    per_user.push((format!("{} (idle)", mailbox.user_id()), mailbox.len() as u64));
  }

  let stats = broker.stats();
  println!("Finished in {:?}", elapsed);
  println!(
    "submitted={} dispatched={} delivered={} dropped={} undeliverable={} discarded={} rejected={}",
    stats.submitted, stats.dispatched, stats.delivered, stats.dropped, stats.undeliverable, stats.discarded, rejected
  );
  for (user_id, received) in per_user {
    println!("  {:<16} received {}", user_id, received);
  }
  Ok(())
}
