use std::time::{Duration, Instant};

use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::store::{keys, scan_prefix, KvStore, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: u32,
    pub failed: u32,
    pub elapsed: Duration,
}

/// Outbound text delivery, factored out so the fan-out loop can be tested
/// without a live bot.
pub trait TextSender {
    fn send_text(
        &self,
        chat_id: i64,
        text: &str,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

impl TextSender for Bot {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true)
            .await?;
        Ok(())
    }
}

/// Fans a message out to every known user, one send at a time. Failures are
/// counted, never retried, and never abort the run.
pub async fn run_broadcast<S: TextSender + Sync>(
    sender: &S,
    store: &dyn KvStore,
    text: &str,
) -> BroadcastReport {
    let start = Instant::now();
    let mut sent = 0;
    let mut failed = 0;

    for key in scan_prefix(store, keys::USER_PREFIX) {
        let user_id = match keys::user_id_from_key(&key) {
            Some(id) => id,
            None => continue,
        };
        match sender.send_text(user_id as i64, text).await {
            Ok(()) => sent += 1,
            Err(e) => {
                tracing::warn!("Broadcast to {} failed: {}", user_id, e);
                failed += 1;
            }
        }
    }

    BroadcastReport {
        sent,
        failed,
        elapsed: start.elapsed(),
    }
}

/// Detaches the broadcast from the triggering update so the admin gets an
/// immediate acknowledgment; the summary lands in their chat when the run
/// completes. Once started, the task runs to completion.
pub fn spawn_broadcast(bot: Bot, store: Store, text: String, report_chat_id: i64) {
    tokio::spawn(async move {
        let report = run_broadcast(&bot, store.as_ref(), &text).await;
        tracing::info!(
            "Broadcast finished: sent={} failed={} elapsed={}s",
            report.sent,
            report.failed,
            report.elapsed.as_secs()
        );
        let summary = format!(
            "Broadcast done. Sent: {}, Failed: {}, Time: {}s",
            report.sent,
            report.failed,
            report.elapsed.as_secs()
        );
        if let Err(e) = bot.send_message(ChatId(report_chat_id), summary).await {
            tracing::error!("Failed to deliver broadcast summary: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeSender {
        fail_for: HashSet<i64>,
        delivered: Mutex<Vec<i64>>,
    }

    impl FakeSender {
        fn failing_for(ids: &[i64]) -> Self {
            FakeSender {
                fail_for: ids.iter().copied().collect(),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextSender for FakeSender {
        async fn send_text(&self, chat_id: i64, _text: &str) -> anyhow::Result<()> {
            if self.fail_for.contains(&chat_id) {
                anyhow::bail!("blocked");
            }
            self.delivered.lock().unwrap().push(chat_id);
            Ok(())
        }
    }

    fn store_with_users(ids: &[u64]) -> MemoryStore {
        let store = MemoryStore::new();
        for id in ids {
            store.put(&keys::user_key(*id), "1").unwrap();
        }
        store
    }

    #[tokio::test]
    async fn counts_successes_and_failures_without_aborting() {
        let store = store_with_users(&[1, 2, 3, 4, 5]);
        let sender = FakeSender::failing_for(&[2, 4]);

        let report = run_broadcast(&sender, &store, "hello").await;
        assert_eq!(report.sent, 3);
        assert_eq!(report.failed, 2);

        let delivered = sender.delivered.lock().unwrap();
        assert_eq!(delivered.as_slice(), &[1, 3, 5]);
    }

    #[tokio::test]
    async fn empty_user_set_reports_zeroes() {
        let store = MemoryStore::new();
        let sender = FakeSender::failing_for(&[]);
        let report = run_broadcast(&sender, &store, "hello").await;
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 0);
    }
}
