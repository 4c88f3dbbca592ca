//! Activity service: the one entry point the transport layer calls.
//!
//! Composes the quota ledger and the history log behind atomic per-user
//! operations. All mutations to one user's record happen under that user's
//! lock; requests from different users only meet at the shared durable write.
//!
//! `submit` is two-phase: the quota is consumed on attempt, and the history
//! entry is written when the caller completes the pending interaction with
//! the generated response. An accepted request that is never completed still
//! counts against the quota but leaves no history entry; this is intentional,
//! so history only ever holds finished exchanges.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::{
    clock::ClockPolicy,
    domain::{truncate_text, Interaction, UserId, UserRecord},
    history,
    ledger::{self, QuotaDecision},
    store::Store,
    Result,
};

/// Caller-owned bounds applied to every record mutation.
#[derive(Clone, Copy, Debug)]
pub struct ActivityLimits {
    pub history_capacity: usize,
    pub max_prompt_len: usize,
    pub max_summary_len: usize,
}

/// Outcome of a submit call. Storage failures surface as `Err`, never as a
/// rejection.
pub enum Submission {
    Accepted {
        remaining: u32,
        pending: PendingInteraction,
    },
    Rejected {
        retry_after: Duration,
    },
}

/// Read-only snapshot of one user's counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserStats {
    pub request_count: u32,
    pub remaining: u32,
    pub total_requests_lifetime: u64,
    pub count_date: NaiveDate,
}

/// Phase two of an accepted submit: hand back the generated response so the
/// finished exchange lands in history. Dropping this without completing is
/// allowed (see module docs).
pub struct PendingInteraction {
    inner: Arc<ActivityInner>,
    user_id: UserId,
    prompt: String,
    accepted_at: String,
}

impl PendingInteraction {
    pub async fn complete(self, response_summary: &str) -> Result<()> {
        let lock = self.inner.user_lock(self.user_id).await;
        let _guard = lock.lock().await;

        let mut record = self
            .inner
            .record_or_new(self.user_id)
            .await;

        let interaction = Interaction {
            timestamp: self.accepted_at,
            prompt: self.prompt,
            response_summary: truncate_text(response_summary, self.inner.limits.max_summary_len),
        };
        history::append(&mut record, interaction, self.inner.limits.history_capacity);
        self.inner.commit(self.user_id, record).await
    }
}

/// Cheap-clone handle; all state lives behind the `Arc`.
#[derive(Clone)]
pub struct ActivityService {
    inner: Arc<ActivityInner>,
}

struct ActivityInner {
    policy: ClockPolicy,
    store: Arc<dyn Store>,
    limits: ActivityLimits,
    /// Per-user exclusive sections: same-user requests are strictly ordered,
    /// different users proceed independently.
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    /// The persisted view. Only ever mutated by `commit`, which writes the
    /// store while holding this lock so saves cannot reorder.
    table: Mutex<HashMap<UserId, UserRecord>>,
}

impl ActivityService {
    /// Load state from the store and build the service. Corrupt or unreadable
    /// backing data starts a fresh tracker and logs a warning; it never fails
    /// startup.
    pub fn new(store: Arc<dyn Store>, policy: ClockPolicy, limits: ActivityLimits) -> Result<Self> {
        let loaded = store.load()?;
        if let Some(warning) = &loaded.warning {
            eprintln!("[STORE] {warning}");
        }

        Ok(Self {
            inner: Arc::new(ActivityInner {
                policy,
                store,
                limits,
                locks: Mutex::new(HashMap::new()),
                table: Mutex::new(loaded.users),
            }),
        })
    }

    /// Admit or reject one request under the daily cap.
    ///
    /// On admission the increment (and any day reset) is already persisted
    /// when this returns; the caller finishes the exchange through the
    /// returned [`PendingInteraction`].
    pub async fn submit(
        &self,
        user_id: UserId,
        prompt: &str,
        daily_limit: u32,
    ) -> Result<Submission> {
        let lock = self.inner.user_lock(user_id).await;
        let _guard = lock.lock().await;

        // Scratch copy: the ledger may reset and increment it, but nothing is
        // observable until commit. Denials are discarded wholesale.
        let mut record = self.inner.record_or_new(user_id).await;

        match ledger::try_consume(&mut record, daily_limit, &self.inner.policy) {
            QuotaDecision::Denied { retry_after } => Ok(Submission::Rejected { retry_after }),
            QuotaDecision::Admitted { remaining } => {
                let accepted_at = self.inner.policy.timestamp();
                self.inner.commit(user_id, record).await?;
                Ok(Submission::Accepted {
                    remaining,
                    pending: PendingInteraction {
                        inner: self.inner.clone(),
                        user_id,
                        prompt: truncate_text(prompt, self.inner.limits.max_prompt_len),
                        accepted_at,
                    },
                })
            }
        }
    }

    /// Read-only snapshot. Never creates a record; `remaining` is day-aware,
    /// so a count from a past date leaves the full limit available.
    pub async fn stats(&self, user_id: UserId, daily_limit: u32) -> UserStats {
        let today = self.inner.policy.today();
        let table = self.inner.table.lock().await;
        match table.get(&user_id) {
            None => UserStats {
                request_count: 0,
                remaining: daily_limit,
                total_requests_lifetime: 0,
                count_date: today,
            },
            Some(r) => {
                let counted_today = if r.count_date == today {
                    r.request_count
                } else {
                    0
                };
                UserStats {
                    request_count: r.request_count,
                    remaining: daily_limit.saturating_sub(counted_today),
                    total_requests_lifetime: r.total_requests_lifetime,
                    count_date: r.count_date,
                }
            }
        }
    }

    /// The user's most recent completed interactions, newest first.
    pub async fn history(&self, user_id: UserId, count: usize) -> Vec<Interaction> {
        let table = self.inner.table.lock().await;
        table
            .get(&user_id)
            .map(|r| history::recent(r, count))
            .unwrap_or_default()
    }

    /// Number of users with a record.
    pub async fn tracked_users(&self) -> usize {
        self.inner.table.lock().await.len()
    }
}

impl ActivityInner {
    async fn user_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(user_id).or_default().clone()
    }

    async fn record_or_new(&self, user_id: UserId) -> UserRecord {
        let table = self.table.lock().await;
        table
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UserRecord::new(user_id, self.policy.today()))
    }

    /// Install a mutated record and persist the whole table. Caller must hold
    /// the user's lock. If the save fails the in-memory view is rolled back,
    /// so memory never claims state the disk does not have.
    async fn commit(&self, user_id: UserId, record: UserRecord) -> Result<()> {
        let mut table = self.table.lock().await;
        let prev = table.insert(user_id, record);
        if let Err(e) = self.store.save(&table) {
            match prev {
                Some(p) => {
                    table.insert(user_id, p);
                }
                None => {
                    table.remove(&user_id);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FakeClock, TimeZonePolicy};
    use crate::store::{JsonFileStore, MemoryStore};
    use crate::Error;

    fn limits() -> ActivityLimits {
        ActivityLimits {
            history_capacity: 50,
            max_prompt_len: 2000,
            max_summary_len: 500,
        }
    }

    fn service_with_clock() -> (Arc<FakeClock>, Arc<MemoryStore>, ActivityService) {
        let clock = Arc::new(FakeClock::at_ymd_hms(2026, 8, 29, 12, 0, 0));
        let policy =
            ClockPolicy::with_clock(clock.clone(), TimeZonePolicy::parse("utc").unwrap());
        let store = Arc::new(MemoryStore::new());
        let svc = ActivityService::new(store.clone(), policy, limits()).unwrap();
        (clock, store, svc)
    }

    async fn accept(svc: &ActivityService, user: UserId, prompt: &str, limit: u32) -> u32 {
        match svc.submit(user, prompt, limit).await.unwrap() {
            Submission::Accepted { remaining, pending } => {
                pending.complete("ok").await.unwrap();
                remaining
            }
            Submission::Rejected { .. } => panic!("expected acceptance for {prompt:?}"),
        }
    }

    #[tokio::test]
    async fn alice_scenario_cap_denial_and_next_day() {
        let (clock, _store, svc) = service_with_clock();
        let alice = UserId(1);

        for i in 0..10 {
            let remaining = accept(&svc, alice, &format!("q{i}"), 10).await;
            assert_eq!(remaining, 10 - 1 - i as u32);
        }

        // Eleventh same-day call: denied, retry_after = seconds until midnight.
        match svc.submit(alice, "one too many", 10).await.unwrap() {
            Submission::Rejected { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(12 * 3600));
            }
            Submission::Accepted { .. } => panic!("expected rejection"),
        }
        let stats = svc.stats(alice, 10).await;
        assert_eq!(stats.request_count, 10);
        assert_eq!(stats.remaining, 0);
        assert_eq!(stats.total_requests_lifetime, 10);

        // Next day: reset to 0, then incremented to 1.
        clock.advance_days(1);
        let remaining = accept(&svc, alice, "good morning", 10).await;
        assert_eq!(remaining, 9);
        let stats = svc.stats(alice, 10).await;
        assert_eq!(stats.request_count, 1);
        assert_eq!(stats.total_requests_lifetime, 11);
    }

    #[tokio::test]
    async fn stats_is_idempotent_and_never_creates_records() {
        let (_clock, _store, svc) = service_with_clock();
        let user = UserId(5);

        let first = svc.stats(user, 10).await;
        let second = svc.stats(user, 10).await;
        assert_eq!(first, second);
        assert_eq!(first.remaining, 10);
        assert_eq!(svc.tracked_users().await, 0);
    }

    #[tokio::test]
    async fn abandoned_submit_counts_but_leaves_no_history() {
        let (_clock, _store, svc) = service_with_clock();
        let user = UserId(3);

        let sub = svc.submit(user, "never finished", 10).await.unwrap();
        match sub {
            Submission::Accepted { remaining, pending } => {
                assert_eq!(remaining, 9);
                drop(pending); // downstream generator "crashed"
            }
            Submission::Rejected { .. } => panic!("expected acceptance"),
        }

        let stats = svc.stats(user, 10).await;
        assert_eq!(stats.request_count, 1);
        assert!(svc.history(user, 10).await.is_empty());
    }

    #[tokio::test]
    async fn history_is_bounded_and_newest_first() {
        let (_clock, _store, svc) = service_with_clock();
        let user = UserId(4);

        for i in 0..60 {
            // Large limit: all 60 complete within one day.
            match svc.submit(user, &format!("q{i}"), 100).await.unwrap() {
                Submission::Accepted { pending, .. } => {
                    pending.complete(&format!("a{i}")).await.unwrap()
                }
                Submission::Rejected { .. } => panic!("unexpected rejection"),
            }
        }

        let hist = svc.history(user, 100).await;
        assert_eq!(hist.len(), 50);
        assert_eq!(hist[0].prompt, "q59");
        assert_eq!(hist[49].prompt, "q10");
        assert!(!hist.iter().any(|i| i.prompt == "q9"));
    }

    #[tokio::test]
    async fn prompts_and_summaries_are_truncated() {
        let clock = Arc::new(FakeClock::at_ymd_hms(2026, 8, 29, 12, 0, 0));
        let policy =
            ClockPolicy::with_clock(clock, TimeZonePolicy::parse("utc").unwrap());
        let svc = ActivityService::new(
            Arc::new(MemoryStore::new()),
            policy,
            ActivityLimits {
                history_capacity: 50,
                max_prompt_len: 10,
                max_summary_len: 4,
            },
        )
        .unwrap();

        match svc.submit(UserId(1), &"x".repeat(100), 10).await.unwrap() {
            Submission::Accepted { pending, .. } => {
                pending.complete(&"y".repeat(100)).await.unwrap()
            }
            Submission::Rejected { .. } => panic!("unexpected rejection"),
        }

        let hist = svc.history(UserId(1), 1).await;
        assert_eq!(hist[0].prompt.len(), 10);
        assert_eq!(hist[0].response_summary.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_user_submits_never_overshoot() {
        let (_clock, _store, svc) = service_with_clock();
        let user = UserId(9);
        let n = 8u32;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..n {
            let svc = svc.clone();
            tasks.spawn(async move { svc.submit(user, &format!("q{i}"), n - 1).await });
        }

        let mut accepted = 0u32;
        let mut rejected = 0u32;
        while let Some(res) = tasks.join_next().await {
            match res.unwrap().unwrap() {
                Submission::Accepted { pending, .. } => {
                    accepted += 1;
                    pending.complete("ok").await.unwrap();
                }
                Submission::Rejected { .. } => rejected += 1,
            }
        }

        assert_eq!(accepted, n - 1);
        assert_eq!(rejected, 1);
        let stats = svc.stats(user, n - 1).await;
        assert_eq!(stats.request_count, n - 1);
        assert_eq!(stats.total_requests_lifetime, (n - 1) as u64);
    }

    #[tokio::test]
    async fn state_survives_a_restart() {
        let path = {
            let ts = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            format!("/tmp/askbot-activity-restart-{}-{ts}.json", std::process::id())
        };

        let clock = Arc::new(FakeClock::at_ymd_hms(2026, 8, 29, 12, 0, 0));
        let policy =
            ClockPolicy::with_clock(clock.clone(), TimeZonePolicy::parse("utc").unwrap());

        {
            let store = Arc::new(JsonFileStore::new(&path));
            let svc = ActivityService::new(store, policy.clone(), limits()).unwrap();
            for i in 0..3 {
                accept(&svc, UserId(1), &format!("q{i}"), 10).await;
            }
        }

        // New process, same file.
        let store = Arc::new(JsonFileStore::new(&path));
        let svc = ActivityService::new(store, policy, limits()).unwrap();
        let stats = svc.stats(UserId(1), 10).await;
        assert_eq!(stats.request_count, 3);
        assert_eq!(stats.total_requests_lifetime, 3);
        let hist = svc.history(UserId(1), 10).await;
        assert_eq!(hist.len(), 3);
        assert_eq!(hist[0].prompt, "q2");
    }

    struct FailingStore;

    impl Store for FailingStore {
        fn load(&self) -> Result<crate::store::Loaded> {
            Ok(crate::store::Loaded {
                users: HashMap::new(),
                warning: None,
            })
        }

        fn save(&self, _users: &HashMap<UserId, UserRecord>) -> Result<()> {
            Err(Error::Storage("disk on fire".to_string()))
        }
    }

    #[tokio::test]
    async fn save_failure_surfaces_and_rolls_back() {
        let clock = Arc::new(FakeClock::at_ymd_hms(2026, 8, 29, 12, 0, 0));
        let policy =
            ClockPolicy::with_clock(clock, TimeZonePolicy::parse("utc").unwrap());
        let svc =
            ActivityService::new(Arc::new(FailingStore), policy, limits()).unwrap();

        match svc.submit(UserId(1), "hello", 10).await {
            Err(Error::Storage(_)) => {}
            Err(other) => panic!("expected storage error, got {other}"),
            Ok(_) => panic!("expected the submit to fail"),
        }

        // Nothing committed: the failed increment is not visible.
        let stats = svc.stats(UserId(1), 10).await;
        assert_eq!(stats.request_count, 0);
        assert_eq!(stats.total_requests_lifetime, 0);
        assert_eq!(svc.tracked_users().await, 0);
    }
}
