use chrono::{NaiveDate, NaiveDateTime};
use futures::future::join_all;
use scoped_cooldown::{
    BucketDimension, ChannelKind, Cooldown, CooldownRecord, CooldownSpec, CooldownStore, Decision,
    InvocationContext, ManualClock, ResetOutcome, ScopeKey,
};
use scoped_cooldown_sqlite::{SqliteConfig, SqliteCooldownStore};
use std::time::Duration;

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap()
}

fn rolling(name: &str, rate: u32, secs: u64) -> CooldownSpec {
    CooldownSpec::builder(name).rate(rate).per(Duration::from_secs(secs)).build().unwrap()
}

fn file_config(dir: &tempfile::TempDir) -> SqliteConfig {
    SqliteConfig {
        path: dir.path().join("cooldowns.db"),
        ..SqliteConfig::default()
    }
}

#[tokio::test]
async fn store_operations_round_trip() {
    let store = SqliteCooldownStore::open_in_memory("cd").unwrap();
    let key = ScopeKey::new(BucketDimension::Guild, 1, 2).action("ping");
    store.ensure_slot(BucketDimension::Guild, "ping").await.unwrap();
    store.ensure_slot(BucketDimension::Guild, "ping").await.unwrap();
    store.ensure_scope_row(&key.scope).await.unwrap();
    store.ensure_scope_row(&key.scope).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), None);

    let record = CooldownRecord {
        limit: 2,
        count: 1,
        expires_at: t0(),
        window: scoped_cooldown::WindowKind::Rolling,
    };
    store.put(&key, &record).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(record.clone()));

    let bumped = CooldownRecord {
        count: 2,
        ..record.clone()
    };
    assert!(store.compare_and_swap(&key, Some(&record), Some(&bumped)).await.unwrap());
    assert!(!store.compare_and_swap(&key, Some(&record), None).await.unwrap());
    assert!(store.compare_and_swap(&key, Some(&bumped), None).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), None);

    store.put(&key, &record).await.unwrap();
    store.clear(&key).await.unwrap();
    assert_eq!(store.raw(&key).await.unwrap(), None);
}

#[tokio::test]
async fn column_added_by_another_handle_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = file_config(&dir);
    let first = SqliteCooldownStore::open(&cfg).unwrap();
    let second = SqliteCooldownStore::open(&cfg).unwrap();
    first.ensure_slot(BucketDimension::User, "ping").await.unwrap();
    // second handle has not cached the slot and hits "duplicate column name"
    second.ensure_slot(BucketDimension::User, "ping").await.unwrap();
}

#[tokio::test]
async fn legacy_and_malformed_payloads() {
    let store = SqliteCooldownStore::open_in_memory("cd").unwrap();
    let key = ScopeKey::user(5).action("ping");
    store.put_raw(&key, "3,1,2024-01-01 10:01:00").await.unwrap();
    let legacy = store.get(&key).await.unwrap().unwrap();
    assert_eq!((legacy.limit, legacy.count), (3, 1));

    store.put_raw(&key, "{not json").await.unwrap();
    assert!(store.get(&key).await.unwrap_err().is_malformed());

    let cooldown = Cooldown::builder(store.clone())
        .clock(ManualClock::new(t0()))
        .register(rolling("ping", 1, 60))
        .build()
        .unwrap();
    assert!(cooldown.check("ping", &InvocationContext::user(5)).await.unwrap().is_allowed());
    assert_eq!(store.get(&key).await.unwrap().unwrap().count, 1);
}

#[tokio::test]
async fn facade_properties_hold_against_sqlite() {
    let clock = ManualClock::new(t0());
    let cooldown = Cooldown::builder(SqliteCooldownStore::open_in_memory("cooldowns").unwrap())
        .clock(clock.clone())
        .register(rolling("ping", 2, 60))
        .build()
        .unwrap();
    let ctx = InvocationContext::user(u64::MAX);

    assert!(cooldown.check("ping", &ctx).await.unwrap().is_allowed());
    assert!(cooldown.check("ping", &ctx).await.unwrap().is_allowed());
    clock.advance(Duration::from_secs(10));
    match cooldown.check("ping", &ctx).await.unwrap() {
        Decision::Denied(active) => assert_eq!(active.retry_after, Duration::from_secs(50)),
        other => panic!("expected denial, got {other:?}"),
    }

    assert_eq!(cooldown.reset("ping", &ctx).await.unwrap(), ResetOutcome::Decremented { count: 1 });
    assert!(cooldown.check("ping", &ctx).await.unwrap().is_allowed());
    assert_eq!(cooldown.force_remove("ping", &ctx).await.unwrap(), ResetOutcome::Cleared);
    assert_eq!(cooldown.reset("ping", &ctx).await.unwrap(), ResetOutcome::Absent);

    clock.advance(Duration::from_secs(3600));
    assert!(cooldown.check("ping", &ctx).await.unwrap().is_allowed());
}

#[tokio::test]
async fn dimensions_are_isolated() {
    let cooldown = Cooldown::builder(SqliteCooldownStore::open_in_memory("cd").unwrap())
        .clock(ManualClock::new(t0()))
        .register(
            CooldownSpec::builder("ping")
                .rate(1)
                .per(Duration::from_secs(60))
                .dimension(BucketDimension::Channel)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let in_channel = |channel| {
        InvocationContext::user(1).in_guild(9).in_channel(channel, ChannelKind::Text, None)
    };
    assert!(cooldown.check("ping", &in_channel(100)).await.unwrap().is_allowed());
    assert!(!cooldown.check("ping", &in_channel(100)).await.unwrap().is_allowed());
    assert!(cooldown.check("ping", &in_channel(200)).await.unwrap().is_allowed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_admit_exactly_once() {
    let cooldown = Cooldown::builder(SqliteCooldownStore::open_in_memory("cd").unwrap())
        .clock(ManualClock::new(t0()))
        .max_cas_attempts(64)
        .register(rolling("ping", 1, 60))
        .build()
        .unwrap();

    let tasks = (0..16).map(|_| {
        let cooldown = cooldown.clone();
        tokio::spawn(async move { cooldown.check("ping", &InvocationContext::user(1)).await })
    });
    let admitted = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(Decision::is_allowed)
        .count();
    assert_eq!(admitted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_across_handles_admit_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = file_config(&dir);
    let clock = ManualClock::new(t0());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            Cooldown::builder(SqliteCooldownStore::open(&cfg).unwrap())
                .clock(clock.clone())
                .max_cas_attempts(64)
                .register(rolling("ping", 1, 60))
                .build()
                .unwrap()
        })
        .collect();

    let tasks = (0..32).map(|i| {
        let cooldown = handles[i % handles.len()].clone();
        tokio::spawn(async move { cooldown.check("ping", &InvocationContext::user(1)).await })
    });
    let decisions: Vec<Decision> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().expect("no store errors across handles"))
        .collect();
    assert_eq!(decisions.iter().filter(|d| d.is_allowed()).count(), 1);

    // every handle now sees the single admission
    for cooldown in &handles {
        let decision = cooldown.check("ping", &InvocationContext::user(1)).await.unwrap();
        assert!(!decision.is_allowed());
    }
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = file_config(&dir);
    let ctx = InvocationContext::user(1).in_guild(2);
    let spec = || {
        CooldownSpec::builder("daily")
            .rate(1)
            .reset_daily()
            .dimension(BucketDimension::Guild)
            .build()
            .unwrap()
    };

    {
        let cooldown = Cooldown::builder(SqliteCooldownStore::open(&cfg).unwrap())
            .clock(ManualClock::new(t0()))
            .register(spec())
            .build()
            .unwrap();
        assert!(cooldown.check("daily", &ctx).await.unwrap().is_allowed());
    }

    let clock = ManualClock::new(t0());
    let reopened = Cooldown::builder(SqliteCooldownStore::open(&cfg).unwrap())
        .clock(clock.clone())
        .register(spec())
        .build()
        .unwrap();
    let Decision::Denied(active) = reopened.check("daily", &ctx).await.unwrap() else {
        panic!("cooldown should persist across reopen");
    };
    assert_eq!(active.retry_after, Duration::from_secs(14 * 3600));

    clock.set(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 1).unwrap());
    assert!(reopened.check("daily", &ctx).await.unwrap().is_allowed());
}
