//! Shared settlement scenarios run against every backend.

#![allow(dead_code)]

use std::sync::Arc;

use futures::future::join_all;
use tokenpay_core::{SessionId, SettlementOutcome, SettlementRecord, TokenGrant, UserId};
use tokenpay_store::Store;

pub const DELIVERIES: usize = 16;

pub fn record(session: &str, user: &str, tokens: u64) -> SettlementRecord {
    SettlementRecord::new(
        SessionId::new(session).unwrap(),
        UserId::new(user).unwrap(),
        9500,
        TokenGrant::new(tokens).unwrap(),
    )
}

/// Suffix that keeps ids from colliding with rows left by earlier runs.
pub fn unique_suffix() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{nanos:x}")
}

/// Fire `DELIVERIES` concurrent settles of the same record and return the outcomes.
pub async fn race_duplicates(
    store: Arc<dyn Store>,
    rec: SettlementRecord,
) -> Vec<SettlementOutcome> {
    let tasks = (0..DELIVERIES).map(|_| {
        let store = Arc::clone(&store);
        let rec = rec.clone();
        tokio::spawn(async move { store.settle(&rec).await })
    });

    join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("settle failed"))
        .collect()
}

pub async fn assert_single_grant(store: Arc<dyn Store>, suffix: &str) {
    let rec = record(&format!("cs_race_{suffix}"), &format!("racer-{suffix}"), 6500);
    let outcomes = race_duplicates(Arc::clone(&store), rec.clone()).await;

    let settled = outcomes.iter().filter(|o| o.is_settled()).count();
    let duplicates = outcomes
        .iter()
        .filter(|o| matches!(o, SettlementOutcome::Duplicate { .. }))
        .count();
    assert_eq!(settled, 1);
    assert_eq!(duplicates, DELIVERIES - 1);

    let balance = store.get_balance(&rec.user_id).await.unwrap();
    assert_eq!(balance.tokens, 6500);
    assert!(store.get_settlement(&rec.session_id).await.unwrap().is_some());
}

pub async fn assert_distinct_sessions_all_credit(store: Arc<dyn Store>, suffix: &str) {
    let user = format!("parallel-{suffix}");
    let tasks = (0..DELIVERIES).map(|i| {
        let store = Arc::clone(&store);
        let rec = record(&format!("cs_par_{suffix}_{i}"), &user, 2500);
        tokio::spawn(async move { store.settle(&rec).await })
    });

    for joined in join_all(tasks).await {
        let outcome = joined.expect("task panicked").expect("settle failed");
        assert!(outcome.is_settled());
    }

    let balance = store
        .get_balance(&UserId::new(user).unwrap())
        .await
        .unwrap();
    assert_eq!(balance.tokens, 2500 * DELIVERIES as u64);
}
