//! Database tests

use super::*;
use crate::models::*;
use chrono::{NaiveDate, Utc};
use std::time::Duration;

fn setup_tenant(db: &Database, id: &str) {
    db.upsert_tenant(id, &format!("{} Inc", id)).unwrap();
}

fn account(external_id: &str, name: &str) -> ExternalAccount {
    ExternalAccount {
        external_id: external_id.to_string(),
        name: name.to_string(),
        classification: Some("Expense".to_string()),
        account_sub_type: None,
        description: None,
    }
}

fn txn(external_id: &str, payee: &str, description: &str, amount: f64) -> ExternalTransaction {
    ExternalTransaction {
        external_id: external_id.to_string(),
        payee_name: payee.to_string(),
        description: description.to_string(),
        amount,
        transaction_date: NaiveDate::from_ymd_opt(2024, 3, 1),
    }
}

fn model_suggestion(account_id: i64) -> Suggestion {
    Suggestion {
        account_id,
        confidence: 0.7,
        reasoning: "Looks like it".to_string(),
        source: SuggestionSource::Model,
    }
}

#[test]
fn test_in_memory_db() {
    let db = Database::in_memory().unwrap();
    assert!(db.list_tenants().unwrap().is_empty());
}

#[test]
fn test_schema_has_queue_columns() {
    let db = Database::in_memory().unwrap();
    let conn = db.conn().unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('transactions') WHERE name IN \
             ('ai_source', 'ai_attempts', 'ai_last_attempted_at', 'ai_last_error', 'embedding')",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 5);
}

#[test]
fn test_tenant_upsert_renames() {
    let db = Database::in_memory().unwrap();
    db.upsert_tenant("t1", "Old").unwrap();
    db.upsert_tenant("t1", "New").unwrap();

    let tenants = db.list_tenants().unwrap();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0].name, "New");
    assert!(db.get_tenant("missing").unwrap().is_none());
}

#[test]
fn test_connection_upsert_and_refresh_update() {
    let db = Database::in_memory().unwrap();
    let now = Utc::now();

    // Connecting creates the tenant
    db.upsert_connection(
        "t1",
        &NewConnection {
            realm_id: "realm-1".into(),
            access_token: "a1".into(),
            refresh_token: "r1".into(),
            access_token_expires_at: now + chrono::Duration::minutes(60),
            refresh_token_expires_at: now + chrono::Duration::days(100),
        },
    )
    .unwrap();
    assert!(db.get_tenant("t1").unwrap().is_some());

    let conn = db.get_connection("t1").unwrap().unwrap();
    assert_eq!(conn.access_token, "a1");
    assert_eq!(conn.realm_id, "realm-1");

    let grant = TokenGrant {
        access_token: "a2".into(),
        refresh_token: "r2".into(),
        expires_in: 3600,
        refresh_expires_in: 86400,
    };
    db.update_connection_tokens("t1", &grant, now).unwrap();

    let conn = db.get_connection("t1").unwrap().unwrap();
    assert_eq!(conn.access_token, "a2");
    assert_eq!(conn.refresh_token, "r2");
    assert_eq!(conn.realm_id, "realm-1");
    let diff = (conn.access_token_expires_at - now).num_seconds();
    assert!((3599..=3600).contains(&diff));

    assert!(matches!(
        db.update_connection_tokens("nobody", &grant, now),
        Err(Error::ConnectionNotFound(_))
    ));
    assert_eq!(db.list_connected_tenants().unwrap(), vec!["t1".to_string()]);
}

#[test]
fn test_account_upsert_is_idempotent() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");

    let batch = vec![account("1", "Office Supplies"), account("2", "Travel")];
    assert_eq!(db.upsert_accounts("t1", &batch).unwrap(), 2);
    let first = db.list_accounts("t1").unwrap();

    db.upsert_accounts("t1", &batch).unwrap();
    let second = db.list_accounts("t1").unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, b.name);
    }

    // Upstream rename updates in place
    db.upsert_accounts("t1", &[account("2", "Travel & Meals")])
        .unwrap();
    let renamed = db.get_account_by_external_id("t1", "2").unwrap().unwrap();
    assert_eq!(renamed.name, "Travel & Meals");
    assert_eq!(db.list_accounts("t1").unwrap().len(), 2);

    assert_eq!(db.upsert_accounts("t1", &[]).unwrap(), 0);
}

#[test]
fn test_accounts_are_tenant_scoped() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    setup_tenant(&db, "t2");

    db.upsert_accounts("t1", &[account("1", "Rent")]).unwrap();
    db.upsert_accounts("t2", &[account("1", "Rent")]).unwrap();

    let t1 = db.list_accounts("t1").unwrap();
    let t2 = db.list_accounts("t2").unwrap();
    assert_eq!(t1.len(), 1);
    assert_eq!(t2.len(), 1);
    assert_ne!(t1[0].id, t2[0].id);

    assert!(db.get_account("t2", t1[0].id).unwrap().is_none());
    assert!(db.get_account("t1", t1[0].id).unwrap().is_some());
    assert!(db.find_account_by_name("t1", "rent").unwrap().is_some());
}

#[test]
fn test_transaction_upsert_counts_and_preserves_review_state() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    db.upsert_accounts("t1", &[account("1", "Office Supplies")])
        .unwrap();
    let office = db.list_accounts("t1").unwrap()[0].id;

    let batch = vec![txn("100", "Staples", "Paper", -42.5), txn("101", "Uber", "Ride", -12.0)];
    let stats = db.upsert_transactions("t1", &batch).unwrap();
    assert_eq!(stats, UpsertStats { inserted: 2, updated: 0 });

    let staples = db.get_transaction_by_external_id("t1", "100").unwrap().unwrap();
    assert_eq!(staples.status, TransactionStatus::Pending);
    assert!(db
        .save_suggestion("t1", staples.id, &model_suggestion(office))
        .unwrap());

    let stats = db.upsert_transactions("t1", &batch).unwrap();
    assert_eq!(stats, UpsertStats { inserted: 0, updated: 2 });

    let again = db.get_transaction("t1", staples.id).unwrap().unwrap();
    assert_eq!(again.ai_suggested_account_id, Some(office));
    assert_eq!(again.ai_source, Some(SuggestionSource::Model));
    assert_eq!(db.list_transactions("t1", None, 100).unwrap().len(), 2);
}

#[test]
fn test_queue_predicate_and_order() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    setup_tenant(&db, "t2");
    db.upsert_accounts("t1", &[account("1", "Office Supplies")])
        .unwrap();
    let office = db.list_accounts("t1").unwrap()[0].id;

    db.upsert_transactions(
        "t1",
        &[
            txn("1", "A", "a", -1.0),
            txn("2", "B", "b", -2.0),
            txn("3", "C", "c", -3.0),
        ],
    )
    .unwrap();
    db.upsert_transactions("t2", &[txn("1", "Other", "x", -9.0)])
        .unwrap();

    let queue = db.list_uncategorized("t1", 20, 5).unwrap();
    assert_eq!(queue.len(), 3);
    assert!(queue.windows(2).all(|w| w[0].id < w[1].id));
    assert!(queue.iter().all(|t| t.tenant_id == "t1"));

    // Suggested rows leave the queue
    db.save_suggestion("t1", queue[0].id, &model_suggestion(office))
        .unwrap();
    // Approved rows leave the queue even without a suggestion
    db.approve_transaction("t1", queue[1].id, Some(office))
        .unwrap();

    let queue2 = db.list_uncategorized("t1", 20, 5).unwrap();
    assert_eq!(queue2.len(), 1);
    assert_eq!(queue2[0].id, queue[2].id);

    assert_eq!(db.list_uncategorized("t1", 0, 5).unwrap().len(), 0);
}

#[test]
fn test_dead_letter_threshold_and_reset_on_change() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    db.upsert_transactions("t1", &[txn("1", "Mystery", "???", -5.0)])
        .unwrap();
    let id = db.list_uncategorized("t1", 20, 2).unwrap()[0].id;

    db.record_categorization_failure("t1", id, "bad json").unwrap();
    assert_eq!(db.list_uncategorized("t1", 20, 2).unwrap().len(), 1);
    db.record_categorization_failure("t1", id, "bad json").unwrap();
    assert!(db.list_uncategorized("t1", 20, 2).unwrap().is_empty());
    // 0 disables the threshold
    assert_eq!(db.list_uncategorized("t1", 20, 0).unwrap().len(), 1);

    let stored = db.get_transaction("t1", id).unwrap().unwrap();
    assert_eq!(stored.ai_attempts, 2);
    assert_eq!(stored.ai_last_error.as_deref(), Some("bad json"));

    // Same upstream text keeps it dead-lettered
    db.upsert_transactions("t1", &[txn("1", "Mystery", "???", -5.0)])
        .unwrap();
    assert!(db.list_uncategorized("t1", 20, 2).unwrap().is_empty());

    // Changed upstream text revives it
    db.upsert_transactions("t1", &[txn("1", "Mystery Co", "Invoice 7", -5.0)])
        .unwrap();
    let revived = db.list_uncategorized("t1", 20, 2).unwrap();
    assert_eq!(revived.len(), 1);
    assert_eq!(revived[0].ai_attempts, 0);
    assert!(revived[0].ai_last_error.is_none());
}

#[test]
fn test_reset_failed_attempts() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    db.upsert_transactions("t1", &[txn("1", "X", "y", -1.0)]).unwrap();
    let id = db.list_uncategorized("t1", 20, 1).unwrap()[0].id;
    db.record_categorization_failure("t1", id, "timeout").unwrap();
    assert!(db.list_uncategorized("t1", 20, 1).unwrap().is_empty());

    assert_eq!(db.reset_failed_attempts("t1").unwrap(), 1);
    assert_eq!(db.list_uncategorized("t1", 20, 1).unwrap().len(), 1);
}

#[test]
fn test_new_rule_revives_matching_dead_letters() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    db.upsert_accounts("t1", &[account("1", "Bank Fees")]).unwrap();
    let fees = db.list_accounts("t1").unwrap()[0].id;
    db.upsert_transactions(
        "t1",
        &[
            txn("1", "STRIPE PAYOUT", "weekly", -5.0),
            txn("2", "Mystery", "???", -7.0),
        ],
    )
    .unwrap();
    for tx in db.list_uncategorized("t1", 20, 1).unwrap() {
        db.record_categorization_failure("t1", tx.id, "bad json").unwrap();
    }
    assert!(db.list_uncategorized("t1", 20, 1).unwrap().is_empty());

    db.create_rule("t1", "Stripe", fees, None).unwrap();

    let queue = db.list_uncategorized("t1", 20, 1).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].external_id, "1");
    assert!(queue[0].ai_last_error.is_none());
}

#[test]
fn test_embedding_storage() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    db.upsert_transactions("t1", &[txn("1", "X", "y", -1.0)]).unwrap();
    let id = db.list_uncategorized("t1", 20, 5).unwrap()[0].id;

    assert!(db.get_embedding("t1", id).unwrap().is_none());
    db.save_embedding("t1", id, &[0.5, -0.25]).unwrap();
    assert_eq!(db.get_embedding("t1", id).unwrap(), Some(vec![0.5, -0.25]));
    assert!(db.get_transaction("t1", id).unwrap().unwrap().has_embedding);

    // Another tenant cannot write it
    assert!(matches!(
        db.save_embedding("t2", id, &[1.0]),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_find_similar_only_approved_same_tenant() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    setup_tenant(&db, "t2");
    db.upsert_accounts("t1", &[account("1", "Office Supplies")])
        .unwrap();
    db.upsert_accounts("t2", &[account("1", "Office Supplies")])
        .unwrap();
    let office1 = db.list_accounts("t1").unwrap()[0].id;
    let office2 = db.list_accounts("t2").unwrap()[0].id;

    db.upsert_transactions(
        "t1",
        &[
            txn("1", "Staples", "Paper", -10.0),
            txn("2", "Staples", "Ink", -20.0),
            txn("3", "Staples", "Pens", -5.0),
            txn("4", "Unrelated", "x", -1.0),
        ],
    )
    .unwrap();
    db.upsert_transactions("t2", &[txn("1", "Staples", "Paper", -10.0)])
        .unwrap();

    let t1: Vec<Transaction> = db.list_uncategorized("t1", 20, 5).unwrap();
    let other = db.list_uncategorized("t2", 20, 5).unwrap()[0].id;

    let query = [1.0_f32, 0.0, 0.0];
    db.save_embedding("t1", t1[0].id, &[0.99, 0.1, 0.0]).unwrap();
    db.save_embedding("t1", t1[1].id, &[0.9, 0.3, 0.0]).unwrap();
    db.save_embedding("t1", t1[2].id, &[0.95, 0.05, 0.0]).unwrap(); // not approved
    db.save_embedding("t1", t1[3].id, &[0.0, 1.0, 0.0]).unwrap(); // dissimilar
    db.save_embedding("t2", other, &[1.0, 0.0, 0.0]).unwrap(); // other tenant

    db.approve_transaction("t1", t1[0].id, Some(office1)).unwrap();
    db.approve_transaction("t1", t1[1].id, Some(office1)).unwrap();
    db.approve_transaction("t1", t1[3].id, Some(office1)).unwrap();
    db.approve_transaction("t2", other, Some(office2)).unwrap();

    let similar = db
        .find_similar_transactions("t1", &query, t1[2].id, 0.8, 5)
        .unwrap();
    assert_eq!(similar.len(), 2);
    assert_eq!(similar[0].transaction_id, t1[0].id);
    assert_eq!(similar[1].transaction_id, t1[1].id);
    assert!(similar[0].similarity >= similar[1].similarity);
    assert_eq!(
        similar[0].assigned_account_name.as_deref(),
        Some("Office Supplies")
    );

    let limited = db
        .find_similar_transactions("t1", &query, t1[2].id, 0.8, 1)
        .unwrap();
    assert_eq!(limited.len(), 1);

    // Nothing in t2 is visible from t1's perspective and vice versa
    let from_t2 = db
        .find_similar_transactions("t2", &query, -1, 0.8, 5)
        .unwrap();
    assert_eq!(from_t2.len(), 1);
    assert_eq!(from_t2[0].transaction_id, other);
}

#[test]
fn test_review_and_approve() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    setup_tenant(&db, "t2");
    db.upsert_accounts(
        "t1",
        &[account("1", "Office Supplies"), account("2", "Travel")],
    )
    .unwrap();
    db.upsert_accounts("t2", &[account("9", "Foreign")]).unwrap();
    let office = db.find_account_by_name("t1", "Office Supplies").unwrap().unwrap().id;
    let travel = db.find_account_by_name("t1", "Travel").unwrap().unwrap().id;
    let foreign = db.list_accounts("t2").unwrap()[0].id;

    db.upsert_transactions(
        "t1",
        &[txn("1", "Staples", "Paper", -10.0), txn("2", "Delta", "Flight", -300.0)],
    )
    .unwrap();
    let queue = db.list_uncategorized("t1", 20, 5).unwrap();
    db.save_suggestion("t1", queue[0].id, &model_suggestion(office))
        .unwrap();

    let pending = db.list_pending_review("t1", 50).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].suggested_account_name.as_deref(),
        Some("Office Supplies")
    );

    // No suggestion and no override
    assert!(matches!(
        db.approve_transaction("t1", queue[1].id, None),
        Err(Error::InvalidData(_))
    ));
    // Cross-tenant override rejected
    assert!(matches!(
        db.approve_transaction("t1", queue[1].id, Some(foreign)),
        Err(Error::NotFound(_))
    ));
    // Cross-tenant transaction invisible
    assert!(matches!(
        db.approve_transaction("t2", queue[0].id, None),
        Err(Error::NotFound(_))
    ));

    let approved = db.approve_transaction("t1", queue[0].id, None).unwrap();
    assert_eq!(approved.status, TransactionStatus::Approved);
    assert_eq!(approved.assigned_account_id, Some(office));

    let overridden = db
        .approve_transaction("t1", queue[1].id, Some(travel))
        .unwrap();
    assert_eq!(overridden.assigned_account_id, Some(travel));

    assert!(db.list_pending_review("t1", 50).unwrap().is_empty());
    assert!(matches!(
        db.approve_transaction("t1", queue[0].id, None),
        Err(Error::InvalidData(_))
    ));

    // Suggestions never overwrite an approved row
    assert!(!db
        .save_suggestion("t1", queue[0].id, &model_suggestion(travel))
        .unwrap());
}

#[test]
fn test_rules_validate_target() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    setup_tenant(&db, "t2");
    db.upsert_accounts("t1", &[account("1", "Bank Fees")]).unwrap();
    db.upsert_accounts("t2", &[account("1", "Bank Fees")]).unwrap();
    let fees = db.list_accounts("t1").unwrap()[0].id;
    let foreign = db.list_accounts("t2").unwrap()[0].id;

    let id = db.create_rule("t1", " Stripe ", fees, Some("fee")).unwrap();
    let rules = db.list_rules("t1").unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].keyword, "Stripe");
    assert_eq!(rules[0].match_type.as_deref(), Some("fee"));

    assert!(matches!(
        db.create_rule("t1", "Wise", foreign, None),
        Err(Error::RuleTargetInvalid { .. })
    ));
    assert!(matches!(
        db.create_rule("t1", "  ", fees, None),
        Err(Error::InvalidData(_))
    ));

    assert!(db.list_rules("t2").unwrap().is_empty());
    assert!(matches!(db.delete_rule("t2", id), Err(Error::NotFound(_))));
    db.delete_rule("t1", id).unwrap();
    assert!(db.list_rules("t1").unwrap().is_empty());
}

#[test]
fn test_sync_lease_exclusion() {
    let db = Database::in_memory().unwrap();
    let ttl = Duration::from_secs(600);

    assert!(db.acquire_sync_lease("t1", "worker-a", ttl).unwrap());
    assert!(!db.acquire_sync_lease("t1", "worker-b", ttl).unwrap());
    // Different tenant is independent
    assert!(db.acquire_sync_lease("t2", "worker-b", ttl).unwrap());

    db.release_sync_lease("t1", "worker-a").unwrap();
    assert!(db.acquire_sync_lease("t1", "worker-b", ttl).unwrap());
}

#[test]
fn test_expired_lease_can_be_taken_over() {
    let db = Database::in_memory().unwrap();
    assert!(db
        .acquire_sync_lease("t1", "crashed", Duration::from_secs(0))
        .unwrap());
    assert!(db
        .acquire_sync_lease("t1", "worker", Duration::from_secs(600))
        .unwrap());
}

#[test]
fn test_embedding_cache() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    assert!(db
        .get_cached_embedding("t1", "m", "abc")
        .unwrap()
        .is_none());
    db.cache_embedding("t1", "m", "abc", &[1.0, 2.0]).unwrap();
    assert_eq!(
        db.get_cached_embedding("t1", "m", "abc").unwrap(),
        Some(vec![1.0, 2.0])
    );
    assert!(db
        .get_cached_embedding("t1", "other-model", "abc")
        .unwrap()
        .is_none());
}

#[test]
fn test_ai_metrics_stats() {
    let db = Database::in_memory().unwrap();
    for (op, ok, ms) in [
        (AiOperation::Embed, true, 10),
        (AiOperation::Categorize, true, 100),
        (AiOperation::Categorize, false, 300),
    ] {
        db.record_ai_metric(&NewAiMetric {
            operation: op,
            model: "test".into(),
            tenant_id: "t1".into(),
            transaction_id: Some(1),
            latency_ms: ms,
            success: ok,
            error_message: (!ok).then(|| "boom".to_string()),
        })
        .unwrap();
    }

    let stats = db.get_ai_stats("t1").unwrap();
    assert_eq!(stats.len(), 2);
    let categorize = stats.iter().find(|s| s.operation == "categorize").unwrap();
    assert_eq!(categorize.call_count, 2);
    assert!((categorize.success_rate - 0.5).abs() < 1e-9);
    assert!((categorize.avg_latency_ms - 200.0).abs() < 1e-9);
    assert!(db.get_ai_stats("t2").unwrap().is_empty());
}

#[test]
fn test_tenant_stats() {
    let db = Database::in_memory().unwrap();
    setup_tenant(&db, "t1");
    db.upsert_accounts("t1", &[account("1", "Office Supplies")])
        .unwrap();
    let office = db.list_accounts("t1").unwrap()[0].id;
    db.upsert_transactions(
        "t1",
        &[
            txn("1", "A", "a", -1.0),
            txn("2", "B", "b", -1.0),
            txn("3", "C", "c", -1.0),
            txn("4", "D", "d", -1.0),
        ],
    )
    .unwrap();
    let q = db.list_uncategorized("t1", 20, 1).unwrap();
    db.save_suggestion("t1", q[0].id, &model_suggestion(office)).unwrap();
    db.approve_transaction("t1", q[1].id, Some(office)).unwrap();
    db.record_categorization_failure("t1", q[2].id, "x").unwrap();

    let stats = db.get_tenant_stats("t1", 1).unwrap();
    assert_eq!(stats.accounts, 1);
    assert_eq!(stats.transactions, 4);
    assert_eq!(stats.awaiting_review, 1);
    assert_eq!(stats.approved, 1);
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.awaiting_suggestion, 1);
}
