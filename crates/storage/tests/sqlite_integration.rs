use std::collections::BTreeSet;

use cbt_core::ledger::AnswerLedger;
use cbt_core::model::{
    AttemptId, AttemptStamp, OptionId, Question, SubmitTrigger, Test, TestId, UserId,
};
use cbt_core::scoring;
use cbt_core::time::fixed_now;
use chrono::Duration;
use storage::repository::{ResultRepository, StorageError, TestRepository};
use storage::sample::sample_catalog;
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn scored_result(test: &Test, user: u64, minutes: i64) -> cbt_core::model::AttemptResult {
    let questions = test.questions();
    let mut ledger = AnswerLedger::initialize(questions.iter().map(Question::id));
    // Answer the first question correctly and the second with a wrong option.
    let first = &questions[0];
    ledger
        .record(first.id(), first.correct_option_ids())
        .unwrap();
    let second = &questions[1];
    let wrong: BTreeSet<OptionId> = second
        .options()
        .iter()
        .filter(|o| !o.is_correct())
        .map(|o| o.id())
        .take(1)
        .collect();
    ledger.record(second.id(), wrong).unwrap();

    let sheet = scoring::score(questions, &ledger.snapshot());
    cbt_core::model::AttemptResult::from_score(
        AttemptStamp {
            attempt_id: AttemptId::generate(),
            test_id: test.id(),
            user_id: UserId::new(user),
            started_at: fixed_now(),
            completed_at: fixed_now() + Duration::minutes(minutes),
            trigger: SubmitTrigger::TimeExpired,
        },
        sheet,
        2,
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_roundtrips_catalog_in_authored_order() {
    let repo = connect("memdb_catalog").await;
    let catalog = sample_catalog(fixed_now()).unwrap();
    for test in &catalog {
        repo.upsert_test(test).await.unwrap();
    }

    let fetched = repo.get_test(TestId::new(1)).await.unwrap().expect("test 1");
    assert_eq!(fetched, catalog[0]);

    // Upserting again replaces questions instead of duplicating them.
    repo.upsert_test(&catalog[0]).await.unwrap();
    let fetched = repo.get_test(TestId::new(1)).await.unwrap().unwrap();
    assert_eq!(fetched.questions().len(), 15);

    assert!(repo.get_test(TestId::new(42)).await.unwrap().is_none());
    assert_eq!(repo.list_tests(10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn sqlite_persists_results_and_rejects_duplicates() {
    let repo = connect("memdb_results").await;
    let test = sample_catalog(fixed_now()).unwrap().remove(1);
    let result = scored_result(&test, 7, 30);

    let id = repo.save_result(&result).await.unwrap();
    let fetched = repo.get_result(id).await.unwrap();
    assert_eq!(fetched, result);
    assert_eq!(fetched.correct_answers(), 1);
    assert_eq!(fetched.trigger(), SubmitTrigger::TimeExpired);
    assert_eq!(fetched.violation_count(), 2);

    assert!(matches!(
        repo.save_result(&result).await,
        Err(StorageError::Conflict)
    ));
    assert!(matches!(
        repo.get_result(id + 100).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_lists_results_per_user_newest_first() {
    let repo = connect("memdb_history").await;
    let test = sample_catalog(fixed_now()).unwrap().remove(0);

    let older = repo.save_result(&scored_result(&test, 1, 10)).await.unwrap();
    repo.save_result(&scored_result(&test, 2, 20)).await.unwrap();
    let newer = repo.save_result(&scored_result(&test, 1, 40)).await.unwrap();

    let rows = repo.list_results_for_user(UserId::new(1), 10).await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![newer, older]);
}
