mod common;

use common::{Customer, SpyDispatcher, open, open_with, seed_customers};
use hybrid_repo_domain::domain_event::DomainEvent;
use hybrid_repo_domain::entity::Entity;
use hybrid_repo_domain::error::DomainError;
use hybrid_repo_domain::eventing::{EventSubscriber, HandledEventType, SubscriberDispatcher};
use hybrid_repo_domain::persist::InMemoryStore;
use hybrid_repo_domain::query::{Predicate, QueryOptions};
use hybrid_repo_domain::unit_of_work::{UnitOfWork, UnitOfWorkState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

fn by_id(customer: &Customer) -> Predicate<Customer> {
    let id = customer.id();
    Predicate::new(move |c: &Customer| c.id() == id)
}

#[tokio::test]
async fn added_entity_is_readable_after_commit() {
    let store = InMemoryStore::new();
    let uow = open(&store);
    let repo = uow.repository::<Customer>().unwrap();

    let alice = Customer::new("alice", 1);
    repo.add(alice.clone()).unwrap();
    assert!(uow.has_pending_changes());
    assert!(uow.commit().await.unwrap());
    assert!(!uow.has_pending_changes());

    let found = repo.find_one(by_id(&alice), None).await.unwrap().unwrap();
    assert_eq!(found.id(), alice.id());
    assert_eq!(found.name, "alice");
    assert_eq!(found.base(), alice.base());

    // 新的工作单元读到同一条已提交记录
    let other = open(&store);
    let reread = other
        .repository::<Customer>()
        .unwrap()
        .find_one(by_id(&alice), Some(QueryOptions::no_tracking()))
        .await
        .unwrap();
    assert_eq!(reread.map(|c| c.name), Some("alice".to_string()));
}

#[tokio::test]
async fn uncommitted_add_is_invisible_and_discarded_on_dispose() {
    let store = InMemoryStore::new();
    let uow = open(&store);
    let repo = uow.repository::<Customer>().unwrap();

    let ghost = Customer::new("ghost", 1);
    repo.add(ghost.clone()).unwrap();
    assert!(repo.find_one(by_id(&ghost), None).await.unwrap().is_none());

    uow.dispose();
    assert_eq!(store.row_count(Customer::TYPE), 0);
    assert_eq!(store.apply_calls(), 0);
}

#[tokio::test]
async fn repository_instances_are_cached_per_entity_type() {
    let store = InMemoryStore::new();
    let uow = open(&store);

    let a = uow.repository::<Customer>().unwrap();
    let b = uow.repository::<Customer>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let orders = uow.repository::<common::Order>().unwrap();
    let orders_again = uow.repository::<common::Order>().unwrap();
    assert!(Arc::ptr_eq(&orders, &orders_again));
    assert_ne!(
        format!("{a:?}"),
        format!("{orders:?}"),
        "different entity types get different repositories"
    );
}

#[tokio::test]
async fn dispose_is_idempotent_and_blocks_further_use() {
    let store = InMemoryStore::new();
    let uow = open(&store);
    let repo = uow.repository::<Customer>().unwrap();

    uow.dispose();
    uow.dispose();
    assert_eq!(uow.state(), UnitOfWorkState::Disposed);
    assert!(uow.is_disposed());

    assert!(matches!(uow.commit().await, Err(DomainError::Disposed)));
    assert!(matches!(uow.rollback().await, Err(DomainError::Disposed)));
    assert!(matches!(
        uow.repository::<Customer>(),
        Err(DomainError::Disposed)
    ));
    assert!(matches!(
        repo.add(Customer::new("late", 1)),
        Err(DomainError::Disposed)
    ));
    assert!(matches!(
        repo.get_all(None).map(|_| ()),
        Err(DomainError::Disposed)
    ));
}

#[tokio::test]
async fn query_built_before_dispose_fails_on_materialization() {
    let store = InMemoryStore::new();
    seed_customers(&store, vec![Customer::new("alice", 1)]).await;

    let uow = open(&store);
    let query = uow.repository::<Customer>().unwrap().get_all(None).unwrap();
    drop(uow);
    assert!(matches!(query.to_list().await, Err(DomainError::Disposed)));
}

#[tokio::test]
async fn commit_without_changes_touches_nothing() {
    let store = InMemoryStore::new();
    let spy = SpyDispatcher::default();
    let uow = open_with(&store, &spy);

    assert!(!uow.commit().await.unwrap());
    assert_eq!(store.apply_calls(), 0);
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn queued_events_are_dispatched_once_in_order() {
    let store = InMemoryStore::new();
    let spy = SpyDispatcher::default();
    let uow = open_with(&store, &spy);
    let repo = uow.repository::<Customer>().unwrap();

    let mut bob = Customer::register("bob", 2);
    bob.rename("robert");
    bob.deactivate();
    repo.add(bob.clone()).unwrap();

    uow.commit().await.unwrap();
    assert_eq!(spy.calls(), 1);
    assert_eq!(
        spy.delivered_for(bob.id()),
        vec![
            "customer.registered",
            "customer.renamed",
            "customer.deactivated"
        ]
    );

    // 第二次提交不再重复分发
    uow.commit().await.unwrap();
    assert_eq!(spy.calls(), 1);
    assert_eq!(spy.delivered_types().len(), 3);
}

#[tokio::test]
async fn events_raised_across_updates_accumulate_until_commit() {
    let store = InMemoryStore::new();
    let [alice]: [Customer; 1] = seed_customers(&store, vec![Customer::new("alice", 1)])
        .await
        .try_into()
        .unwrap();

    let spy = SpyDispatcher::default();
    let uow = open_with(&store, &spy);
    let repo = uow.repository::<Customer>().unwrap();

    let mut loaded = repo.find_one(by_id(&alice), None).await.unwrap().unwrap();
    loaded.rename("alicia");
    repo.update(loaded).unwrap();

    let mut again = repo.find_one(by_id(&alice), None).await.unwrap().unwrap();
    assert_eq!(again.name, "alicia");
    assert!(again.base().unwrap().domain_events().is_empty());
    again.deactivate();
    repo.update(again).unwrap();

    uow.commit().await.unwrap();
    assert_eq!(
        spy.delivered_for(alice.id()),
        vec!["customer.renamed", "customer.deactivated"]
    );
}

#[tokio::test]
async fn updating_the_added_value_again_delivers_each_event_once() {
    let store = InMemoryStore::new();
    let spy = SpyDispatcher::default();
    let uow = open_with(&store, &spy);
    let repo = uow.repository::<Customer>().unwrap();

    let mut bob = Customer::register("bob", 1);
    repo.add(bob.clone()).unwrap();
    bob.rename("robert");
    repo.update(bob.clone()).unwrap();

    uow.commit().await.unwrap();
    assert_eq!(
        spy.delivered_for(bob.id()),
        vec!["customer.registered", "customer.renamed"]
    );
}

#[tokio::test]
async fn events_of_deleted_entities_are_still_dispatched() {
    let store = InMemoryStore::new();
    let [carol]: [Customer; 1] = seed_customers(&store, vec![Customer::new("carol", 3)])
        .await
        .try_into()
        .unwrap();

    let spy = SpyDispatcher::default();
    let uow = open_with(&store, &spy);
    let repo = uow.repository::<Customer>().unwrap();

    let mut loaded = repo.find_one(by_id(&carol), None).await.unwrap().unwrap();
    loaded.deactivate();
    repo.delete(loaded).unwrap();
    uow.commit().await.unwrap();

    assert_eq!(store.row_count(Customer::TYPE), 0);
    assert_eq!(spy.delivered_for(carol.id()), vec!["customer.deactivated"]);
}

#[tokio::test]
async fn failed_flush_reports_store_error_and_dispatches_nothing() {
    let store = InMemoryStore::new();
    let spy = SpyDispatcher::default();
    let uow = open_with(&store, &spy);
    let repo = uow.repository::<Customer>().unwrap();

    repo.add(Customer::register("dave", 1)).unwrap();
    store.fail_next_apply("unique constraint violated");

    let err = uow.commit().await.unwrap_err();
    assert!(err.is_store_failure(), "unexpected error: {err}");
    assert_eq!(spy.calls(), 0);
    assert_eq!(store.row_count(Customer::TYPE), 0);

    // 失败后暂存与跟踪被清空，工作单元仍可继续使用
    assert!(!uow.has_pending_changes());
    assert_eq!(uow.tracked_entities(), 0);
    assert_eq!(uow.state(), UnitOfWorkState::Open);
    assert!(!uow.commit().await.unwrap());
}

#[tokio::test]
async fn dispatch_failure_is_distinct_and_keeps_data_committed() {
    struct Flaky;

    #[async_trait::async_trait]
    impl EventSubscriber for Flaky {
        fn subscriber_name(&self) -> &str {
            "flaky-mailer"
        }

        fn handled_event_type(&self) -> HandledEventType {
            HandledEventType::One("customer.registered".into())
        }

        async fn handle(&self, _event: &dyn DomainEvent) -> anyhow::Result<()> {
            anyhow::bail!("smtp unavailable")
        }
    }

    let store = InMemoryStore::new();
    let dispatcher = SubscriberDispatcher::new(vec![Arc::new(Flaky) as Arc<dyn EventSubscriber>]);
    let uow = UnitOfWork::builder()
        .store(Arc::new(store.clone()))
        .dispatcher(Arc::new(dispatcher))
        .build();
    let repo = uow.repository::<Customer>().unwrap();

    let erin = Customer::register("erin", 1);
    repo.add(erin.clone()).unwrap();

    let err = uow.commit().await.unwrap_err();
    assert!(err.is_dispatch_failure(), "unexpected error: {err}");
    assert!(!err.is_store_failure());
    match &err {
        DomainError::Dispatch {
            entity_id,
            event_type,
            subscriber,
            ..
        } => {
            assert_eq!(entity_id, &erin.id().to_string());
            assert_eq!(event_type, "customer.registered");
            assert_eq!(subscriber, "flaky-mailer");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(store.row_count(Customer::TYPE), 1);
    // 已取出的事件不会重新入队
    assert!(!uow.commit().await.unwrap());
}

#[tokio::test]
async fn spy_dispatch_failure_surfaces_after_durable_write() {
    let store = InMemoryStore::new();
    let spy = SpyDispatcher::default();
    spy.fail_from_now_on();

    let uow = open_with(&store, &spy);
    uow.repository::<Customer>()
        .unwrap()
        .add(Customer::register("frank", 1))
        .unwrap();

    assert!(uow.commit().await.unwrap_err().is_dispatch_failure());
    assert_eq!(spy.calls(), 1);
    assert_eq!(store.row_count(Customer::TYPE), 1);
}

#[tokio::test]
async fn without_dispatcher_commit_succeeds_and_dispatches_nothing() {
    let store = InMemoryStore::new();
    let uow = open(&store);
    uow.repository::<Customer>()
        .unwrap()
        .add(Customer::register("gina", 1))
        .unwrap();

    assert!(uow.commit().await.unwrap());
    assert_eq!(store.row_count(Customer::TYPE), 1);
}

#[tokio::test]
async fn rollback_restores_store_values_and_drops_staged_changes() {
    let store = InMemoryStore::new();
    let [hank]: [Customer; 1] = seed_customers(&store, vec![Customer::new("hank", 1)])
        .await
        .try_into()
        .unwrap();

    let spy = SpyDispatcher::default();
    let uow = open_with(&store, &spy);
    let repo = uow.repository::<Customer>().unwrap();

    let mut loaded = repo.find_one(by_id(&hank), None).await.unwrap().unwrap();
    loaded.rename("henry");
    repo.update(loaded).unwrap();
    repo.add(Customer::register("ivy", 1)).unwrap();
    assert_eq!(uow.tracked_entities(), 2);

    uow.rollback().await.unwrap();
    assert!(!uow.has_pending_changes());
    // 从未落库的新增实体不再被跟踪
    assert_eq!(uow.tracked_entities(), 1);

    let reloaded = repo.find_one(by_id(&hank), None).await.unwrap().unwrap();
    assert_eq!(reloaded.name, "hank");

    assert!(!uow.commit().await.unwrap());
    assert_eq!(spy.calls(), 0);
    assert_eq!(store.row_count(Customer::TYPE), 1);
}

#[tokio::test]
async fn cancelled_token_stops_reads_and_commit_before_io() {
    let store = InMemoryStore::new();
    seed_customers(&store, vec![Customer::new("jack", 1)]).await;

    let token = CancellationToken::new();
    let uow = UnitOfWork::builder()
        .store(Arc::new(store.clone()))
        .cancellation(token.clone())
        .build();
    let repo = uow.repository::<Customer>().unwrap();
    repo.add(Customer::new("kate", 1)).unwrap();

    token.cancel();
    assert!(matches!(
        repo.get_all(None).unwrap().to_list().await,
        Err(DomainError::Cancelled { .. })
    ));
    assert!(matches!(
        uow.commit().await,
        Err(DomainError::Cancelled { .. })
    ));
    assert_eq!(store.apply_calls(), 1, "only the seeding commit reached the store");
    assert_eq!(uow.state(), UnitOfWorkState::Open);
}

#[tokio::test]
async fn ping_reports_store_liveness() {
    let store = InMemoryStore::new();
    let uow = open(&store);
    uow.ping().await.unwrap();

    store.set_offline(true);
    assert!(uow.ping().await.unwrap_err().is_store_failure());

    uow.dispose();
    assert!(matches!(uow.ping().await, Err(DomainError::Disposed)));
}

#[tokio::test]
async fn independent_units_of_work_commit_concurrently() {
    let store = InMemoryStore::new();
    let commits = Arc::new(AtomicUsize::new(0));

    let tasks = (0..8).map(|n| {
        let store = store.clone();
        let commits = commits.clone();
        async move {
            let uow = open(&store);
            let repo = uow.repository::<Customer>().unwrap();
            repo.add(Customer::new(&format!("worker-{n}"), n)).unwrap();
            if uow.commit().await.unwrap() {
                commits.fetch_add(1, Ordering::SeqCst);
            }
        }
    });
    futures_util::future::join_all(tasks).await;

    assert_eq!(commits.load(Ordering::SeqCst), 8);
    assert_eq!(store.row_count(Customer::TYPE), 8);
}
