#![allow(dead_code)]

use async_trait::async_trait;
use hybrid_repo_domain::chrono::Utc;
use hybrid_repo_domain::domain_event::EntityEvents;
use hybrid_repo_domain::entity::{Entity, EntityBase, EntityId};
use hybrid_repo_domain::error::{DomainError, DomainResult};
use hybrid_repo_domain::eventing::DomainEventDispatcher;
use hybrid_repo_domain::persist::InMemoryStore;
use hybrid_repo_domain::query::{Include, Navigation, Predicate, RelationLoader};
use hybrid_repo_domain::unit_of_work::UnitOfWork;
use hybrid_repo_macros::{domain_event, entity};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[entity(name = "customer", auto_includes = customer_includes)]
pub struct Customer {
    pub name: String,
    pub tier: u32,
    #[serde(skip)]
    pub orders: Vec<Order>,
}

#[entity(name = "order")]
pub struct Order {
    pub customer_id: EntityId,
    pub total: u64,
}

#[entity(name = "tag", base = false)]
pub struct Tag {
    pub id: EntityId,
    pub label: String,
}

#[domain_event]
pub enum CustomerEvent {
    #[event(event_type = "customer.registered")]
    Registered { name: String },
    #[event(event_type = "customer.renamed")]
    Renamed { to: String },
    #[event(event_type = "customer.deactivated")]
    Deactivated,
}

impl Customer {
    pub fn new(name: &str, tier: u32) -> Self {
        Self {
            base: EntityBase::new(),
            name: name.to_string(),
            tier,
            orders: Vec::new(),
        }
    }

    pub fn register(name: &str, tier: u32) -> Self {
        let mut customer = Self::new(name, tier);
        customer.base.add_domain_event(CustomerEvent::Registered {
            occurred_at: Utc::now(),
            name: name.to_string(),
        });
        customer
    }

    pub fn rename(&mut self, to: &str) {
        self.name = to.to_string();
        self.base.add_domain_event(CustomerEvent::Renamed {
            occurred_at: Utc::now(),
            to: to.to_string(),
        });
    }

    pub fn deactivate(&mut self) {
        self.base.add_domain_event(CustomerEvent::Deactivated {
            occurred_at: Utc::now(),
        });
    }

    pub fn named(name: &'static str) -> Predicate<Customer> {
        Predicate::labeled(format!("name == {name}"), move |c: &Customer| c.name == name)
    }
}

impl Order {
    pub fn new(customer: &Customer, total: u64) -> Self {
        Self {
            base: EntityBase::new(),
            customer_id: customer.id(),
            total,
        }
    }
}

impl Tag {
    pub fn new(label: &str) -> Self {
        Self {
            id: EntityId::new(),
            label: label.to_string(),
        }
    }
}

/// 客户的订单关联
pub struct CustomerOrders;

#[async_trait]
impl Navigation<Customer> for CustomerOrders {
    fn name(&self) -> &str {
        "orders"
    }

    async fn load(&self, customers: &mut [Customer], loader: &RelationLoader) -> DomainResult<()> {
        let owners: Vec<EntityId> = customers.iter().map(Entity::id).collect();
        let orders = loader
            .load(&Predicate::new(move |o: &Order| {
                owners.contains(&o.customer_id)
            }))
            .await?;
        for customer in customers.iter_mut() {
            customer.orders = orders
                .iter()
                .filter(|o| o.customer_id == customer.id())
                .cloned()
                .collect();
        }
        Ok(())
    }
}

pub fn orders_include() -> Include<Customer> {
    Arc::new(CustomerOrders)
}

fn customer_includes() -> Vec<Include<Customer>> {
    vec![orders_include()]
}

/// 记录每次分发调用与事件类型的分发器
#[derive(Clone, Default)]
pub struct SpyDispatcher {
    calls: Arc<AtomicUsize>,
    delivered: Arc<Mutex<Vec<(EntityId, String)>>>,
    fail: Arc<AtomicBool>,
}

impl SpyDispatcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered_types(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn delivered_for(&self, id: EntityId) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn fail_from_now_on(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DomainEventDispatcher for SpyDispatcher {
    async fn dispatch_and_clear(&self, entities: Vec<EntityEvents>) -> DomainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut delivered = self.delivered.lock().unwrap();
            for batch in &entities {
                for event in batch.events() {
                    delivered.push((batch.entity_id(), event.event_type().to_string()));
                }
            }
        }
        if self.fail.load(Ordering::SeqCst) {
            let first = entities.first();
            return Err(DomainError::Dispatch {
                entity_id: first.map(|b| b.entity_id().to_string()).unwrap_or_default(),
                event_type: first
                    .and_then(|b| b.events().first())
                    .map(|e| e.event_type().to_string())
                    .unwrap_or_default(),
                subscriber: "spy".into(),
                reason: "subscriber unavailable".into(),
            });
        }
        Ok(())
    }
}

pub fn open(store: &InMemoryStore) -> UnitOfWork {
    UnitOfWork::builder().store(Arc::new(store.clone())).build()
}

pub fn open_with(store: &InMemoryStore, dispatcher: &SpyDispatcher) -> UnitOfWork {
    UnitOfWork::builder()
        .store(Arc::new(store.clone()))
        .dispatcher(Arc::new(dispatcher.clone()))
        .build()
}

/// 预置一批客户并提交
pub async fn seed_customers(store: &InMemoryStore, customers: Vec<Customer>) -> Vec<Customer> {
    let uow = open(store);
    let repo = uow.repository::<Customer>().unwrap();
    repo.add_range(customers.clone()).unwrap();
    uow.commit().await.unwrap();
    customers
}
