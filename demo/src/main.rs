use async_trait::async_trait;
use hybrid_repo_application::{RepoServices, RepoSettings, telemetry};
use hybrid_repo_domain::chrono::Utc;
use hybrid_repo_domain::domain_event::DomainEvent;
use hybrid_repo_domain::entity::{Entity, EntityBase};
use hybrid_repo_domain::eventing::{EventSubscriber, HandledEventType, SubscriberDispatcher};
use hybrid_repo_domain::persist::InMemoryStore;
use hybrid_repo_domain::query::{Predicate, QueryOptions};
use hybrid_repo_macros::{domain_event, entity};
use std::sync::Arc;
use std::time::Duration;

#[entity(name = "product")]
struct Product {
    sku: String,
    stock: u32,
}

#[domain_event]
enum ProductEvent {
    #[event(event_type = "product.listed")]
    Listed { sku: String },
    #[event(event_type = "product.restocked")]
    Restocked { sku: String, added: u32 },
}

impl Product {
    fn list(sku: &str, stock: u32) -> Self {
        let mut product = Self {
            base: EntityBase::new(),
            sku: sku.to_string(),
            stock,
        };
        product.base.add_domain_event(ProductEvent::Listed {
            occurred_at: Utc::now(),
            sku: sku.to_string(),
        });
        product
    }

    fn restock(&mut self, added: u32) {
        self.stock += added;
        self.base.add_domain_event(ProductEvent::Restocked {
            occurred_at: Utc::now(),
            sku: self.sku.clone(),
            added,
        });
    }
}

struct AuditLog;

#[async_trait]
impl EventSubscriber for AuditLog {
    fn subscriber_name(&self) -> &str {
        "audit-log"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::All
    }

    async fn handle(&self, event: &dyn DomainEvent) -> anyhow::Result<()> {
        tracing::info!(event_type = event.event_type(), at = %event.occurred_at(), "audit");
        Ok(())
    }
}

const SETTINGS: &str = r#"
provider = "PostgreSQL"
health_check = "Active"
health_check_interval_secs = 1

[connection_strings]
PostgresConnection = "postgres://demo@localhost/demo"
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = RepoSettings::from_toml_str(SETTINGS)?.validate()?;
    let dispatcher = SubscriberDispatcher::new(vec![Arc::new(AuditLog) as Arc<dyn EventSubscriber>]);
    let services =
        RepoServices::from_config(&config, Arc::new(InMemoryStore::new()), Some(Arc::new(dispatcher)));
    let health = services.start_health_check();

    {
        let uow = services.begin();
        let products = uow.repository::<Product>()?;
        products.add_range(vec![Product::list("kb-01", 3), Product::list("ms-02", 0)])?;
        uow.commit().await?;
    }

    {
        let uow = services.begin();
        let products = uow.repository::<Product>()?;
        let out_of_stock = Predicate::labeled("stock == 0", |p: &Product| p.stock == 0);
        for mut product in products.find(out_of_stock, None)?.to_list().await? {
            product.restock(10);
            products.update(product)?;
        }
        uow.commit().await?;
    }

    let uow = services.begin();
    let page = uow
        .repository::<Product>()?
        .get_all(Some(QueryOptions::no_tracking()))?
        .order_by(|p: &Product| p.sku.clone())
        .to_list()
        .await?;
    for product in &page {
        tracing::info!(
            id = %product.id(),
            sku = %product.sku,
            stock = product.stock,
            updated_at = ?product.base().and_then(|b| b.updated_at()),
            "product"
        );
    }

    tokio::time::sleep(Duration::from_millis(1500)).await;
    if let Some(handle) = health {
        tracing::info!(status = ?handle.status().snapshot(), "health");
        handle.shutdown();
        handle.join().await;
    }
    Ok(())
}
