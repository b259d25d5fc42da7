use async_trait::async_trait;
use hybrid_repo_domain::entity::{Entity, EntityBase};
use hybrid_repo_domain::error::DomainResult;
use hybrid_repo_domain::query::{Include, Navigation, RelationLoader};
use hybrid_repo_macros::entity;
use std::sync::Arc;

struct Lines;

#[async_trait]
impl Navigation<Order> for Lines {
    fn name(&self) -> &str {
        "lines"
    }

    async fn load(&self, _entities: &mut [Order], _loader: &RelationLoader) -> DomainResult<()> {
        Ok(())
    }
}

fn order_includes() -> Vec<Include<Order>> {
    vec![Arc::new(Lines)]
}

#[entity(name = "order", auto_includes = order_includes)]
struct Order {
    total: u64,
}

fn main() {
    let order = Order {
        base: EntityBase::new(),
        total: 42,
    };
    assert_eq!(order.total, 42);
    let includes = Order::auto_includes();
    assert_eq!(includes.len(), 1);
    assert_eq!(includes[0].name(), "lines");
}
