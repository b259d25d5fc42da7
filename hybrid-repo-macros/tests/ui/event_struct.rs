use hybrid_repo_domain::chrono::Utc;
use hybrid_repo_domain::domain_event::DomainEvent;
use hybrid_repo_macros::domain_event;

#[domain_event(event_type = "order.placed")]
struct OrderPlaced {
    total: u64,
}

#[domain_event]
struct OrderShipped {
    carrier: String,
}

fn main() {
    let now = Utc::now();
    let placed = OrderPlaced {
        occurred_at: now,
        total: 10,
    };
    assert_eq!(placed.event_type(), "order.placed");
    assert_eq!(placed.occurred_at(), now);
    assert_eq!(placed.clone().total, 10);

    let shipped = OrderShipped {
        occurred_at: now,
        carrier: "ups".into(),
    };
    assert_eq!(shipped.event_type(), "OrderShipped");

    let erased: &dyn DomainEvent = &shipped;
    assert_eq!(erased.downcast_ref::<OrderShipped>().unwrap().carrier, "ups");
    assert!(!erased.is::<OrderPlaced>());
}
