use hybrid_repo_domain::chrono::Utc;
use hybrid_repo_domain::domain_event::DomainEvent;
use hybrid_repo_macros::domain_event;

#[domain_event]
enum AccountEvent {
    Opened {
        owner: String,
    },
    #[event(event_type = "account.closed")]
    Closed,
}

fn main() {
    let now = Utc::now();
    let opened = AccountEvent::Opened {
        occurred_at: now,
        owner: "alice".into(),
    };
    let closed = AccountEvent::Closed { occurred_at: now };

    assert_eq!(opened.event_type(), "AccountEvent.Opened");
    assert_eq!(closed.event_type(), "account.closed");
    assert_eq!(closed.occurred_at(), now);
    let _ = format!("{:?}", opened.clone());
}
