use hybrid_repo_domain::entity::{Entity, EntityBase};
use hybrid_repo_macros::entity;

#[entity(name = "account")]
struct Account {
    name: String,
}

fn main() {
    let mut account = Account {
        base: EntityBase::new(),
        name: "alice".into(),
    };
    assert_eq!(Account::TYPE, "account");
    assert_eq!(account.id(), account.base.id());
    assert!(account.base().is_some());

    account.base_mut().unwrap().mark_deleted();
    assert!(account.base.is_deleted());

    // base 字段被展平到文档顶层
    let json = serde_json::to_value(&account).unwrap();
    assert_eq!(json["name"], "alice");
    assert_eq!(json["is_deleted"], true);
    let back: Account = serde_json::from_value(json).unwrap();
    assert_eq!(back.base, account.base);
    let _ = format!("{:?}", back.clone());
}
