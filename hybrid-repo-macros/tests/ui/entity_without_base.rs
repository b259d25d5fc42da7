use hybrid_repo_domain::entity::{Entity, EntityId};
use hybrid_repo_macros::entity;

#[entity(base = false, debug = false)]
#[derive(PartialEq)]
struct Tag {
    id: EntityId,
    label: String,
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag({})", self.label)
    }
}

fn main() {
    let tag = Tag {
        id: EntityId::new(),
        label: "rust".into(),
    };
    assert_eq!(Tag::TYPE, "Tag");
    assert_eq!(tag.id(), tag.id);
    assert!(tag.base().is_none());
    assert!(Tag::auto_includes().is_empty());
    assert_eq!(format!("{tag:?}"), "Tag(rust)");
    assert_eq!(tag.clone(), tag);
}
