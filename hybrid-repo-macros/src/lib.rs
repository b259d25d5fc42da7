use proc_macro::TokenStream;

mod domain_event;
mod entity;
mod utils;

/// 实体宏
///
/// 为具名字段结构体实现 `::hybrid_repo_domain::entity::Entity`：
/// - `#[entity(name = "...")]`：实体类型名（存储分表键），默认结构体名；
/// - `base = true|false`：默认 `true`，缺失时在最前追加
///   `#[serde(flatten)] base: EntityBase` 字段，并以其提供 id、时间戳、软删除与事件能力；
///   为 `false` 时结构体需自带 `id: EntityId` 字段；
/// - `auto_includes = path`：返回 `Vec<Include<Self>>` 的函数，作为默认预加载；
/// - `debug = true|false`：是否派生 `Debug`，默认 `true`。
///
/// 同时派生 `Clone`、`serde::Serialize`、`serde::Deserialize`（与已有 derive 合并去重）。
#[proc_macro_attribute]
pub fn entity(attr: TokenStream, item: TokenStream) -> TokenStream {
    entity::expand(attr, item)
}

/// 领域事件宏
///
/// 可用于具名字段结构体或具名字段变体的枚举：
/// - 缺失时追加 `occurred_at: DateTime<Utc>` 字段；
/// - 实现 `::hybrid_repo_domain::domain_event::DomainEvent`；
/// - 结构体：`#[domain_event(event_type = "...")]`，默认结构体名；
/// - 枚举：事件类型默认 `Enum.Variant`，变体可用 `#[event(event_type = "...")]` 覆写；
/// - 派生 `Debug`、`Clone`（与已有 derive 合并去重）。
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_event::expand(attr, item)
}
