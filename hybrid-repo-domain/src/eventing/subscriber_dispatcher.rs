//! 基于订阅者注册表的分发器（SubscriberDispatcher）
//!
//! - 按事件类型匹配订阅者，`All` 订阅者接收全部事件；
//! - 按实体、事件、订阅者注册顺序依次投递并逐个等待；
//! - 首个失败即停止并返回 `DomainError::Dispatch`，不会重新入队；
//! - 所有投递与失败都记录日志。
//!
use super::{DomainEventDispatcher, EventSubscriber, HandledEventType};
use crate::{
    domain_event::EntityEvents,
    error::{DomainError, DomainResult},
};
use async_trait::async_trait;
use bon::Builder;
use std::{collections::HashMap, sync::Arc};

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::subscriber_dispatcher_builder::{IsUnset, SetRegistry, State as BuilderState};

#[derive(Builder)]
pub struct SubscriberDispatcher {
    #[builder(setters(vis = "pub(crate)"))]
    registry: SubscriberRegistry,
}

// 接收订阅者列表，内部转换为注册表；仅当 `registry` 尚未设置时可调用
impl<S: BuilderState> SubscriberDispatcherBuilder<S> {
    pub fn subscribers(
        self,
        subscribers: Vec<Arc<dyn EventSubscriber>>,
    ) -> SubscriberDispatcherBuilder<SetRegistry<S>>
    where
        <S as BuilderState>::Registry: IsUnset,
    {
        self.registry(SubscriberRegistry::new(subscribers))
    }
}

impl SubscriberDispatcher {
    pub fn new(subscribers: Vec<Arc<dyn EventSubscriber>>) -> Self {
        Self {
            registry: SubscriberRegistry::new(subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len
    }
}

#[async_trait]
impl DomainEventDispatcher for SubscriberDispatcher {
    async fn dispatch_and_clear(&self, entities: Vec<EntityEvents>) -> DomainResult<()> {
        for batch in entities {
            for event in batch.events() {
                let matched = self.registry.matching(event.event_type());
                if matched.is_empty() {
                    tracing::debug!(
                        entity_type = batch.entity_type(),
                        entity_id = %batch.entity_id(),
                        event_type = event.event_type(),
                        "no subscriber for domain event"
                    );
                    continue;
                }

                for subscriber in matched {
                    if let Err(err) = subscriber.handle(event.as_ref()).await {
                        tracing::error!(
                            entity_type = batch.entity_type(),
                            entity_id = %batch.entity_id(),
                            event_type = event.event_type(),
                            subscriber = subscriber.subscriber_name(),
                            error = %err,
                            "domain event subscriber failed"
                        );
                        return Err(DomainError::Dispatch {
                            entity_id: batch.entity_id().to_string(),
                            event_type: event.event_type().to_string(),
                            subscriber: subscriber.subscriber_name().to_string(),
                            reason: format!("{err:#}"),
                        });
                    }
                    tracing::debug!(
                        entity_id = %batch.entity_id(),
                        event_type = event.event_type(),
                        subscriber = subscriber.subscriber_name(),
                        "domain event delivered"
                    );
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SubscriberRegistry {
    by_type: HashMap<String, Vec<(usize, Arc<dyn EventSubscriber>)>>,
    all: Vec<(usize, Arc<dyn EventSubscriber>)>,
    len: usize,
}

impl SubscriberRegistry {
    fn new(subscribers: Vec<Arc<dyn EventSubscriber>>) -> Self {
        let mut by_type: HashMap<String, Vec<(usize, Arc<dyn EventSubscriber>)>> = HashMap::new();
        let mut all = Vec::new();
        let len = subscribers.len();

        for (position, s) in subscribers.into_iter().enumerate() {
            match s.handled_event_type() {
                HandledEventType::All => all.push((position, s)),
                HandledEventType::One(t) => {
                    by_type.entry(t).or_default().push((position, s));
                }
                HandledEventType::Many(ts) => {
                    for t in ts {
                        by_type.entry(t).or_default().push((position, s.clone()));
                    }
                }
            }
        }

        Self { by_type, all, len }
    }

    /// 匹配的订阅者，保持注册顺序
    fn matching(&self, event_type: &str) -> Vec<Arc<dyn EventSubscriber>> {
        let mut merged: Vec<(usize, Arc<dyn EventSubscriber>)> = Vec::new();
        if let Some(list) = self.by_type.get(event_type) {
            merged.extend(list.iter().cloned());
        }
        merged.extend(self.all.iter().cloned());
        merged.sort_by_key(|(position, _)| *position);
        merged.dedup_by_key(|(position, _)| *position);
        merged.into_iter().map(|(_, s)| s).collect()
    }
}
