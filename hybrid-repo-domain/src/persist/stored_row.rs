use crate::{
    entity::{Entity, EntityId},
    error::{DomainError, DomainResult as Result},
};
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 存储层的一行：实体类型 + 标识 + JSON 文档
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct StoredRow {
    #[builder(into)]
    entity_type: String,
    id: EntityId,
    payload: Value,
}

impl StoredRow {
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// 从实体实例创建存储行
    pub fn encode<T>(entity: &T) -> Result<Self>
    where
        T: Entity,
    {
        Ok(Self {
            entity_type: T::TYPE.to_string(),
            id: entity.id(),
            payload: serde_json::to_value(entity)?,
        })
    }

    /// 将存储行反序列化为实体实例
    pub fn decode<T>(&self) -> Result<T>
    where
        T: Entity,
    {
        if T::TYPE != self.entity_type {
            return Err(DomainError::InvalidState {
                reason: format!(
                    "row type mismatch: expected {}, found {}",
                    T::TYPE,
                    self.entity_type
                ),
            });
        }

        let entity = serde_json::from_value(self.payload.clone())?;
        Ok(entity)
    }
}

/// 一次提交中的单条变更
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Insert(StoredRow),
    Update(StoredRow),
    Delete { entity_type: String, id: EntityId },
}

impl RowChange {
    pub fn entity_type(&self) -> &str {
        match self {
            RowChange::Insert(row) | RowChange::Update(row) => row.entity_type(),
            RowChange::Delete { entity_type, .. } => entity_type,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            RowChange::Insert(row) | RowChange::Update(row) => row.id(),
            RowChange::Delete { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RowChange::Insert(_) => "insert",
            RowChange::Update(_) => "update",
            RowChange::Delete { .. } => "delete",
        }
    }
}
