//! 评分细则存储，按 (scope_key, question_key) 索引

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::GradingError;
use crate::models::rubric::RubricSpec;

#[async_trait]
pub trait RubricStore: Send + Sync {
    async fn get(&self, scope_key: &str, question_key: &str) -> Result<Option<RubricSpec>, GradingError>;

    async fn upsert(
        &self,
        scope_key: &str,
        question_key: &str,
        rubric: RubricSpec,
    ) -> Result<(), GradingError>;

    /// 删除细则，返回是否确实存在
    async fn delete(&self, scope_key: &str, question_key: &str) -> Result<bool, GradingError>;
}

#[derive(Default)]
pub struct InMemoryRubricStore {
    rubrics: RwLock<HashMap<(String, String), RubricSpec>>,
}

impl InMemoryRubricStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RubricStore for InMemoryRubricStore {
    async fn get(&self, scope_key: &str, question_key: &str) -> Result<Option<RubricSpec>, GradingError> {
        let key = (scope_key.to_string(), question_key.to_string());
        Ok(self.rubrics.read().await.get(&key).cloned())
    }

    async fn upsert(
        &self,
        scope_key: &str,
        question_key: &str,
        rubric: RubricSpec,
    ) -> Result<(), GradingError> {
        let key = (scope_key.to_string(), question_key.to_string());
        self.rubrics.write().await.insert(key, rubric);
        Ok(())
    }

    async fn delete(&self, scope_key: &str, question_key: &str) -> Result<bool, GradingError> {
        let key = (scope_key.to_string(), question_key.to_string());
        Ok(self.rubrics.write().await.remove(&key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rubric_validator;
    use serde_json::json;

    fn rubric() -> RubricSpec {
        rubric_validator::validate(&json!({
            "version": "3.0",
            "metadata": {"questionId": "q1", "title": "测试"},
            "strategyType": "point_accumulation",
            "content": {
                "scoringStrategy": {"type": "all"},
                "points": [{"id": "p1", "content": "要点", "keywords": [], "score": 2}]
            },
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        }))
        .into_result()
        .unwrap()
    }

    #[tokio::test]
    async fn test_scoped_by_owner() {
        let store = InMemoryRubricStore::new();
        store.upsert("device:a", "q1", rubric()).await.unwrap();

        assert!(store.get("device:a", "q1").await.unwrap().is_some());
        assert!(store.get("device:b", "q1").await.unwrap().is_none());

        assert!(store.delete("device:a", "q1").await.unwrap());
        assert!(!store.delete("device:a", "q1").await.unwrap());
    }
}
