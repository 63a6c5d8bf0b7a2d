//! 评分记录存储
//!
//! 只负责"保存一条评分记录"，不关心流程。

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::GradingError;
use crate::models::identity::GradingRecord;

#[async_trait]
pub trait GradingRecordStore: Send + Sync {
    async fn save(&self, record: &GradingRecord) -> Result<(), GradingError>;
}

/// 追加写入 JSON Lines 文件
///
/// 每条记录一行，文件不存在时自动创建。
pub struct JsonlRecordStore {
    record_file_path: String,
    // 串行化并发写入，避免两行交错
    write_lock: Mutex<()>,
}

impl JsonlRecordStore {
    pub fn new() -> Self {
        Self::with_path("grading_records.jsonl")
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            record_file_path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &str {
        &self.record_file_path
    }
}

impl Default for JsonlRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GradingRecordStore for JsonlRecordStore {
    /// 写入评分记录
    ///
    /// # 参数
    /// - `record`: 评分记录
    ///
    /// # 返回
    /// 序列化或写文件失败时返回 `GradingError::Persistence`
    async fn save(&self, record: &GradingRecord) -> Result<(), GradingError> {
        debug!(
            "写入评分记录: {} | 题目 {} | 得分 {}/{}",
            record.scope_key,
            record.question_key.as_deref().unwrap_or("-"),
            record.score,
            record.max_score
        );

        let mut line = serde_json::to_string(record)
            .map_err(|e| GradingError::persistence(format!("评分记录序列化失败: {}", e)))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.record_file_path)
            .await
            .map_err(|e| {
                GradingError::persistence(format!("无法打开 {}: {}", self.record_file_path, e))
            })?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| GradingError::persistence(format!("写入 {} 失败: {}", self.record_file_path, e)))?;

        Ok(())
    }
}

/// 进程内记录存储，用于测试和嵌入式调用
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<GradingRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<GradingRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl GradingRecordStore for InMemoryRecordStore {
    async fn save(&self, record: &GradingRecord) -> Result<(), GradingError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(score: f64) -> GradingRecord {
        GradingRecord {
            scope_key: "device:abc".to_string(),
            question_key: Some("q1".to_string()),
            student_name: Some("张三".to_string()),
            score,
            max_score: 10.0,
            breakdown: Vec::new(),
            comment: "不错".to_string(),
            device_id: Some("abc".to_string()),
            graded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let store = JsonlRecordStore::with_path(path.to_string_lossy().to_string());

        store.save(&record(6.0)).await.unwrap();
        store.save(&record(8.0)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: GradingRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.score, 8.0);
        assert_eq!(second.student_name.as_deref(), Some("张三"));
    }

    #[tokio::test]
    async fn test_unwritable_path_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("records.jsonl");
        let store = JsonlRecordStore::with_path(path.to_string_lossy().to_string());

        let err = store.save(&record(1.0)).await.unwrap_err();
        assert_eq!(err.code(), "persistence_failed");
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryRecordStore::new();
        store.save(&record(3.0)).await.unwrap();
        assert_eq!(store.records().await.len(), 1);
    }
}
