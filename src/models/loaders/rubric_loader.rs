use crate::models::rubric::RubricSpec;
use crate::services::rubric_validator;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 JSON 文件加载评分细则并校验
///
/// 校验失败时返回的错误包含全部问题列表
pub async fn load_rubric_file(rubric_file_path: &Path) -> Result<RubricSpec> {
    let content = fs::read_to_string(rubric_file_path)
        .await
        .with_context(|| format!("无法读取评分细则文件: {}", rubric_file_path.display()))?;

    let raw: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("无法解析评分细则 JSON: {}", rubric_file_path.display()))?;

    let rubric = rubric_validator::validate(&raw)
        .into_result()
        .with_context(|| format!("评分细则校验失败: {}", rubric_file_path.display()))?;

    Ok(rubric)
}

/// 从文件夹中加载所有评分细则
///
/// 单个文件失败只记录警告，不影响其他文件
pub async fn load_rubric_folder(folder_path: &str) -> Result<Vec<(PathBuf, RubricSpec)>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut rubrics = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            tracing::info!(
                "正在加载评分细则: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );

            match load_rubric_file(&path).await {
                Ok(rubric) => {
                    tracing::info!(
                        "成功加载 {} ({})",
                        rubric.question_id(),
                        rubric.strategy().type_name()
                    );
                    rubrics.push((path, rubric));
                }
                Err(e) => {
                    tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
                }
            }
        }
    }

    rubrics.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(rubrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUBRIC: &str = r#"{
        "version": "3.0",
        "metadata": {"questionId": "q-1", "title": "简答题"},
        "strategyType": "point_accumulation",
        "content": {
            "scoringStrategy": {"type": "weighted"},
            "points": [{"id": "p1", "content": "要点一", "keywords": [], "score": 2}]
        },
        "createdAt": "2025-01-01T00:00:00Z",
        "updatedAt": "2025-01-01T00:00:00Z"
    }"#;

    #[tokio::test]
    async fn test_load_rubric_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q1.json");
        std::fs::write(&path, RUBRIC).unwrap();

        let rubric = load_rubric_file(&path).await.unwrap();
        assert_eq!(rubric.question_id(), "q-1");
    }

    #[tokio::test]
    async fn test_load_folder_skips_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), RUBRIC).unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"version": "2.0"}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let rubrics = load_rubric_folder(dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(rubrics.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_folder_is_error() {
        assert!(load_rubric_folder("/definitely/not/here").await.is_err());
    }
}
