//! 判定结果解析
//!
//! 模型不是遵守语法的可信对端，所以这里宁可宽松也不严格：
//! - 第一阶段 [`extract_json_span`]：去掉 Markdown 代码块，取第一个 `{` 到最后一个 `}`
//! - 第二阶段 [`coerce_judgment`]：对解析出的 JSON 逐字段强制转换并补默认值
//!
//! 两个阶段可以分别测试，[`parse`] 把它们串起来。

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseError;
use crate::models::judgment::{CheckpointVerdict, DimensionVerdict, Judgment, DEFAULT_CONFIDENCE};

/// 去掉 Markdown 代码块标记（连同紧跟的语言名，如 ```json）
fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = rest[pos + 3..]
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    }
    out.push_str(rest);
    out
}

/// 解析模型输出为判定结果
pub fn parse(raw_text: &str) -> Result<Judgment, ParseError> {
    let span = extract_json_span(raw_text)?;
    let value: Value =
        serde_json::from_str(&span).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    coerce_judgment(&value)
}

/// 第一阶段：定位候选 JSON 片段
///
/// 贪婪匹配第一个 `{` 和最后一个 `}`，容忍 JSON 前后的说明文字。
pub fn extract_json_span(raw_text: &str) -> Result<String, ParseError> {
    let stripped = strip_code_fences(raw_text);
    let start = stripped.find('{').ok_or(ParseError::NoJsonObject)?;
    let end = stripped.rfind('}').ok_or(ParseError::NoJsonObject)?;
    if end < start {
        return Err(ParseError::NoJsonObject);
    }
    Ok(stripped[start..=end].to_string())
}

/// 第二阶段：结构化强制转换
///
/// - `confidence` 缺失或不是数字时取 0.7，超出 [0, 1] 时截断
/// - `needsReview` 只有布尔 `true` 才算
/// - `checkpoints` / `dimensions` 只有是对象时才保留
pub fn coerce_judgment(value: &Value) -> Result<Judgment, ParseError> {
    let obj = value.as_object().ok_or(ParseError::NotAnObject)?;

    let confidence = obj
        .get("confidence")
        .and_then(number_of)
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE);

    let needs_review = matches!(
        obj.get("needsReview").or_else(|| obj.get("needs_review")),
        Some(Value::Bool(true))
    );

    let checkpoints = obj
        .get("checkpoints")
        .and_then(Value::as_object)
        .map(coerce_checkpoints)
        .unwrap_or_default();

    let dimensions = obj
        .get("dimensions")
        .and_then(Value::as_object)
        .map(coerce_dimensions)
        .unwrap_or_default();

    let notes = obj
        .get("notes")
        .or_else(|| obj.get("comment"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    debug!(
        "判定结果: confidence={}, checkpoints={}, dimensions={}",
        confidence,
        checkpoints.len(),
        dimensions.len()
    );

    Ok(Judgment {
        confidence,
        needs_review,
        checkpoints,
        dimensions,
        notes,
    })
}

fn coerce_checkpoints(map: &Map<String, Value>) -> BTreeMap<String, CheckpointVerdict> {
    map.iter()
        .map(|(id, entry)| {
            let verdict = match entry {
                Value::Object(fields) => CheckpointVerdict {
                    met: matches!(fields.get("met"), Some(Value::Bool(true))),
                    evidence: text_of(fields.get("evidence")),
                },
                // 简写形式 {"p1": true}
                Value::Bool(met) => CheckpointVerdict {
                    met: *met,
                    evidence: None,
                },
                _ => CheckpointVerdict::default(),
            };
            (id.clone(), verdict)
        })
        .collect()
}

fn coerce_dimensions(map: &Map<String, Value>) -> BTreeMap<String, DimensionVerdict> {
    map.iter()
        .filter_map(|(id, entry)| {
            let fields = entry.as_object()?;
            let verdict = DimensionVerdict {
                level: text_of(fields.get("level")),
                score: fields
                    .get("score")
                    .and_then(number_of)
                    .filter(|s| s.is_finite()),
                evidence: text_of(fields.get("evidence")),
            };
            Some((id.clone(), verdict))
        })
        .collect()
}

/// 数字或数字字符串
fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
