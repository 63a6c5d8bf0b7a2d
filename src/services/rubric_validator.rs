//! 评分细则校验
//!
//! 严格校验 v3 文档：
//! 1. 结构校验（未知字段一律拒绝）
//! 2. `content` 形状必须与 `strategyType` 一致（两半各自合法也不行）
//! 3. 顶层和 `content` 内出现旧版字段即拒绝
//!
//! 所有问题一次性收集返回，方便界面一起展示；任何问题都会让整个文档失败，不做部分接受。

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ValidationError, ValidationIssue};
use crate::models::rubric::{
    Constraint, Dimension, Level, PointAccumulationContent, RubricMatrixContent, RubricMetadata,
    RubricPoint, RubricSpec, RubricStrategy, ScoringStrategy, SequentialLogicContent,
    StrategyKind, StrategyType, RUBRIC_VERSION,
};

/// 顶层允许的字段
const TOP_LEVEL_KEYS: &[&str] = &[
    "version",
    "metadata",
    "strategyType",
    "content",
    "constraints",
    "createdAt",
    "updatedAt",
];

/// 旧版扁平格式的字段
const LEGACY_FIELDS: &[&str] = &[
    "totalScore",
    "maxScore",
    "answerPoints",
    "scoringRules",
    "scoreRules",
    "gradingNotes",
    "standardAnswer",
    "alternativeAnswers",
    "keyPoints",
    "rubricType",
];

/// 决定 content 形状的字段
const SHAPE_KEYS: &[(&str, StrategyType)] = &[
    ("points", StrategyType::PointAccumulation),
    ("steps", StrategyType::SequentialLogic),
    ("dimensions", StrategyType::RubricMatrix),
];

/// 校验报告
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub rubric: Option<RubricSpec>,
}

impl ValidationReport {
    fn rejected(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: false,
            errors,
            rubric: None,
        }
    }

    pub fn into_result(self) -> Result<RubricSpec, ValidationError> {
        match self.rubric {
            Some(rubric) if self.valid => Ok(rubric),
            _ => Err(ValidationError {
                issues: self.errors,
            }),
        }
    }
}

/// 校验原始 JSON
pub fn validate(raw: &Value) -> ValidationReport {
    let mut issues = Vec::new();

    let Some(obj) = raw.as_object() else {
        return ValidationReport::rejected(vec![ValidationIssue::new("", "评分细则必须是 JSON 对象")]);
    };

    check_keys(obj, "", TOP_LEVEL_KEYS, LEGACY_FIELDS, &mut issues);

    match obj.get("version") {
        Some(Value::String(v)) if v == RUBRIC_VERSION => {}
        Some(other) => issues.push(ValidationIssue::new(
            "version",
            format!("版本必须为 \"{}\"，实际为 {}", RUBRIC_VERSION, other),
        )),
        None => issues.push(ValidationIssue::new("version", "缺少字段")),
    }

    let metadata = required(obj, "metadata", &mut issues)
        .and_then(|v| parse_value::<RubricMetadata>(v, "metadata", &mut issues))
        .filter(|metadata| check_metadata(metadata, &mut issues));

    let strategy_type = match required(obj, "strategyType", &mut issues) {
        Some(Value::String(s)) => {
            let parsed = StrategyType::parse(s);
            if parsed.is_none() {
                issues.push(ValidationIssue::new(
                    "strategyType",
                    format!("未知的策略类型: {}", s),
                ));
            }
            parsed
        }
        Some(_) => {
            issues.push(ValidationIssue::new("strategyType", "必须是字符串"));
            None
        }
        None => None,
    };

    let strategy = match required(obj, "content", &mut issues) {
        Some(Value::Object(content)) => {
            validate_content(content, strategy_type, &mut issues)
        }
        Some(_) => {
            issues.push(ValidationIssue::new("content", "必须是对象"));
            None
        }
        None => None,
    };

    let constraints = match obj.get("constraints") {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(items)) => validate_constraints(items, &mut issues),
        Some(_) => {
            issues.push(ValidationIssue::new("constraints", "必须是数组"));
            None
        }
    };

    let created_at = required(obj, "createdAt", &mut issues)
        .and_then(|v| parse_value::<DateTime<Utc>>(v, "createdAt", &mut issues));
    let updated_at = required(obj, "updatedAt", &mut issues)
        .and_then(|v| parse_value::<DateTime<Utc>>(v, "updatedAt", &mut issues));
    if let (Some(created), Some(updated)) = (created_at, updated_at) {
        if updated < created {
            issues.push(ValidationIssue::new("updatedAt", "不能早于 createdAt"));
        }
    }

    if !issues.is_empty() {
        return ValidationReport::rejected(issues);
    }

    match (metadata, strategy, constraints, created_at, updated_at) {
        (Some(metadata), Some(strategy), Some(constraints), Some(created_at), Some(updated_at)) => {
            ValidationReport {
                valid: true,
                errors: Vec::new(),
                rubric: Some(RubricSpec {
                    version: RUBRIC_VERSION.to_string(),
                    metadata,
                    strategy,
                    constraints,
                    created_at,
                    updated_at,
                }),
            }
        }
        _ => ValidationReport::rejected(vec![ValidationIssue::new("", "评分细则不完整")]),
    }
}

fn validate_content(
    content: &Map<String, Value>,
    strategy_type: Option<StrategyType>,
    issues: &mut Vec<ValidationIssue>,
) -> Option<RubricStrategy> {
    let legacy: Vec<&str> = LEGACY_FIELDS
        .iter()
        .copied()
        .filter(|key| *key != "totalScore")
        .collect();

    let Some(strategy_type) = strategy_type else {
        // 类型未知时仍然报告旧版字段
        for key in content.keys() {
            if legacy.contains(&key.as_str()) {
                issues.push(legacy_issue(&format!("content.{}", key)));
            }
        }
        return None;
    };

    let before = issues.len();

    for (shape_key, owner) in SHAPE_KEYS {
        if *owner != strategy_type && content.contains_key(*shape_key) {
            issues.push(ValidationIssue::new(
                format!("content.{}", shape_key),
                format!(
                    "content 形状与 strategyType={} 不匹配（{} 属于 {}）",
                    strategy_type.as_str(),
                    shape_key,
                    owner.as_str()
                ),
            ));
        }
    }

    let foreign_shape: Vec<&str> = SHAPE_KEYS
        .iter()
        .filter(|(_, owner)| *owner != strategy_type)
        .map(|(key, _)| *key)
        .collect();
    for key in content.keys() {
        if legacy.contains(&key.as_str()) {
            issues.push(legacy_issue(&format!("content.{}", key)));
        } else if !strategy_type.content_keys().contains(&key.as_str())
            && !foreign_shape.contains(&key.as_str())
        {
            issues.push(ValidationIssue::new(format!("content.{}", key), "未知字段"));
        }
    }

    let total_score = match content.get("totalScore") {
        None | Some(Value::Null) => None,
        Some(v) => parse_value::<f64>(v, "content.totalScore", issues)
            .filter(|score| check_non_negative(*score, "content.totalScore", issues)),
    };

    let strategy = match strategy_type {
        StrategyType::PointAccumulation => {
            let scoring_strategy = parse_scoring_strategy(content, issues);
            let points = parse_points(content, "points", issues);
            match (scoring_strategy, points) {
                (Some(scoring_strategy), Some(points)) => {
                    check_pick_n(&scoring_strategy, issues);
                    Some(RubricStrategy::PointAccumulation(PointAccumulationContent {
                        scoring_strategy,
                        points,
                        total_score,
                    }))
                }
                _ => None,
            }
        }
        StrategyType::SequentialLogic => {
            let scoring_strategy = parse_scoring_strategy(content, issues);
            let steps = parse_points(content, "steps", issues);
            let require_order = match content.get("requireOrder") {
                None | Some(Value::Null) => None,
                Some(v) => parse_value::<bool>(v, "content.requireOrder", issues),
            };
            match (scoring_strategy, steps) {
                (Some(scoring_strategy), Some(steps)) => {
                    check_pick_n(&scoring_strategy, issues);
                    Some(RubricStrategy::SequentialLogic(SequentialLogicContent {
                        scoring_strategy,
                        steps,
                        require_order,
                        total_score,
                    }))
                }
                _ => None,
            }
        }
        StrategyType::RubricMatrix => parse_dimensions(content, issues).map(|dimensions| {
            RubricStrategy::RubricMatrix(RubricMatrixContent {
                dimensions,
                total_score,
            })
        }),
    };

    if issues.len() > before {
        None
    } else {
        strategy
    }
}

fn parse_scoring_strategy(
    content: &Map<String, Value>,
    issues: &mut Vec<ValidationIssue>,
) -> Option<ScoringStrategy> {
    match content.get("scoringStrategy") {
        Some(v) => parse_value::<ScoringStrategy>(v, "content.scoringStrategy", issues),
        None => {
            issues.push(ValidationIssue::new("content.scoringStrategy", "缺少字段"));
            None
        }
    }
}

fn check_pick_n(strategy: &ScoringStrategy, issues: &mut Vec<ValidationIssue>) {
    if let Some(value) = strategy.point_value {
        check_non_negative(value, "content.scoringStrategy.pointValue", issues);
    }
    if strategy.kind != StrategyKind::PickN {
        return;
    }
    // 不写 maxPoints 表示不限点数；超过得分点数量同样等于不限
    if strategy.max_points == Some(0) {
        issues.push(ValidationIssue::new(
            "content.scoringStrategy.maxPoints",
            "必须大于 0",
        ));
    }
}

fn parse_points(
    content: &Map<String, Value>,
    key: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Vec<RubricPoint>> {
    let path = format!("content.{}", key);
    let items = match content.get(key) {
        Some(Value::Array(items)) => items,
        Some(_) => {
            issues.push(ValidationIssue::new(&path, "必须是数组"));
            return None;
        }
        None => {
            issues.push(ValidationIssue::new(&path, "缺少字段"));
            return None;
        }
    };
    if items.is_empty() {
        issues.push(ValidationIssue::new(&path, "至少需要一个得分点"));
        return None;
    }

    let before = issues.len();
    let mut seen = HashSet::new();
    let mut points = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);
        let Some(point) = parse_value::<RubricPoint>(item, &item_path, issues) else {
            continue;
        };
        if point.id.trim().is_empty() {
            issues.push(ValidationIssue::new(format!("{}.id", item_path), "不能为空"));
        } else if !seen.insert(point.id.clone()) {
            issues.push(ValidationIssue::new(
                format!("{}.id", item_path),
                format!("重复的 id: {}", point.id),
            ));
        }
        if point.content.trim().is_empty() {
            issues.push(ValidationIssue::new(format!("{}.content", item_path), "不能为空"));
        }
        check_non_negative(point.score, &format!("{}.score", item_path), issues);
        points.push(point);
    }

    (issues.len() == before).then_some(points)
}

fn parse_dimensions(
    content: &Map<String, Value>,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Vec<Dimension>> {
    let items = match content.get("dimensions") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            issues.push(ValidationIssue::new("content.dimensions", "必须是数组"));
            return None;
        }
        None => {
            issues.push(ValidationIssue::new("content.dimensions", "缺少字段"));
            return None;
        }
    };
    if items.is_empty() {
        issues.push(ValidationIssue::new("content.dimensions", "至少需要一个维度"));
        return None;
    }

    let before = issues.len();
    let mut seen = HashSet::new();
    let mut dimensions = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("content.dimensions[{}]", i);
        let Some(dimension) = parse_value::<Dimension>(item, &path, issues) else {
            continue;
        };
        if dimension.id.trim().is_empty() {
            issues.push(ValidationIssue::new(format!("{}.id", path), "不能为空"));
        } else if !seen.insert(dimension.id.clone()) {
            issues.push(ValidationIssue::new(
                format!("{}.id", path),
                format!("重复的 id: {}", dimension.id),
            ));
        }
        if dimension.name.trim().is_empty() {
            issues.push(ValidationIssue::new(format!("{}.name", path), "不能为空"));
        }
        if let Some(weight) = dimension.weight {
            check_non_negative(weight, &format!("{}.weight", path), issues);
        }
        check_levels(&dimension.levels, &path, issues);
        dimensions.push(dimension);
    }

    (issues.len() == before).then_some(dimensions)
}

fn check_levels(levels: &[Level], path: &str, issues: &mut Vec<ValidationIssue>) {
    if levels.is_empty() {
        issues.push(ValidationIssue::new(format!("{}.levels", path), "至少需要一个等级"));
        return;
    }
    let mut labels = HashSet::new();
    for (i, level) in levels.iter().enumerate() {
        let level_path = format!("{}.levels[{}]", path, i);
        if level.label.trim().is_empty() {
            issues.push(ValidationIssue::new(format!("{}.label", level_path), "不能为空"));
        } else if !labels.insert(level.label.as_str()) {
            issues.push(ValidationIssue::new(
                format!("{}.label", level_path),
                format!("重复的等级: {}", level.label),
            ));
        }
        check_non_negative(level.score, &format!("{}.score", level_path), issues);
    }
}

fn validate_constraints(
    items: &[Value],
    issues: &mut Vec<ValidationIssue>,
) -> Option<Vec<Constraint>> {
    let before = issues.len();
    let mut seen = HashSet::new();
    let mut constraints = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("constraints[{}]", i);
        let Some(constraint) = parse_value::<Constraint>(item, &path, issues) else {
            continue;
        };
        if !seen.insert(constraint.id.clone()) {
            issues.push(ValidationIssue::new(
                format!("{}.id", path),
                format!("重复的 id: {}", constraint.id),
            ));
        }
        if let Some(penalty) = constraint.penalty {
            check_non_negative(penalty, &format!("{}.penalty", path), issues);
        }
        constraints.push(constraint);
    }
    (issues.len() == before).then_some(constraints)
}

fn check_metadata(metadata: &RubricMetadata, issues: &mut Vec<ValidationIssue>) -> bool {
    let mut ok = true;
    if metadata.question_id.trim().is_empty() {
        issues.push(ValidationIssue::new("metadata.questionId", "不能为空"));
        ok = false;
    }
    if metadata.title.trim().is_empty() {
        issues.push(ValidationIssue::new("metadata.title", "不能为空"));
        ok = false;
    }
    ok
}

/// 检查字段集合：旧版字段与未知字段分别报告
fn check_keys(
    obj: &Map<String, Value>,
    prefix: &str,
    allowed: &[&str],
    legacy: &[&str],
    issues: &mut Vec<ValidationIssue>,
) {
    for key in obj.keys() {
        let path = format!("{}{}", prefix, key);
        if legacy.contains(&key.as_str()) {
            issues.push(legacy_issue(&path));
        } else if !allowed.contains(&key.as_str()) {
            issues.push(ValidationIssue::new(path, "未知字段"));
        }
    }
}

fn legacy_issue(path: &str) -> ValidationIssue {
    ValidationIssue::new(path, "旧版字段，v3 格式不再支持")
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'a Value> {
    let value = obj.get(key);
    if value.is_none() {
        issues.push(ValidationIssue::new(key, "缺少字段"));
    }
    value
}

fn parse_value<T: DeserializeOwned>(
    value: &Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<T> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            issues.push(ValidationIssue::new(path, e.to_string()));
            None
        }
    }
}

fn check_non_negative(value: f64, path: &str, issues: &mut Vec<ValidationIssue>) -> bool {
    if value.is_finite() && value >= 0.0 {
        true
    } else {
        issues.push(ValidationIssue::new(path, format!("必须是非负数，实际为 {}", value)));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point_rubric() -> Value {
        json!({
            "version": "3.0",
            "metadata": {"questionId": "q-7", "title": "第 7 题", "subject": "历史"},
            "strategyType": "point_accumulation",
            "content": {
                "scoringStrategy": {"type": "pick_n", "maxPoints": 2, "pointValue": 2},
                "points": [
                    {"id": "p1", "content": "指出背景", "keywords": ["背景"], "score": 2},
                    {"id": "p2", "content": "说明影响", "keywords": [], "score": 2},
                    {"id": "p3", "content": "给出评价", "keywords": [], "score": 2}
                ]
            },
            "constraints": [
                {"id": "c1", "type": "length", "description": "不少于 50 字", "penalty": 1}
            ],
            "createdAt": "2025-03-01T08:00:00Z",
            "updatedAt": "2025-03-02T08:00:00Z"
        })
    }

    fn matrix_rubric() -> Value {
        json!({
            "version": "3.0",
            "metadata": {"questionId": "essay-1", "title": "作文"},
            "strategyType": "rubric_matrix",
            "content": {
                "dimensions": [
                    {"id": "d1", "name": "内容", "weight": 0.6, "levels": [
                        {"label": "A", "score": 10}, {"label": "B", "score": 8}
                    ]}
                ]
            },
            "createdAt": "2025-03-01T08:00:00Z",
            "updatedAt": "2025-03-01T08:00:00Z"
        })
    }

    #[test]
    fn test_valid_point_rubric() {
        let report = validate(&point_rubric());
        assert!(report.valid, "{:?}", report.errors);
        let rubric = report.rubric.unwrap();
        assert_eq!(rubric.question_id(), "q-7");
        assert_eq!(rubric.constraints().len(), 1);
        match rubric.strategy() {
            RubricStrategy::PointAccumulation(c) => assert_eq!(c.points.len(), 3),
            other => panic!("意外的策略: {:?}", other),
        }
    }

    #[test]
    fn test_valid_matrix_rubric() {
        let report = validate(&matrix_rubric());
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        let mut raw = matrix_rubric();
        raw["content"] = point_rubric()["content"].clone();

        let report = validate(&raw);
        assert!(!report.valid);
        assert!(report.rubric.is_none());
        assert!(report
            .errors
            .iter()
            .any(|issue| issue.path == "content.points" && issue.message.contains("不匹配")));
    }

    #[test]
    fn test_rejects_legacy_fields_everywhere() {
        let mut raw = point_rubric();
        raw["totalScore"] = json!(10);
        raw["answerPoints"] = json!([]);
        raw["content"]["scoringRules"] = json!("旧规则");

        let report = validate(&raw);
        assert!(!report.valid);
        let paths: Vec<&str> = report.errors.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"totalScore"));
        assert!(paths.contains(&"answerPoints"));
        assert!(paths.contains(&"content.scoringRules"));
    }

    #[test]
    fn test_content_total_score_is_allowed() {
        let mut raw = point_rubric();
        raw["content"]["totalScore"] = json!(4);
        let rubric = validate(&raw).into_result().unwrap();
        assert_eq!(rubric.strategy().total_score(), Some(4.0));
    }

    #[test]
    fn test_accumulates_all_errors() {
        let raw = json!({
            "version": "2.0",
            "metadata": {"questionId": "", "title": "t", "author": "x"},
            "strategyType": "point_accumulation",
            "content": {
                "scoringStrategy": {"type": "weighted"},
                "points": [
                    {"id": "p1", "content": "a", "keywords": [], "score": -1},
                    {"id": "p1", "content": "b", "keywords": [], "score": 1}
                ]
            },
            "extra": true,
            "createdAt": "not a date",
            "updatedAt": "2025-03-01T08:00:00Z"
        });

        let report = validate(&raw);
        assert!(!report.valid);
        let paths: Vec<&str> = report.errors.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"version"));
        assert!(paths.contains(&"metadata"));
        assert!(paths.contains(&"extra"));
        assert!(paths.contains(&"content.points[0].score"));
        assert!(paths.contains(&"content.points[1].id"));
        assert!(paths.contains(&"createdAt"));
    }

    #[test]
    fn test_unknown_point_field_rejected() {
        let mut raw = point_rubric();
        raw["content"]["points"][0]["bonus"] = json!(1);
        let report = validate(&raw);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|i| i.path == "content.points[0]"));
    }

    #[test]
    fn test_pick_n_max_points_is_optional() {
        let mut raw = point_rubric();
        raw["content"]["scoringStrategy"] = json!({"type": "pick_n"});
        let report = validate(&raw);
        assert!(report.valid, "{:?}", report.errors);

        // 上限大于得分点数量也合法
        raw["content"]["scoringStrategy"] = json!({"type": "pick_n", "maxPoints": 99});
        assert!(validate(&raw).valid);
    }

    #[test]
    fn test_pick_n_zero_max_points_rejected() {
        let mut raw = point_rubric();
        raw["content"]["scoringStrategy"] = json!({"type": "pick_n", "maxPoints": 0});
        let report = validate(&raw);
        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|i| i.path == "content.scoringStrategy.maxPoints"));
    }

    #[test]
    fn test_non_object_rejected() {
        let report = validate(&json!([1, 2, 3]));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_revise_produces_new_instance() {
        let rubric = validate(&matrix_rubric()).into_result().unwrap();
        let strategy = rubric.strategy().clone();
        let revised = rubric.revise(strategy, Vec::new()).unwrap();
        assert!(revised.updated_at() >= rubric.updated_at());
        assert_eq!(revised.created_at(), rubric.created_at());
        assert_eq!(revised.metadata(), rubric.metadata());
    }
}
