//! 评分引擎 - 纯函数
//!
//! `(RubricSpec, Judgment) -> ScoreResult`，无 I/O、无状态，同样的输入得到逐位相同的输出。
//!
//! 计分规则：
//! - `rubric_matrix`：每个维度优先取判定里的显式分数，其次按等级标签查分，否则 0
//! - `all`：全部达成得满分，否则 0
//! - `pick_n`：按细则声明顺序取前 `maxPoints` 个达成点（不是按分值从高到低），
//!   未指定 `maxPoints` 时所有达成点都计分
//! - `weighted`：所有达成点分数之和
//!
//! 每项得分截断到 `[0, 该项上限]`，累加型策略的总分再按 breakdown 顺序截断到 `maxScore`，
//! 所以 breakdown 之和始终等于总分。

use crate::models::judgment::{Judgment, DEFAULT_CONFIDENCE};
use crate::models::rubric::{Dimension, RubricPoint, RubricSpec, RubricStrategy, ScoringStrategy, StrategyKind};
use crate::models::score::{BreakdownItem, ScoreResult};

/// 低于该置信度的结果需要人工复核
pub const REVIEW_THRESHOLD: f64 = 0.8;

/// 计算评分结果
pub fn score(rubric: &RubricSpec, judgment: &Judgment) -> ScoreResult {
    let max_score = max_score(rubric);

    let (breakdown, score) = match rubric.strategy() {
        RubricStrategy::PointAccumulation(content) => {
            score_points(&content.points, &content.scoring_strategy, judgment, max_score)
        }
        RubricStrategy::SequentialLogic(content) => {
            score_points(&content.steps, &content.scoring_strategy, judgment, max_score)
        }
        RubricStrategy::RubricMatrix(content) => {
            score_matrix(&content.dimensions, judgment, max_score)
        }
    };

    let confidence = effective_confidence(judgment.confidence);

    ScoreResult {
        score,
        max_score,
        breakdown,
        confidence,
        needs_review: judgment.needs_review || confidence < REVIEW_THRESHOLD,
    }
}

/// 总分：优先取 `content.totalScore`，否则累加各点 / 各维度上限
pub fn max_score(rubric: &RubricSpec) -> f64 {
    if let Some(total) = rubric.strategy().total_score() {
        return total;
    }
    match rubric.strategy() {
        RubricStrategy::PointAccumulation(content) => content.points.iter().map(|p| p.score).sum(),
        RubricStrategy::SequentialLogic(content) => content.steps.iter().map(|p| p.score).sum(),
        RubricStrategy::RubricMatrix(content) => {
            content.dimensions.iter().map(Dimension::ceiling).sum()
        }
    }
}

/// 置信度为 0、缺失或非法时按默认值处理
fn effective_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() && confidence != 0.0 {
        confidence
    } else {
        DEFAULT_CONFIDENCE
    }
}

fn score_points(
    points: &[RubricPoint],
    strategy: &ScoringStrategy,
    judgment: &Judgment,
    max_score: f64,
) -> (Vec<BreakdownItem>, f64) {
    match strategy.kind {
        StrategyKind::All => score_all(points, judgment, max_score),
        StrategyKind::PickN => score_pick_n(points, strategy, judgment, max_score),
        StrategyKind::Weighted => {
            let mut breakdown: Vec<BreakdownItem> = points
                .iter()
                .map(|point| {
                    let met = judgment.is_met(&point.id);
                    let awarded = if met { point.score } else { 0.0 };
                    point_item(point, awarded, point.score, met_comment(judgment, point, met))
                })
                .collect();
            let total = cap_breakdown(&mut breakdown, max_score);
            (breakdown, total)
        }
    }
}

/// 全部达成才得分，没有部分分
fn score_all(
    points: &[RubricPoint],
    judgment: &Judgment,
    max_score: f64,
) -> (Vec<BreakdownItem>, f64) {
    let all_met = points.iter().all(|point| judgment.is_met(&point.id));

    let breakdown = points
        .iter()
        .map(|point| {
            let met = judgment.is_met(&point.id);
            let comment = if met && !all_met {
                "已达成（需全部达成才得分）".to_string()
            } else {
                met_comment(judgment, point, met)
            };
            let awarded = if all_met { point.score } else { 0.0 };
            point_item(point, awarded, point.score, comment)
        })
        .collect();

    let total = if all_met { max_score } else { 0.0 };
    (breakdown, total)
}

/// 按声明顺序取前 N 个达成点
fn score_pick_n(
    points: &[RubricPoint],
    strategy: &ScoringStrategy,
    judgment: &Judgment,
    max_score: f64,
) -> (Vec<BreakdownItem>, f64) {
    let limit = strategy.max_points.unwrap_or(u32::MAX) as usize;
    let mut selected = 0usize;

    let mut breakdown: Vec<BreakdownItem> = points
        .iter()
        .map(|point| {
            let met = judgment.is_met(&point.id);
            let item_max = strategy.point_value.unwrap_or(point.score);
            if met && selected < limit {
                selected += 1;
                point_item(point, item_max, item_max, met_comment(judgment, point, met))
            } else if met {
                point_item(
                    point,
                    0.0,
                    item_max,
                    format!("已达成（超出 {} 点上限，不计分）", limit),
                )
            } else {
                point_item(point, 0.0, item_max, met_comment(judgment, point, met))
            }
        })
        .collect();

    let total = cap_breakdown(&mut breakdown, max_score);
    (breakdown, total)
}

fn score_matrix(
    dimensions: &[Dimension],
    judgment: &Judgment,
    max_score: f64,
) -> (Vec<BreakdownItem>, f64) {
    let mut breakdown: Vec<BreakdownItem> = dimensions
        .iter()
        .map(|dimension| {
            let ceiling = dimension.ceiling();
            let verdict = judgment.dimension(&dimension.id);

            let explicit = verdict.and_then(|v| v.score);
            let level = verdict
                .and_then(|v| v.level.as_deref())
                .and_then(|label| dimension.level(label));

            let (awarded, mut comment) = match (explicit, level) {
                (Some(score), _) => (score, format!("评分 {}", score)),
                (None, Some(level)) => (level.score, format!("等级 {}", level.label)),
                (None, None) => (0.0, "无评分依据".to_string()),
            };
            if let Some(evidence) = verdict.and_then(|v| v.evidence.as_deref()) {
                comment = format!("{}：{}", comment, evidence);
            }

            BreakdownItem::new(&dimension.name, clamp(awarded, ceiling), ceiling)
                .with_comment(comment)
        })
        .collect();

    let total = cap_breakdown(&mut breakdown, max_score);
    (breakdown, total)
}

fn point_item(point: &RubricPoint, awarded: f64, max: f64, comment: String) -> BreakdownItem {
    BreakdownItem::new(&point.content, clamp(awarded, max), max).with_comment(comment)
}

fn met_comment(judgment: &Judgment, point: &RubricPoint, met: bool) -> String {
    let evidence = judgment
        .checkpoint(&point.id)
        .and_then(|verdict| verdict.evidence.as_deref());
    match (met, evidence) {
        (true, Some(evidence)) => format!("已达成：{}", evidence),
        (true, None) => "已达成".to_string(),
        (false, Some(evidence)) => format!("未达成：{}", evidence),
        (false, None) => "未达成".to_string(),
    }
}

fn clamp(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0).min(max.max(0.0))
    } else {
        0.0
    }
}

/// 按 breakdown 顺序把总分截断到上限，返回截断后的总分
fn cap_breakdown(items: &mut [BreakdownItem], cap: f64) -> f64 {
    let mut remaining = cap.max(0.0);
    let mut total = 0.0;
    for item in items.iter_mut() {
        let awarded = item.score.min(remaining);
        if awarded < item.score {
            let note = "超出总分上限，已截断";
            item.comment = Some(match item.comment.take() {
                Some(comment) => format!("{}（{}）", comment, note),
                None => note.to_string(),
            });
            item.score = awarded;
        }
        remaining -= awarded;
        total += awarded;
    }
    total
}
