//! 兜底评估器
//!
//! AI 梯队全部失败时使用，不访问网络、永不失败。输出只保证结构符合 `ScoreResult`
//! 的约定，并不能替代真实评分，调用方通过 `providerTrace.mode = "fallback"` 区分。
//!
//! 默认策略是 [`OptimisticFallbackEvaluator`]（按满分给出参考分）；需要更严格时可以
//! 换成 [`ZeroCreditFallbackEvaluator`]，编排层无需改动。

use crate::models::rubric::{Dimension, RubricPoint, RubricSpec, RubricStrategy, StrategyKind};
use crate::models::score::{BreakdownItem, ScoreResult};
use crate::services::scoring_engine;

/// 兜底评估策略
pub trait FallbackEvaluator: Send + Sync {
    /// 策略名，写入追踪信息
    fn name(&self) -> &'static str;

    fn evaluate(&self, rubric: &RubricSpec) -> ScoreResult;
}

/// 乐观兜底：每个得分点 / 维度按自身上限给分
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimisticFallbackEvaluator;

impl FallbackEvaluator for OptimisticFallbackEvaluator {
    fn name(&self) -> &'static str {
        "optimistic"
    }

    fn evaluate(&self, rubric: &RubricSpec) -> ScoreResult {
        build(rubric, |max| max, "AI 不可用，暂按满分参考")
    }
}

/// 零分兜底：结构完整但不给分
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroCreditFallbackEvaluator;

impl FallbackEvaluator for ZeroCreditFallbackEvaluator {
    fn name(&self) -> &'static str {
        "zero_credit"
    }

    fn evaluate(&self, rubric: &RubricSpec) -> ScoreResult {
        build(rubric, |_| 0.0, "AI 不可用，待人工评分")
    }
}

fn build(rubric: &RubricSpec, award: impl Fn(f64) -> f64, comment: &str) -> ScoreResult {
    let max_score = scoring_engine::max_score(rubric);

    let (items, all_or_nothing) = match rubric.strategy() {
        RubricStrategy::PointAccumulation(content) => (
            point_items(&content.points),
            content.scoring_strategy.kind == StrategyKind::All,
        ),
        RubricStrategy::SequentialLogic(content) => (
            point_items(&content.steps),
            content.scoring_strategy.kind == StrategyKind::All,
        ),
        RubricStrategy::RubricMatrix(content) => (dimension_items(&content.dimensions), false),
    };

    // `all` 只有 0 和满分两种结果，breakdown 保留各点自身分值
    if all_or_nothing {
        let breakdown = items
            .into_iter()
            .map(|(label, max)| BreakdownItem::new(label, award(max), max).with_comment(comment))
            .collect();
        return ScoreResult {
            score: award(max_score).clamp(0.0, max_score.max(0.0)),
            max_score,
            breakdown,
            confidence: 0.0,
            needs_review: true,
        };
    }

    let mut remaining = max_score.max(0.0);
    let mut score = 0.0;
    let breakdown = items
        .into_iter()
        .map(|(label, max)| {
            let awarded = award(max).min(remaining);
            remaining -= awarded;
            score += awarded;
            BreakdownItem::new(label, awarded, max).with_comment(comment)
        })
        .collect();

    ScoreResult {
        score,
        max_score,
        breakdown,
        confidence: 0.0,
        needs_review: true,
    }
}

fn point_items(points: &[RubricPoint]) -> Vec<(String, f64)> {
    points
        .iter()
        .map(|point| (point.content.clone(), point.score))
        .collect()
}

fn dimension_items(dimensions: &[Dimension]) -> Vec<(String, f64)> {
    dimensions
        .iter()
        .map(|dimension| (dimension.name.clone(), dimension.ceiling()))
        .collect()
}
