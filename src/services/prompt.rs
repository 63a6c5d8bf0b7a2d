//! 提示词构建
//!
//! 把评分细则渲染成模型能读懂的说明，并约定返回的 JSON 结构：
//! - 得分点 / 步骤类：`checkpoints: {pointId: {met, evidence}}`
//! - 维度矩阵类：`dimensions: {dimensionId: {level, evidence}}`

use crate::models::rubric::{
    Dimension, RubricPoint, RubricSpec, RubricStrategy, ScoringStrategy, StrategyKind,
};

/// 发送给模型的提示词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const GRADING_SYSTEM: &str = "你是一位严谨、公正的阅卷老师。\
你只依据评分细则判断学生答案是否达到每个得分点，不臆测学生没有写出的内容。\
学生答案可能来自手写识别，存在少量错别字时按语义判断。\
只返回 JSON，不要返回任何其他内容。";

const DRAFT_SYSTEM: &str = "你是一位经验丰富的命题与阅卷专家，擅长把参考答案拆解为可操作的评分细则。\
只返回 JSON，不要返回任何其他内容。";

/// 构建评分提示词
///
/// # 参数
/// - `rubric`: 评分细则
/// - `answer_text`: 学生答案文本（可以为空，此时答案在图片中）
/// - `image_count`: 附带的答题图片数量
pub fn build_grading_prompt(rubric: &RubricSpec, answer_text: &str, image_count: usize) -> Prompt {
    let metadata = rubric.metadata();
    let mut user = String::new();

    user.push_str(&format!("【题目】{}\n", metadata.title));
    if let Some(subject) = &metadata.subject {
        user.push_str(&format!("【学科】{}\n", subject));
    }
    if let Some(grade) = &metadata.grade {
        user.push_str(&format!("【年级】{}\n", grade));
    }
    if let Some(question_type) = &metadata.question_type {
        user.push_str(&format!("【题型】{}\n", question_type));
    }
    user.push('\n');

    let format_hint = match rubric.strategy() {
        RubricStrategy::PointAccumulation(content) => {
            user.push_str("【评分细则：得分点】\n");
            render_strategy(&mut user, &content.scoring_strategy);
            render_points(&mut user, &content.points);
            CHECKPOINT_FORMAT
        }
        RubricStrategy::SequentialLogic(content) => {
            user.push_str("【评分细则：解题步骤】\n");
            render_strategy(&mut user, &content.scoring_strategy);
            if content.require_order == Some(true) {
                user.push_str("- 步骤必须按顺序出现，顺序颠倒的步骤视为未达成\n");
            }
            render_points(&mut user, &content.steps);
            CHECKPOINT_FORMAT
        }
        RubricStrategy::RubricMatrix(content) => {
            user.push_str("【评分细则：等级维度】\n");
            render_dimensions(&mut user, &content.dimensions);
            DIMENSION_FORMAT
        }
    };

    if !rubric.constraints().is_empty() {
        user.push_str("\n【附加要求】\n");
        for constraint in rubric.constraints() {
            user.push_str(&format!("- [{}] {}", constraint.kind, constraint.description));
            if let Some(penalty) = constraint.penalty {
                user.push_str(&format!("（不满足扣 {} 分，请在 notes 中说明）", penalty));
            }
            user.push('\n');
        }
    }

    user.push_str("\n【学生答案】\n");
    if answer_text.trim().is_empty() {
        user.push_str("（见图片）\n");
    } else {
        user.push_str(answer_text.trim());
        user.push('\n');
    }
    if image_count > 0 {
        user.push_str(&format!("（另附 {} 张答题图片，请结合图片内容判断）\n", image_count));
    }

    user.push_str("\n【返回格式】\n");
    user.push_str(format_hint);

    Prompt {
        system: GRADING_SYSTEM.to_string(),
        user,
    }
}

const CHECKPOINT_FORMAT: &str = r#"{
  "checkpoints": {"<得分点id>": {"met": true, "evidence": "答案中的依据原文"}},
  "confidence": 0.0-1.0,
  "needsReview": false,
  "notes": "给学生的简短评语"
}
每个得分点都必须出现在 checkpoints 中；没有依据时 met 为 false。"#;

const DIMENSION_FORMAT: &str = r#"{
  "dimensions": {"<维度id>": {"level": "<等级标签>", "evidence": "判断依据"}},
  "confidence": 0.0-1.0,
  "needsReview": false,
  "notes": "给学生的简短评语"
}
level 必须是该维度列出的等级标签之一。"#;

fn render_strategy(out: &mut String, strategy: &ScoringStrategy) {
    match strategy.kind {
        StrategyKind::All => out.push_str("- 计分方式：全部得分点达成才得分\n"),
        StrategyKind::PickN => match strategy.max_points {
            Some(limit) => out.push_str(&format!("- 计分方式：答对任意 {} 点即可\n", limit)),
            None => out.push_str("- 计分方式：每个达成的得分点都计分，不限点数\n"),
        },
        StrategyKind::Weighted => out.push_str("- 计分方式：按达成的得分点累加\n"),
    }
    if strategy.allow_alternative == Some(true) {
        out.push_str("- 意思相近的其他表述同样有效\n");
    }
    if strategy.strict_mode == Some(true) {
        out.push_str("- 严格模式：必须出现关键词或等价的专业表述\n");
    }
    if strategy.open_ended == Some(true) {
        out.push_str("- 开放性题目：言之有理即可视为达成\n");
    }
}

fn render_points(out: &mut String, points: &[RubricPoint]) {
    for point in points {
        out.push_str(&format!("- id={} ({} 分): {}", point.id, point.score, point.content));
        if !point.keywords.is_empty() {
            out.push_str(&format!(" ［关键词: {}］", point.keywords.join("、")));
        }
        out.push('\n');
    }
}

fn render_dimensions(out: &mut String, dimensions: &[Dimension]) {
    for dimension in dimensions {
        out.push_str(&format!("- id={} {}\n", dimension.id, dimension.name));
        for level in &dimension.levels {
            out.push_str(&format!("    {} ({} 分)", level.label, level.score));
            if let Some(description) = &level.description {
                out.push_str(&format!(": {}", description));
            }
            out.push('\n');
        }
    }
}

/// 构建评分细则起草提示词
pub fn build_draft_prompt(question: &str, reference_answer: &str, total_score: f64) -> Prompt {
    let user = format!(
        r#"请根据题目和参考答案起草评分细则。

【题目】
{}

【参考答案】
{}

【总分】{}

【要求】
1. 能拆成独立要点的题目使用 "point_accumulation"；有固定解题步骤的使用 "sequential_logic"；作文等整体评价使用 "rubric_matrix"
2. 各得分点分数之和（或各维度最高等级分之和）等于总分
3. 只返回下面结构的 JSON（不包含 version / metadata / 时间字段）：
{{
  "strategyType": "point_accumulation",
  "content": {{
    "scoringStrategy": {{"type": "weighted"}},
    "points": [{{"id": "p1", "content": "要点", "keywords": ["关键词"], "score": 2}}]
  }},
  "constraints": []
}}"#,
        question.trim(),
        reference_answer.trim(),
        total_score
    );

    Prompt {
        system: DRAFT_SYSTEM.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rubric_validator;
    use serde_json::json;

    #[test]
    fn test_grading_prompt_lists_points_and_format() {
        let rubric = rubric_validator::validate(&json!({
            "version": "3.0",
            "metadata": {"questionId": "h-1", "title": "辛亥革命的意义", "subject": "历史"},
            "strategyType": "point_accumulation",
            "content": {
                "scoringStrategy": {"type": "pick_n", "maxPoints": 2, "allowAlternative": true},
                "points": [
                    {"id": "p1", "content": "推翻帝制", "keywords": ["帝制"], "score": 2},
                    {"id": "p2", "content": "民主共和观念深入人心", "keywords": [], "score": 2}
                ]
            },
            "constraints": [{"id": "c1", "type": "format", "description": "分点作答", "penalty": 1}],
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        }))
        .into_result()
        .unwrap();

        let prompt = build_grading_prompt(&rubric, "推翻了两千多年的帝制", 1);
        assert!(prompt.user.contains("【学科】历史"));
        assert!(prompt.user.contains("id=p1 (2 分): 推翻帝制"));
        assert!(prompt.user.contains("答对任意 2 点"));
        assert!(prompt.user.contains("分点作答"));
        assert!(prompt.user.contains("另附 1 张答题图片"));
        assert!(prompt.user.contains("\"checkpoints\""));
        assert!(prompt.system.contains("只返回 JSON"));
    }

    #[test]
    fn test_pick_n_without_limit_prompt() {
        let rubric = rubric_validator::validate(&json!({
            "version": "3.0",
            "metadata": {"questionId": "h-2", "title": "洋务运动的影响"},
            "strategyType": "point_accumulation",
            "content": {
                "scoringStrategy": {"type": "pick_n"},
                "points": [{"id": "p1", "content": "引进西方技术", "keywords": [], "score": 2}]
            },
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        }))
        .into_result()
        .unwrap();

        let prompt = build_grading_prompt(&rubric, "引进了机器生产", 0);
        assert!(prompt.user.contains("不限点数"));
        assert!(!prompt.user.contains("答对任意 0 点"));
        assert!(!prompt.user.contains("答题图片"));
    }

    #[test]
    fn test_matrix_prompt_uses_dimension_format() {
        let rubric = rubric_validator::validate(&json!({
            "version": "3.0",
            "metadata": {"questionId": "e-1", "title": "作文"},
            "strategyType": "rubric_matrix",
            "content": {"dimensions": [{"id": "d1", "name": "立意", "levels": [
                {"label": "一类", "score": 20, "description": "立意深刻"}
            ]}]},
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z"
        }))
        .into_result()
        .unwrap();

        let prompt = build_grading_prompt(&rubric, "", 2);
        assert!(prompt.user.contains("一类 (20 分): 立意深刻"));
        assert!(prompt.user.contains("（见图片）"));
        assert!(prompt.user.contains("\"dimensions\""));
    }

    #[test]
    fn test_draft_prompt() {
        let prompt = build_draft_prompt("1+1=?", "2", 3.0);
        assert!(prompt.user.contains("【总分】3"));
        assert!(prompt.user.contains("\"strategyType\""));
    }
}
