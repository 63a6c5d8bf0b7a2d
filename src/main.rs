use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rubric_grader::models::{load_rubric_file, load_rubric_folder};
use rubric_grader::services::DraftRequest;
use rubric_grader::utils::logging::{self, truncate_text};
use rubric_grader::{App, Config, GradingRequest, RubricSource};
use tracing::{info, warn};

const USAGE: &str = "用法:
  rubric_grader <rubric.json> <answer.txt | 答案文件夹> [学生姓名]
  rubric_grader check <评分细则文件夹>
  rubric_grader draft <题目.txt> <参考答案.txt> <总分> [题目ID]";

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(&config.log_level)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("check") if args.len() == 2 => check(&args[1]).await,
        Some("draft") if args.len() >= 4 => draft(config, &args[1..]).await,
        Some(_) if args.len() >= 2 => grade(config, &args).await,
        _ => bail!("{}", USAGE),
    }
}

/// 评分：单个答案文件或整个文件夹
async fn grade(config: Config, args: &[String]) -> Result<()> {
    let app = App::initialize(config)?;

    let rubric = load_rubric_file(Path::new(&args[0])).await?;
    let question_key = app.register_rubric(rubric).await?;

    let answer_path = PathBuf::from(&args[1]);
    if answer_path.is_dir() {
        let answers = load_answers(&answer_path).await?;
        if answers.is_empty() {
            warn!("⚠️ 文件夹中没有找到 .txt 答案文件，程序结束");
            return Ok(());
        }

        let requests = answers
            .into_iter()
            .map(|(student, text)| {
                GradingRequest::new(app.identity(), RubricSource::Stored, text)
                    .with_question_key(question_key.clone())
                    .with_student(student)
            })
            .collect();

        let report = app.grade_batch(requests).await?;
        for outcome in report.outcomes.iter().flatten() {
            println!("{}", serde_json::to_string(&outcome.response)?);
        }
        return Ok(());
    }

    let answer_text = tokio::fs::read_to_string(&answer_path)
        .await
        .with_context(|| format!("无法读取答案文件: {}", answer_path.display()))?;
    info!("📝 学生答案: {}", truncate_text(answer_text.trim(), 60));

    let mut request = GradingRequest::new(app.identity(), RubricSource::Stored, answer_text)
        .with_question_key(question_key);
    if let Some(student) = args.get(2) {
        request = request.with_student(student.clone());
    }

    let outcome = app.grade(request).await?;
    println!("{}", serde_json::to_string_pretty(&outcome.response)?);
    Ok(())
}

/// 校验文件夹中的所有评分细则
async fn check(folder: &str) -> Result<()> {
    let rubrics = load_rubric_folder(folder).await?;
    info!("✓ 共 {} 份评分细则通过校验", rubrics.len());
    for (path, rubric) in rubrics {
        println!(
            "{}\t{}\t{}",
            path.display(),
            rubric.question_id(),
            rubric.strategy().type_name()
        );
    }
    Ok(())
}

/// 让 AI 起草评分细则并输出 JSON
async fn draft(config: Config, args: &[String]) -> Result<()> {
    let question = tokio::fs::read_to_string(&args[0])
        .await
        .with_context(|| format!("无法读取题目文件: {}", args[0]))?;
    let reference_answer = tokio::fs::read_to_string(&args[1])
        .await
        .with_context(|| format!("无法读取参考答案文件: {}", args[1]))?;
    let total_score: f64 = args[2]
        .parse()
        .with_context(|| format!("总分不是数字: {}", args[2]))?;
    let question_id = args.get(3).cloned().unwrap_or_else(|| "draft-1".to_string());

    let app = App::initialize(config)?;
    let request = DraftRequest {
        question_id,
        title: truncate_text(question.trim(), 30),
        question,
        reference_answer,
        total_score,
        subject: None,
    };

    let rubric = app.drafter().draft(&request).await?;
    println!("{}", serde_json::to_string_pretty(&rubric)?);
    Ok(())
}

/// 读取文件夹中的 .txt 答案，文件名即学生姓名
async fn load_answers(folder: &Path) -> Result<Vec<(String, String)>> {
    let mut answers = Vec::new();
    let mut entries = tokio::fs::read_dir(folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("txt") {
            continue;
        }
        let student = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("无法读取答案文件: {}", path.display()))?;
        answers.push((student, text));
    }

    answers.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(answers)
}
