// Rendering of the admin view and of the questionnaire.

use std::fmt::Write;

use serde_json::json;
use serde_json::Map as JSMap;

use crate::survey::{io_common::*, *};

const BAR_WIDTH: usize = 30;

/// Rounds to 4 decimals so that summaries compare stably across runs.
fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

pub fn summary_to_json(summary: Option<&Summary>) -> JSValue {
    let s = match summary {
        Some(s) => s,
        None => return json!({ "participants": 0 }),
    };
    let mut gender_counts: JSMap<String, JSValue> = JSMap::new();
    let mut gender_means: JSMap<String, JSValue> = JSMap::new();
    for g in s.by_gender.iter() {
        gender_counts.insert(g.key.to_string(), json!(g.count));
        gender_means.insert(g.key.to_string(), json!(round4(g.mean)));
    }
    let mut level_counts: JSMap<String, JSValue> = JSMap::new();
    for (level, count) in s.by_level.iter() {
        level_counts.insert(level.to_string(), json!(count));
    }
    json!({
        "participants": s.total,
        "overallMean": round4(s.overall_mean),
        "genderCounts": gender_counts,
        "meanByGender": gender_means,
        "levelCounts": level_counts,
    })
}

pub fn render_summary(s: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total participants:      {}", s.total);
    let _ = writeln!(out, "Overall technostress mean: {}", format_mean(s.overall_mean));

    let _ = writeln!(out, "\nGender distribution:");
    for g in s.by_gender.iter() {
        let _ = writeln!(out, "  {:<28} {}", g.key.label(), g.count);
    }

    let _ = writeln!(out, "\nStress levels:");
    for (level, count) in s.by_level.iter() {
        let _ = writeln!(out, "  {:<28} {}", level.label(), count);
    }

    let _ = writeln!(out, "\nMean technostress by gender:");
    for g in s.by_gender.iter() {
        let _ = writeln!(
            out,
            "  {:<28} {} {}",
            g.key.label(),
            mean_bar(g.mean, BAR_WIDTH),
            format_mean(g.mean)
        );
    }
    out
}

/// All the stored responses, one per line. The identity digests are shortened.
pub fn render_records(records: &[ResponseRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nStored responses:");
    let _ = writeln!(
        out,
        "  {:<19}  {:<12}  {:<26}  {:<6}  {:>7}  {:<6}  scores",
        "timestamp", "identity", "gender", "age", "average", "level"
    );
    for r in records.iter() {
        let short_hash: String = r.identity_hash.0.chars().take(12).collect();
        let scores: Vec<String> = r.scores.as_slice().iter().map(|s| s.to_string()).collect();
        let _ = writeln!(
            out,
            "  {:<19}  {:<12}  {:<26}  {:<6}  {:>7}  {:<6}  {}",
            format_timestamp(&r.timestamp),
            short_hash,
            r.demographics.gender.label(),
            r.demographics.age.label(),
            format_mean(r.average),
            r.level.label(),
            scores.join(" ")
        );
    }
    out
}

fn choice_list(labels: &[&str]) -> String {
    labels.join(" | ")
}

pub fn render_questionnaire() -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "This form is anonymous. The answers are only used for academic purposes.\n"
    );
    let _ = writeln!(out, "Answers (case-insensitive):");
    let fields: Vec<(&str, Vec<&str>)> = vec![
        ("--gender", Gender::ALL.iter().map(|c| c.label()).collect()),
        ("--age", AgeBracket::ALL.iter().map(|c| c.label()).collect()),
        (
            "--mother-education, --father-education",
            EducationLevel::ALL.iter().map(|c| c.label()).collect(),
        ),
        (
            "--screen-time",
            ScreenTime::ALL.iter().map(|c| c.label()).collect(),
        ),
        (
            "--notification-count",
            NotificationCount::ALL.iter().map(|c| c.label()).collect(),
        ),
        (
            "--notification-type",
            NotificationType::ALL.iter().map(|c| c.label()).collect(),
        ),
        ("--device", Device::ALL.iter().map(|c| c.label()).collect()),
    ];
    for (flag, labels) in fields.iter() {
        let _ = writeln!(out, "  {}: {}", flag, choice_list(labels));
    }
    let _ = writeln!(
        out,
        "\nStatements, rated from {} (strongly disagree) to {} (strongly agree), given in order with --scores:",
        MIN_SCORE, MAX_SCORE
    );
    for (code, text) in QUESTIONS.iter() {
        let _ = writeln!(out, "  {:<4} {}", code, text);
    }
    out
}

/// The message shown to the participant once the response is recorded.
pub fn render_result(record: &ResponseRecord) -> String {
    format!(
        "Your technostress level: {}\nYour average score: {} / {}\nYour response was recorded. Thank you!",
        record.level,
        format_mean(record.average),
        MAX_SCORE
    )
}
