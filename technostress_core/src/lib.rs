mod config;
use log::{debug, info};

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

pub mod admin;
pub mod builder;
pub mod manual;
pub mod verification;

pub use crate::config::*;

/// Normalizes an identity token: surrounding whitespace is removed and the
/// token is lowercased, so that `" User@Example.com "` and `"user@example.com"`
/// designate the same participant.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Computes the digest under which an identity is stored and compared.
///
/// The digest is a one-way SHA-256 hash of the normalized token. Empty
/// identities (after trimming) are rejected before hashing.
pub fn hash_identity(raw: &str) -> Result<IdentityHash, IntakeError> {
    let normalized = normalize_identity(raw);
    if normalized.is_empty() {
        return Err(IntakeError::Validation { field: "identity" });
    }
    Ok(IdentityHash(sha256::digest(normalized)))
}

/// The number of stored records that were submitted under this identity.
pub fn count_submissions(records: &[ResponseRecord], identity: &IdentityHash) -> usize {
    records
        .iter()
        .filter(|r| r.identity_hash == *identity)
        .count()
}

/// Checks that this identity may still submit.
///
/// Returns the number of prior submissions, or `QuotaExceeded` once the
/// identity reached `MAX_PARTICIPATION` accepted submissions.
pub fn check_participation(
    records: &[ResponseRecord],
    identity: &IdentityHash,
) -> Result<usize, IntakeError> {
    let prior = count_submissions(records, identity);
    debug!(
        "check_participation: {} prior submission(s) out of {} record(s)",
        prior,
        records.len()
    );
    if prior >= MAX_PARTICIPATION {
        return Err(IntakeError::QuotaExceeded {
            limit: MAX_PARTICIPATION,
        });
    }
    Ok(prior)
}

/// Arithmetic mean of the item scores.
pub fn mean_score(scores: &ItemScores) -> f64 {
    let s = scores.as_slice();
    let total: u32 = s.iter().map(|x| u32::from(*x)).sum();
    f64::from(total) / s.len() as f64
}

/// Classifies an average score. Boundary values belong to the upper bracket.
pub fn classify_level(mean: f64) -> StressLevel {
    if mean < 2.5 {
        StressLevel::Low
    } else if mean < 3.5 {
        StressLevel::Medium
    } else {
        StressLevel::High
    }
}

/// Runs the intake checks on a submitted form against the existing records and
/// builds the record to append.
///
/// Nothing is written here: the caller is responsible for appending the
/// returned record while still holding the store lock it used to read `existing`.
pub fn prepare_record(
    form: &FormSubmission,
    existing: &[ResponseRecord],
    timestamp: NaiveDateTime,
) -> Result<ResponseRecord, IntakeError> {
    let identity_hash = hash_identity(&form.identity)?;
    check_participation(existing, &identity_hash)?;

    let average = mean_score(&form.scores);
    let level = classify_level(average);
    info!(
        "prepare_record: accepted submission, average {:.2}, level {}",
        average, level
    );
    Ok(ResponseRecord {
        timestamp,
        identity_hash,
        demographics: form.demographics.clone(),
        usage: form.usage.clone(),
        scores: form.scores,
        average,
        level,
    })
}

/// Computes the aggregates of the admin view.
///
/// Returns `None` when there is no record yet.
pub fn summarize(records: &[ResponseRecord]) -> Option<Summary> {
    if records.is_empty() {
        return None;
    }
    info!("summarize: processing {} record(s)", records.len());

    let total = records.len();
    let overall_mean = records.iter().map(|r| r.average).sum::<f64>() / total as f64;

    let mut gender_acc: BTreeMap<Gender, (usize, f64)> = BTreeMap::new();
    let mut level_acc: BTreeMap<StressLevel, usize> = BTreeMap::new();
    for r in records.iter() {
        let e = gender_acc.entry(r.demographics.gender).or_insert((0, 0.0));
        e.0 += 1;
        e.1 += r.average;
        *level_acc.entry(r.level).or_insert(0) += 1;
    }

    let by_gender: Vec<GroupStats<Gender>> = gender_acc
        .into_iter()
        .map(|(key, (count, sum))| GroupStats {
            key,
            count,
            mean: sum / count as f64,
        })
        .collect();
    for g in by_gender.iter() {
        debug!("summarize: {}: {} record(s), mean {:.2}", g.key, g.count, g.mean);
    }

    Some(Summary {
        total,
        overall_mean,
        by_gender,
        by_level: level_acc.into_iter().collect(),
    })
}
