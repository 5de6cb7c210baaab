//! Scoring answer files against ground truth.

use crate::{DocId, Qid, Question, RankingResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruth {
    pub qid: Qid,
    pub retrieve: DocId,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroundTruthSet {
    pub ground_truths: Vec<GroundTruth>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub qid: Qid,
    pub predicted: DocId,
    pub expected: DocId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub correct: usize,
    pub total: usize,
}

impl Tally {
    pub fn precision(&self) -> f64 {
        if self.total == 0 { 0.0 } else { self.correct as f64 / self.total as f64 }
    }
}

#[derive(Debug, Default)]
pub struct PrecisionReport {
    pub overall: Tally,
    pub per_category: BTreeMap<String, Tally>,
    pub mismatches: Vec<Mismatch>,
    /// Ground-truth qids with no prediction.
    pub missing: Vec<Qid>,
}

/// Match predictions to ground truth by qid.
///
/// Precision counts only questions that received a prediction; unanswered
/// questions are reported in `missing`.
pub fn precision(answers: &[RankingResult], truths: &[GroundTruth]) -> PrecisionReport {
    let predicted: HashMap<Qid, DocId> = answers.iter().map(|a| (a.qid, a.retrieve)).collect();
    let mut report = PrecisionReport::default();
    for truth in truths {
        let Some(&guess) = predicted.get(&truth.qid) else {
            report.missing.push(truth.qid);
            continue;
        };
        let hit = guess == truth.retrieve;
        let category = truth.category.clone().unwrap_or_else(|| "unknown".to_string());
        for tally in [&mut report.overall, report.per_category.entry(category).or_default()] {
            tally.total += 1;
            if hit { tally.correct += 1; }
        }
        if !hit {
            report.mismatches.push(Mismatch { qid: truth.qid, predicted: guess, expected: truth.retrieve });
        }
    }
    report
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateViolation {
    /// The chosen document is not in the question's candidate list.
    OutsideCandidates { qid: Qid, retrieve: DocId },
    UnknownQid { qid: Qid },
}

pub fn validate_candidates(answers: &[RankingResult], questions: &[Question]) -> Vec<CandidateViolation> {
    let by_qid: HashMap<Qid, &Question> = questions.iter().map(|q| (q.qid, q)).collect();
    answers
        .iter()
        .filter_map(|a| match by_qid.get(&a.qid) {
            None => Some(CandidateViolation::UnknownQid { qid: a.qid }),
            Some(q) if !q.source.contains(&a.retrieve) => Some(CandidateViolation::OutsideCandidates { qid: a.qid, retrieve: a.retrieve }),
            Some(_) => None,
        })
        .collect()
}
