use crate::error::RankingFailure;
use crate::eval::GroundTruthSet;
use crate::{AnswerSet, Qid, QuestionSet, RankingResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Summary of one retrieval run, written next to the answers on request.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailureEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailureEntry {
    pub qid: Qid,
    pub cause: String,
}

impl From<&RankingFailure> for FailureEntry {
    fn from(f: &RankingFailure) -> Self { Self { qid: f.qid, cause: f.cause.to_string() } }
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_default()
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {}", path.display()))
}

/// Pretty JSON with 4-space indent; non-ASCII is written as-is.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp: PathBuf = path.with_file_name(tmp_name);
    {
        let mut f = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(&buf)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Sort by qid and write the canonical answer file. Returns the number of answers written.
pub fn save_answers<P: AsRef<Path>>(results: Vec<RankingResult>, path: P) -> Result<usize> {
    let mut answers = results;
    answers.sort_by_key(|a| a.qid);
    let count = answers.len();
    write_json_atomic(path.as_ref(), &AnswerSet { answers })?;
    Ok(count)
}

pub fn load_answers<P: AsRef<Path>>(path: P) -> Result<AnswerSet> { read_json(path.as_ref()) }

pub fn load_questions<P: AsRef<Path>>(path: P) -> Result<QuestionSet> { read_json(path.as_ref()) }

pub fn load_ground_truths<P: AsRef<Path>>(path: P) -> Result<GroundTruthSet> { read_json(path.as_ref()) }

pub fn save_report<P: AsRef<Path>>(report: &RunReport, path: P) -> Result<()> { write_json_atomic(path.as_ref(), report) }
