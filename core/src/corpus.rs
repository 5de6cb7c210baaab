use crate::error::CorpusError;
use crate::{Category, DocId, Document};
use anyhow::Result;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// All documents of one category, keyed by ID. Immutable once loaded.
#[derive(Debug, Default, Clone)]
pub struct Corpus {
    docs: HashMap<DocId, Document>,
}

impl Corpus {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, id: DocId) -> Option<&Document> { self.docs.get(&id) }

    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    /// Returns the previous document when `id` was already present.
    pub fn insert(&mut self, id: DocId, doc: Document) -> Option<Document> { self.docs.insert(id, doc) }
}

impl FromIterator<(DocId, Document)> for Corpus {
    fn from_iter<I: IntoIterator<Item = (DocId, Document)>>(iter: I) -> Self {
        Self { docs: iter.into_iter().collect() }
    }
}

/// Where each category lives below the source directory.
#[derive(Debug, Clone)]
pub struct CorpusLayout {
    pub finance_dir: PathBuf,
    pub insurance_dir: PathBuf,
    pub faq_file: PathBuf,
}

impl Default for CorpusLayout {
    fn default() -> Self {
        Self {
            finance_dir: PathBuf::from("finance"),
            insurance_dir: PathBuf::from("insurance"),
            faq_file: PathBuf::from("faq").join("pid_map_content.json"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Corpora {
    pub finance: Corpus,
    pub insurance: Corpus,
    pub faq: Corpus,
}

impl Corpora {
    /// Load all three corpora. A missing location is fatal; individual bad files are not.
    pub fn load<P: AsRef<Path>>(source_path: P, layout: &CorpusLayout) -> Result<Self> {
        let root = source_path.as_ref();
        let finance = load_corpus_dir(root.join(&layout.finance_dir), Category::Finance)?;
        let insurance = load_corpus_dir(root.join(&layout.insurance_dir), Category::Insurance)?;
        let faq = load_faq_map(root.join(&layout.faq_file))?;
        Ok(Self { finance, insurance, faq })
    }

    pub fn for_category(&self, category: Category) -> &Corpus {
        match category {
            Category::Finance => &self.finance,
            Category::Insurance => &self.insurance,
            Category::Faq => &self.faq,
        }
    }
}

/// Load every `<id>.json` file directly inside `dir`.
///
/// Files are visited in name order, so when two names parse to the same ID
/// (`1.json` and `01.json`) the later one wins and the collision is logged.
pub fn load_corpus_dir<P: AsRef<Path>>(dir: P, category: Category) -> Result<Corpus> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(CorpusError::NotFound(dir.to_path_buf()).into());
    }

    let mut corpus = Corpus::new();
    let mut origin: HashMap<DocId, PathBuf> = HashMap::new();
    let mut skipped = 0usize;
    // symlinked documents count like regular files
    let walker = WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true).sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                skipped += 1;
                tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable corpus entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_corpus_file(path) {
            Ok((id, value)) => {
                let doc = if category.is_filing() {
                    let doc = Document::from_filing_value(value);
                    if matches!(doc, Document::Opaque(_)) {
                        tracing::warn!(path = %path.display(), %category, "document lacks combined_responses/raw_text, keeping it as opaque");
                    }
                    doc
                } else {
                    Document::Opaque(value)
                };
                if corpus.insert(id, doc).is_some() {
                    let previous = origin.get(&id).map(|p| p.display().to_string()).unwrap_or_default();
                    tracing::warn!(doc_id = id, previous = %previous, replacement = %path.display(), "duplicate document id, keeping the later file");
                }
                origin.insert(id, path.to_path_buf());
            }
            Err(err) => {
                skipped += 1;
                tracing::warn!(error = %err, "skipping corpus file");
            }
        }
    }

    tracing::info!(%category, dir = %dir.display(), docs = corpus.len(), skipped, "loaded corpus");
    Ok(corpus)
}

fn read_corpus_file(path: &Path) -> Result<(DocId, serde_json::Value), CorpusError> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let id: DocId = stem.parse().map_err(|_| CorpusError::Malformed {
        path: path.to_path_buf(),
        reason: format!("file name '{stem}' is not a numeric document id"),
    })?;
    let reader = BufReader::new(File::open(path)?);
    let value = serde_json::from_reader(reader).map_err(|e| CorpusError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok((id, value))
}

/// Load the faq mapping file: a JSON object from string-encoded IDs to arbitrary values.
pub fn load_faq_map<P: AsRef<Path>>(path: P) -> Result<Corpus> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(CorpusError::NotFound(path.to_path_buf()).into());
    }
    let reader = BufReader::new(File::open(path)?);
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_reader(reader)
        .map_err(|e| CorpusError::Malformed { path: path.to_path_buf(), reason: e.to_string() })?;

    let mut corpus = Corpus::new();
    for (key, value) in raw {
        match key.trim().parse::<DocId>() {
            Ok(id) => {
                if corpus.insert(id, Document::Opaque(value)).is_some() {
                    tracing::warn!(doc_id = id, key = %key, "duplicate faq id, keeping the later entry");
                }
            }
            Err(_) => {
                let err = CorpusError::Malformed { path: path.to_path_buf(), reason: format!("key '{key}' is not a numeric document id") };
                tracing::warn!(error = %err, "skipping faq entry");
            }
        }
    }
    tracing::info!(path = %path.display(), docs = corpus.len(), "loaded faq corpus");
    Ok(corpus)
}
