use crate::corpus::Corpus;
use crate::{Category, DocId, Document};
use std::fmt::Write;

/// Render the candidate documents of one question into a single prompt block.
///
/// Candidates are rendered in the given order, without deduplication. IDs missing
/// from the corpus are skipped with a warning and the remaining ones still render.
pub fn build_context(category: Category, candidate_ids: &[DocId], corpus: &Corpus) -> String {
    let mut out = String::new();
    for &id in candidate_ids {
        match corpus.get(id) {
            Some(doc) => render_document(&mut out, id, doc),
            None => tracing::warn!(doc_id = id, %category, "candidate document not found in corpus"),
        }
    }
    out
}

fn render_document(out: &mut String, id: DocId, doc: &Document) {
    // writing into a String cannot fail
    let _ = match doc {
        Document::Filing { combined_responses, raw_text } => write!(
            out,
            "Document {id}: {{\npages_text:\n{{{}}}\nraw_text:\n{{{raw_text}}}\n}}\n",
            value_text(combined_responses)
        ),
        Document::Opaque(value) => write!(out, "Document {id}: {{\n{{{}}}\n}}\n", value_text(value)),
    };
}

/// Strings render verbatim; anything else as compact JSON.
fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
