//! BM25 keyword ranking for the lexical search branch.

use std::collections::{HashMap, HashSet};

/// BM25 parameters
const K1: f64 = 1.2; // Term frequency saturation
const B: f64 = 0.75; // Length normalization

/// A document in the BM25 index
#[derive(Debug, Clone)]
struct Document {
    tokens: Vec<String>,
}

/// In-memory BM25 index keyed by chunk id.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    /// All indexed documents
    documents: HashMap<String, Document>,
    /// Document frequency for each term
    doc_freq: HashMap<String, f64>,
    /// Document lengths (in tokens)
    doc_lengths: HashMap<String, usize>,
    /// Average document length
    avg_doc_length: f64,
    /// Total document count
    doc_count: usize,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize text into terms. Hyphens and underscores are part of a
    /// token, matching the query sanitization rules.
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
            .filter(|s| !s.is_empty() && s.len() > 1)
            .map(String::from)
            .collect()
    }

    /// Add a document to the index, replacing any existing one with the
    /// same id.
    pub fn add_document(&mut self, id: String, text: &str) {
        self.remove_document(&id);

        let tokens = Self::tokenize(text);
        let doc_length = tokens.len();

        let unique_terms: HashSet<_> = tokens.iter().cloned().collect();
        for term in unique_terms {
            *self.doc_freq.entry(term).or_insert(0.0) += 1.0;
        }

        self.documents.insert(id.clone(), Document { tokens });
        self.doc_lengths.insert(id, doc_length);
        self.doc_count += 1;

        let total_length: usize = self.doc_lengths.values().sum();
        self.avg_doc_length = total_length as f64 / self.doc_count as f64;
    }

    /// Remove a document from the index. Returns false if it was absent.
    pub fn remove_document(&mut self, id: &str) -> bool {
        if let Some(doc) = self.documents.remove(id) {
            self.doc_lengths.remove(id);
            self.doc_count -= 1;

            let unique_terms: HashSet<_> = doc.tokens.iter().collect();
            for term in unique_terms {
                if let Some(count) = self.doc_freq.get_mut(term) {
                    *count -= 1.0;
                    if *count <= 0.0 {
                        self.doc_freq.remove(term);
                    }
                }
            }

            if self.doc_count > 0 {
                let total_length: usize = self.doc_lengths.values().sum();
                self.avg_doc_length = total_length as f64 / self.doc_count as f64;
            } else {
                self.avg_doc_length = 0.0;
            }

            true
        } else {
            false
        }
    }

    fn calculate_idf(&self, term: &str) -> f64 {
        let doc_freq = self.doc_freq.get(term).copied().unwrap_or(0.0);
        if doc_freq == 0.0 {
            return 0.0;
        }

        let n = self.doc_count as f64;
        ((n - doc_freq + 0.5) / (doc_freq + 0.5) + 1.0).ln()
    }

    fn score_document(&self, doc_id: &str, query_terms: &[String]) -> f64 {
        let doc = match self.documents.get(doc_id) {
            Some(d) => d,
            None => return 0.0,
        };

        let doc_length = self.doc_lengths.get(doc_id).copied().unwrap_or(0) as f64;

        let mut term_freqs: HashMap<&str, usize> = HashMap::new();
        for token in &doc.tokens {
            *term_freqs.entry(token.as_str()).or_insert(0) += 1;
        }

        let mut score = 0.0;

        for term in query_terms {
            let idf = self.calculate_idf(term);
            let tf = term_freqs.get(term.as_str()).copied().unwrap_or(0) as f64;

            if tf > 0.0 {
                let numerator = tf * (K1 + 1.0);
                let denominator = tf + K1 * (1.0 - B + B * (doc_length / self.avg_doc_length));
                score += idf * (numerator / denominator);
            }
        }

        score
    }

    /// Search the index and return `(id, score)` pairs, best first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f64)> {
        let query_terms = Self::tokenize(query);

        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scores: Vec<(String, f64)> = self
            .documents
            .keys()
            .map(|id| (id.clone(), self.score_document(id, &query_terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(limit);
        scores
    }

    pub fn len(&self) -> usize {
        self.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }
}
