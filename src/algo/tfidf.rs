use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

/// A fitted TF-IDF vector space over a fixed document list.
///
/// Term weights use the smoothed IDF `ln((1 + n) / (1 + df)) + 1` and every
/// document row is L2-normalized, so the dot product of two rows is their
/// cosine similarity. The vocabulary is fixed at fit time; queries only see
/// terms the corpus contained.
#[derive(Debug, Clone)]
pub struct TfidfIndex {
    /// term -> column index (columns assigned in sorted term order)
    vocab: HashMap<String, usize>,
    /// column index -> smoothed IDF
    idf: Vec<f64>,
    /// one sparse L2-normalized row per document, entries sorted by column
    rows: Vec<Vec<(usize, f64)>>,
}

impl TfidfIndex {
    /// Fit an index over pre-tokenized documents.
    pub fn fit(documents: &[Vec<String>]) -> Self {
        let num_docs = documents.len();
        let mut df: HashMap<&str, usize> = HashMap::new();
        for tokens in documents {
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for term in unique {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        // Sorted column order keeps fits reproducible run to run.
        let mut terms: Vec<&str> = df.keys().copied().collect();
        terms.sort_unstable();
        let vocab: HashMap<String, usize> = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect();
        let idf: Vec<f64> = terms.iter().map(|t| smooth_idf(num_docs, df[*t])).collect();

        let rows: Vec<Vec<(usize, f64)>> = documents
            .par_iter()
            .map(|tokens| vectorize(&vocab, &idf, tokens))
            .collect();

        Self { vocab, idf, rows }
    }

    /// Number of fitted documents.
    pub fn num_docs(&self) -> usize {
        self.rows.len()
    }

    /// Cosine similarity of every fitted document to the centroid of the
    /// given rows. An empty selection yields all zeros.
    pub fn similarities_to_rows(&self, rows: &[usize]) -> Vec<f64> {
        let mut centroid = vec![0.0; self.idf.len()];
        for &r in rows {
            for &(col, w) in &self.rows[r] {
                centroid[col] += w;
            }
        }
        if !rows.is_empty() {
            let k = rows.len() as f64;
            for v in &mut centroid {
                *v /= k;
            }
        }
        self.similarities_to_query(&centroid)
    }

    /// Cosine similarity of every fitted document to a query token list
    /// vectorized under the fitted vocabulary. Out-of-vocabulary tokens
    /// contribute nothing; an all-unknown query yields all zeros.
    pub fn similarities_to_tokens(&self, tokens: &[String]) -> Vec<f64> {
        let mut query = vec![0.0; self.idf.len()];
        for (col, w) in vectorize(&self.vocab, &self.idf, tokens) {
            query[col] = w;
        }
        self.similarities_to_query(&query)
    }

    fn similarities_to_query(&self, query: &[f64]) -> Vec<f64> {
        let norm = query.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            return vec![0.0; self.rows.len()];
        }
        self.rows
            .iter()
            .map(|row| row.iter().map(|&(col, w)| query[col] * w).sum::<f64>() / norm)
            .collect()
    }
}

fn smooth_idf(num_docs: usize, df: usize) -> f64 {
    ((1.0 + num_docs as f64) / (1.0 + df as f64)).ln() + 1.0
}

fn vectorize(vocab: &HashMap<String, usize>, idf: &[f64], tokens: &[String]) -> Vec<(usize, f64)> {
    let mut counts: HashMap<usize, u32> = HashMap::new();
    for token in tokens {
        if let Some(&col) = vocab.get(token) {
            *counts.entry(col).or_insert(0) += 1;
        }
    }
    let mut entries: Vec<(usize, f64)> = counts
        .into_iter()
        .map(|(col, count)| (col, count as f64 * idf[col]))
        .collect();
    entries.sort_unstable_by_key(|&(col, _)| col);
    let norm = entries.iter().map(|&(_, w)| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for entry in &mut entries {
            entry.1 /= norm;
        }
    }
    entries
}
