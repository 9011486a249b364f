// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! TF-IDF vectorizer
//!
//! Lowercases, extracts word tokens of two or more characters, removes English
//! stop words, then builds n-grams over the remaining tokens. The vocabulary is
//! capped to the most frequent terms and indexed in lexicographic order.
//! Weights use smoothed IDF, `ln((1 + n) / (1 + df)) + 1`, and each document
//! vector is L2-normalized.

use crate::error::{ClassifierError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

/// Sparse vector as `(feature index, value)` pairs sorted by index
pub type SparseVector = Vec<(usize, f64)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    max_features: usize,
    ngram_range: (usize, usize),
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new(max_features: usize, ngram_range: (usize, usize)) -> Self {
        Self {
            max_features,
            ngram_range,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    pub fn vocabulary(&self) -> &BTreeMap<String, usize> {
        &self.vocabulary
    }

    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    /// Token stream after stop-word removal, expanded to n-grams
    pub fn analyze(&self, document: &str) -> Vec<String> {
        let lowered = document.to_lowercase();
        let stop = stop_words();
        let tokens: Vec<&str> = token_pattern()
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|t| !stop.contains(t))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n.max(1)..=max_n {
            if n > tokens.len() {
                break;
            }
            terms.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        terms
    }

    /// Learn the vocabulary and IDF weights from `documents`.
    pub fn fit(&mut self, documents: &[String]) -> Result<()> {
        let mut term_freq: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let terms = self.analyze(doc);
            let unique: HashSet<&String> = terms.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            for term in terms {
                *term_freq.entry(term).or_insert(0) += 1;
            }
        }

        if term_freq.is_empty() {
            return Err(ClassifierError::NotEnoughData(
                "empty vocabulary; documents contain only stop words or no words".to_string(),
            ));
        }

        // Most frequent first, ties alphabetically
        let mut ranked: Vec<(String, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);

        let mut selected: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        selected.sort();

        let n_docs = documents.len() as f64;
        self.idf = selected
            .iter()
            .map(|term| {
                let df = *doc_freq.get(term).unwrap_or(&0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        self.vocabulary = selected.into_iter().enumerate().map(|(i, t)| (t, i)).collect();

        tracing::debug!("TF-IDF vocabulary size: {}", self.vocabulary.len());
        Ok(())
    }

    pub fn transform_one(&self, document: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.analyze(document) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut vector: SparseVector = counts
            .into_iter()
            .map(|(idx, count)| (idx, count * self.idf[idx]))
            .collect();

        let norm = vector.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    pub fn transform(&self, documents: &[String]) -> Vec<SparseVector> {
        documents.iter().map(|d| self.transform_one(d)).collect()
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> Result<Vec<SparseVector>> {
        self.fit(documents)?;
        Ok(self.transform(documents))
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"))
}

fn stop_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| ENGLISH_STOP_WORDS.iter().copied().collect())
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call", "can",
    "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail", "do",
    "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto",
    "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own",
    "part", "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together",
    "too", "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up",
    "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
    "whence", "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon",
    "wherever", "whether", "which", "while", "whither", "who", "whoever", "whole", "whom",
    "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
    "yourself", "yourselves",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_analyze_removes_stop_words_before_bigrams() {
        let vectorizer = TfidfVectorizer::new(100, (1, 2));
        let terms = vectorizer.analyze("Claim the FREE prize now!");

        assert_eq!(terms, vec!["claim", "free", "prize", "claim free", "free prize"]);
    }

    #[test]
    fn test_single_char_tokens_ignored() {
        let vectorizer = TfidfVectorizer::new(100, (1, 1));
        assert_eq!(vectorizer.analyze("a b c winner"), vec!["winner"]);
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let mut vectorizer = TfidfVectorizer::new(2, (1, 1));
        vectorizer
            .fit(&docs(&["cash cash prize", "cash prize", "meeting"]))
            .unwrap();

        let vocab: Vec<&String> = vectorizer.vocabulary().keys().collect();
        assert_eq!(vocab, vec!["cash", "prize"]);
        assert_eq!(vectorizer.vocabulary()["cash"], 0);
        assert_eq!(vectorizer.n_features(), 2);
    }

    #[test]
    fn test_transform_is_l2_normalized() {
        let mut vectorizer = TfidfVectorizer::new(100, (1, 2));
        let matrix = vectorizer
            .fit_transform(&docs(&["win cash prize today", "lunch meeting today"]))
            .unwrap();

        for row in &matrix {
            let norm: f64 = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
        // Indices ascend
        assert!(matrix[0].windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_smoothed_idf() {
        let mut vectorizer = TfidfVectorizer::new(100, (1, 1));
        vectorizer.fit(&docs(&["shared alpha", "shared beta"])).unwrap();

        let shared = vectorizer.idf[vectorizer.vocabulary()["shared"]];
        let alpha = vectorizer.idf[vectorizer.vocabulary()["alpha"]];
        assert!((shared - 1.0).abs() < 1e-12);
        assert!((alpha - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_terms_give_empty_vector() {
        let mut vectorizer = TfidfVectorizer::new(100, (1, 2));
        vectorizer.fit(&docs(&["discount offer"])).unwrap();
        assert!(vectorizer.transform_one("completely unrelated").is_empty());
    }

    #[test]
    fn test_empty_vocabulary_rejected() {
        let mut vectorizer = TfidfVectorizer::new(100, (1, 2));
        let result = vectorizer.fit(&docs(&["the and of", "a"]));
        assert!(matches!(result, Err(ClassifierError::NotEnoughData(_))));
    }
}
