use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Sparse row: `(column, value)` pairs sorted by column
pub type SparseRow = Vec<(usize, f64)>;

/// English stop words removed before n-gram construction
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "be", "became", "because", "become", "becomes", "been", "before",
    "behind", "being", "below", "beside", "besides", "between", "beyond", "both", "but", "by",
    "can", "cannot", "could", "do", "done", "down", "due", "during", "each", "eg", "either",
    "else", "elsewhere", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "except", "few", "for", "former", "from", "further", "had", "has", "have", "he", "hence",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "however", "ie", "if",
    "in", "indeed", "into", "is", "it", "its", "itself", "just", "last", "latter", "least",
    "less", "many", "may", "me", "meanwhile", "might", "mine", "more", "moreover", "most",
    "mostly", "much", "must", "my", "myself", "neither", "never", "nevertheless", "next", "no",
    "nobody", "none", "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on",
    "once", "one", "only", "onto", "or", "other", "others", "otherwise", "our", "ours",
    "ourselves", "out", "over", "own", "per", "perhaps", "please", "rather", "re", "same",
    "seem", "seemed", "seeming", "seems", "several", "she", "should", "since", "so", "some",
    "somehow", "someone", "something", "sometime", "sometimes", "somewhere", "still", "such",
    "than", "that", "the", "their", "them", "themselves", "then", "thence", "there",
    "thereafter", "thereby", "therefore", "therein", "these", "they", "this", "those", "though",
    "through", "throughout", "thru", "thus", "to", "together", "too", "toward", "towards",
    "under", "until", "up", "upon", "us", "very", "via", "was", "we", "well", "were", "what",
    "whatever", "when", "whence", "whenever", "where", "whereas", "whether", "which", "while",
    "who", "whoever", "whole", "whom", "whose", "why", "will", "with", "within", "without",
    "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

/// Fitting parameters for a [`TfIdfVectorizer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TfIdfParams {
    /// Largest n-gram length (1 = unigrams only)
    pub max_ngram: usize,
    /// Vocabulary cap, most frequent terms first
    pub max_features: usize,
}

/// Term-frequency / inverse-document-frequency vectorizer.
///
/// Fit once over a corpus; the learned vocabulary and IDF weights are then
/// reused unchanged so that later documents land in the same column space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    max_ngram: usize,
    /// term → column, columns in lexicographic term order
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfIdfVectorizer {
    /// Learns vocabulary and IDF weights from `documents`
    pub fn fit(documents: &[String], params: TfIdfParams) -> Self {
        let analyzed: Vec<Vec<String>> = documents
            .iter()
            .map(|doc| analyze(doc, params.max_ngram))
            .collect();

        let mut corpus_counts: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for terms in &analyzed {
            let mut seen = HashSet::new();
            for term in terms {
                *corpus_counts.entry(term.as_str()).or_insert(0) += 1;
                if seen.insert(term.as_str()) {
                    *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        // keep the most frequent terms, ties broken lexicographically
        let mut ranked: Vec<(&str, usize)> = corpus_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(params.max_features);

        let mut kept: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();

        let n = documents.len() as f64;
        let idf = kept
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let vocabulary = kept
            .into_iter()
            .enumerate()
            .map(|(column, term)| (term.to_string(), column))
            .collect();

        Self {
            max_ngram: params.max_ngram,
            vocabulary,
            idf,
        }
    }

    /// Number of columns this vectorizer produces
    pub fn width(&self) -> usize {
        self.idf.len()
    }

    pub fn vocabulary(&self) -> &BTreeMap<String, usize> {
        &self.vocabulary
    }

    /// Maps a document into the fitted column space, L2-normalized.
    /// Terms outside the vocabulary are dropped.
    pub fn transform(&self, document: &str) -> SparseRow {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in analyze(document, self.max_ngram) {
            if let Some(&column) = self.vocabulary.get(&term) {
                *counts.entry(column).or_insert(0.0) += 1.0;
            }
        }

        let mut row: SparseRow = counts
            .into_iter()
            .map(|(column, tf)| (column, tf * self.idf[column]))
            .collect();

        let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, value) in &mut row {
                *value /= norm;
            }
        }
        row
    }
}

/// Lowercases, tokenizes, drops stop words and emits 1..=max_ngram grams
fn analyze(document: &str, max_ngram: usize) -> Vec<String> {
    let lowered = document.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2 && !STOP_WORDS.contains(token))
        .collect();

    let mut terms: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    for n in 2..=max_ngram.max(1) {
        terms.extend(tokens.windows(n).map(|gram| gram.join(" ")));
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    const UNIGRAMS: TfIdfParams = TfIdfParams {
        max_ngram: 1,
        max_features: 100,
    };

    #[test]
    fn test_analyze_drops_stop_words_and_short_tokens() {
        let terms = analyze("The Chicken, and a 2 Eggs!", 1);
        assert_eq!(terms, vec!["chicken", "eggs"]);
    }

    #[test]
    fn test_analyze_bigrams_skip_stop_words() {
        let terms = analyze("olive oil and garlic", 2);
        assert_eq!(terms, vec!["olive", "oil", "garlic", "olive oil", "oil garlic"]);
    }

    #[test]
    fn test_vocabulary_is_lexicographic() {
        let vectorizer = TfIdfVectorizer::fit(&docs(&["zucchini apple", "mango"]), UNIGRAMS);
        let columns: Vec<(&str, usize)> = vectorizer
            .vocabulary()
            .iter()
            .map(|(t, c)| (t.as_str(), *c))
            .collect();
        assert_eq!(columns, vec![("apple", 0), ("mango", 1), ("zucchini", 2)]);
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let corpus = docs(&["salt pepper", "salt butter", "salt pepper flour"]);
        let vectorizer = TfIdfVectorizer::fit(
            &corpus,
            TfIdfParams {
                max_ngram: 1,
                max_features: 2,
            },
        );
        let terms: Vec<&String> = vectorizer.vocabulary().keys().collect();
        assert_eq!(terms, vec!["pepper", "salt"]);
    }

    #[test]
    fn test_transform_is_unit_length() {
        let corpus = docs(&["rice beans", "rice chicken", "beans"]);
        let vectorizer = TfIdfVectorizer::fit(&corpus, UNIGRAMS);
        let row = vectorizer.transform("rice beans beans");
        let norm: f64 = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
        // sorted by column
        assert!(row.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let corpus = docs(&["rice beans", "rice chicken", "rice tofu"]);
        let vectorizer = TfIdfVectorizer::fit(&corpus, UNIGRAMS);
        let row = vectorizer.transform("rice tofu");
        let rice = vectorizer.vocabulary()["rice"];
        let tofu = vectorizer.vocabulary()["tofu"];
        let value = |col| row.iter().find(|(c, _)| *c == col).map(|(_, v)| *v).unwrap();
        assert!(value(tofu) > value(rice));
    }

    #[test]
    fn test_out_of_vocabulary_is_empty() {
        let vectorizer = TfIdfVectorizer::fit(&docs(&["rice"]), UNIGRAMS);
        assert!(vectorizer.transform("quinoa").is_empty());
        assert!(vectorizer.transform("").is_empty());
    }

    #[test]
    fn test_empty_corpus_has_no_columns() {
        let vectorizer = TfIdfVectorizer::fit(&[], UNIGRAMS);
        assert_eq!(vectorizer.width(), 0);
    }
}
