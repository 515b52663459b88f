use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

pub const MAX_FEATURES: usize = 5000;

/// English stop-word list of the Glasgow IR group, as shipped by scikit-learn.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call", "can", "cannot",
    "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail", "do", "done",
    "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else", "elsewhere",
    "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything", "everywhere",
    "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five", "for", "former",
    "formerly", "forty", "found", "four", "from", "front", "full", "further", "get", "give", "go",
    "had", "has", "hasnt", "have", "he", "hence", "her", "here", "hereafter", "hereby", "herein",
    "hereupon", "hers", "herself", "him", "himself", "his", "how", "however", "hundred", "i", "ie",
    "if", "in", "inc", "indeed", "interest", "into", "is", "it", "its", "itself", "keep", "last",
    "latter", "latterly", "least", "less", "ltd", "made", "many", "may", "me", "meanwhile",
    "might", "mill", "mine", "more", "moreover", "most", "mostly", "move", "much", "must", "my",
    "myself", "name", "namely", "neither", "never", "nevertheless", "next", "nine", "no", "nobody",
    "none", "noone", "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on", "once",
    "one", "only", "onto", "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out",
    "over", "own", "part", "per", "perhaps", "please", "put", "rather", "re", "same", "see",
    "seem", "seemed", "seeming", "seems", "serious", "several", "she", "should", "show", "side",
    "since", "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something",
    "sometime", "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that",
    "the", "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together", "too",
    "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up", "upon",
    "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence",
    "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever",
    "whether", "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("vectorizer has not been fitted")]
pub struct NotFitted;

/// Sparse term-count vector: (feature index, count), sorted by index.
pub type TermCounts = Vec<(usize, f64)>;

/// Bag-of-words vectorizer over unigrams and bigrams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountVectorizer {
    pub max_features: usize,
    pub ngram_range: (usize, usize),
    /// Term to feature index. Empty until fitted.
    pub vocabulary: BTreeMap<String, usize>,
}

impl Default for CountVectorizer {
    fn default() -> Self {
        Self {
            max_features: MAX_FEATURES,
            ngram_range: (1, 2),
            vocabulary: BTreeMap::new(),
        }
    }
}

impl CountVectorizer {
    pub fn is_fitted(&self) -> bool {
        !self.vocabulary.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    /// Learns the vocabulary and returns the count matrix for `texts`.
    pub fn fit_transform(&mut self, texts: &[&str]) -> Vec<TermCounts> {
        let docs: Vec<Vec<String>> = texts.iter().map(|t| self.analyze(t)).collect();

        let mut frequency: HashMap<&str, usize> = HashMap::new();
        for term in docs.iter().flatten() {
            *frequency.entry(term.as_str()).or_default() += 1;
        }

        let mut ranked: Vec<(&str, usize)> = frequency.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let mut terms: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        terms.sort_unstable();
        self.vocabulary = terms
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term.to_string(), idx))
            .collect();

        docs.iter().map(|doc| self.count(doc)).collect()
    }

    pub fn transform(&self, text: &str) -> Result<TermCounts, NotFitted> {
        if !self.is_fitted() {
            return Err(NotFitted);
        }
        Ok(self.count(&self.analyze(text)))
    }

    fn count(&self, terms: &[String]) -> TermCounts {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in terms {
            if let Some(&idx) = self.vocabulary.get(term) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }
        counts.into_iter().collect()
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        let tokens: Vec<String> = tokenize(text)
            .filter(|t| !STOP_WORDS.contains(&t.as_str()))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n.max(1)..=max_n {
            if n == 1 {
                terms.extend(tokens.iter().cloned());
            } else {
                terms.extend(tokens.windows(n).map(|w| w.join(" ")));
            }
        }
        terms
    }
}

/// Lowercased runs of two or more word characters.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
}
