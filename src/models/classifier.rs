use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{
    naive_bayes::{MultinomialNb, DEFAULT_ALPHA},
    vectorizer::{CountVectorizer, NotFitted},
};

pub const REAL: u8 = 1;
pub const FAKE: u8 = 0;

/// Labelled texts the default model is fitted on.
pub const BOOTSTRAP_CORPUS: [(&str, u8); 4] = [
    ("This is a legitimate news article about current events", REAL),
    ("Fake news story spreading misinformation", FAKE),
    ("Verified report from trusted journalist", REAL),
    ("False claims going viral on social media", FAKE),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    pub fn is_real(self) -> bool {
        self == Label::Real
    }
}

impl From<u8> for Label {
    fn from(class: u8) -> Self {
        if class == REAL {
            Label::Real
        } else {
            Label::Fake
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Real => write!(f, "Real"),
            Label::Fake => write!(f, "Fake"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub label: Label,
    /// Highest class probability as a percentage, two decimals.
    pub confidence: f64,
}

/// Vectorizer and classifier fitted together; never mixed across fits.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierPair {
    pub classifier: MultinomialNb,
    pub vectorizer: CountVectorizer,
}

impl ClassifierPair {
    pub fn bootstrap() -> Self {
        let texts: Vec<&str> = BOOTSTRAP_CORPUS.iter().map(|(text, _)| *text).collect();
        let labels: Vec<u8> = BOOTSTRAP_CORPUS.iter().map(|(_, label)| *label).collect();

        let mut vectorizer = CountVectorizer::default();
        let samples = vectorizer.fit_transform(&texts);
        let classifier =
            MultinomialNb::fit(&samples, &labels, vectorizer.n_features(), DEFAULT_ALPHA);

        Self {
            classifier,
            vectorizer,
        }
    }

    pub fn predict(&self, text: &str) -> Result<Verdict, NotFitted> {
        let sample = self.vectorizer.transform(text)?;
        let label = Label::from(self.classifier.predict(&sample));
        let best = self
            .classifier
            .predict_proba(&sample)
            .into_iter()
            .fold(0.0_f64, f64::max);

        Ok(Verdict {
            label,
            confidence: (best * 100.0 * 100.0).round() / 100.0,
        })
    }

    /// Cheap prediction used by the pipeline, no probabilities.
    pub fn is_real(&self, text: &str) -> Result<bool, NotFitted> {
        let sample = self.vectorizer.transform(text)?;
        Ok(Label::from(self.classifier.predict(&sample)).is_real())
    }
}
