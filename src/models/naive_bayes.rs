use serde::{Deserialize, Serialize};

use crate::models::vectorizer::TermCounts;

pub const DEFAULT_ALPHA: f64 = 0.1;

/// Multinomial naive Bayes over term counts with additive smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultinomialNb {
    pub alpha: f64,
    /// Class labels in ascending order.
    pub classes: Vec<u8>,
    pub class_log_prior: Vec<f64>,
    /// `feature_log_prob[class][feature]`
    pub feature_log_prob: Vec<Vec<f64>>,
}

impl MultinomialNb {
    pub fn fit(samples: &[TermCounts], labels: &[u8], n_features: usize, alpha: f64) -> Self {
        let mut classes: Vec<u8> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let mut class_count = vec![0.0; classes.len()];
        let mut feature_count = vec![vec![0.0; n_features]; classes.len()];

        for (sample, label) in samples.iter().zip(labels) {
            let Ok(c) = classes.binary_search(label) else {
                continue;
            };
            class_count[c] += 1.0;
            for &(feature, count) in sample {
                if feature < n_features {
                    feature_count[c][feature] += count;
                }
            }
        }

        let total: f64 = class_count.iter().sum();
        let class_log_prior = class_count.iter().map(|n| (n / total).ln()).collect();

        let feature_log_prob = feature_count
            .iter()
            .map(|counts| {
                let denom = (counts.iter().sum::<f64>() + alpha * n_features as f64).ln();
                counts.iter().map(|n| (n + alpha).ln() - denom).collect()
            })
            .collect();

        Self {
            alpha,
            classes,
            class_log_prior,
            feature_log_prob,
        }
    }

    pub fn n_features(&self) -> usize {
        self.feature_log_prob.first().map_or(0, Vec::len)
    }

    /// Shape checks that a fitted model always passes.
    pub fn is_consistent(&self) -> bool {
        !self.classes.is_empty()
            && self.class_log_prior.len() == self.classes.len()
            && self.feature_log_prob.len() == self.classes.len()
            && self
                .feature_log_prob
                .iter()
                .all(|row| row.len() == self.n_features())
    }

    fn joint_log_likelihood(&self, sample: &TermCounts) -> Vec<f64> {
        self.class_log_prior
            .iter()
            .zip(&self.feature_log_prob)
            .map(|(prior, log_probs)| {
                prior
                    + sample
                        .iter()
                        .filter_map(|&(f, count)| log_probs.get(f).map(|lp| lp * count))
                        .sum::<f64>()
            })
            .collect()
    }

    pub fn predict(&self, sample: &TermCounts) -> u8 {
        let jll = self.joint_log_likelihood(sample);
        let mut best = 0;
        for (idx, score) in jll.iter().enumerate() {
            if *score > jll[best] {
                best = idx;
            }
        }
        self.classes.get(best).copied().unwrap_or_default()
    }

    /// Posterior probability per class, in `classes` order.
    pub fn predict_proba(&self, sample: &TermCounts) -> Vec<f64> {
        let jll = self.joint_log_likelihood(sample);
        let max = jll.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = jll.iter().map(|v| (v - max).exp()).collect();
        let sum: f64 = exp.iter().sum();
        exp.into_iter().map(|v| v / sum).collect()
    }
}
