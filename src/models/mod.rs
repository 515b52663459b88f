pub mod cache;
pub mod classifier;
pub mod error;
pub mod naive_bayes;
pub mod news;
pub mod vectorizer;
