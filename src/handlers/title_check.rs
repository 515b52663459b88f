use serde::Serialize;
use tracing::debug;

use crate::{
    models::{
        classifier::Label,
        error::{Error, Result},
    },
    utils::state::AppState,
};

pub const MIN_TITLE_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleCheck {
    pub title: String,
    pub prediction: Label,
    pub confidence: f64,
}

/// Classifies one free-text title. Reloads the classifier pair on every
/// call, so a cold load (or a regeneration) may happen here.
pub async fn classify_title(state: &AppState, title: &str) -> Result<TitleCheck> {
    let title = title.trim();
    if title.chars().count() < MIN_TITLE_LEN {
        debug!(len = title.chars().count(), "title rejected");
        return Err(Error::Validation(format!(
            "Title must be at least {MIN_TITLE_LEN} characters long"
        )));
    }

    let pair = state.classifier_store.load().await?;
    let verdict = pair
        .predict(title)
        .map_err(|e| Error::ModelCorruption(e.to_string()))?;

    Ok(TitleCheck {
        title: title.to_string(),
        prediction: verdict.label,
        confidence: verdict.confidence,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::handlers::news::tests::test_state;

    #[tokio::test]
    async fn short_titles_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (state, _) = test_state(tmp.path(), Duration::from_secs(300));

        for title in ["short", "123456789", "   padded   "] {
            let err = classify_title(&state, title).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{title:?}");
        }
        assert!(!tmp.path().join("nb_model.json").exists());
    }

    #[tokio::test]
    async fn ten_characters_are_enough() {
        let tmp = tempfile::tempdir().unwrap();
        let (state, _) = test_state(tmp.path(), Duration::from_secs(300));

        let check = classify_title(&state, "  exactly ten ").await.unwrap();

        assert_eq!(check.title, "exactly ten");
        assert!(matches!(check.prediction, Label::Real | Label::Fake));
        assert!((50.0..=100.0).contains(&check.confidence));
    }

    #[tokio::test]
    async fn known_phrases_follow_the_bootstrap_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let (state, _) = test_state(tmp.path().join("fresh").as_path(), Duration::from_secs(300));

        let real = classify_title(&state, "Verified report from trusted journalist")
            .await
            .unwrap();
        let fake = classify_title(&state, "False claims going viral on social media")
            .await
            .unwrap();

        assert_eq!(real.prediction, Label::Real);
        assert_eq!(fake.prediction, Label::Fake);
        assert!(real.confidence > 50.0);
    }
}
