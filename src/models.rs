use serde::{Deserialize, Serialize};

/// Review body as it travels on both topics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Free text written by the reviewer
    pub text: String,

    /// Language tag detected by the review source, empty when unknown
    #[serde(default)]
    pub lang: String,
}

/// Inbound record consumed from the review topics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Location identifier
    pub location: String,

    /// Restaurant identifier
    pub restaurant: String,

    /// Original review
    pub review: Review,
}

/// Outbound record published once a review has an English text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedRecord {
    pub location: String,
    pub restaurant: String,
    pub review: Review,

    /// English text, equal to `review.text` for English reviews
    pub translated: String,
}

impl TranslatedRecord {
    /// Attach a translation to the record it was produced from
    pub fn from_review(record: ReviewRecord, translated: String) -> Self {
        Self {
            location: record.location,
            restaurant: record.restaurant,
            review: record.review,
            translated,
        }
    }
}
