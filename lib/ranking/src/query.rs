use placerank_core::{Error, Result, StipendRange, Vector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a candidate is looking for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub embedding: Vector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_location: Option<String>,
    #[serde(default)]
    pub desired_skills: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_stipend: Option<StipendRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_duration_months: Option<u32>,
    /// Per-query weights keyed by booster name (or `similarity`)
    #[serde(default)]
    pub weight_overrides: BTreeMap<String, f32>,
}

impl Query {
    #[must_use]
    pub fn new(embedding: Vector) -> Self {
        Self {
            embedding,
            desired_location: None,
            desired_skills: BTreeSet::new(),
            desired_stipend: None,
            desired_duration_months: None,
            weight_overrides: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.desired_location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.desired_skills = skills
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_stipend(mut self, min: i64, max: i64) -> Self {
        self.desired_stipend = Some(StipendRange::new(min, max));
        self
    }

    #[must_use]
    pub fn with_duration_months(mut self, months: u32) -> Self {
        self.desired_duration_months = Some(months);
        self
    }

    #[must_use]
    pub fn with_weight(mut self, booster: impl Into<String>, weight: f32) -> Self {
        self.weight_overrides.insert(booster.into(), weight);
        self
    }

    /// Shape checks that need no engine state beyond the index dimension.
    /// Weight overrides are validated by the score adjuster.
    pub fn validate(&self, dim: usize) -> Result<()> {
        self.embedding.validate(dim)?;
        if let Some(stipend) = &self.desired_stipend {
            stipend.validate()?;
        }
        if self.desired_duration_months == Some(0) {
            return Err(Error::InvalidQuery(
                "desired duration must be at least one month".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_dimension() {
        let query = Query::new(Vector::new(vec![1.0, 0.0]));
        assert!(query.validate(2).is_ok());
        assert!(matches!(
            query.validate(3),
            Err(Error::InvalidDimension { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_validate_stipend_and_duration() {
        let negative = Query::new(Vector::new(vec![1.0])).with_stipend(-100, 500);
        assert!(matches!(negative.validate(1), Err(Error::InvalidQuery(_))));

        let inverted = Query::new(Vector::new(vec![1.0])).with_stipend(900, 400);
        assert!(matches!(inverted.validate(1), Err(Error::InvalidQuery(_))));

        let zero_months = Query::new(Vector::new(vec![1.0])).with_duration_months(0);
        assert!(matches!(zero_months.validate(1), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_deserialize_minimal() {
        let query: Query = serde_json::from_str(
            r#"{"embedding": [0.5, 0.5], "desired_skills": ["Python"], "weight_overrides": {"skills": 0.4}}"#,
        )
        .unwrap();
        assert_eq!(query.embedding.dim(), 2);
        assert!(query.desired_skills.contains("Python"));
        assert_eq!(query.weight_overrides.get("skills"), Some(&0.4));
        assert!(query.desired_location.is_none());
    }
}
