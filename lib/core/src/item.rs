use crate::vector::Vector;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a posting.
///
/// Integer IDs order before string IDs; this ordering is the tie-break used by
/// every ranked list in the crate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Integer(u64),
    String(String),
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemId::Integer(i) => write!(f, "{}", i),
            ItemId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId::String(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId::String(s.to_string())
    }
}

impl From<u64> for ItemId {
    fn from(i: u64) -> Self {
        ItemId::Integer(i)
    }
}

/// Inclusive stipend range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StipendRange {
    pub min: i64,
    pub max: i64,
}

impl StipendRange {
    #[inline]
    #[must_use]
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// A single amount, e.g. a fixed monthly stipend
    #[inline]
    #[must_use]
    pub fn fixed(amount: i64) -> Self {
        Self { min: amount, max: amount }
    }

    pub fn validate(&self) -> Result<()> {
        match self.defect() {
            Some(reason) => Err(Error::InvalidQuery(reason)),
            None => Ok(()),
        }
    }

    fn defect(&self) -> Option<String> {
        if self.min < 0 || self.max < 0 {
            return Some(format!("stipend range [{}, {}] is negative", self.min, self.max));
        }
        if self.min > self.max {
            return Some(format!(
                "stipend range [{}, {}] has min above max",
                self.min, self.max
            ));
        }
        None
    }

    #[inline]
    pub fn overlaps(&self, other: &StipendRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    /// Distance between the two ranges, zero when they overlap
    #[inline]
    pub fn gap(&self, other: &StipendRange) -> i64 {
        if self.overlaps(other) {
            0
        } else if self.max < other.min {
            other.min.saturating_sub(self.max)
        } else {
            self.min.saturating_sub(other.max)
        }
    }

    /// Parse listing text such as `"Unpaid"`, `"5000-8000 /month"` or `"10,000 /month"`.
    pub fn parse(text: &str) -> Option<Self> {
        let cleaned = text.trim().to_lowercase().replace(',', "");
        if cleaned.is_empty() {
            return None;
        }
        if cleaned.starts_with("unpaid") {
            return Some(Self::fixed(0));
        }
        let head = cleaned.split_whitespace().next()?;
        if let Some((low, high)) = head.split_once('-') {
            let low = low.trim().parse::<i64>().ok()?;
            let high = high.trim().parse::<i64>().ok()?;
            if low < 0 || high < 0 {
                return None;
            }
            return Some(Self::new(low.min(high), low.max(high)));
        }
        head.parse::<i64>().ok().filter(|amount| *amount >= 0).map(Self::fixed)
    }
}

/// Structured attributes of a posting, kept in the catalog and used for score adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributes {
    pub id: ItemId,
    /// Incremented each time the attributes are replaced
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stipend: Option<StipendRange>,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_months: Option<u32>,
    pub posted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_by: Option<DateTime<Utc>>,
}

impl ItemAttributes {
    #[must_use]
    pub fn new(id: impl Into<ItemId>, posted_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            title: String::new(),
            organization: String::new(),
            location: None,
            stipend: None,
            skills: BTreeSet::new(),
            duration_months: None,
            posted_at,
            apply_by: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>, organization: impl Into<String>) -> Self {
        self.title = title.into();
        self.organization = organization.into();
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_stipend(mut self, min: i64, max: i64) -> Self {
        self.stipend = Some(StipendRange::new(min, max));
        self
    }

    #[must_use]
    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.skills = skills
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_duration_months(mut self, months: u32) -> Self {
        self.duration_months = Some(months);
        self
    }

    #[must_use]
    pub fn with_apply_by(mut self, apply_by: DateTime<Utc>) -> Self {
        self.apply_by = Some(apply_by);
        self
    }

    /// True when the application window closed strictly before `now`
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.apply_by.is_some_and(|deadline| deadline < now)
    }

    /// Reject attributes the boosters cannot score, such as a negative or inverted stipend
    pub fn validate(&self) -> Result<()> {
        if let Some(reason) = self.stipend.as_ref().and_then(StipendRange::defect) {
            return Err(Error::InvalidItem {
                id: self.id.clone(),
                reason,
            });
        }
        Ok(())
    }

    /// Attributes equal apart from the version counter
    pub fn same_content(&self, other: &ItemAttributes) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.organization == other.organization
            && self.location == other.location
            && self.stipend == other.stipend
            && self.skills == other.skills
            && self.duration_months == other.duration_months
            && self.posted_at == other.posted_at
            && self.apply_by == other.apply_by
    }
}

/// A posting together with its embedding, as delivered by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    #[serde(flatten)]
    pub attributes: ItemAttributes,
    pub embedding: Vector,
}

impl Item {
    #[inline]
    #[must_use]
    pub fn new(attributes: ItemAttributes, embedding: Vector) -> Self {
        Self {
            attributes,
            embedding,
        }
    }

    #[inline]
    pub fn id(&self) -> &ItemId {
        &self.attributes.id
    }

    /// Embedding dimension and finiteness, then attribute checks
    pub fn validate(&self, dim: usize) -> Result<()> {
        self.embedding.validate(dim)?;
        self.attributes.validate()
    }

    /// Split into the parts stored by the index and the catalog
    #[inline]
    pub fn into_parts(self) -> (ItemId, Vector, ItemAttributes) {
        (self.attributes.id.clone(), self.embedding, self.attributes)
    }
}

/// Parse a deadline in either `15-Oct-2025` or RFC 3339 form.
/// Day-only dates close at the end of that day (UTC).
pub fn parse_deadline(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%d-%b-%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_item_id_ordering() {
        let mut ids = vec![
            ItemId::from("b"),
            ItemId::from(10),
            ItemId::from("a"),
            ItemId::from(2),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![ItemId::from(2), ItemId::from(10), ItemId::from("a"), ItemId::from("b")]
        );
    }

    #[test]
    fn test_item_id_serde_untagged() {
        let int: ItemId = serde_json::from_str("42").unwrap();
        let s: ItemId = serde_json::from_str("\"intern-7\"").unwrap();
        assert_eq!(int, ItemId::Integer(42));
        assert_eq!(s, ItemId::String("intern-7".to_string()));
    }

    #[test]
    fn test_stipend_gap_and_overlap() {
        let a = StipendRange::new(500, 1000);
        let b = StipendRange::new(400, 900);
        let c = StipendRange::new(0, 200);
        assert!(a.overlaps(&b));
        assert_eq!(a.gap(&b), 0);
        assert_eq!(c.gap(&b), 200);
        assert_eq!(b.gap(&c), 200);

        let extreme = StipendRange::new(i64::MIN, i64::MIN);
        assert_eq!(extreme.gap(&StipendRange::new(0, 10)), i64::MAX);
        assert_eq!(StipendRange::new(0, 10).gap(&extreme), i64::MAX);
    }

    #[test]
    fn test_stipend_validate() {
        assert!(StipendRange::new(0, 0).validate().is_ok());
        assert!(StipendRange::new(-1, 10).validate().is_err());
        assert!(StipendRange::new(10, 5).validate().is_err());
    }

    #[test]
    fn test_stipend_parse() {
        assert_eq!(StipendRange::parse("Unpaid"), Some(StipendRange::fixed(0)));
        assert_eq!(
            StipendRange::parse("5000-8000 /month"),
            Some(StipendRange::new(5000, 8000))
        );
        assert_eq!(
            StipendRange::parse("10,000 /month"),
            Some(StipendRange::fixed(10000))
        );
        assert_eq!(StipendRange::parse("5000--100"), None);
        assert_eq!(StipendRange::parse("-100 /month"), None);
        assert_eq!(StipendRange::parse("negotiable"), None);
        assert_eq!(StipendRange::parse(""), None);
    }

    #[test]
    fn test_item_validation() {
        let posted = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        let ok = Item::new(
            ItemAttributes::new(1u64, posted).with_stipend(0, 500),
            Vector::new(vec![1.0, 0.0]),
        );
        assert!(ok.validate(2).is_ok());
        assert!(matches!(ok.validate(3), Err(Error::InvalidDimension { .. })));

        for (min, max) in [(i64::MIN, i64::MIN), (-5, 10), (900, 100)] {
            let bad = Item::new(
                ItemAttributes::new(2u64, posted).with_stipend(min, max),
                Vector::new(vec![1.0, 0.0]),
            );
            let err = bad.validate(2).unwrap_err();
            assert!(matches!(err, Error::InvalidItem { ref id, .. } if *id == ItemId::from(2)));
            assert_eq!(err.kind(), crate::ErrorKind::Validation);
        }
    }

    #[test]
    fn test_is_expired_is_strict() {
        let deadline = Utc.with_ymd_and_hms(2025, 10, 15, 0, 0, 0).unwrap();
        let attrs = ItemAttributes::new(1u64, deadline).with_apply_by(deadline);
        assert!(!attrs.is_expired(deadline));
        assert!(attrs.is_expired(deadline + chrono::Duration::seconds(1)));
        assert!(!ItemAttributes::new(2u64, deadline).is_expired(deadline));
    }

    #[test]
    fn test_parse_deadline_formats() {
        let day = parse_deadline("15-Oct-2025").unwrap();
        assert_eq!(day, Utc.with_ymd_and_hms(2025, 10, 15, 23, 59, 59).unwrap());
        let rfc = parse_deadline("2025-10-15T08:00:00Z").unwrap();
        assert_eq!(rfc, Utc.with_ymd_and_hms(2025, 10, 15, 8, 0, 0).unwrap());
        assert!(parse_deadline("someday").is_none());
    }

    #[test]
    fn test_item_json_shape() {
        let posted = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        let item = Item::new(
            ItemAttributes::new("a", posted).with_location("NYC").with_skills(["python"]),
            Vector::new(vec![1.0, 0.0]),
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], "a");
        assert_eq!(json["location"], "NYC");
        assert_eq!(json["embedding"], serde_json::json!([1.0, 0.0]));

        let back: Item = serde_json::from_value(json).unwrap();
        assert_eq!(back.attributes, item.attributes);
    }
}
