//! Open Library response shapes
//!
//! Fields Open Library returns in more than one shape are normalised
//! while deserializing, so callers only ever see plain values.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Text that arrives either bare or as `{"type": "/type/text", "value": ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TextValue {
    Plain(String),
    Typed { value: String },
    Other(IgnoredAny),
}

impl TextValue {
    fn into_text(self) -> Option<String> {
        let text = match self {
            TextValue::Plain(text) | TextValue::Typed { value: text } => text,
            TextValue::Other(_) => return None,
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

fn text_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<TextValue>::deserialize(deserializer)?;
    Ok(value.and_then(TextValue::into_text))
}

/// Image ids with Open Library's "no image" placeholders (`-1`) removed
fn image_ids<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids = Option::<Vec<Option<i64>>>::deserialize(deserializer)?;
    Ok(ids
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter(|id| *id > 0)
        .collect())
}

fn image_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<i64>::deserialize(deserializer)?;
    Ok(id.filter(|id| *id > 0))
}

#[derive(Debug, Deserialize)]
struct AuthorKey {
    key: String,
}

#[derive(Debug, Deserialize)]
struct WorkAuthorRole {
    author: Option<AuthorKey>,
}

/// `authors: [{"author": {"key": "/authors/OL1A"}, "type": ...}]` to keys
fn author_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let roles = Option::<Vec<WorkAuthorRole>>::deserialize(deserializer)?;
    Ok(roles
        .unwrap_or_default()
        .into_iter()
        .filter_map(|role| role.author.map(|a| a.key))
        .collect())
}

/// Strip the `/works/` or `/authors/` prefix from an Open Library key
pub fn key_id(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// One hit from `/search.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSummary {
    /// e.g. `/works/OL45804W`
    pub key: String,

    #[serde(default)]
    pub title: String,

    #[serde(alias = "author_name", default)]
    pub author_names: Vec<String>,

    #[serde(alias = "author_key", default)]
    pub author_keys: Vec<String>,

    #[serde(default)]
    pub first_publish_year: Option<i32>,

    #[serde(alias = "cover_i", default, deserialize_with = "image_id")]
    pub cover_id: Option<i64>,

    #[serde(alias = "subject", default)]
    pub subjects: Vec<String>,
}

impl WorkSummary {
    pub fn work_id(&self) -> &str {
        key_id(&self.key)
    }
}

/// Body of `/search.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(alias = "numFound", default)]
    pub num_found: u64,

    #[serde(alias = "docs", default)]
    pub works: Vec<WorkSummary>,
}

/// Body of `/works/{id}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkDetails {
    pub key: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, deserialize_with = "text_value")]
    pub description: Option<String>,

    #[serde(default)]
    pub subjects: Vec<String>,

    #[serde(default, deserialize_with = "image_ids")]
    pub covers: Vec<i64>,

    /// Author keys, e.g. `/authors/OL23919A`
    #[serde(rename(deserialize = "authors"), default, deserialize_with = "author_keys")]
    pub author_keys: Vec<String>,

    #[serde(default)]
    pub first_publish_date: Option<String>,
}

impl WorkDetails {
    pub fn work_id(&self) -> &str {
        key_id(&self.key)
    }

    /// First usable cover
    pub fn cover_id(&self) -> Option<i64> {
        self.covers.first().copied()
    }
}

/// Body of `/authors/{id}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorDetails {
    pub key: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "text_value")]
    pub bio: Option<String>,

    #[serde(default)]
    pub birth_date: Option<String>,

    #[serde(default)]
    pub death_date: Option<String>,

    #[serde(default, deserialize_with = "image_ids")]
    pub photos: Vec<i64>,
}

impl AuthorDetails {
    pub fn author_id(&self) -> &str {
        key_id(&self.key)
    }

    pub fn photo_id(&self) -> Option<i64> {
        self.photos.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_description_accepts_both_shapes() {
        let plain: WorkDetails = serde_json::from_value(json!({
            "key": "/works/OL1W",
            "title": "A",
            "description": "Plain text"
        }))
        .unwrap();
        assert_eq!(plain.description.as_deref(), Some("Plain text"));

        let typed: WorkDetails = serde_json::from_value(json!({
            "key": "/works/OL2W",
            "title": "B",
            "description": {"type": "/type/text", "value": "Typed text"}
        }))
        .unwrap();
        assert_eq!(typed.description.as_deref(), Some("Typed text"));

        let missing: WorkDetails =
            serde_json::from_value(json!({"key": "/works/OL3W", "description": null})).unwrap();
        assert_eq!(missing.description, None);
    }

    #[test]
    fn test_unexpected_text_shapes_are_dropped() {
        let odd: WorkDetails = serde_json::from_value(json!({
            "key": "/works/OL4W",
            "description": {"type": "/type/text"}
        }))
        .unwrap();
        assert_eq!(odd.description, None);

        let author: AuthorDetails =
            serde_json::from_value(json!({"key": "/authors/OL1A", "bio": 42})).unwrap();
        assert_eq!(author.bio, None);
    }

    #[test]
    fn test_work_details_normalises_covers_and_authors() {
        let work: WorkDetails = serde_json::from_value(json!({
            "key": "/works/OL27448W",
            "title": "The Lord of the Rings",
            "covers": [-1, 14625765, 1],
            "subjects": ["Fiction", "Middle Earth"],
            "authors": [
                {"author": {"key": "/authors/OL26320A"}, "type": {"key": "/type/author_role"}},
                {"type": {"key": "/type/author_role"}}
            ]
        }))
        .unwrap();

        assert_eq!(work.work_id(), "OL27448W");
        assert_eq!(work.covers, vec![14625765, 1]);
        assert_eq!(work.cover_id(), Some(14625765));
        assert_eq!(work.author_keys, vec!["/authors/OL26320A".to_string()]);
    }

    #[test]
    fn test_author_bio_and_photos() {
        let author: AuthorDetails = serde_json::from_value(json!({
            "key": "/authors/OL26320A",
            "name": "J.R.R. Tolkien",
            "bio": {"type": "/type/text", "value": "  English writer.  "},
            "birth_date": "3 January 1892",
            "photos": [-1, 6791763]
        }))
        .unwrap();

        assert_eq!(author.author_id(), "OL26320A");
        assert_eq!(author.bio.as_deref(), Some("English writer."));
        assert_eq!(author.photo_id(), Some(6791763));
        assert_eq!(author.death_date, None);
    }

    #[test]
    fn test_search_doc_field_names() {
        let results: SearchResults = serde_json::from_value(json!({
            "numFound": 2,
            "docs": [
                {
                    "key": "/works/OL45804W",
                    "title": "Fantastic Mr Fox",
                    "author_name": ["Roald Dahl"],
                    "first_publish_year": 1970,
                    "cover_i": 6498519,
                    "subject": ["Foxes"]
                },
                {"key": "/works/OL1W", "title": "No cover", "cover_i": -1}
            ]
        }))
        .unwrap();

        assert_eq!(results.num_found, 2);
        let first = &results.works[0];
        assert_eq!(first.work_id(), "OL45804W");
        assert_eq!(first.author_names, vec!["Roald Dahl".to_string()]);
        assert_eq!(first.cover_id, Some(6498519));
        assert_eq!(results.works[1].cover_id, None);
    }
}
