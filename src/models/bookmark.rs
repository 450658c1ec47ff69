use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::object_id::ObjectId;

/// A bookmark or bookmark folder as persisted in the local store.
///
/// `parent_object_id` is always kept. `parent_id` is the resolved local row
/// of that parent and stays `None` until the parent folder exists locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: i64,
    pub object_id: ObjectId,
    pub title: String,
    pub url: Option<String>,
    pub custom_title: Option<String>,
    pub is_folder: bool,
    pub parent_object_id: Option<ObjectId>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Bookmark {
    /// Title shown to the user: the custom title wins over the page title.
    pub fn display_title(&self) -> &str {
        self.custom_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.title)
    }

    /// True when the parent is referenced but has not arrived yet.
    pub fn is_orphaned(&self) -> bool {
        self.parent_object_id.is_some() && self.parent_id.is_none()
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_folder { "folder" } else { "bookmark" };
        write!(f, "[{}] {} ({})", kind, self.display_title(), self.object_id)?;
        if let Some(url) = &self.url {
            write!(f, " {}", url)?;
        }
        Ok(())
    }
}

/// A bookmark that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBookmark {
    pub object_id: ObjectId,
    pub title: String,
    pub url: Option<String>,
    pub custom_title: Option<String>,
    pub is_folder: bool,
    pub parent_object_id: Option<ObjectId>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl NewBookmark {
    /// Creates a bookmark with a freshly minted object id.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            object_id: ObjectId::mint(),
            title: title.into(),
            url: None,
            custom_title: None,
            is_folder: false,
            parent_object_id: None,
            created_at: now,
            last_modified: now,
        }
    }

    pub fn folder(title: impl Into<String>) -> Self {
        Self {
            is_folder: true,
            ..Self::new(title)
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_custom_title(mut self, custom_title: impl Into<String>) -> Self {
        self.custom_title = Some(custom_title.into());
        self
    }

    pub fn with_parent(mut self, parent: ObjectId) -> Self {
        self.parent_object_id = Some(parent);
        self
    }

    pub fn with_object_id(mut self, object_id: ObjectId) -> Self {
        self.object_id = object_id;
        self
    }
}
