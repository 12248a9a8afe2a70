use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted video in the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Store-assigned identifier
    pub id: Uuid,
    /// Locator of the stored blob, served back verbatim
    pub url: String,
    pub caption: Option<String>,
    pub username: Option<String>,
    pub user_avatar: Option<String>,
    pub song_name: Option<String>,
    /// Like counter (inert in this service)
    #[serde(default)]
    pub likes: i64,
    /// Comment thread (inert in this service)
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// When the store created the record
    pub created_at: DateTime<Utc>,
}

/// A single comment on a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub user: String,
}

/// Optional text fields sent alongside an upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFields {
    pub caption: Option<String>,
    pub username: Option<String>,
    pub user_avatar: Option<String>,
    pub song_name: Option<String>,
}

impl UploadFields {
    /// Set a field by its multipart form name. Unknown names are ignored.
    ///
    /// Returns `true` if the name was recognized.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "caption" => &mut self.caption,
            "username" => &mut self.username,
            "userAvatar" => &mut self.user_avatar,
            "songName" => &mut self.song_name,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Payload for creating a record in the metadata store.
///
/// The store assigns `id` and `created_at`, and starts `likes` and `comments` empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVideo {
    pub url: String,
    pub fields: UploadFields,
}

impl NewVideo {
    pub fn new(url: impl Into<String>, fields: UploadFields) -> Self {
        Self {
            url: url.into(),
            fields,
        }
    }

    /// Materialize the record as a store would on create
    pub fn into_record(self, id: Uuid, created_at: DateTime<Utc>) -> VideoRecord {
        VideoRecord {
            id,
            url: self.url,
            caption: self.fields.caption,
            username: self.fields.username,
            user_avatar: self.fields.user_avatar,
            song_name: self.fields.song_name,
            likes: 0,
            comments: Vec::new(),
            created_at,
        }
    }
}
