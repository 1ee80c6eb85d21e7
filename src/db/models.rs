use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub mobile: String,
    pub email: String,
    #[serde(default)]
    pub followed_users: Vec<String>,
    #[serde(default)]
    pub followers: Vec<String>,
}

/// Mutable user fields, used for both creation and full overwrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFields {
    pub name: String,
    pub mobile: String,
    pub email: String,
}

impl From<UserFields> for User {
    fn from(fields: UserFields) -> Self {
        Self {
            name: fields.name,
            mobile: fields.mobile,
            email: fields.email,
            followed_users: Vec::new(),
            followers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_on: DateTime<Utc>,
}

/// Mutable discussion fields. Comments and the creation time are never
/// overwritten through these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionFields {
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
}

impl DiscussionFields {
    pub fn into_discussion(self, created_on: DateTime<Utc>) -> Discussion {
        Discussion {
            text: self.text,
            image: self.image,
            hashtags: self.hashtags,
            views: self.views,
            likes: self.likes,
            comments: Vec::new(),
            created_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub replies: Vec<Comment>,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub text: String,
    pub author: String,
}

impl NewComment {
    pub fn into_comment(self, created_on: DateTime<Utc>) -> Comment {
        Comment {
            id: uuid::Uuid::now_v7().to_string(),
            text: self.text,
            author: self.author,
            likes: 0,
            replies: Vec::new(),
            created_on,
            updated_on: None,
        }
    }
}

/// Shallow patch for a comment; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentPatch {
    pub text: Option<String>,
    pub author: Option<String>,
    pub likes: Option<u64>,
}
