use chrono::{DateTime, Utc};

use crate::db::models::{Comment, CommentPatch};

/// Addresses a comment either by its current position or by its stable id.
/// Positions shift when an earlier comment is deleted; ids never do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentRef {
    Index(usize),
    Id(String),
}

impl CommentRef {
    /// All-digit segments are positions, anything else is an id.
    pub fn parse(segment: &str) -> Self {
        match segment.parse::<usize>() {
            Ok(index) if segment.bytes().all(|b| b.is_ascii_digit()) => Self::Index(index),
            _ => Self::Id(segment.to_string()),
        }
    }

    pub fn position(&self, comments: &[Comment]) -> Option<usize> {
        match self {
            Self::Index(index) => (*index < comments.len()).then_some(*index),
            Self::Id(id) => comments.iter().position(|c| &c.id == id),
        }
    }
}

/// Shallow merge: only fields present in the patch are overwritten.
pub fn apply_patch(comment: &mut Comment, patch: CommentPatch, now: DateTime<Utc>) {
    if let Some(text) = patch.text {
        comment.text = text;
    }
    if let Some(author) = patch.author {
        comment.author = author;
    }
    if let Some(likes) = patch.likes {
        comment.likes = likes;
    }
    comment.updated_on = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewComment;

    fn comment(text: &str) -> Comment {
        NewComment {
            text: text.into(),
            author: "ann".into(),
        }
        .into_comment(Utc::now())
    }

    #[test]
    fn digits_parse_as_index() {
        assert_eq!(CommentRef::parse("0"), CommentRef::Index(0));
        assert_eq!(CommentRef::parse("12"), CommentRef::Index(12));
    }

    #[test]
    fn everything_else_parses_as_id() {
        assert_eq!(CommentRef::parse("+1"), CommentRef::Id("+1".into()));
        assert_eq!(
            CommentRef::parse("0190a5c2-7b1e-7cc0-9a55-1f1f1f1f1f1f"),
            CommentRef::Id("0190a5c2-7b1e-7cc0-9a55-1f1f1f1f1f1f".into())
        );
    }

    #[test]
    fn position_checks_bounds_and_ids() {
        let comments = vec![comment("a"), comment("b")];
        assert_eq!(CommentRef::Index(1).position(&comments), Some(1));
        assert_eq!(CommentRef::Index(2).position(&comments), None);
        assert_eq!(
            CommentRef::Id(comments[1].id.clone()).position(&comments),
            Some(1)
        );
        assert_eq!(CommentRef::Id("nope".into()).position(&comments), None);
    }

    #[test]
    fn patch_overwrites_only_given_fields() {
        let mut c = comment("before");
        c.likes = 4;
        let now = Utc::now();

        apply_patch(
            &mut c,
            CommentPatch {
                text: Some("after".into()),
                ..Default::default()
            },
            now,
        );

        assert_eq!(c.text, "after");
        assert_eq!(c.author, "ann");
        assert_eq!(c.likes, 4);
        assert_eq!(c.updated_on, Some(now));
    }
}
