//! Discussion board: discussions, counters, and their embedded comments.
//!
//! Counter bumps and comment appends are single atomic store updates. Every
//! other comment mutation loads the discussion, edits the comment list in
//! memory and writes it back guarded by the revision it loaded, so a
//! concurrent change surfaces as a conflict instead of being overwritten.

pub mod comments;

pub use comments::CommentRef;

use comments::apply_patch;

use chrono::Utc;

use crate::db::models::{Comment, CommentPatch, Discussion, DiscussionFields, NewComment};
use crate::error::{ensure_matched, AppError, AppResult};
use crate::store::{DocumentStore, Filter, Record, Update};

#[derive(Clone)]
pub struct DiscussionBoard {
    store: DocumentStore,
}

impl DiscussionBoard {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn create_discussion(&self, fields: DiscussionFields) -> AppResult<String> {
        let discussion = fields.into_discussion(Utc::now());
        let id = self
            .store
            .session(|s| s.discussions().insert(&discussion))?;
        tracing::info!(discussion_id = %id, "Discussion created");
        Ok(id)
    }

    pub fn list_discussions(&self) -> AppResult<Vec<Record<Discussion>>> {
        Ok(self.store.session(|s| s.discussions().find(&Filter::All))?)
    }

    pub fn get_discussion(&self, id: &str) -> AppResult<Record<Discussion>> {
        self.store
            .session(|s| s.discussions().get(id))?
            .ok_or(AppError::NotFound)
    }

    pub fn find_by_text(&self, fragment: &str) -> AppResult<Vec<Record<Discussion>>> {
        let filter = Filter::contains_ignore_case("text", fragment);
        Ok(self.store.session(|s| s.discussions().find(&filter))?)
    }

    /// Matches discussions carrying any of `#tag` for the given tags. Stored
    /// hashtags without the leading `#` never match.
    pub fn find_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> AppResult<Vec<Record<Discussion>>> {
        let filter = Filter::array_contains_any(
            "hashtags",
            tags.iter().map(|tag| format!("#{}", tag.as_ref())),
        );
        Ok(self.store.session(|s| s.discussions().find(&filter))?)
    }

    /// Overwrite text, image, hashtags and counters. Comments and the creation
    /// time are kept.
    pub fn update_discussion(
        &self,
        id: &str,
        fields: DiscussionFields,
        expected_revision: Option<i64>,
    ) -> AppResult<()> {
        let filter = match expected_revision {
            Some(revision) => Filter::id(id).and(Filter::Revision(revision)),
            None => Filter::id(id),
        };

        self.store.session(|s| {
            let discussions = s.discussions();
            let matched = discussions.update_one(&filter, &Update::set(&fields)?)?;
            ensure_matched(&discussions, id, matched)
        })?;

        tracing::info!(discussion_id = %id, "Discussion updated");
        Ok(())
    }

    pub fn delete_discussion(&self, id: &str) -> AppResult<()> {
        let deleted = self
            .store
            .session(|s| s.discussions().delete_one(&Filter::id(id)))?;
        if deleted == 0 {
            return Err(AppError::NotFound);
        }
        tracing::info!(discussion_id = %id, "Discussion deleted");
        Ok(())
    }

    pub fn like_discussion(&self, id: &str) -> AppResult<()> {
        self.increment(id, "likes")
    }

    pub fn record_view(&self, id: &str) -> AppResult<()> {
        self.increment(id, "views")
    }

    fn increment(&self, id: &str, counter: &'static str) -> AppResult<()> {
        let matched = self
            .store
            .session(|s| s.discussions().update_one(&Filter::id(id), &Update::inc(counter, 1)))?;
        if matched == 0 {
            return Err(AppError::NotFound);
        }
        tracing::debug!(discussion_id = %id, counter, "Counter incremented");
        Ok(())
    }

    /// Atomic append; returns the stored comment with its assigned id.
    pub fn add_comment(&self, id: &str, new: NewComment) -> AppResult<Comment> {
        let comment = new.into_comment(Utc::now());
        let matched = self.store.session(|s| {
            s.discussions()
                .update_one(&Filter::id(id), &Update::push("comments", &comment)?)
        })?;
        if matched == 0 {
            return Err(AppError::NotFound);
        }
        tracing::info!(discussion_id = %id, comment_id = %comment.id, "Comment added");
        Ok(comment)
    }

    pub fn update_comment(
        &self,
        id: &str,
        target: &CommentRef,
        patch: CommentPatch,
        expected_revision: Option<i64>,
    ) -> AppResult<Comment> {
        let now = Utc::now();
        self.mutate_comments(id, expected_revision, |comments| {
            let comment = locate(comments, target)?;
            apply_patch(comment, patch, now);
            Ok(comment.clone())
        })
    }

    pub fn like_comment(
        &self,
        id: &str,
        target: &CommentRef,
        expected_revision: Option<i64>,
    ) -> AppResult<Comment> {
        self.mutate_comments(id, expected_revision, |comments| {
            let comment = locate(comments, target)?;
            comment.likes += 1;
            Ok(comment.clone())
        })
    }

    /// Removes the comment; later comments move down one position.
    pub fn delete_comment(
        &self,
        id: &str,
        target: &CommentRef,
        expected_revision: Option<i64>,
    ) -> AppResult<Comment> {
        let removed = self.mutate_comments(id, expected_revision, |comments| {
            let position = target.position(comments).ok_or(AppError::NotFound)?;
            Ok(comments.remove(position))
        })?;
        tracing::info!(discussion_id = %id, comment_id = %removed.id, "Comment deleted");
        Ok(removed)
    }

    pub fn add_reply(
        &self,
        id: &str,
        target: &CommentRef,
        new: NewComment,
        expected_revision: Option<i64>,
    ) -> AppResult<Comment> {
        let reply = new.into_comment(Utc::now());
        self.mutate_comments(id, expected_revision, |comments| {
            locate(comments, target)?.replies.push(reply.clone());
            Ok(reply)
        })
    }

    /// Load, edit the comment list, and store it back only if the discussion
    /// is still at the revision that was loaded.
    fn mutate_comments<T>(
        &self,
        id: &str,
        expected_revision: Option<i64>,
        mutate: impl FnOnce(&mut Vec<Comment>) -> AppResult<T>,
    ) -> AppResult<T> {
        self.store.session(|s| {
            let discussions = s.discussions();
            let current: Record<Discussion> = discussions.get(id)?.ok_or(AppError::NotFound)?;
            if expected_revision.is_some_and(|revision| revision != current.revision) {
                return Err(AppError::stale(id));
            }

            let mut comments = current.data.comments;
            let outcome = mutate(&mut comments)?;

            let guard = Filter::id(id).and(Filter::Revision(current.revision));
            let matched = discussions.update_one(&guard, &Update::set_field("comments", &comments)?)?;
            ensure_matched(&discussions, id, matched)?;
            Ok(outcome)
        })
    }
}

/// Out-of-range positions are reported like a missing discussion.
fn locate<'c>(comments: &'c mut [Comment], target: &CommentRef) -> AppResult<&'c mut Comment> {
    let position = target.position(comments).ok_or(AppError::NotFound)?;
    Ok(&mut comments[position])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::CollectionNames;

    fn board() -> DiscussionBoard {
        let store = DocumentStore::new(db::memory_pool().unwrap(), CollectionNames::default());
        DiscussionBoard::new(store)
    }

    fn fields(text: &str, hashtags: &[&str]) -> DiscussionFields {
        DiscussionFields {
            text: text.into(),
            image: None,
            hashtags: hashtags.iter().map(|t| t.to_string()).collect(),
            views: 0,
            likes: 0,
        }
    }

    fn new_comment(text: &str) -> NewComment {
        NewComment {
            text: text.into(),
            author: "ann".into(),
        }
    }

    fn texts(board: &DiscussionBoard, id: &str) -> Vec<String> {
        board
            .get_discussion(id)
            .unwrap()
            .data
            .comments
            .into_iter()
            .map(|c| c.text)
            .collect()
    }

    #[test]
    fn create_starts_empty_with_request_time() {
        let board = board();
        let before = Utc::now();
        let id = board.create_discussion(fields("hello", &["#go"])).unwrap();

        let record = board.get_discussion(&id).unwrap();
        assert!(record.data.comments.is_empty());
        assert_eq!(record.data.views, 0);
        assert!(record.data.created_on >= before);
    }

    #[test]
    fn separate_creations_get_their_own_timestamps() {
        let board = board();
        let a = board.create_discussion(fields("a", &[])).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = board.create_discussion(fields("b", &[])).unwrap();
        assert!(
            board.get_discussion(&b).unwrap().data.created_on
                > board.get_discussion(&a).unwrap().data.created_on
        );
    }

    #[test]
    fn comments_append_in_order() {
        let board = board();
        let id = board.create_discussion(fields("d", &[])).unwrap();
        for text in ["c0", "c1", "c2", "c3"] {
            board.add_comment(&id, new_comment(text)).unwrap();
        }
        assert_eq!(texts(&board, &id), ["c0", "c1", "c2", "c3"]);
    }

    #[test]
    fn add_comment_to_missing_discussion_is_not_found() {
        let board = board();
        assert!(matches!(
            board.add_comment("missing", new_comment("x")),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn delete_by_index_shifts_later_comments() {
        let board = board();
        let id = board.create_discussion(fields("d", &[])).unwrap();
        for text in ["c0", "c1", "c2"] {
            board.add_comment(&id, new_comment(text)).unwrap();
        }

        board.delete_comment(&id, &CommentRef::Index(1), None).unwrap();
        assert_eq!(texts(&board, &id), ["c0", "c2"]);

        let removed = board.delete_comment(&id, &CommentRef::Index(1), None).unwrap();
        assert_eq!(removed.text, "c2");
        assert_eq!(texts(&board, &id), ["c0"]);
    }

    #[test]
    fn stable_ids_survive_earlier_deletions() {
        let board = board();
        let id = board.create_discussion(fields("d", &[])).unwrap();
        board.add_comment(&id, new_comment("c0")).unwrap();
        let c1 = board.add_comment(&id, new_comment("c1")).unwrap();

        board.delete_comment(&id, &CommentRef::Index(0), None).unwrap();
        let liked = board
            .like_comment(&id, &CommentRef::Id(c1.id.clone()), None)
            .unwrap();
        assert_eq!(liked.text, "c1");
        assert_eq!(liked.likes, 1);
    }

    #[test]
    fn out_of_range_index_is_not_found() {
        let board = board();
        let id = board.create_discussion(fields("d", &[])).unwrap();
        board.add_comment(&id, new_comment("c0")).unwrap();

        let patch = CommentPatch::default();
        assert!(matches!(
            board.update_comment(&id, &CommentRef::Index(1), patch, None),
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            board.like_comment(&id, &CommentRef::Index(5), None),
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            board.delete_comment("missing", &CommentRef::Index(0), None),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn like_discussion_counts_every_call() {
        let board = board();
        let id = board.create_discussion(fields("d", &[])).unwrap();
        for _ in 0..7 {
            board.like_discussion(&id).unwrap();
        }
        board.record_view(&id).unwrap();

        let record = board.get_discussion(&id).unwrap();
        assert_eq!(record.data.likes, 7);
        assert_eq!(record.data.views, 1);
        assert!(matches!(board.like_discussion("missing"), Err(AppError::NotFound)));
    }

    #[test]
    fn update_comment_merges_and_stamps() {
        let board = board();
        let id = board.create_discussion(fields("d", &[])).unwrap();
        board.add_comment(&id, new_comment("c0")).unwrap();
        board.like_comment(&id, &CommentRef::Index(0), None).unwrap();

        let patch = CommentPatch {
            text: Some("edited".into()),
            ..Default::default()
        };
        let updated = board
            .update_comment(&id, &CommentRef::Index(0), patch, None)
            .unwrap();

        assert_eq!(updated.text, "edited");
        assert_eq!(updated.author, "ann");
        assert_eq!(updated.likes, 1);
        assert!(updated.updated_on.is_some());
        assert_eq!(board.get_discussion(&id).unwrap().data.comments[0], updated);
    }

    #[test]
    fn stale_comment_update_is_rejected_and_like_survives() {
        let board = board();
        let id = board.create_discussion(fields("d", &[])).unwrap();
        board.add_comment(&id, new_comment("c0")).unwrap();
        let loaded = board.get_discussion(&id).unwrap();

        board.like_comment(&id, &CommentRef::Index(0), None).unwrap();

        let patch = CommentPatch {
            text: Some("from stale view".into()),
            likes: Some(0),
            ..Default::default()
        };
        let result = board.update_comment(&id, &CommentRef::Index(0), patch, Some(loaded.revision));
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let comment = &board.get_discussion(&id).unwrap().data.comments[0];
        assert_eq!(comment.likes, 1);
        assert_eq!(comment.text, "c0");
    }

    #[test]
    fn replies_nest_under_their_comment() {
        let board = board();
        let id = board.create_discussion(fields("d", &[])).unwrap();
        let parent = board.add_comment(&id, new_comment("parent")).unwrap();

        let reply = board
            .add_reply(&id, &CommentRef::Id(parent.id.clone()), new_comment("reply"), None)
            .unwrap();

        let stored = &board.get_discussion(&id).unwrap().data.comments[0];
        assert_eq!(stored.replies.len(), 1);
        assert_eq!(stored.replies[0].id, reply.id);
        assert_ne!(reply.id, parent.id);
    }

    #[test]
    fn find_by_tags_prefixes_hash() {
        let board = board();
        board.create_discussion(fields("a", &["#go"])).unwrap();
        board.create_discussion(fields("b", &["go"])).unwrap();
        board.create_discussion(fields("c", &["#rust", "#golang"])).unwrap();

        let found: Vec<String> = board
            .find_by_tags(&["go"])
            .unwrap()
            .into_iter()
            .map(|r| r.data.text)
            .collect();
        assert_eq!(found, ["a"]);

        let either = board.find_by_tags(&["go", "rust"]).unwrap();
        assert_eq!(either.len(), 2);
        assert!(board.find_by_tags::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn find_by_text_ignores_case() {
        let board = board();
        board.create_discussion(fields("Rust Ownership", &[])).unwrap();
        board.create_discussion(fields("borrowing", &[])).unwrap();

        let found = board.find_by_text("OWNER").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data.text, "Rust Ownership");
    }

    #[test]
    fn update_discussion_keeps_comments() {
        let board = board();
        let id = board.create_discussion(fields("d", &["#go"])).unwrap();
        board.add_comment(&id, new_comment("c0")).unwrap();

        let mut replacement = fields("new text", &["#rust"]);
        replacement.image = Some("https://img/1.png".into());
        board.update_discussion(&id, replacement, None).unwrap();

        let record = board.get_discussion(&id).unwrap();
        assert_eq!(record.data.text, "new text");
        assert_eq!(record.data.hashtags, ["#rust"]);
        assert_eq!(record.data.image.as_deref(), Some("https://img/1.png"));
        assert_eq!(record.data.comments.len(), 1);
    }

    #[test]
    fn delete_discussion_then_not_found() {
        let board = board();
        let id = board.create_discussion(fields("d", &[])).unwrap();
        board.delete_discussion(&id).unwrap();
        assert!(matches!(board.get_discussion(&id), Err(AppError::NotFound)));
        assert!(matches!(board.delete_discussion(&id), Err(AppError::NotFound)));
    }
}
