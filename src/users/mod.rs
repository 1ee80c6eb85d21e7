// User directory: user records and the follow graph
use std::collections::HashMap;

use serde::Serialize;

use crate::db::models::{User, UserFields};
use crate::error::{ensure_matched, AppError, AppResult};
use crate::store::{Collection, DocumentStore, Filter, Record, Update};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowStatus {
    Followed,
    AlreadyFollowed,
    Unfollowed,
    NotFollowed,
}

#[derive(Clone)]
pub struct UserDirectory {
    store: DocumentStore,
}

impl UserDirectory {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Mobile and email are claimed atomically with the insert, so two
    /// concurrent creations with the same value cannot both succeed.
    pub fn create_user(&self, fields: UserFields) -> AppResult<String> {
        let id = self
            .store
            .session(|s| s.users().insert(&User::from(fields)))?;
        tracing::info!(user_id = %id, "User created");
        Ok(id)
    }

    pub fn list_users(&self) -> AppResult<Vec<Record<User>>> {
        Ok(self.store.session(|s| s.users().find(&Filter::All))?)
    }

    pub fn search_users(&self, name_fragment: &str) -> AppResult<Vec<Record<User>>> {
        let filter = Filter::contains_ignore_case("name", name_fragment);
        Ok(self.store.session(|s| s.users().find(&filter))?)
    }

    pub fn get_user(&self, id: &str) -> AppResult<Record<User>> {
        self.store
            .session(|s| s.users().get(id))?
            .ok_or(AppError::NotFound)
    }

    /// Overwrite name, mobile and email. The follow lists are untouched.
    pub fn update_user(
        &self,
        id: &str,
        fields: UserFields,
        expected_revision: Option<i64>,
    ) -> AppResult<()> {
        let filter = match expected_revision {
            Some(revision) => Filter::id(id).and(Filter::Revision(revision)),
            None => Filter::id(id),
        };

        self.store.session(|s| {
            let users = s.users();
            let matched = users.update_one(&filter, &Update::set(&fields)?)?;
            ensure_matched(&users, id, matched)
        })?;

        tracing::info!(user_id = %id, "User updated");
        Ok(())
    }

    /// Hard delete. Ids held in other users' follow lists are left dangling.
    pub fn delete_user(&self, id: &str) -> AppResult<()> {
        let deleted = self
            .store
            .session(|s| s.users().delete_one(&Filter::id(id)))?;
        if deleted == 0 {
            return Err(AppError::NotFound);
        }
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Both sides of the relationship are written in one transaction.
    pub fn follow(&self, user_id: &str, target_id: &str) -> AppResult<FollowStatus> {
        if user_id == target_id {
            return Err(AppError::BadRequest("Users cannot follow themselves".into()));
        }

        let status = self.store.transaction(|s| {
            let users = s.users();
            let user: Record<User> = users.get(user_id)?.ok_or(AppError::NotFound)?;
            let target: Record<User> = users.get(target_id)?.ok_or(AppError::NotFound)?;

            if user.data.followed_users.iter().any(|id| id == target_id) {
                return Ok(FollowStatus::AlreadyFollowed);
            }

            users.update_one(
                &Filter::id(user_id),
                &Update::push("followed_users", &target_id)?,
            )?;
            if !target.data.followers.iter().any(|id| id == user_id) {
                users.update_one(&Filter::id(target_id), &Update::push("followers", &user_id)?)?;
            }
            Ok::<_, AppError>(FollowStatus::Followed)
        })?;

        if status == FollowStatus::Followed {
            tracing::info!(user_id, target_id, "User followed");
        }
        Ok(status)
    }

    /// Inverse of [`follow`](Self::follow). A target that no longer exists is
    /// still removed from the follower's list.
    pub fn unfollow(&self, user_id: &str, target_id: &str) -> AppResult<FollowStatus> {
        let status = self.store.transaction(|s| {
            let users = s.users();
            let user: Record<User> = users.get(user_id)?.ok_or(AppError::NotFound)?;
            let followed = user.data.followed_users.iter().any(|id| id == target_id);
            let target_exists = users.exists(target_id)?;

            if !followed {
                return if target_exists {
                    Ok(FollowStatus::NotFollowed)
                } else {
                    Err(AppError::NotFound)
                };
            }

            users.update_one(&Filter::id(user_id), &Update::pull("followed_users", target_id))?;
            if target_exists {
                users.update_one(&Filter::id(target_id), &Update::pull("followers", user_id))?;
            }
            Ok::<_, AppError>(FollowStatus::Unfollowed)
        })?;

        if status == FollowStatus::Unfollowed {
            tracing::info!(user_id, target_id, "User unfollowed");
        }
        Ok(status)
    }

    /// Users this user follows, in follow order. Deleted users are skipped.
    pub fn list_followed_users(&self, user_id: &str) -> AppResult<Vec<Record<User>>> {
        self.store.session(|s| {
            let users = s.users();
            let user: Record<User> = users.get(user_id)?.ok_or(AppError::NotFound)?;
            resolve(&users, user.data.followed_users)
        })
    }

    /// Users following this user, in follow order. Deleted users are skipped.
    pub fn list_followers(&self, user_id: &str) -> AppResult<Vec<Record<User>>> {
        self.store.session(|s| {
            let users = s.users();
            let user: Record<User> = users.get(user_id)?.ok_or(AppError::NotFound)?;
            resolve(&users, user.data.followers)
        })
    }
}

fn resolve(users: &Collection<'_>, ids: Vec<String>) -> AppResult<Vec<Record<User>>> {
    let mut found: HashMap<String, Record<User>> = users
        .find(&Filter::IdIn(ids.clone()))?
        .into_iter()
        .map(|record: Record<User>| (record.id.clone(), record))
        .collect();

    Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
}
