use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::discussions::DiscussionBoard;
use crate::store::DocumentStore;
use crate::users::UserDirectory;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: UserDirectory,
    pub discussions: DiscussionBoard,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> Self {
        let store = DocumentStore::new(pool, config.store.collection_names());
        Self {
            config,
            users: UserDirectory::new(store.clone()),
            discussions: DiscussionBoard::new(store),
        }
    }
}
