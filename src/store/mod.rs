pub mod sqlite;

pub use sqlite::{ArticleStats, RuleUpdate, SqliteStore};
