pub mod article;
pub mod feed;
pub mod gmail;
pub mod notification;
pub mod state;
pub mod topic;

pub use article::{Article, ArticleFilter, ContentKind, NewArticle};
pub use feed::{Feed, FeedUpdate, NEWSLETTER_SCHEME, STANDALONE_FEED_URL};
pub use gmail::GmailConfig;
pub use notification::{NotificationHistoryEntry, NotificationMatch, NotificationRule, Priority};
pub use state::{UserArticleState, UserStats};
pub use topic::TopicEntry;
