use std::sync::Arc;

use crate::app::Result;
use crate::cache::TieredCache;
use crate::cluster::Clusterer;
use crate::config::Config;
use crate::feeds::FeedParser;
use crate::fetch::archive::ArchiveService;
use crate::fetch::render::JsRenderer;
use crate::fetch::{EnhancedFetcher, Fetcher};
use crate::gmail::GmailPoller;
use crate::library::LibraryService;
use crate::llm::{self, Provider};
use crate::related::RelatedLinksService;
use crate::resolver::SourceResolver;
use crate::scheduler::Scheduler;
use crate::store::SqliteStore;
use crate::summarize::Summarizer;

/// Wires every component together with explicit dependencies; nothing here
/// reaches back into a global.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub cache: Arc<TieredCache>,
    pub fetcher: Arc<EnhancedFetcher>,
    pub feed_parser: Arc<FeedParser>,
    pub resolver: Arc<SourceResolver>,
    pub provider: Option<Arc<dyn Provider>>,
    pub summarizer: Option<Arc<Summarizer>>,
    pub clusterer: Option<Arc<Clusterer>>,
    pub related_links: Option<Arc<RelatedLinksService>>,
    pub library: Arc<LibraryService>,
    pub scheduler: Arc<Scheduler>,
    pub gmail_poller: Arc<GmailPoller>,
}

impl AppContext {
    pub fn from_env() -> Result<Self> {
        Self::with_config(Config::from_env()?)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(&config.db_path)?);
        let cache = Arc::new(TieredCache::with_defaults(&config.cache_dir)?);

        let renderer = config
            .enable_js_render
            .then(|| JsRenderer::new(config.js_render_timeout_ms));
        let archive = if config.enable_archive {
            Some(ArchiveService::new(30, config.archive_max_age_days)?)
        } else {
            None
        };
        let fetcher = Arc::new(EnhancedFetcher::new(
            Fetcher::with_defaults()?,
            renderer,
            archive,
        ));

        let feed_parser = Arc::new(FeedParser::with_defaults()?);
        let resolver = Arc::new(SourceResolver::with_defaults()?);

        let provider = llm::provider_from_config(&config);
        let summarizer = provider
            .clone()
            .map(|p| Arc::new(Summarizer::new(p, Some(cache.clone()), true)));
        let clusterer = provider
            .clone()
            .map(|p| Arc::new(Clusterer::new(p, Some(cache.clone()))));
        let related_links = match (&provider, &config.exa_api_key) {
            (Some(provider), Some(key)) if config.enable_related_links => Some(Arc::new(
                RelatedLinksService::new(key, cache.clone(), provider.clone())?,
            )),
            _ => None,
        };

        let library = Arc::new(LibraryService::new(
            store.clone(),
            fetcher.clone(),
            &config.uploads_dir,
            config.max_upload_size_mb,
        )?);

        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            feed_parser.clone(),
            fetcher.clone(),
            resolver.clone(),
            summarizer.clone(),
        ));

        let gmail_poller = Arc::new(GmailPoller::new(store.clone(), &config));

        Ok(Self {
            config,
            store,
            cache,
            fetcher,
            feed_parser,
            resolver,
            provider,
            summarizer,
            clusterer,
            related_links,
            library,
            scheduler,
            gmail_poller,
        })
    }
}
