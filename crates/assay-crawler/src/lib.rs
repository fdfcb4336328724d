pub mod crawler;
pub mod error;
pub mod mounts;
pub mod retry;
pub mod source;
pub mod tables;

pub use crawler::{CrawlOutcome, CrawlPolicy, CrawlState, CrawlerBase, Fetch, FetchFn, Fetched};
pub use mounts::{Mount, MountsCrawler};
pub use tables::{Table, TableType, TablesCrawler};
