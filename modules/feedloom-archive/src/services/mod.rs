pub mod bilibili;
pub mod douban;
pub mod zhihu;
mod zhihu_html;

use feedloom_common::Platform;

use crate::normalize::Normalizer;
use crate::source::PageSource;

pub use bilibili::{BilibiliNormalizer, BilibiliSource};
pub use douban::{DoubanNormalizer, DoubanSource};
pub use zhihu::{ZhihuNormalizer, ZhihuSource};

/// The normalizer for a platform's raw records.
pub fn normalizer_for(platform: Platform) -> Box<dyn Normalizer> {
    match platform {
        Platform::Bilibili | Platform::BilibiliAlt => Box::new(BilibiliNormalizer::new(platform)),
        Platform::Zhihu => Box::new(ZhihuNormalizer),
        Platform::Douban => Box::new(DoubanNormalizer),
    }
}

/// An authenticated page source for a platform.
pub fn source_for(
    platform: Platform,
    client: reqwest::Client,
    credential: &str,
) -> Box<dyn PageSource> {
    match platform {
        Platform::Bilibili | Platform::BilibiliAlt => {
            Box::new(BilibiliSource::new(client, platform, credential))
        }
        Platform::Zhihu => Box::new(ZhihuSource::new(client, credential)),
        Platform::Douban => Box::new(DoubanSource::new(client, credential)),
    }
}
