pub mod content;
pub mod feed;
pub mod image_proxy;

pub use feed::FeedRenderer;
pub use image_proxy::ImageProxy;
