// Content 模块
// 从页面快照中抽取有序、带类型、可朗读的内容块

pub mod dom;
pub mod classifier;
pub mod text_processor;
pub mod extractor;

// 重新导出主要类型
pub use dom::{DomProbe, PageDocument, StaticDomProbe};
pub use classifier::DomClassifier;
pub use extractor::ContentExtractor;
