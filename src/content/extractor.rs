use crate::content::classifier::{is_main_landmark, DomClassifier};
use crate::content::dom::{inner_text, locator_for, PageDocument};
use crate::content::text_processor::{
    clean_text, format_code_for_reading, format_image_for_reading, format_table_for_reading,
};
use crate::settings::AccessiReaderSettings;
use crate::types::{priority, BlockMetadata, BlockType, ContentBlock};
use scraper::{ElementRef, Selector};
use std::cell::Cell;

/// 作为叶子抽取的块级标签
const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "blockquote", "li", "td", "th",
    "figcaption", "dt", "dd",
];

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// 直接跳过、不向下遍历的标签
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "svg", "iframe", "template", "audio", "video", "canvas",
    "object", "embed",
];

/// 单个元素的分类结果
enum NodeOutcome {
    /// 原子元素：产出至多一个块，不再遍历子元素
    Emit(Option<ContentBlock>),
    /// 普通容器：按文档顺序遍历子元素
    Descend,
}

/// Content Extractor
/// 遍历页面（或用户选中的单个元素），产出有序、带类型的内容块
pub struct ContentExtractor {
    classifier: DomClassifier,
    block_index: Cell<usize>, // 用于生成唯一ID
}

impl ContentExtractor {
    pub fn new() -> Self {
        Self::with_classifier(DomClassifier::new())
    }

    pub fn with_classifier(classifier: DomClassifier) -> Self {
        Self {
            classifier,
            block_index: Cell::new(0),
        }
    }

    pub fn classifier(&self) -> &DomClassifier {
        &self.classifier
    }

    /// 抽取整页内容
    ///
    /// 从主内容容器开始按文档顺序遍历
    ///
    /// # 返回
    /// 文档顺序的内容块列表，不含空文本块
    pub fn extract_all(&self, doc: &PageDocument) -> Vec<ContentBlock> {
        self.block_index.set(0);
        let mut blocks = Vec::new();
        let container = self.classifier.find_main_container(doc);
        self.walk(container, &mut blocks);
        tracing::debug!(
            "extracted {} blocks from <{}>",
            blocks.len(),
            container.value().name()
        );
        blocks
    }

    /// 抽取用户选中的单个元素
    ///
    /// 使用与整页遍历相同的分类规则，但不遍历子元素
    pub fn extract_single(&self, element: ElementRef<'_>) -> Option<ContentBlock> {
        if !self.classifier.is_visible(element) {
            return None;
        }
        if SKIP_TAGS.contains(&element.value().name()) {
            return None;
        }

        let within_main = self.classifier.is_within_main(element);
        match self.classify_node(element, within_main) {
            NodeOutcome::Emit(block) => block,
            NodeOutcome::Descend => self.block_from_element(element, within_main),
        }
    }

    /// 按优先级重排（可选，默认不使用）
    ///
    /// 稳定排序，同优先级保持文档顺序
    pub fn reading_order(&self, blocks: &[ContentBlock]) -> Vec<ContentBlock> {
        let mut ordered = blocks.to_vec();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        ordered
    }

    /// 按用户设置过滤
    ///
    /// 只删除，不重排
    pub fn filter_by_settings(
        &self,
        blocks: Vec<ContentBlock>,
        settings: &AccessiReaderSettings,
    ) -> Vec<ContentBlock> {
        let filter = &settings.content_filter;
        blocks
            .into_iter()
            .filter(|block| match block.block_type {
                BlockType::Ad => !settings.skip_ads,
                BlockType::Nav => !settings.skip_nav,
                BlockType::Code => {
                    !settings.skip_code
                        && block.text.chars().count() <= filter.max_code_block_length
                }
                BlockType::ImageAlt => filter.include_images,
                BlockType::Table => filter.include_tables,
                BlockType::Blockquote => filter.include_blockquotes,
                BlockType::Link => filter.include_links,
                _ => true,
            })
            .collect()
    }

    /// 显式栈的先序遍历
    ///
    /// 栈中元素都已确认可见；是否位于正文区域随遍历向下传递
    fn walk(&self, container: ElementRef<'_>, blocks: &mut Vec<ContentBlock>) {
        if !self.classifier.is_visible(container) {
            return;
        }
        let mut stack = vec![(container, self.classifier.is_within_main(container))];

        while let Some((element, within_main)) = stack.pop() {
            if SKIP_TAGS.contains(&element.value().name()) {
                continue;
            }

            match self.classify_node(element, within_main) {
                NodeOutcome::Emit(block) => blocks.extend(block),
                NodeOutcome::Descend => {
                    let children: Vec<_> = element
                        .children()
                        .filter_map(ElementRef::wrap)
                        .filter(|child| self.classifier.is_visible_within_parent(*child))
                        .map(|child| (child, within_main || is_main_landmark(child)))
                        .collect();
                    // 逆序入栈，出栈即文档顺序
                    stack.extend(children.into_iter().rev());
                }
            }
        }
    }

    /// 单元素分类
    ///
    /// 优先级：广告 > 导航（非正文）> 图片 > 表格 > 块级元素 > 容器
    fn classify_node(&self, element: ElementRef<'_>, within_main: bool) -> NodeOutcome {
        let tag = element.value().name();

        // 广告是原子的：其中的正文元素也不能漏出来
        if self.classifier.matches_ad_pattern(element) {
            let text = clean_text(&inner_text(element));
            let block = self.simple_block(element, BlockType::Ad, text, within_main);
            return NodeOutcome::Emit(block);
        }

        if self.classifier.is_nav_element(element) && !self.classifier.is_main_content(element) {
            let text = clean_text(&inner_text(element));
            let block = self.simple_block(element, BlockType::Nav, text, within_main);
            return NodeOutcome::Emit(block);
        }

        if tag == "img" {
            let alt = element
                .value()
                .attr("alt")
                .map(str::trim)
                .filter(|alt| !alt.is_empty());
            return NodeOutcome::Emit(alt.and_then(|alt| {
                let mut block = self.simple_block(
                    element,
                    BlockType::ImageAlt,
                    format_image_for_reading(Some(alt)),
                    within_main,
                )?;
                block.metadata.alt_text = Some(alt.to_string());
                Some(block)
            }));
        }

        if tag == "table" {
            let text = self.table_text(element);
            let block = self.simple_block(element, BlockType::Table, text, within_main);
            return NodeOutcome::Emit(block);
        }

        if BLOCK_TAGS.contains(&tag) {
            return NodeOutcome::Emit(self.block_from_element(element, within_main));
        }

        NodeOutcome::Descend
    }

    /// 块级元素转换为内容块
    fn block_from_element(
        &self,
        element: ElementRef<'_>,
        within_main: bool,
    ) -> Option<ContentBlock> {
        let tag = element.value().name();
        let block_type = self.classify_element(element);
        let raw_text = clean_text(&inner_text(element));
        if raw_text.is_empty() {
            return None;
        }

        let language = if block_type == BlockType::Code {
            self.classifier.detect_code_language(element)
        } else {
            None
        };

        let text = match block_type {
            BlockType::Code => format_code_for_reading(&inner_text(element), language.as_deref()),
            BlockType::ImageAlt => format_image_for_reading(element.value().attr("alt")),
            BlockType::Table => self.table_text(element),
            _ => raw_text,
        };
        if text.is_empty() {
            return None;
        }

        let level = if HEADING_TAGS.contains(&tag) {
            tag[1..].parse::<u8>().ok()
        } else {
            None
        };

        let mut metadata = self.metadata(element);
        metadata.href = first_link(element);

        Some(ContentBlock {
            id: self.generate_id(tag),
            block_type,
            text,
            locator: locator_for(element),
            level,
            language,
            priority: self.assign_priority(block_type, element, within_main),
            metadata,
        })
    }

    /// 具体类型判定
    ///
    /// 广告 > 标题 > 代码 > 引用 > 列表项 > 列表 > 链接 > 图片 > 表格 > 导航 > 段落
    fn classify_element(&self, element: ElementRef<'_>) -> BlockType {
        let tag = element.value().name();

        if self.classifier.matches_ad_pattern(element) {
            return BlockType::Ad;
        }
        if HEADING_TAGS.contains(&tag) {
            return BlockType::Heading;
        }
        if self.classifier.is_code_element(element) {
            return BlockType::Code;
        }
        match tag {
            "blockquote" => return BlockType::Blockquote,
            "li" => return BlockType::ListItem,
            "ul" | "ol" => return BlockType::List,
            "a" => return BlockType::Link,
            "img" => return BlockType::ImageAlt,
            "table" => return BlockType::Table,
            _ => {}
        }
        if self.classifier.is_nav_element(element) {
            return BlockType::Nav;
        }

        BlockType::Paragraph
    }

    /// 广告、导航、图片、表格等不需再格式化的块
    fn simple_block(
        &self,
        element: ElementRef<'_>,
        block_type: BlockType,
        text: String,
        within_main: bool,
    ) -> Option<ContentBlock> {
        if text.is_empty() {
            return None;
        }
        let tag = element.value().name();
        Some(ContentBlock {
            id: self.generate_id(tag),
            block_type,
            text,
            locator: locator_for(element),
            level: None,
            language: None,
            priority: self.assign_priority(block_type, element, within_main),
            metadata: self.metadata(element),
        })
    }

    /// 统计数据行和表头列，生成表格摘要
    fn table_text(&self, table: ElementRef<'_>) -> String {
        let (Ok(rows), Ok(cells), Ok(data_cells)) = (
            Selector::parse("tr"),
            Selector::parse("th, td"),
            Selector::parse("td"),
        ) else {
            return String::new();
        };

        let rows: Vec<ElementRef<'_>> = table.select(&rows).collect();
        let headers: Vec<String> = rows
            .first()
            .map(|row| {
                row.select(&cells)
                    .map(|cell| clean_text(&inner_text(cell)))
                    .collect()
            })
            .unwrap_or_default();
        let data_rows = rows
            .iter()
            .filter(|row| row.select(&data_cells).next().is_some())
            .count();

        format_table_for_reading(data_rows, &headers)
    }

    fn metadata(&self, element: ElementRef<'_>) -> BlockMetadata {
        let attr = |name: &str| {
            element
                .value()
                .attr(name)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        BlockMetadata {
            tag_name: element.value().name().to_string(),
            role: attr("role"),
            aria_label: attr("aria-label"),
            href: None,
            alt_text: None,
        }
    }

    /// 优先级：广告 0，导航 1，正文内 3，其余 2
    ///
    /// `within_main`：元素自身或祖先是 article / main / role=main
    fn assign_priority(
        &self,
        block_type: BlockType,
        element: ElementRef<'_>,
        within_main: bool,
    ) -> u8 {
        match block_type {
            BlockType::Ad => priority::AD,
            BlockType::Nav => priority::NAV,
            _ if within_main || self.classifier.is_main_content(element) => priority::MAIN,
            _ => priority::NORMAL,
        }
    }

    fn generate_id(&self, tag: &str) -> String {
        let index = self.block_index.get() + 1;
        self.block_index.set(index);
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        format!("block-{}-{}-{}", index, tag, to_base36(millis))
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// 块内第一个链接的目标
fn first_link(element: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("a[href]").ok()?;
    element
        .select(&selector)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(str::to_string)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
