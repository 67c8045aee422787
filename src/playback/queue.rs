use crate::types::{BlockType, ContentBlock, ReadingProgress};

/// Reading Queue
/// 有序内容块列表上的游标
///
/// 游标为 None 表示尚未开始（相当于 -1）。队列耗尽是可重复的稳定状态，不是错误。
#[derive(Debug, Clone, Default)]
pub struct ReadingQueue {
    blocks: Vec<ContentBlock>,
    index: Option<usize>,
}

impl ReadingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换内容块并重置游标
    pub fn replace(&mut self, blocks: Vec<ContentBlock>) {
        self.blocks = blocks;
        self.index = None;
    }

    /// 追加内容块，不移动游标
    pub fn enqueue(&mut self, block: ContentBlock) {
        self.blocks.push(block);
    }

    /// 前进一个块
    ///
    /// # 返回
    /// 下一个块；已到末尾时返回 None，且游标保持不变
    pub fn next(&mut self) -> Option<&ContentBlock> {
        let next = self.index.map_or(0, |i| i + 1);
        if next >= self.blocks.len() {
            return None;
        }
        self.index = Some(next);
        self.blocks.get(next)
    }

    /// 后退一个块
    ///
    /// 游标在 0 或尚未开始时不移动，返回当前块
    pub fn previous(&mut self) -> Option<&ContentBlock> {
        if let Some(i) = self.index.filter(|i| *i > 0) {
            self.index = Some(i - 1);
        }
        self.current()
    }

    /// 游标回到开始之前，下一次 next() 返回第一个块
    pub fn rewind(&mut self) {
        self.index = None;
    }

    /// 跳到指定位置，越界时不移动
    pub fn skip_to(&mut self, index: usize) -> Option<&ContentBlock> {
        if index >= self.blocks.len() {
            return None;
        }
        self.index = Some(index);
        self.blocks.get(index)
    }

    pub fn current(&self) -> Option<&ContentBlock> {
        self.index.and_then(|i| self.blocks.get(i))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.index
    }

    pub fn has_next(&self) -> bool {
        self.index.map_or(0, |i| i + 1) < self.blocks.len()
    }

    pub fn has_previous(&self) -> bool {
        self.index.is_some_and(|i| i > 0)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn progress(&self) -> ReadingProgress {
        ReadingProgress::at(self.index.unwrap_or(0), self.blocks.len())
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.index = None;
    }
}

/// 块切换时的播报文本
///
/// # 参数
/// - `from`: 上一个块，首个块时为 None
/// - `to`: 即将朗读的块
///
/// # 返回
/// 类型相同时为空串；否则为目标块类型的播报（类型不在标签表中时也为空串）
pub fn transition(from: Option<&ContentBlock>, to: &ContentBlock) -> String {
    match from {
        Some(from) if from.block_type == to.block_type => String::new(),
        _ => announcement(to),
    }
}

fn announcement(block: &ContentBlock) -> String {
    let Some(label) = block.block_type.label() else {
        return String::new();
    };

    match (block.block_type, block.level, block.language.as_deref()) {
        (BlockType::Heading, Some(level), _) => format!("Heading level {}.", level),
        (BlockType::Code, _, Some(language)) if !language.is_empty() => {
            format!("{}, {}.", label, language)
        }
        _ => format!("{}.", label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{priority, BlockMetadata};

    fn block(block_type: BlockType, text: &str) -> ContentBlock {
        ContentBlock {
            id: text.to_string(),
            block_type,
            text: text.to_string(),
            locator: "body".to_string(),
            level: None,
            language: None,
            priority: priority::NORMAL,
            metadata: BlockMetadata::default(),
        }
    }

    fn queue_of(n: usize) -> ReadingQueue {
        let mut queue = ReadingQueue::new();
        queue.replace(
            (0..n)
                .map(|i| block(BlockType::Paragraph, &format!("b{}", i)))
                .collect(),
        );
        queue
    }

    #[test]
    fn test_next_visits_each_block_once_then_exhausts() {
        let mut queue = queue_of(3);

        let seen: Vec<String> = (0..3)
            .map(|_| queue.next().unwrap().text.clone())
            .collect();
        assert_eq!(seen, vec!["b0", "b1", "b2"]);

        assert!(queue.next().is_none());
        assert_eq!(queue.current_index(), Some(2));
        assert!(queue.next().is_none());
        assert_eq!(queue.current_index(), Some(2));
        assert_eq!(queue.current().unwrap().text, "b2");
    }

    #[test]
    fn test_previous_is_floored() {
        let mut queue = queue_of(3);

        assert!(queue.previous().is_none());
        assert_eq!(queue.current_index(), None);

        queue.next();
        assert_eq!(queue.previous().unwrap().text, "b0");
        assert_eq!(queue.current_index(), Some(0));

        queue.next();
        queue.next();
        assert_eq!(queue.previous().unwrap().text, "b1");
    }

    #[test]
    fn test_replace_resets_cursor() {
        let mut queue = queue_of(2);
        queue.next();
        queue.next();

        queue.replace(vec![block(BlockType::Heading, "new")]);
        assert!(queue.current().is_none());
        assert_eq!(queue.next().unwrap().text, "new");
    }

    #[test]
    fn test_navigation_helpers() {
        let mut queue = queue_of(4);
        assert!(queue.has_next());
        assert!(!queue.has_previous());

        assert_eq!(queue.skip_to(3).unwrap().text, "b3");
        assert!(!queue.has_next());
        assert!(queue.has_previous());
        assert!(queue.skip_to(9).is_none());
        assert_eq!(queue.current_index(), Some(3));

        assert_eq!(queue.progress().percentage, 100.0);

        queue.enqueue(block(BlockType::Paragraph, "b4"));
        assert!(queue.has_next());

        queue.rewind();
        assert_eq!(queue.next().unwrap().text, "b0");

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_transition_texts() {
        let paragraph = block(BlockType::Paragraph, "p");
        let mut heading = block(BlockType::Heading, "h");
        heading.level = Some(2);
        let mut code = block(BlockType::Code, "c");
        code.language = Some("python".to_string());
        let table = block(BlockType::Table, "t");

        assert_eq!(transition(Some(&paragraph), &heading), "Heading level 2.");
        assert_eq!(transition(Some(&heading), &code), "Code block, python.");
        assert_eq!(transition(Some(&code), &table), "Table.");
        assert_eq!(transition(Some(&paragraph), &paragraph.clone()), "");
        assert_eq!(transition(Some(&heading), &paragraph), "");
        assert_eq!(transition(None, &heading), "Heading level 2.");
        assert_eq!(transition(None, &paragraph), "");
    }

    #[test]
    fn test_code_without_language() {
        let code = block(BlockType::Code, "c");
        assert_eq!(transition(None, &code), "Code block.");
    }
}
