use crate::error::Result;
use scraper::{ElementRef, Html, Selector};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// 不产生可读文本的标签
const NON_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// innerText 中前后换行的块级标签
const LINE_BREAK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "footer", "nav", "aside", "h1", "h2",
    "h3", "h4", "h5", "h6", "pre", "blockquote", "li", "ul", "ol", "tr", "table", "figure",
    "figcaption", "dt", "dd", "dl",
];

/// 页面快照
///
/// 对宿主文档的只读封装：标签名、属性、内联样式、文本和子节点枚举。
/// 核心从不修改页面内容。
pub struct PageDocument {
    html: Html,
}

impl PageDocument {
    /// 解析完整 HTML 文档
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// 从文件读取并解析
    pub fn from_path(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        Ok(Self::parse(&source))
    }

    /// 根元素（html）
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// body 元素；缺失时退回根元素
    pub fn body(&self) -> ElementRef<'_> {
        self.query("body").unwrap_or_else(|| self.root())
    }

    /// 第一个匹配选择器的元素
    ///
    /// 无效或不支持的选择器视为不匹配
    pub fn query(&self, selector: &str) -> Option<ElementRef<'_>> {
        let selector = Selector::parse(selector).ok()?;
        self.html.select(&selector).next()
    }

    /// 所有匹配选择器的元素（文档顺序）
    pub fn query_all(&self, selector: &str) -> Vec<ElementRef<'_>> {
        match Selector::parse(selector) {
            Ok(selector) => self.html.select(&selector).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// 根据定位器重新查找节点
    ///
    /// 页面变化后定位器可能失效，此时返回 None
    pub fn resolve(&self, locator: &str) -> Option<ElementRef<'_>> {
        self.query(locator)
    }
}

/// DOM 能力接口
///
/// 分类逻辑只依赖这两个能力，便于在内存文档树上测试。
pub trait DomProbe {
    /// 元素是否可见
    fn is_visible(&self, element: ElementRef<'_>) -> bool;

    /// 父元素已知可见时，元素自身是否可见
    ///
    /// 遍历时逐层使用，避免对每个元素重新检查整条祖先链
    fn is_visible_within_parent(&self, element: ElementRef<'_>) -> bool {
        self.is_visible(element)
    }

    /// 元素是否匹配选择器；无效选择器返回 false 而不是报错
    fn matches(&self, element: ElementRef<'_>, selector: &str) -> bool;
}

/// 基于静态 HTML 的探测器
///
/// 没有布局引擎，可见性由 hidden 属性、内联样式和 aria-hidden 推断。
#[derive(Default)]
pub struct StaticDomProbe {
    selectors: RefCell<HashMap<String, Option<Selector>>>,
}

impl StaticDomProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomProbe for StaticDomProbe {
    fn is_visible(&self, element: ElementRef<'_>) -> bool {
        let in_layout = element.value().name() != "body";
        let hidden = std::iter::once(element)
            .chain(element.ancestors().filter_map(ElementRef::wrap))
            .any(|node| hides_subtree(node, in_layout));

        !hidden && element.value().attr("aria-hidden") != Some("true")
    }

    fn is_visible_within_parent(&self, element: ElementRef<'_>) -> bool {
        let in_layout = element.value().name() != "body";
        !hides_subtree(element, in_layout) && element.value().attr("aria-hidden") != Some("true")
    }

    fn matches(&self, element: ElementRef<'_>, selector: &str) -> bool {
        let mut cache = self.selectors.borrow_mut();
        let parsed = cache.entry(selector.to_string()).or_insert_with(|| {
            let parsed = Selector::parse(selector).ok();
            if parsed.is_none() {
                tracing::debug!("unsupported selector treated as non-matching: {}", selector);
            }
            parsed
        });
        parsed.as_ref().is_some_and(|s| s.matches(&element))
    }
}

/// 元素是否把自身和全部后代隐藏
///
/// 脱离布局（display:none / hidden / head、template）对 body 不适用；
/// visibility 和 opacity 会向子元素继承
fn hides_subtree(node: ElementRef<'_>, check_detached: bool) -> bool {
    let name = node.value().name();
    let detached = check_detached
        && (name == "head"
            || name == "template"
            || node.value().attr("hidden").is_some()
            || inline_style(node, "display").as_deref() == Some("none"));

    detached
        || inline_style(node, "visibility").as_deref() == Some("hidden")
        || inline_style(node, "opacity")
            .and_then(|v| v.parse::<f32>().ok())
            .is_some_and(|v| v == 0.0)
}

/// 读取内联样式属性值（小写，去掉 !important）
fn inline_style(element: ElementRef<'_>, property: &str) -> Option<String> {
    let style = element.value().attr("style")?;
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case(property))
        .map(|(_, value)| {
            value
                .trim()
                .trim_end_matches("!important")
                .trim()
                .to_ascii_lowercase()
        })
        .last()
}

/// 近似浏览器 innerText 的文本
///
/// 跳过脚本与样式，`<br>` 和块级元素边界产生换行
pub fn inner_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    let mut stack = Vec::new();
    push_children(element, &mut stack);

    while let Some(step) = stack.pop() {
        match step {
            TextStep::Text(text) => out.push_str(text),
            TextStep::Enter(child) => {
                let breaks = LINE_BREAK_TAGS.contains(&child.value().name());
                if breaks && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                stack.push(TextStep::Leave(breaks));
                push_children(child, &mut stack);
            }
            TextStep::Leave(breaks) => {
                if breaks && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
    }
    out
}

/// innerText 遍历步骤（显式栈，深层嵌套也不会耗尽调用栈）
enum TextStep<'a> {
    Text(&'a str),
    Enter(ElementRef<'a>),
    Leave(bool),
}

/// 逆序压入子节点，出栈时即为文档顺序
fn push_children<'a>(element: ElementRef<'a>, stack: &mut Vec<TextStep<'a>>) {
    let children: Vec<TextStep<'a>> = element
        .children()
        .filter_map(|child| {
            if let Some(text) = child.value().as_text() {
                return Some(TextStep::Text(&**text));
            }
            let child = ElementRef::wrap(child)?;
            match child.value().name() {
                name if NON_TEXT_TAGS.contains(&name) => None,
                "br" => Some(TextStep::Text("\n")),
                _ => Some(TextStep::Enter(child)),
            }
        })
        .collect();
    stack.extend(children.into_iter().rev());
}

/// 生成定位器
///
/// 有 id 时直接使用 `#id`；否则沿父链生成 `tag:nth-of-type(n)` 路径，
/// 遇到带 id 的祖先或 body 为止
pub fn locator_for(element: ElementRef<'_>) -> String {
    if let Some(id) = element.value().attr("id").filter(|id| !id.is_empty()) {
        return format!("#{}", css_escape(id));
    }

    let mut path: Vec<String> = Vec::new();
    let mut current = Some(element);
    let mut reached_body = false;

    while let Some(node) = current {
        let tag = node.value().name();
        if tag == "body" {
            reached_body = true;
            break;
        }
        if let Some(id) = node.value().attr("id").filter(|id| !id.is_empty()) {
            path.push(format!("#{}", css_escape(id)));
            break;
        }

        let parent = node.parent().and_then(ElementRef::wrap);
        if parent.is_some() {
            let index = node
                .prev_siblings()
                .filter_map(ElementRef::wrap)
                .filter(|sibling| sibling.value().name() == tag)
                .count()
                + 1;
            path.push(format!("{}:nth-of-type({})", tag, index));
        } else {
            path.push(tag.to_string());
        }
        current = parent;
    }

    if path.is_empty() {
        return "body".to_string();
    }
    if reached_body {
        path.push("body".to_string());
    }
    path.reverse();
    path.join(" > ")
}

/// CSS 标识符转义
fn css_escape(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (i, c) in ident.chars().enumerate() {
        if c.is_ascii_alphanumeric() && !(i == 0 && c.is_ascii_digit()) || c == '-' || c == '_' {
            out.push(c);
        } else if c.is_ascii_digit() {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else if c.is_ascii() {
            out.push('\\');
            out.push(c);
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_text_skips_scripts_and_breaks_blocks() {
        let doc = PageDocument::parse(
            "<body><div><p>One</p><script>var x;</script><p>Two<br>Three</p></div></body>",
        );
        let text = inner_text(doc.body());
        assert_eq!(text.trim(), "One\nTwo\nThree");
    }

    #[test]
    fn test_visibility_rules() {
        let doc = PageDocument::parse(
            r#"<body>
                <p id="shown">a</p>
                <p id="none" style="display: none">b</p>
                <div style="display:none"><p id="nested">c</p></div>
                <p id="hidden" style="visibility:hidden">d</p>
                <p id="clear" style="opacity: 0">e</p>
                <p id="aria" aria-hidden="true">f</p>
                <p id="attr" hidden>g</p>
            </body>"#,
        );
        let probe = StaticDomProbe::new();
        let visible = |id: &str| probe.is_visible(doc.query(&format!("#{}", id)).unwrap());

        assert!(visible("shown"));
        assert!(!visible("none"));
        assert!(!visible("nested"));
        assert!(!visible("hidden"));
        assert!(!visible("clear"));
        assert!(!visible("aria"));
        assert!(!visible("attr"));
        assert!(probe.is_visible(doc.body()));
    }

    #[test]
    fn test_invalid_selector_never_matches() {
        let doc = PageDocument::parse("<body><p class='x'>a</p></body>");
        let probe = StaticDomProbe::new();
        let p = doc.query("p").unwrap();

        assert!(probe.matches(p, ".x"));
        assert!(!probe.matches(p, "p[[["));
        assert!(!probe.matches(p, "p[[["));
        assert!(doc.query("::nonsense(").is_none());
        assert!(doc.query_all("::nonsense(").is_empty());
    }

    #[test]
    fn test_locator_round_trip() {
        let doc = PageDocument::parse(
            "<body><div><p>a</p><p>b</p></div><section id='s'><p>c</p></section></body>",
        );
        let paragraphs = doc.query_all("p");

        let second = locator_for(paragraphs[1]);
        assert_eq!(second, "body > div:nth-of-type(1) > p:nth-of-type(2)");
        assert_eq!(inner_text(doc.resolve(&second).unwrap()), "b");

        let third = locator_for(paragraphs[2]);
        assert_eq!(third, "#s > p:nth-of-type(1)");
        assert_eq!(inner_text(doc.resolve(&third).unwrap()), "c");
    }

    #[test]
    fn test_locator_prefers_own_id() {
        let doc = PageDocument::parse("<body><p id='intro'>a</p></body>");
        assert_eq!(locator_for(doc.query("p").unwrap()), "#intro");
        assert_eq!(locator_for(doc.body()), "body");
    }

    #[test]
    fn test_resolve_stale_locator() {
        let doc = PageDocument::parse("<body><p>a</p></body>");
        assert!(doc.resolve("body > div:nth-of-type(4)").is_none());
    }

    #[test]
    fn test_visible_within_parent_checks_only_the_element() {
        let doc = PageDocument::parse(
            r#"<body>
                <div id="outer" style="visibility:hidden"><p id="inner">a</p></div>
                <p id="faded" style="opacity:0">b</p>
                <p id="aria" aria-hidden="true">c</p>
            </body>"#,
        );
        let probe = StaticDomProbe::new();
        let element = |id: &str| doc.query(&format!("#{}", id)).unwrap();

        assert!(!probe.is_visible_within_parent(element("outer")));
        assert!(probe.is_visible_within_parent(element("inner")));
        assert!(!probe.is_visible(element("inner")));
        assert!(!probe.is_visible_within_parent(element("faded")));
        assert!(!probe.is_visible_within_parent(element("aria")));
        assert!(probe.is_visible_within_parent(doc.body()));
    }

    #[test]
    fn test_inner_text_on_deeply_nested_markup() {
        let depth = 10_000;
        let html = format!(
            "<body>{}<span>deep</span>{}</body>",
            "<div>".repeat(depth),
            "</div>".repeat(depth)
        );
        let doc = PageDocument::parse(&html);
        assert_eq!(inner_text(doc.body()).trim(), "deep");
    }
}
