use crate::content::dom::{inner_text, DomProbe, PageDocument, StaticDomProbe};
use regex::{Regex, RegexSet};
use scraper::ElementRef;
use std::collections::HashMap;

/// 广告模式（匹配 id + class 字符串，忽略大小写）
const AD_PATTERNS: &[&str] = &[
    r"(?i)\bads?\b",
    r"(?i)\bsponsor",
    r"(?i)\bpromo",
    r"(?i)\bbanner-ad",
    r"(?i)\badsense",
    r"(?i)\bdoubleclick",
    r"(?i)\bgoogle?ad",
    r"(?i)\baffiliate",
    r"(?i)\bpartner-content",
    r"(?i)\bpaid-content",
    r"(?i)\bnative-ad",
    r"(?i)\bad-slot",
    r"(?i)\bad-wrapper",
    r"(?i)\bad-container",
];

const CODE_SELECTORS: &[&str] = &[
    "pre",
    "code",
    ".highlight",
    ".syntax",
    ".codehilite",
    ".prism",
    ".hljs",
    ".CodeMirror",
    ".monaco-editor",
    r#"[class*="code-block"]"#,
    r#"[class*="codeblock"]"#,
    r#"[class*="sourceCode"]"#,
];

const NAV_TAGS: &[&str] = &["nav", "header", "footer", "aside"];

const NAV_SELECTORS: &[&str] = &[
    "nav",
    "header",
    "footer",
    "aside",
    r#"[role="navigation"]"#,
    r#"[role="banner"]"#,
    r#"[role="contentinfo"]"#,
    ".sidebar",
    ".menu",
    ".breadcrumb",
    ".pagination",
    ".toc",
    ".table-of-contents",
];

/// 正文容器选择器，按优先级排列
pub const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    r#"[role="main"]"#,
    ".post-content",
    ".entry-content",
    ".article-body",
    ".post-body",
    ".story-body",
    "#content",
    ".content",
    ".markdown-body",
    ".prose",
];

/// 回退扫描的通用容器标签
const GENERIC_CONTAINERS: &[&str] = &["div", "section"];

/// 不计入 innerText 的标签
const SILENT_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// 回退候选容器的最少文本长度
const MIN_CONTAINER_TEXT: usize = 100;

/// DOM Classifier
/// 判断元素属于广告、代码、导航、正文或可见等（可同时成立的）类别
pub struct DomClassifier {
    ad_patterns: RegexSet,
    language_regex: Regex,
    probe: Box<dyn DomProbe>,
}

impl DomClassifier {
    pub fn new() -> Self {
        Self::with_probe(Box::new(StaticDomProbe::new()))
    }

    /// 使用自定义的宿主文档能力
    pub fn with_probe(probe: Box<dyn DomProbe>) -> Self {
        let ad_patterns = RegexSet::new(AD_PATTERNS).unwrap();
        let language_regex = Regex::new(r"(?i)(?:language-|lang-|highlight-)(\w+)").unwrap();

        Self {
            ad_patterns,
            language_regex,
            probe,
        }
    }

    /// 广告检测：id 与 class 拼接后匹配广告模式
    pub fn matches_ad_pattern(&self, element: ElementRef<'_>) -> bool {
        let id = element.value().attr("id").unwrap_or("");
        let class = element.value().attr("class").unwrap_or("");
        self.ad_patterns.is_match(&format!("{} {}", id, class))
    }

    pub fn is_code_element(&self, element: ElementRef<'_>) -> bool {
        let tag = element.value().name();
        if tag == "pre" || tag == "code" {
            return true;
        }
        self.matches_any(element, CODE_SELECTORS)
    }

    pub fn is_nav_element(&self, element: ElementRef<'_>) -> bool {
        if NAV_TAGS.contains(&element.value().name()) {
            return true;
        }
        self.matches_any(element, NAV_SELECTORS)
    }

    pub fn is_main_content(&self, element: ElementRef<'_>) -> bool {
        self.matches_any(element, MAIN_CONTENT_SELECTORS)
    }

    /// 元素自身或祖先是 article / main / role=main
    pub fn is_within_main(&self, element: ElementRef<'_>) -> bool {
        std::iter::once(element)
            .chain(element.ancestors().filter_map(ElementRef::wrap))
            .any(is_main_landmark)
    }

    pub fn is_visible(&self, element: ElementRef<'_>) -> bool {
        self.probe.is_visible(element)
    }

    /// 父元素已知可见时的逐层可见性
    pub fn is_visible_within_parent(&self, element: ElementRef<'_>) -> bool {
        self.probe.is_visible_within_parent(element)
    }

    /// 检测代码语言
    ///
    /// 先看自身 class，再看父元素 class（`<pre class="language-x"><code>` 的情况）
    pub fn detect_code_language(&self, element: ElementRef<'_>) -> Option<String> {
        let own = element.value().attr("class");
        let parent = element
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|p| p.value().attr("class"));

        [own, parent]
            .into_iter()
            .flatten()
            .find_map(|class| self.language_regex.captures(class))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// 查找主内容容器
    ///
    /// 1. 按优先级尝试正文选择器
    /// 2. 回退：在通用容器中选出 文本长度 × 文本密度 最大者（至少 100 字符）
    /// 3. 仍无结果时返回 body
    pub fn find_main_container<'a>(&self, doc: &'a PageDocument) -> ElementRef<'a> {
        for selector in MAIN_CONTENT_SELECTORS {
            if let Some(element) = doc.query(selector) {
                return element;
            }
        }

        let body = doc.body();
        let mut best = body;
        let mut best_score = 0.0;

        let containers = GENERIC_CONTAINERS
            .iter()
            .flat_map(|tag| doc.query_all(tag))
            .collect();

        for candidate in candidates_with_text(body, containers, MIN_CONTAINER_TEXT) {
            let text_length = inner_text(candidate).chars().count();
            if text_length < MIN_CONTAINER_TEXT {
                continue;
            }
            let score = text_density(candidate) * text_length as f64;
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }

        best
    }

    fn matches_any(&self, element: ElementRef<'_>, selectors: &[&str]) -> bool {
        selectors
            .iter()
            .any(|selector| self.probe.matches(element, selector))
    }
}

impl Default for DomClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// article / main / role=main
pub fn is_main_landmark(element: ElementRef<'_>) -> bool {
    let name = element.value().name();
    name == "article" || name == "main" || element.value().attr("role") == Some("main")
}

/// 去掉 innerText 一定不足 `min_length` 的候选容器
///
/// 一次逆先序遍历累加每个元素的文本字符数和 `<br>` 数。块边界换行只会跟在
/// 非换行字符之后，所以 innerText 长度不超过 2 × 文本字符数 + `<br>` 数。
fn candidates_with_text<'a>(
    root: ElementRef<'a>,
    candidates: Vec<ElementRef<'a>>,
    min_length: usize,
) -> Vec<ElementRef<'a>> {
    let nodes: Vec<_> = (*root).descendants().collect();
    let mut totals = HashMap::new();
    totals.insert((*root).id(), (0usize, 0usize));

    for node in nodes.iter().rev() {
        let contribution = if let Some(text) = node.value().as_text() {
            (text.chars().count(), 0)
        } else if let Some(element) = node.value().as_element() {
            match element.name() {
                "br" => (0, 1),
                name if SILENT_TAGS.contains(&name) => (0, 0),
                _ => totals.get(&node.id()).copied().unwrap_or_default(),
            }
        } else {
            (0, 0)
        };

        if let Some(parent) = node.parent() {
            let entry = totals.entry(parent.id()).or_default();
            entry.0 += contribution.0;
            entry.1 += contribution.1;
        }
    }

    candidates
        .into_iter()
        .filter(|candidate| {
            totals
                .get(&(**candidate).id())
                .map_or(true, |&(chars, breaks)| chars * 2 + breaks >= min_length)
        })
        .collect()
}

/// 文本密度：可见文本长度 / HTML 长度
pub fn text_density(element: ElementRef<'_>) -> f64 {
    let html_length = element.inner_html().chars().count();
    if html_length == 0 {
        return 0.0;
    }
    inner_text(element).chars().count() as f64 / html_length as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first<'a>(doc: &'a PageDocument, selector: &str) -> ElementRef<'a> {
        doc.query(selector).unwrap()
    }

    #[test]
    fn test_ad_patterns() {
        let doc = PageDocument::parse(
            r#"<body>
                <div id="a1" class="ad">x</div>
                <div id="a2" class="sidebar-ads">x</div>
                <div id="a3" class="SponsoredPost">x</div>
                <div id="ad-slot-top">x</div>
                <div id="n1" class="header shadow">x</div>
                <div id="n2" class="reader-loaded">x</div>
            </body>"#,
        );
        let classifier = DomClassifier::new();

        assert!(classifier.matches_ad_pattern(first(&doc, "#a1")));
        assert!(classifier.matches_ad_pattern(first(&doc, "#a2")));
        assert!(classifier.matches_ad_pattern(first(&doc, "#a3")));
        assert!(classifier.matches_ad_pattern(first(&doc, "#ad-slot-top")));
        assert!(!classifier.matches_ad_pattern(first(&doc, "#n1")));
        assert!(!classifier.matches_ad_pattern(first(&doc, "#n2")));
    }

    #[test]
    fn test_code_nav_main() {
        let doc = PageDocument::parse(
            r#"<body>
                <div id="c" class="x-code-block">code</div>
                <div id="m" class="menu">menu</div>
                <div id="r" role="navigation">nav</div>
                <div id="content">main</div>
                <p id="p">plain</p>
            </body>"#,
        );
        let classifier = DomClassifier::new();

        assert!(classifier.is_code_element(first(&doc, "#c")));
        assert!(!classifier.is_code_element(first(&doc, "#p")));
        assert!(classifier.is_nav_element(first(&doc, "#m")));
        assert!(classifier.is_nav_element(first(&doc, "#r")));
        assert!(!classifier.is_nav_element(first(&doc, "#p")));
        assert!(classifier.is_main_content(first(&doc, "#content")));
        assert!(!classifier.is_main_content(first(&doc, "#p")));
    }

    #[test]
    fn test_detect_code_language() {
        let doc = PageDocument::parse(
            r#"<body>
                <pre class="language-python"><code id="inner">print(1)</code></pre>
                <code id="own" class="lang-rust">fn main() {}</code>
                <code id="none">x</code>
            </body>"#,
        );
        let classifier = DomClassifier::new();

        assert_eq!(
            classifier.detect_code_language(first(&doc, "#inner")),
            Some("python".to_string())
        );
        assert_eq!(
            classifier.detect_code_language(first(&doc, "#own")),
            Some("rust".to_string())
        );
        assert_eq!(classifier.detect_code_language(first(&doc, "#none")), None);
    }

    #[test]
    fn test_find_main_container_by_selector() {
        let doc = PageDocument::parse(
            "<body><div>intro</div><main id='m'><p>text</p></main><article>later</article></body>",
        );
        let classifier = DomClassifier::new();
        let container = classifier.find_main_container(&doc);
        // article 优先于 main
        assert_eq!(container.value().name(), "article");
    }

    #[test]
    fn test_find_main_container_by_density() {
        let long_text = "Readable sentence with plenty of words. ".repeat(5);
        let html = format!(
            r#"<body>
                <div id="short">tiny</div>
                <div id="dense"><p>{}</p></div>
                <div id="sparse"><span><a><b><i>{}</i></b></a></span><span class="a b c d e f g h"></span></div>
            </body>"#,
            long_text, long_text
        );
        let doc = PageDocument::parse(&html);
        let classifier = DomClassifier::new();

        let container = classifier.find_main_container(&doc);
        assert_eq!(container.value().attr("id"), Some("dense"));
    }

    #[test]
    fn test_find_main_container_defaults_to_body() {
        let doc = PageDocument::parse("<body><div>short</div><p>also short</p></body>");
        let classifier = DomClassifier::new();
        assert_eq!(classifier.find_main_container(&doc).value().name(), "body");
    }

    #[test]
    fn test_is_within_main() {
        let doc = PageDocument::parse(
            r#"<body><div role="main"><p id="in">a</p></div><p id="out">b</p></body>"#,
        );
        let classifier = DomClassifier::new();
        assert!(classifier.is_within_main(first(&doc, "#in")));
        assert!(!classifier.is_within_main(first(&doc, "#out")));
    }

    #[test]
    fn test_find_main_container_past_deep_short_nesting() {
        let depth = 5_000;
        let html = format!(
            r#"<body>{}<p>short</p>{}<div id="story"><p>{}</p></div></body>"#,
            "<div>".repeat(depth),
            "</div>".repeat(depth),
            "Readable sentence with plenty of words. ".repeat(5)
        );
        let doc = PageDocument::parse(&html);
        let classifier = DomClassifier::new();

        let container = classifier.find_main_container(&doc);
        assert_eq!(container.value().attr("id"), Some("story"));
    }

    #[test]
    fn test_text_bound_never_drops_a_qualifying_container() {
        // 大量块边界换行让 innerText 超过原始文本长度
        let items = "<p>ab</p>".repeat(40);
        let html = format!(r#"<body><div id="list">{}</div></body>"#, items);
        let doc = PageDocument::parse(&html);
        let classifier = DomClassifier::new();

        let list = first(&doc, "#list");
        assert!(inner_text(list).chars().count() >= MIN_CONTAINER_TEXT);
        assert_eq!(classifier.find_main_container(&doc).value().attr("id"), Some("list"));
    }
}
