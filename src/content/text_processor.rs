//! 朗读文本处理
//!
//! 纯函数、无状态的字符串转换，每种内容类型一个

/// 零宽字符
fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
}

/// 通用清理
///
/// 去掉零宽字符，把连续空白折叠成单个空格，最多保留两个连续换行，去掉首尾空白
pub fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.chars().filter(|c| !is_zero_width(*c)) {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    cap_newlines(&out).trim().to_string()
}

fn cap_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0;
    for c in text.chars() {
        if c == '\n' {
            run += 1;
            if run > 2 {
                continue;
            }
        } else {
            run = 0;
        }
        out.push(c);
    }
    out
}

/// 按长度截断
///
/// 在限制内最后一个句号处截断（该位置需超过限制的一半），否则硬截断并追加省略号
pub fn truncate_for_speech(text: &str, max_length: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_length {
        return text.to_string();
    }

    let truncated = &chars[..max_length];
    match truncated.iter().rposition(|c| *c == '.') {
        Some(pos) if pos as f64 > max_length as f64 * 0.5 => truncated[..=pos].iter().collect(),
        _ => {
            let mut out: String = truncated.iter().collect();
            out.push_str("...");
            out
        }
    }
}

/// 代码块朗读文本
///
/// 不超过 3 个非空行时逐行朗读；更长的代码只给出行数和首尾行，
/// 避免长时间朗读整段代码
pub fn format_code_for_reading(code: &str, language: Option<&str>) -> String {
    let lines: Vec<&str> = code
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return String::new();
    }

    let prefix = match language {
        Some(lang) if !lang.is_empty() => format!("Code block in {}.", lang),
        _ => "Code block.".to_string(),
    };

    if lines.len() <= 3 {
        return format!("{} {}.", prefix, lines.join(". "));
    }

    format!(
        "{} {} lines. Starting with: {}. Ending with: {}.",
        prefix,
        lines.len(),
        lines[0],
        lines[lines.len() - 1]
    )
}

/// 图片朗读文本
pub fn format_image_for_reading(alt_text: Option<&str>) -> String {
    match alt_text.map(str::trim) {
        Some(alt) if !alt.is_empty() => format!("Image: {}", alt),
        _ => "Image without description".to_string(),
    }
}

/// 表格朗读文本
///
/// # 参数
/// - `row_count`: 数据行数
/// - `headers`: 表头单元格文本
pub fn format_table_for_reading(row_count: usize, headers: &[String]) -> String {
    if row_count == 0 && headers.is_empty() {
        return "Empty table".to_string();
    }

    let summary = format!(
        "Table with {} rows and {} columns.",
        row_count,
        headers.len()
    );
    if headers.iter().any(|h| !h.is_empty()) {
        return format!("{} Columns: {}.", summary, headers.join(", "));
    }
    summary
}

/// 列表朗读文本
pub fn format_list_for_reading(items: &[String]) -> String {
    let total = items.len();
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("Item {} of {}: {}", i + 1, total, item))
        .collect::<Vec<_>>()
        .join(". ")
}

/// 标题朗读文本
pub fn format_heading_for_reading(text: &str, level: u8) -> String {
    format!("Heading level {}. {}", level, text)
}

/// 链接朗读文本：附带目标域名
pub fn format_link_for_reading(text: &str, href: Option<&str>) -> String {
    let domain = href
        .and_then(|h| url::Url::parse(h).ok())
        .and_then(|u| u.host_str().map(|host| host.trim_start_matches("www.").to_string()));

    match domain {
        Some(domain) => format!("{}, link to {}", text, domain),
        None => text.to_string(),
    }
}

/// 分句
///
/// 以 `.`、`!`、`?` 结尾切分；末尾没有标点的剩余文本作为最后一句保留
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let terminal = matches!(c, '.' | '!' | '?');
        if terminal && !matches!(chars.peek(), Some('.' | '!' | '?')) {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    if sentences.is_empty() {
        return vec![text.to_string()];
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Hello\u{200B}   world \n\n\n again  "), "Hello world again");
        assert_eq!(clean_text("\u{FEFF}\t"), "");
    }

    #[test]
    fn test_truncate_at_sentence() {
        let text = "First sentence here. Second one is long and keeps going on";
        assert_eq!(truncate_for_speech(text, 30), "First sentence here.");
    }

    #[test]
    fn test_truncate_hard_with_ellipsis() {
        let text = "Short. Then a very long run of words without punctuation";
        // 句号位置在前 50% 以内，不采用
        assert_eq!(truncate_for_speech(text, 20), "Short. Then a very l...");
        assert_eq!(truncate_for_speech("tiny", 20), "tiny");
    }

    #[test]
    fn test_format_short_code() {
        assert_eq!(
            format_code_for_reading("let a = 1;\n\nlet b = 2;", None),
            "Code block. let a = 1;. let b = 2;."
        );
        assert_eq!(
            format_code_for_reading("x = 1", Some("python")),
            "Code block in python. x = 1."
        );
        assert_eq!(format_code_for_reading("\n  \n", None), "");
    }

    #[test]
    fn test_format_long_code_summarizes() {
        let code: String = (1..=10).map(|i| format!("line_{}\n", i)).collect();
        let spoken = format_code_for_reading(&code, None);

        assert_eq!(
            spoken,
            "Code block. 10 lines. Starting with: line_1. Ending with: line_10."
        );
        for i in 2..=9 {
            assert!(!spoken.contains(&format!("line_{}.", i)));
        }
    }

    #[test]
    fn test_format_image() {
        assert_eq!(format_image_for_reading(Some("A cat")), "Image: A cat");
        assert_eq!(format_image_for_reading(Some("  ")), "Image without description");
        assert_eq!(format_image_for_reading(None), "Image without description");
    }

    #[test]
    fn test_format_table() {
        let headers = vec!["Name".to_string(), "Age".to_string()];
        assert_eq!(
            format_table_for_reading(3, &headers),
            "Table with 3 rows and 2 columns. Columns: Name, Age."
        );

        let blank = vec![String::new(), String::new()];
        assert_eq!(
            format_table_for_reading(2, &blank),
            "Table with 2 rows and 2 columns."
        );
        assert_eq!(format_table_for_reading(0, &[]), "Empty table");
    }

    #[test]
    fn test_format_list_heading_link() {
        let items = vec!["one".to_string(), "two".to_string()];
        assert_eq!(
            format_list_for_reading(&items),
            "Item 1 of 2: one. Item 2 of 2: two"
        );
        assert_eq!(format_list_for_reading(&[]), "");
        assert_eq!(format_heading_for_reading("Intro", 2), "Heading level 2. Intro");
        assert_eq!(
            format_link_for_reading("Docs", Some("https://www.rust-lang.org/learn")),
            "Docs, link to rust-lang.org"
        );
        assert_eq!(format_link_for_reading("Home", Some("/relative")), "Home");
    }

    #[test]
    fn test_split_into_sentences_keeps_tail() {
        assert_eq!(
            split_into_sentences("Hello there. How are you?! Fine"),
            vec!["Hello there.", "How are you?!", "Fine"]
        );
        assert_eq!(split_into_sentences("no punctuation"), vec!["no punctuation"]);
    }
}
