use crate::error::ReconcileError;
use crate::table_markup::line_spans;
use regex::Regex;
use std::ops::Range;

pub const PAGE_BREAK: &str = "<!-- PageBreak -->";

const PAGE_FURNITURE: [&str; 3] = ["PageHeader", "PageFooter", "PageNumber"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPage {
    pub number: u32,
    pub span: Range<usize>,
}

/// Layout markdown after preprocessing, with the byte span of every page.
#[derive(Debug, Clone)]
pub struct LayoutDocument {
    pub markdown: String,
    pub pages: Vec<LayoutPage>,
}

impl LayoutDocument {
    pub fn page_text(&self, number: u32) -> Option<&str> {
        self.pages
            .iter()
            .find(|page| page.number == number)
            .map(|page| &self.markdown[page.span.clone()])
    }
}

fn comment_body(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("<!--")
        .and_then(|rest| rest.strip_suffix("-->"))
        .map(str::trim)
}

pub fn is_page_break(line: &str) -> bool {
    comment_body(line).is_some_and(|body| body.eq_ignore_ascii_case("PageBreak"))
}

pub fn is_comment_line(line: &str) -> bool {
    comment_body(line).is_some()
}

fn is_page_furniture(line: &str) -> bool {
    comment_body(line).is_some_and(|body| {
        PAGE_FURNITURE.iter().any(|kind| {
            body.get(..kind.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kind))
        })
    })
}

/// Splits markdown on page-break lines. Page numbers start at 1.
pub fn paginate(markdown: &str) -> Vec<LayoutPage> {
    let mut pages = Vec::new();
    let mut start = 0;

    for (span, line) in line_spans(markdown, 0) {
        if !is_page_break(line) {
            continue;
        }

        pages.push(LayoutPage {
            number: pages.len() as u32 + 1,
            span: start..span.start,
        });

        let rest = &markdown[span.end..];
        start = if rest.starts_with("\r\n") {
            span.end + 2
        } else if rest.starts_with('\n') {
            span.end + 1
        } else {
            span.end
        };
    }

    pages.push(LayoutPage {
        number: pages.len() as u32 + 1,
        span: start..markdown.len(),
    });

    pages
}

pub struct LayoutMarkdownPreprocessor {
    heading_re: Regex,
}

impl LayoutMarkdownPreprocessor {
    pub fn new() -> Result<Self, ReconcileError> {
        Ok(Self {
            heading_re: Regex::new(r"^(#{1,6})[ \t]+(\S.*)$")?,
        })
    }

    /// Drops page furniture, tidies headings and blank runs, keeps page breaks.
    pub fn preprocess(&self, markdown: &str) -> LayoutDocument {
        let normalized = markdown.replace("\r\n", "\n");
        let mut lines: Vec<String> = Vec::new();

        for raw in normalized.split('\n') {
            let line = raw.trim_end();

            if is_page_furniture(line) {
                continue;
            }

            if is_page_break(line) {
                while lines.last().is_some_and(|last| last.is_empty()) {
                    lines.pop();
                }
                lines.push(PAGE_BREAK.to_string());
                continue;
            }

            if line.is_empty() {
                let after_break = lines.last().is_some_and(|last| last == PAGE_BREAK);
                if lines.is_empty() || after_break || lines.last().is_some_and(|last| last.is_empty()) {
                    continue;
                }
                lines.push(String::new());
                continue;
            }

            match self.heading_re.captures(line) {
                Some(heading) => lines.push(format!("{} {}", &heading[1], &heading[2])),
                None => lines.push(line.to_string()),
            }
        }

        while lines.last().is_some_and(|last| last.is_empty()) {
            lines.pop();
        }

        let mut markdown = lines.join("\n");
        if !markdown.is_empty() {
            markdown.push('\n');
        }

        let pages = paginate(&markdown);
        LayoutDocument { markdown, pages }
    }
}
