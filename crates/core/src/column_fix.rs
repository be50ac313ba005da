use crate::error::ReconcileError;
use crate::models::PipelineOptions;
use regex::Regex;

const SENTENCE_TERMINATORS: [char; 8] = ['.', '!', '?', ':', '다', ')', '」', '。'];

#[derive(Debug, Clone, Copy)]
enum PendingBullet {
    /// Found alone on its own line.
    Lone(char),
    /// Cut from the end of the previous output line.
    Dangling(char),
}

impl PendingBullet {
    fn bullet(self) -> char {
        match self {
            PendingBullet::Lone(bullet) | PendingBullet::Dangling(bullet) => bullet,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnArtifactFixer {
    bullets: Vec<char>,
    max_fragment_chars: usize,
    page_number_re: Regex,
}

impl ColumnArtifactFixer {
    pub fn from_options(options: &PipelineOptions) -> Result<Self, ReconcileError> {
        Ok(Self {
            bullets: options.bullet_chars.clone(),
            max_fragment_chars: options.max_fragment_chars,
            page_number_re: Regex::new(options.page_number_regex)?,
        })
    }

    pub fn fix(&self, raw_page_text: &str) -> String {
        let mut output: Vec<String> = Vec::new();
        let mut pending: Option<PendingBullet> = None;
        let mut in_open_item = false;

        for raw_line in raw_page_text.split('\n') {
            let line = raw_line.trim_end_matches('\r');
            let trimmed = line.trim();

            if let Some(waiting) = pending {
                if trimmed.is_empty() {
                    continue;
                }
                if is_structural(trimmed) {
                    // Table rows and headings keep their bytes; the bullet goes back where it was.
                    match waiting {
                        PendingBullet::Dangling(bullet) if !output.is_empty() => {
                            if let Some(previous) = output.last_mut() {
                                previous.push(' ');
                                previous.push(bullet);
                            }
                        }
                        _ => output.push(waiting.bullet().to_string()),
                    }
                    pending = None;
                    in_open_item = false;
                    output.push(raw_line.to_string());
                    continue;
                }
                let (body, dangling) = self.split_dangling_bullet(trimmed);
                output.push(format!("{} {body}", waiting.bullet()));
                pending = dangling.map(PendingBullet::Dangling);
                in_open_item = !ends_sentence(body);
                continue;
            }

            if self.is_lone_bullet(trimmed) {
                pending = trimmed.chars().next().map(PendingBullet::Lone);
                in_open_item = false;
                continue;
            }

            if in_open_item && self.is_fragment(trimmed) {
                if let Some(previous) = output.last_mut() {
                    let (body, dangling) = self.split_dangling_bullet(trimmed);
                    previous.push(' ');
                    previous.push_str(body);
                    pending = dangling.map(PendingBullet::Dangling);
                    in_open_item = dangling.is_none() && !ends_sentence(body);
                    continue;
                }
            }

            if !is_structural(trimmed) {
                let (body, dangling) = self.split_dangling_bullet(line);
                if let Some(bullet) = dangling {
                    output.push(body.to_string());
                    pending = Some(PendingBullet::Dangling(bullet));
                    in_open_item = false;
                    continue;
                }
            }

            in_open_item = self.starts_with_bullet(trimmed) && !ends_sentence(trimmed);
            output.push(raw_line.to_string());
        }

        match pending {
            Some(PendingBullet::Dangling(bullet)) => {
                if let Some(previous) = output.last_mut() {
                    previous.push(' ');
                    previous.push(bullet);
                }
            }
            Some(PendingBullet::Lone(bullet)) => output.push(bullet.to_string()),
            None => {}
        }

        output.join("\n")
    }

    fn is_bullet(&self, ch: char) -> bool {
        self.bullets.contains(&ch)
    }

    fn is_lone_bullet(&self, trimmed: &str) -> bool {
        let mut chars = trimmed.chars();
        matches!((chars.next(), chars.next()), (Some(ch), None) if self.is_bullet(ch))
    }

    fn starts_with_bullet(&self, trimmed: &str) -> bool {
        trimmed.chars().next().is_some_and(|ch| self.is_bullet(ch))
    }

    /// `"text •"` yields `("text", Some('•'))`; anything else is returned whole.
    fn split_dangling_bullet<'a>(&self, line: &'a str) -> (&'a str, Option<char>) {
        let trimmed = line.trim_end();
        let Some(last) = trimmed.chars().last() else {
            return (line, None);
        };
        if !self.is_bullet(last) {
            return (line, None);
        }

        let head = &trimmed[..trimmed.len() - last.len_utf8()];
        let body = head.trim_end();
        if body.is_empty() || !head.ends_with(char::is_whitespace) {
            return (line, None);
        }
        (body, Some(last))
    }

    fn is_fragment(&self, trimmed: &str) -> bool {
        !trimmed.is_empty()
            && !self.starts_with_bullet(trimmed)
            && !is_structural(trimmed)
            && !self.page_number_re.is_match(trimmed)
            && trimmed.chars().count() <= self.max_fragment_chars
    }
}

fn is_structural(trimmed: &str) -> bool {
    trimmed.starts_with('|') || trimmed.starts_with('#')
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .is_some_and(|ch| SENTENCE_TERMINATORS.contains(&ch))
}
