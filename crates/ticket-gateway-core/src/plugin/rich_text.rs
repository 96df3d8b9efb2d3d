//! Structured rich-text documents used by the issue tracker.
//!
//! Comment bodies and (optionally) descriptions are exchanged as a tree of
//! typed nodes:
//!
//! ```json
//! { "type": "doc", "version": 1, "content": [
//!     { "type": "paragraph", "content": [ { "type": "text", "text": "Hi" } ] }
//! ] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document format version produced by [`to_document`]
pub const DOCUMENT_VERSION: u32 = 1;

const FENCE: &str = "```";

/// Root of a rich-text document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub content: Vec<Block>,
}

impl Document {
    fn new(content: Vec<Block>) -> Self {
        Self {
            kind: "doc".to_string(),
            version: DOCUMENT_VERSION,
            content,
        }
    }
}

/// Block-level node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Block {
    Paragraph {
        #[serde(default)]
        content: Vec<Inline>,
    },
    Heading {
        attrs: HeadingAttrs,
        #[serde(default)]
        content: Vec<Inline>,
    },
    BulletList {
        content: Vec<Block>,
    },
    OrderedList {
        content: Vec<Block>,
    },
    ListItem {
        content: Vec<Block>,
    },
    CodeBlock {
        #[serde(default)]
        content: Vec<Inline>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingAttrs {
    pub level: u8,
}

/// Inline node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inline {
    Text { text: String },
    HardBreak,
}

/// Convert plain text to a rich-text document
///
/// Recognizes blank-line separated paragraphs, `#` headings, `- `/`* `
/// bullets, `1. ` numbered items and triple-backtick code fences. Everything
/// else is literal text. Output is a pure function of the input.
pub fn to_document(text: &str) -> Document {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut builder = DocumentBuilder::default();
    let mut lines = normalized.lines();

    while let Some(line) = lines.next() {
        if line.trim_start().starts_with(FENCE) {
            builder.flush();
            let mut code = Vec::new();
            for inner in lines.by_ref() {
                if inner.trim_start().starts_with(FENCE) {
                    break;
                }
                code.push(inner);
            }
            builder.push_code(code.join("\n"));
            continue;
        }

        if line.trim().is_empty() {
            builder.flush();
            continue;
        }

        if let Some((level, title)) = heading(line) {
            builder.flush();
            builder.blocks.push(Block::Heading {
                attrs: HeadingAttrs { level },
                content: text_nodes(title),
            });
        } else if let Some(item) = bullet_item(line) {
            builder.push_item(ListKind::Bullet, item);
        } else if let Some(item) = ordered_item(line) {
            builder.push_item(ListKind::Ordered, item);
        } else {
            builder.push_paragraph_line(line);
        }
    }

    builder.finish()
}

/// Flatten a rich-text document (as raw JSON) to plain text
///
/// Blocks are separated by newlines and hard breaks become newlines. Unknown
/// node types contribute their text children. A JSON string is returned
/// unchanged.
pub fn to_plain_text(value: &Value) -> String {
    if let Value::String(s) = value {
        return s.clone();
    }

    let mut lines = Vec::new();
    collect_blocks(value, &mut lines);
    lines.join("\n").trim().to_string()
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Ordered,
}

#[derive(Default)]
struct DocumentBuilder {
    blocks: Vec<Block>,
    paragraph: Vec<Inline>,
    list: Option<(ListKind, Vec<Block>)>,
}

impl DocumentBuilder {
    fn flush(&mut self) {
        self.flush_paragraph();
        self.flush_list();
    }

    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let content = std::mem::take(&mut self.paragraph);
            self.blocks.push(Block::Paragraph { content });
        }
    }

    fn flush_list(&mut self) {
        if let Some((kind, items)) = self.list.take() {
            self.blocks.push(match kind {
                ListKind::Bullet => Block::BulletList { content: items },
                ListKind::Ordered => Block::OrderedList { content: items },
            });
        }
    }

    fn push_paragraph_line(&mut self, line: &str) {
        self.flush_list();
        if !self.paragraph.is_empty() {
            self.paragraph.push(Inline::HardBreak);
        }
        self.paragraph.extend(text_nodes(line.trim_end()));
    }

    fn push_item(&mut self, kind: ListKind, item: &str) {
        self.flush_paragraph();
        if self.list.as_ref().map(|(k, _)| *k) != Some(kind) {
            self.flush_list();
            self.list = Some((kind, Vec::new()));
        }
        if let Some((_, items)) = self.list.as_mut() {
            items.push(Block::ListItem {
                content: vec![Block::Paragraph {
                    content: text_nodes(item),
                }],
            });
        }
    }

    fn push_code(&mut self, code: String) {
        self.blocks.push(Block::CodeBlock {
            content: text_nodes(&code),
        });
    }

    fn finish(mut self) -> Document {
        self.flush();
        if self.blocks.is_empty() {
            self.blocks.push(Block::Paragraph {
                content: Vec::new(),
            });
        }
        Document::new(self.blocks)
    }
}

fn text_nodes(text: &str) -> Vec<Inline> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![Inline::Text {
            text: text.to_string(),
        }]
    }
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let title = line[hashes..].strip_prefix(' ')?;
    Some((hashes as u8, title.trim()))
}

fn bullet_item(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .map(str::trim)
}

fn ordered_item(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    trimmed[digits..].strip_prefix(". ").map(str::trim)
}

// ============================================================================
// Flattening
// ============================================================================

fn node_type(node: &Value) -> Option<&str> {
    node.get("type").and_then(Value::as_str)
}

fn children(node: &Value) -> impl Iterator<Item = &Value> {
    node.get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn collect_blocks(node: &Value, lines: &mut Vec<String>) {
    match node_type(node) {
        Some("paragraph" | "heading" | "codeBlock" | "text" | "hardBreak") => {
            let mut line = String::new();
            collect_inline(node, &mut line);
            lines.push(line);
        }
        _ => {
            for child in children(node) {
                collect_blocks(child, lines);
            }
        }
    }
}

fn collect_inline(node: &Value, out: &mut String) {
    match node_type(node) {
        Some("text") => {
            if let Some(text) = node.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        Some("hardBreak") => out.push('\n'),
        _ => {
            if let Some(text) = node.pointer("/attrs/text").and_then(Value::as_str) {
                out.push_str(text);
            }
            for child in children(node) {
                collect_inline(child, out);
            }
        }
    }
}

#[cfg(test)]
#[path = "rich_text_tests.rs"]
mod tests;
