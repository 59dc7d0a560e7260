//! Markdown → interactive mind-map document.
//!
//! [`render_document`] turns Markdown into the markmap node tree (headings and
//! list items nest, other blocks become leaves) and fills the markmap-view page
//! template with it. [`embed_assets`] then splices the toolbars and the hidden
//! copy of the original Markdown in front of the closing body tag.

use pulldown_cmark::{html, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::Serialize;

const PAGE_TEMPLATE: &str = include_str!("assets/page.html");
const TOOLBAR_ASSETS: &str = include_str!("assets/toolbar.html");
const EXPORT_ASSETS: &str = include_str!("assets/export.html");
const ROOT_PLACEHOLDER: &str = "__MARKMAP_ROOT__";

/// Id of the hidden element carrying the original Markdown.
pub const ORIGINAL_MARKDOWN_ID: &str = "original-markdown";

/// One node of the tree consumed by markmap-view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MindNode {
    /// Inline HTML shown in the node.
    pub content: String,
    pub children: Vec<MindNode>,
}

/// Build the markmap node tree for a Markdown document.
///
/// A document whose top level holds a single node (typically one `#` title)
/// uses that node as the root; otherwise the root has empty content.
pub fn transform(markdown: &str) -> MindNode {
    let mut builder = TreeBuilder::default();
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    for event in Parser::new_ext(markdown, options) {
        builder.push(event);
    }
    builder.finish()
}

/// Render the base markmap page for `markdown`.
pub fn render_document(markdown: &str) -> String {
    let root = transform(markdown);
    // Serialising a tree of strings cannot fail.
    let json = serde_json::to_string(&root).unwrap_or_else(|_| "null".to_string());
    PAGE_TEMPLATE.replacen(ROOT_PLACEHOLDER, &script_safe(&json), 1)
}

/// Splice the interactive assets and the original Markdown into `html`,
/// immediately before the last `</body>`. A document without a body tag gets
/// the assets appended.
///
/// The textarea start tag is always followed by a newline. HTML parsers drop
/// one leading newline from a textarea body, so Markdown that itself starts
/// with a newline survives intact in `textarea.value`.
pub fn embed_assets(html: &str, original: &str) -> String {
    let extra = format!(
        "{TOOLBAR_ASSETS}\n<textarea id=\"{ORIGINAL_MARKDOWN_ID}\" style=\"display:none;\">\n{}</textarea>\n{EXPORT_ASSETS}\n",
        escape_textarea(original)
    );
    match html.rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + extra.len());
            out.push_str(&html[..idx]);
            out.push_str(&extra);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{html}{extra}"),
    }
}

/// Escape text for a `<textarea>` body. The browser decodes these entities
/// back, so `textarea.value` equals the input.
pub fn escape_textarea(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

// JSON inside <script> must not contain a closing tag sequence.
fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/").replace("<!--", "<\\!--")
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Where buffered inline events go when flushed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Sink {
    /// Content of an existing node (heading or list item head).
    Node(usize),
    /// A new leaf under the current container.
    Leaf,
}

#[derive(Debug, Default)]
struct Slot {
    content: String,
    children: Vec<usize>,
}

#[derive(Debug)]
struct TreeBuilder<'a> {
    nodes: Vec<Slot>,
    headings: Vec<(u8, usize)>,
    items: Vec<usize>,
    inline: Vec<Event<'a>>,
    sink: Option<Sink>,
    code: Option<String>,
}

impl Default for TreeBuilder<'_> {
    fn default() -> Self {
        Self {
            nodes: vec![Slot::default()],
            headings: Vec::new(),
            items: Vec::new(),
            inline: Vec::new(),
            sink: None,
            code: None,
        }
    }
}

impl<'a> TreeBuilder<'a> {
    fn container(&self) -> usize {
        self.items
            .last()
            .copied()
            .or_else(|| self.headings.last().map(|(_, idx)| *idx))
            .unwrap_or(0)
    }

    fn add_child(&mut self, parent: usize, content: String) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Slot {
            content,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(idx);
        idx
    }

    fn flush(&mut self) {
        let sink = self.sink.take();
        if self.inline.is_empty() {
            return;
        }
        let mut rendered = String::new();
        html::push_html(&mut rendered, self.inline.drain(..));
        let rendered = rendered.trim().to_string();
        if rendered.is_empty() {
            return;
        }
        match sink {
            Some(Sink::Node(idx)) => {
                let slot = &mut self.nodes[idx];
                if !slot.content.is_empty() {
                    slot.content.push(' ');
                }
                slot.content.push_str(&rendered);
            }
            Some(Sink::Leaf) | None => {
                let parent = self.container();
                self.add_child(parent, rendered);
            }
        }
    }

    fn push(&mut self, event: Event<'a>) {
        if let Some(code) = self.code.as_mut() {
            match event {
                Event::Text(text) => code.push_str(&text),
                Event::End(TagEnd::CodeBlock) => {
                    let body = self.code.take().unwrap_or_default();
                    let content = format!(
                        "<pre><code>{}</code></pre>",
                        escape_textarea(body.trim_end_matches('\n'))
                    );
                    let parent = self.container();
                    self.add_child(parent, content);
                }
                _ => {}
            }
            return;
        }

        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush();
                self.items.clear();
                let depth = heading_depth(level);
                while matches!(self.headings.last(), Some((d, _)) if *d >= depth) {
                    self.headings.pop();
                }
                let parent = self.headings.last().map(|(_, idx)| *idx).unwrap_or(0);
                let idx = self.add_child(parent, String::new());
                self.headings.push((depth, idx));
                self.sink = Some(Sink::Node(idx));
            }
            Event::End(TagEnd::Heading(_)) => self.flush(),
            Event::Start(Tag::List(_)) => self.flush(),
            Event::End(TagEnd::List(_)) => {}
            Event::Start(Tag::Item) => {
                self.flush();
                let parent = self.container();
                let idx = self.add_child(parent, String::new());
                self.items.push(idx);
                self.sink = Some(Sink::Node(idx));
            }
            Event::End(TagEnd::Item) => {
                self.flush();
                self.items.pop();
            }
            Event::Start(Tag::Paragraph) => {
                let item_head = match (self.sink, self.items.last()) {
                    (Some(Sink::Node(idx)), Some(item)) => {
                        idx == *item && self.nodes[idx].content.is_empty() && self.inline.is_empty()
                    }
                    _ => false,
                };
                if !item_head {
                    self.flush();
                    self.sink = Some(Sink::Leaf);
                }
            }
            Event::End(TagEnd::Paragraph) => self.flush(),
            Event::Start(Tag::CodeBlock(_)) => {
                self.flush();
                self.code = Some(String::new());
            }
            Event::Start(Tag::BlockQuote)
            | Event::End(TagEnd::BlockQuote)
            | Event::Start(Tag::HtmlBlock)
            | Event::End(TagEnd::HtmlBlock)
            | Event::Rule
            | Event::Html(_) => self.flush(),
            Event::TaskListMarker(done) => {
                let mark = if done { "\u{2611} " } else { "\u{2610} " };
                self.inline.push(Event::Text(mark.into()));
            }
            other => {
                if self.sink.is_none() {
                    self.sink = Some(Sink::Leaf);
                }
                self.inline.push(other);
            }
        }
    }

    fn finish(mut self) -> MindNode {
        self.flush();
        let mut root = self.build(0);
        if root.content.is_empty() && root.children.len() == 1 {
            root = root.children.remove(0);
        }
        root
    }

    fn build(&self, idx: usize) -> MindNode {
        let slot = &self.nodes[idx];
        MindNode {
            content: slot.content.clone(),
            children: slot.children.iter().map(|&c| self.build(c)).collect(),
        }
    }
}
