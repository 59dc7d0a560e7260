//! FreeMind `.mm` export.
//!
//! A line-oriented walk over the Markdown: `#` headings open a node at their
//! own level, `-`/`*` list items open a node one level below the nearest open
//! heading (plus one per two spaces of indentation), so consecutive items stay
//! siblings. Everything else is ignored. The in-page exporter script applies the same rules.

/// Convert Markdown into a FreeMind document.
pub fn markdown_to_freemind(markdown: &str) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<map version=\"1.0.1\">\n");
    // (level, is_heading) of the currently open nodes; the sentinel is the map itself.
    let mut open: Vec<(usize, bool)> = vec![(0, true)];
    let mut next_id = 0usize;

    for line in markdown.split('\n') {
        let Some((level, is_heading, text)) = classify(line, &open) else {
            continue;
        };

        while open.len() > 1 && open.last().is_some_and(|&(l, _)| l >= level) {
            close_node(&mut xml, open.len() - 1);
            open.pop();
        }

        xml.push_str(&"  ".repeat(open.len()));
        xml.push_str(&format!(
            "<node ID=\"ID_{next_id}\" TEXT=\"{}\">\n",
            escape_xml(text)
        ));
        next_id += 1;
        open.push((level, is_heading));
    }

    while open.len() > 1 {
        close_node(&mut xml, open.len() - 1);
        open.pop();
    }
    xml.push_str("</map>");
    xml
}

fn close_node(xml: &mut String, depth: usize) {
    xml.push_str(&"  ".repeat(depth));
    xml.push_str("</node>\n");
}

fn classify<'a>(line: &'a str, open: &[(usize, bool)]) -> Option<(usize, bool, &'a str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('#') {
        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        let rest = &trimmed[hashes..];
        // `#tag` is not a heading.
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let text = rest.trim();
        if text.is_empty() {
            return None;
        }
        return Some((hashes, true, text));
    }

    if trimmed.starts_with('-') || trimmed.starts_with('*') {
        let leading = line.len() - line.trim_start().len();
        let heading = open
            .iter()
            .rev()
            .find(|&&(_, is_heading)| is_heading)
            .map(|&(l, _)| l)
            .unwrap_or(0);
        return Some((heading + 1 + leading / 2, false, trimmed[1..].trim()));
    }

    None
}

/// Escape the five XML special characters.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
