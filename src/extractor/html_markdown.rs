//! Best-effort HTML-to-markdown conversion: links are kept, images are
//! stripped. Used both by the web extractor (C5) and the feed reader (C6)
//! for embedded HTML content.

use ego_tree::NodeRef;
use scraper::{Html, Node};

fn walk(node: NodeRef<Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => {
            out.push_str(&htmlescape::decode_html(text).unwrap_or_else(|_| text.to_string()));
        }
        Node::Element(el) => {
            let tag = el.name();
            match tag {
                "img" | "script" | "style" | "noscript" => {}
                "a" => {
                    let href = el.attr("href").unwrap_or("").to_string();
                    let mut inner = String::new();
                    for child in node.children() {
                        walk(child, &mut inner);
                    }
                    let inner = inner.trim();
                    if !href.is_empty() && !inner.is_empty() {
                        out.push_str(&format!("[{inner}]({href})"));
                    } else {
                        out.push_str(inner);
                    }
                }
                "br" => out.push('\n'),
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let level: usize = tag[1..].parse().unwrap_or(1);
                    out.push('\n');
                    out.push_str(&"#".repeat(level));
                    out.push(' ');
                    for child in node.children() {
                        walk(child, out);
                    }
                    out.push('\n');
                }
                "p" | "div" | "li" | "tr" | "blockquote" => {
                    out.push('\n');
                    for child in node.children() {
                        walk(child, out);
                    }
                    out.push('\n');
                }
                _ => {
                    for child in node.children() {
                        walk(child, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Convert a fragment of HTML to markdown. Images are dropped; anchors
/// become `[text](href)`.
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_fragment(html);
    let mut out = String::new();
    for child in document.tree.root().children() {
        walk(child, &mut out);
    }
    out
}
