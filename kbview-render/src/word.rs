use std::io::{Cursor, Read};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use kbview_core::search::find_byte_ranges;
use kbview_core::{
    DocumentFormat, DocumentView, MatchNavigator, MatchStatus, SpanStyle, StyledLine, StyledSpan,
    ViewAction, ViewError, ViewFrame,
};
use tracing::{debug, instrument, warn};
use zip::ZipArchive;

use crate::{spans_with_matches, TextMatch};

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    ListItem,
    TableRow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Highlight { text: String, match_index: usize },
}

impl Inline {
    fn text(&self) -> &str {
        match self {
            Inline::Text(text) | Inline::Highlight { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub inlines: Vec<Inline>,
}

impl Block {
    fn new(kind: BlockKind, text: String) -> Self {
        Self {
            kind,
            inlines: vec![Inline::Text(text)],
        }
    }

    pub fn text(&self) -> String {
        self.inlines.iter().map(Inline::text).collect()
    }
}

/// Word-processor document converted once into blocks of inline text nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupTree {
    pub blocks: Vec<Block>,
}

impl MarkupTree {
    #[instrument(skip_all, fields(len = bytes.len()))]
    pub fn from_docx(bytes: &[u8]) -> Result<Self> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).context("document is not a zip container")?;
        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .with_context(|| format!("missing {DOCUMENT_PART}"))?
            .read_to_string(&mut xml)
            .with_context(|| format!("failed to read {DOCUMENT_PART}"))?;
        Self::from_document_xml(&xml)
    }

    pub fn from_document_xml(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| anyhow!("invalid XML: {e}"))?;
        let body = doc
            .descendants()
            .find(|node| node.tag_name().name() == "body")
            .ok_or_else(|| anyhow!("document has no body"))?;

        let mut blocks = Vec::new();
        for node in body.children().filter(|node| node.is_element()) {
            match node.tag_name().name() {
                "p" => {
                    if let Some(block) = paragraph_block(&node) {
                        blocks.push(block);
                    }
                }
                "tbl" => {
                    for row in node
                        .children()
                        .filter(|child| child.tag_name().name() == "tr")
                    {
                        let cells: Vec<String> = row
                            .children()
                            .filter(|cell| cell.tag_name().name() == "tc")
                            .map(|cell| normalize_whitespace(&collect_text(&cell)))
                            .collect();
                        if cells.iter().any(|cell| !cell.is_empty()) {
                            blocks.push(Block::new(BlockKind::TableRow, cells.join(" | ")));
                        }
                    }
                }
                _ => {}
            }
        }
        debug!(blocks = blocks.len(), "document converted");
        Ok(Self { blocks })
    }

    /// Unwraps previous highlights, then wraps every occurrence of `query`.
    pub fn highlight(&mut self, query: &str) -> usize {
        self.unwrap_highlights();
        if query.trim().is_empty() {
            return 0;
        }
        let mut next_index = 0;
        for block in &mut self.blocks {
            let mut wrapped = Vec::with_capacity(block.inlines.len());
            for inline in block.inlines.drain(..) {
                let Inline::Text(text) = inline else {
                    wrapped.push(inline);
                    continue;
                };
                let ranges = find_byte_ranges(&text, query);
                if ranges.is_empty() {
                    wrapped.push(Inline::Text(text));
                    continue;
                }
                let mut cursor = 0;
                for range in ranges {
                    if range.start > cursor {
                        wrapped.push(Inline::Text(text[cursor..range.start].to_string()));
                    }
                    wrapped.push(Inline::Highlight {
                        text: text[range.clone()].to_string(),
                        match_index: next_index,
                    });
                    next_index += 1;
                    cursor = range.end;
                }
                if cursor < text.len() {
                    wrapped.push(Inline::Text(text[cursor..].to_string()));
                }
            }
            block.inlines = wrapped;
        }
        next_index
    }

    /// Turns highlights back into text and merges adjacent text nodes.
    pub fn unwrap_highlights(&mut self) {
        for block in &mut self.blocks {
            let mut merged: Vec<Inline> = Vec::with_capacity(block.inlines.len());
            for inline in block.inlines.drain(..) {
                let text = match inline {
                    Inline::Text(text) | Inline::Highlight { text, .. } => text,
                };
                match merged.last_mut() {
                    Some(Inline::Text(previous)) => previous.push_str(&text),
                    _ => merged.push(Inline::Text(text)),
                }
            }
            block.inlines = merged;
        }
    }

    fn block_of_match(&self, match_index: usize) -> Option<usize> {
        self.blocks.iter().position(|block| {
            block.inlines.iter().any(|inline| {
                matches!(inline, Inline::Highlight { match_index: idx, .. } if *idx == match_index)
            })
        })
    }
}

fn paragraph_block(node: &roxmltree::Node) -> Option<Block> {
    let text = normalize_whitespace(&collect_text(node));
    if text.is_empty() {
        return None;
    }
    let properties = node
        .children()
        .find(|child| child.tag_name().name() == "pPr");
    let style = properties.and_then(|props| {
        props
            .children()
            .find(|child| child.tag_name().name() == "pStyle")
            .and_then(|style| local_attribute(&style, "val"))
    });
    let numbered = properties
        .map(|props| {
            props
                .children()
                .any(|child| child.tag_name().name() == "numPr")
        })
        .unwrap_or(false);

    let kind = match style {
        Some(style) if style.eq_ignore_ascii_case("title") => BlockKind::Heading(1),
        Some(style) if style.to_ascii_lowercase().starts_with("heading") => {
            let level = style
                .trim_start_matches(|c: char| !c.is_ascii_digit())
                .parse::<u8>()
                .unwrap_or(1);
            BlockKind::Heading(level.clamp(1, 6))
        }
        Some(style) if style.to_ascii_lowercase().starts_with("list") => BlockKind::ListItem,
        _ if numbered => BlockKind::ListItem,
        _ => BlockKind::Paragraph,
    };
    Some(Block::new(kind, text))
}

fn local_attribute<'a>(node: &roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|attr| attr.name() == name)
        .map(|attr| attr.value())
}

fn collect_text(node: &roxmltree::Node) -> String {
    let mut text = String::new();
    for child in node.descendants() {
        match child.tag_name().name() {
            "t" => text.push_str(child.text().unwrap_or("")),
            "tab" => text.push('\t'),
            "br" | "cr" => text.push(' '),
            _ => {}
        }
    }
    text
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-processor fallback: the converted markup tree with inline highlights.
pub struct WordView {
    title: String,
    format: DocumentFormat,
    tree: MarkupTree,
    error: Option<ViewError>,
    query: String,
    navigator: MatchNavigator,
    bytes: Option<Bytes>,
}

impl WordView {
    pub fn from_bytes(title: String, format: DocumentFormat, bytes: Bytes) -> Self {
        let converted = match format {
            DocumentFormat::Docx => MarkupTree::from_docx(&bytes),
            _ => Err(anyhow!("legacy binary .{} files cannot be converted", format.tag())),
        };
        let mut view = Self::empty(title, format);
        match converted {
            Ok(tree) => view.tree = tree,
            Err(err) => {
                warn!(?err, title = %view.title, "word conversion failed");
                view.error = Some(ViewError::Conversion {
                    format,
                    message: format!("{err:#}"),
                });
            }
        }
        view.bytes = Some(bytes);
        view
    }

    pub fn failed(title: String, format: DocumentFormat, error: ViewError) -> Self {
        let mut view = Self::empty(title, format);
        view.error = Some(error);
        view
    }

    fn empty(title: String, format: DocumentFormat) -> Self {
        Self {
            title,
            format,
            tree: MarkupTree::default(),
            error: None,
            query: String::new(),
            navigator: MatchNavigator::new(),
            bytes: None,
        }
    }

    pub fn tree(&self) -> &MarkupTree {
        &self.tree
    }

    fn render_block(&self, block: &Block) -> StyledLine {
        let base = match block.kind {
            BlockKind::Heading(_) => SpanStyle::Heading,
            _ => SpanStyle::Plain,
        };
        let current = self.navigator.current();
        let mut spans = Vec::new();
        match block.kind {
            BlockKind::Heading(level) => {
                spans.push(StyledSpan::new("#".repeat(level as usize) + " ", base))
            }
            BlockKind::ListItem => spans.push(StyledSpan::plain("• ")),
            BlockKind::TableRow => spans.push(StyledSpan::plain("| ")),
            BlockKind::Paragraph => {}
        }
        for inline in &block.inlines {
            match inline {
                Inline::Text(text) => spans.push(StyledSpan::new(text.clone(), base)),
                Inline::Highlight { text, match_index } => {
                    let found = [TextMatch {
                        range: 0..text.len(),
                        match_index: *match_index,
                    }];
                    spans.extend(spans_with_matches(text, &found, current, base));
                }
            }
        }
        StyledLine::new(spans)
    }
}

impl DocumentView for WordView {
    fn format(&self) -> DocumentFormat {
        self.format
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn search(&mut self, query: &str) -> MatchStatus {
        self.query = query.to_string();
        if self.error.is_some() {
            return MatchStatus::default();
        }
        let total = self.tree.highlight(query);
        self.navigator.reset(total);
        self.navigator.status()
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn next_match(&mut self) -> MatchStatus {
        self.navigator.next();
        self.navigator.status()
    }

    fn prev_match(&mut self) -> MatchStatus {
        self.navigator.prev();
        self.navigator.status()
    }

    fn match_status(&self) -> MatchStatus {
        self.navigator.status()
    }

    fn handle(&mut self, _action: ViewAction, _now: Instant) -> bool {
        false
    }

    fn frame(&self) -> ViewFrame<'_> {
        if let Some(err) = &self.error {
            return ViewFrame::Message {
                title: self.title.clone(),
                body: err.to_string(),
            };
        }
        let lines = self
            .tree
            .blocks
            .iter()
            .map(|block| self.render_block(block))
            .collect();
        let focus = self
            .navigator
            .current()
            .and_then(|index| self.tree.block_of_match(index));
        ViewFrame::Lines { lines, focus }
    }

    fn location_label(&self) -> String {
        format!("{} blocks", self.tree.blocks.len())
    }

    fn error(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    fn source_bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    use zip::write::FileOptions;
    use zip::ZipWriter;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Leave policy</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Annual leave is </w:t></w:r><w:r><w:t>accrued monthly.</w:t></w:r></w:p>
    <w:p><w:pPr><w:numPr><w:ilvl w:val="0"/></w:numPr></w:pPr><w:r><w:t>Request leave early</w:t></w:r></w:p>
    <w:p/>
    <w:tbl>
      <w:tr><w:tc><w:p><w:r><w:t>Type</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Days</w:t></w:r></w:p></w:tc></w:tr>
      <w:tr><w:tc><w:p><w:r><w:t>Sick leave</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>10</w:t></w:r></w:p></w:tc></w:tr>
    </w:tbl>
  </w:body>
</w:document>"#;

    pub(crate) fn docx_fixture() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(DOCUMENT_PART, FileOptions::default())
            .unwrap();
        writer.write_all(BODY.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn converts_paragraph_structure() {
        let tree = MarkupTree::from_docx(&docx_fixture()).unwrap();
        let kinds: Vec<_> = tree.blocks.iter().map(|block| block.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading(2),
                BlockKind::Paragraph,
                BlockKind::ListItem,
                BlockKind::TableRow,
                BlockKind::TableRow,
            ]
        );
        assert_eq!(tree.blocks[1].text(), "Annual leave is accrued monthly.");
        assert_eq!(tree.blocks[4].text(), "Sick leave | 10");
    }

    #[test]
    fn re_search_unwraps_and_normalizes() {
        let mut tree = MarkupTree::from_docx(&docx_fixture()).unwrap();
        let pristine = tree.clone();

        assert_eq!(tree.highlight("LEAVE"), 4);
        assert_eq!(
            tree.blocks[1].inlines,
            vec![
                Inline::Text("Annual ".into()),
                Inline::Highlight {
                    text: "leave".into(),
                    match_index: 1
                },
                Inline::Text(" is accrued monthly.".into()),
            ]
        );

        assert_eq!(tree.highlight("monthly"), 1);
        assert_eq!(tree.blocks[0], pristine.blocks[0]);

        assert_eq!(tree.highlight(""), 0);
        assert_eq!(tree, pristine);
    }

    #[test]
    fn view_focuses_block_of_current_match() {
        let mut view = WordView::from_bytes(
            "policy.docx".into(),
            DocumentFormat::Docx,
            Bytes::from(docx_fixture()),
        );
        assert_eq!(view.search("leave").total, 4);
        view.next_match();
        view.next_match();

        match view.frame() {
            ViewFrame::Lines { lines, focus } => {
                assert_eq!(focus, Some(2));
                assert!(lines[2].has_style(SpanStyle::CurrentMatch));
                assert!(!lines[1].has_style(SpanStyle::CurrentMatch));
                assert!(lines[0].has_style(SpanStyle::Heading));
            }
            _ => panic!("expected lines"),
        }
    }

    #[test]
    fn legacy_doc_is_an_isolated_error() {
        let mut view = WordView::from_bytes(
            "old.doc".into(),
            DocumentFormat::Doc,
            Bytes::from_static(b"\xD0\xCF\x11\xE0"),
        );
        assert!(view.error().unwrap().contains("doc"));
        assert_eq!(view.search("anything"), MatchStatus::default());
        assert!(view.source_bytes().is_some());
        assert!(matches!(view.frame(), ViewFrame::Message { .. }));
    }

    #[test]
    fn corrupt_docx_reports_conversion_error() {
        let view = WordView::from_bytes(
            "broken.docx".into(),
            DocumentFormat::Docx,
            Bytes::from_static(b"not a zip"),
        );
        assert!(view.error().unwrap().contains("zip"));
    }
}
