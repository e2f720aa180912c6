//! In-process markdown → PDF typesetting.
//!
//! A deliberately small layout engine: markdown is flattened into blocks
//! (headings, paragraphs, list items, code, table rows, rules), each block is
//! word-wrapped with an average-glyph-width estimate, and the lines are laid
//! out top to bottom on A4 pages using the three standard PDF fonts. No font
//! files are embedded, so the output stays small and needs nothing on disk.
//!
//! The standard fonts only cover WinAnsi. Typographic punctuation is mapped
//! to ASCII equivalents, Latin-1 passes through, and anything else (emoji,
//! CJK, most math symbols) is dropped.

use crate::error::NotesError;
use crate::pipeline::html::markdown_options;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use tracing::debug;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const TEXT_WIDTH: i64 = PAGE_WIDTH - 2 * MARGIN;
const LIST_INDENT: i64 = 16;

/// A laid-out unit of the note.
#[derive(Debug, Clone, PartialEq)]
enum Block {
    Heading(u8, String),
    Paragraph(String),
    ListItem { prefix: String, depth: usize, text: String },
    Code(String),
    TableRow { cells: Vec<String>, header: bool },
    Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Mono,
}

impl Font {
    fn resource(self) -> &'static [u8] {
        match self {
            Font::Regular => b"F1",
            Font::Bold => b"F2",
            Font::Mono => b"F3",
        }
    }

    /// Average glyph width as a fraction of the font size.
    fn width_factor(self) -> f32 {
        match self {
            Font::Regular => 0.5,
            Font::Bold => 0.55,
            Font::Mono => 0.6,
        }
    }
}

/// One positioned line of text, or a horizontal rule.
#[derive(Debug, Clone, PartialEq)]
enum Line {
    Text { font: Font, size: i64, x: i64, text: String },
    Rule,
}

// ── Markdown → blocks ────────────────────────────────────────────────────────

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<Block>,
    text: String,
    heading: Option<u8>,
    lists: Vec<Option<u64>>,
    item_prefix: Option<String>,
    in_code: bool,
    row: Vec<String>,
}

impl BlockCollector {
    fn flush_text(&mut self) {
        let text = collapse_whitespace(&self.text);
        self.text.clear();
        if text.is_empty() {
            return;
        }
        if !self.lists.is_empty() {
            let prefix = self.item_prefix.take().unwrap_or_default();
            self.blocks.push(Block::ListItem {
                prefix,
                depth: self.lists.len() - 1,
                text,
            });
        } else {
            self.blocks.push(Block::Paragraph(text));
        }
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush_text();
                self.heading = Some(heading_number(level));
            }
            Event::End(TagEnd::Heading(_)) => {
                let text = collapse_whitespace(&self.text);
                self.text.clear();
                let level = self.heading.take().unwrap_or(1);
                if !text.is_empty() {
                    self.blocks.push(Block::Heading(level, text));
                }
            }
            Event::End(TagEnd::Paragraph) => self.flush_text(),
            Event::Start(Tag::List(start)) => {
                self.flush_text();
                self.lists.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                self.flush_text();
                self.lists.pop();
            }
            Event::Start(Tag::Item) => {
                self.flush_text();
                let prefix = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let p = format!("{n}. ");
                        *n += 1;
                        p
                    }
                    _ => "- ".to_string(),
                };
                self.item_prefix = Some(prefix);
            }
            Event::End(TagEnd::Item) => self.flush_text(),
            Event::Start(Tag::CodeBlock(_)) => {
                self.flush_text();
                self.in_code = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                self.in_code = false;
                let code = std::mem::take(&mut self.text);
                self.blocks.push(Block::Code(code.trim_end_matches('\n').to_string()));
            }
            Event::Start(Tag::Table(_)) => self.flush_text(),
            Event::Start(Tag::TableCell) => self.text.clear(),
            Event::End(TagEnd::TableCell) => {
                let cell = collapse_whitespace(&self.text);
                self.text.clear();
                self.row.push(cell);
            }
            Event::End(TagEnd::TableHead) => {
                let cells = std::mem::take(&mut self.row);
                self.blocks.push(Block::TableRow { cells, header: true });
            }
            Event::End(TagEnd::TableRow) => {
                let cells = std::mem::take(&mut self.row);
                self.blocks.push(Block::TableRow { cells, header: false });
            }
            Event::Text(t) | Event::Code(t) => self.text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => {
                self.text.push(if self.in_code { '\n' } else { ' ' })
            }
            Event::TaskListMarker(done) => self.text.push_str(if done { "[x] " } else { "[ ] " }),
            Event::Rule => {
                self.flush_text();
                self.blocks.push(Block::Rule);
            }
            _ => {}
        }
    }
}

fn heading_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_blocks(markdown: &str) -> Vec<Block> {
    let mut collector = BlockCollector::default();
    for event in Parser::new_ext(markdown, markdown_options()) {
        collector.handle(event);
    }
    collector.flush_text();
    collector.blocks
}

// ── Blocks → lines ───────────────────────────────────────────────────────────

fn wrap_columns(font: Font, size: i64, width: i64) -> usize {
    let glyph = font.width_factor() * size as f32;
    ((width as f32 / glyph).floor() as usize).max(8)
}

fn push_wrapped(lines: &mut Vec<(Line, i64)>, font: Font, size: i64, x: i64, text: &str) {
    let cols = wrap_columns(font, size, TEXT_WIDTH - (x - MARGIN));
    let leading = size * 14 / 10;
    for piece in textwrap::wrap(text, cols) {
        lines.push((
            Line::Text {
                font,
                size,
                x,
                text: piece.into_owned(),
            },
            leading,
        ));
    }
}

/// Lay out blocks as `(line, advance)` pairs; `advance` is the vertical space
/// the line consumes, with block spacing folded into the last line.
fn layout(blocks: &[Block]) -> Vec<(Line, i64)> {
    let mut lines: Vec<(Line, i64)> = Vec::new();
    let mut i = 0;

    while i < blocks.len() {
        let before = lines.len();
        let mut gap = 6;
        match &blocks[i] {
            Block::Heading(level, text) => {
                let size = match level {
                    1 => 20,
                    2 => 16,
                    3 => 14,
                    _ => 12,
                };
                push_wrapped(&mut lines, Font::Bold, size, MARGIN, text);
                gap = 8;
            }
            Block::Paragraph(text) => push_wrapped(&mut lines, Font::Regular, 11, MARGIN, text),
            Block::ListItem {
                prefix,
                depth,
                text,
            } => {
                let x = MARGIN + LIST_INDENT * (*depth as i64 + 1);
                push_wrapped(&mut lines, Font::Regular, 11, x, &format!("{prefix}{text}"));
                gap = 2;
            }
            Block::Code(code) => {
                let cols = wrap_columns(Font::Mono, 9, TEXT_WIDTH - 12);
                for raw in code.lines() {
                    let expanded = raw.replace('\t', "    ");
                    let chunks: Vec<String> = if expanded.is_empty() {
                        vec![String::new()]
                    } else {
                        expanded
                            .chars()
                            .collect::<Vec<_>>()
                            .chunks(cols)
                            .map(|c| c.iter().collect())
                            .collect()
                    };
                    for chunk in chunks {
                        lines.push((
                            Line::Text {
                                font: Font::Mono,
                                size: 9,
                                x: MARGIN + 12,
                                text: chunk,
                            },
                            12,
                        ));
                    }
                }
            }
            Block::TableRow { .. } => {
                let start = i;
                while i + 1 < blocks.len() && matches!(blocks[i + 1], Block::TableRow { .. }) {
                    i += 1;
                }
                layout_table(&mut lines, &blocks[start..=i]);
            }
            Block::Rule => lines.push((Line::Rule, 12)),
        }
        if lines.len() > before {
            if let Some(last) = lines.last_mut() {
                last.1 += gap;
            }
        }
        i += 1;
    }

    lines
}

fn layout_table(lines: &mut Vec<(Line, i64)>, rows: &[Block]) {
    let rows: Vec<(&Vec<String>, bool)> = rows
        .iter()
        .filter_map(|b| match b {
            Block::TableRow { cells, header } => Some((cells, *header)),
            _ => None,
        })
        .collect();
    let ncols = rows.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
    if ncols == 0 {
        return;
    }

    let total_cols = wrap_columns(Font::Mono, 9, TEXT_WIDTH);
    let budget = total_cols.saturating_sub(3 * (ncols - 1)).max(ncols);
    let mut widths: Vec<usize> = (0..ncols)
        .map(|c| {
            rows.iter()
                .map(|(cells, _)| cells.get(c).map(|s| s.chars().count()).unwrap_or(0))
                .max()
                .unwrap_or(0)
                .max(1)
        })
        .collect();
    // Shrink the widest column until the row fits.
    while widths.iter().sum::<usize>() > budget {
        let Some((idx, w)) = widths.iter().enumerate().max_by_key(|(_, w)| **w).map(|(i, w)| (i, *w)) else {
            break;
        };
        if w <= 4 {
            break;
        }
        widths[idx] = w - 1;
    }

    for (cells, header) in rows {
        let wrapped: Vec<Vec<String>> = (0..ncols)
            .map(|c| {
                let cell = cells.get(c).map(String::as_str).unwrap_or("");
                textwrap::wrap(cell, widths[c])
                    .into_iter()
                    .map(|s| s.into_owned())
                    .collect()
            })
            .collect();
        let height = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
        for line_no in 0..height {
            let text = (0..ncols)
                .map(|c| {
                    let part = wrapped[c].get(line_no).map(String::as_str).unwrap_or("");
                    format!("{:<width$}", part, width = widths[c])
                })
                .collect::<Vec<_>>()
                .join(" | ");
            lines.push((
                Line::Text {
                    font: if header { Font::Bold } else { Font::Mono },
                    size: 9,
                    x: MARGIN,
                    text: text.trim_end().to_string(),
                },
                12,
            ));
        }
        if header {
            let sep = widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-");
            lines.push((
                Line::Text {
                    font: Font::Mono,
                    size: 9,
                    x: MARGIN,
                    text: sep,
                },
                12,
            ));
        }
    }
}

// ── Lines → pages ────────────────────────────────────────────────────────────

fn paginate(lines: Vec<(Line, i64)>) -> Vec<Vec<(Line, i64)>> {
    let mut pages: Vec<Vec<(Line, i64)>> = vec![Vec::new()];
    let mut y = PAGE_HEIGHT - MARGIN;

    for (line, advance) in lines {
        if y - advance < MARGIN {
            pages.push(Vec::new());
            y = PAGE_HEIGHT - MARGIN;
        }
        let baseline = y - advance.min(line_height(&line));
        if let Some(page) = pages.last_mut() {
            page.push((line, baseline));
        }
        y -= advance;
    }
    pages
}

fn line_height(line: &Line) -> i64 {
    match line {
        Line::Text { size, .. } => size * 14 / 10,
        Line::Rule => 12,
    }
}

/// Map text onto the WinAnsi subset the standard fonts can show.
fn to_pdf_text(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push(b'-'),
            '\u{2018}' | '\u{2019}' => out.push(b'\''),
            '\u{201C}' | '\u{201D}' => out.push(b'"'),
            '\u{2026}' => out.extend_from_slice(b"..."),
            '\u{2022}' => out.push(b'*'),
            '\u{2192}' => out.extend_from_slice(b"->"),
            '\u{2264}' => out.extend_from_slice(b"<="),
            '\u{2265}' => out.extend_from_slice(b">="),
            '\u{2260}' => out.extend_from_slice(b"!="),
            '\t' => out.extend_from_slice(b"    "),
            c if (' '..='~').contains(&c) => out.push(c as u8),
            c if ('\u{00A0}'..='\u{00FF}').contains(&c) => out.push(c as u32 as u8),
            _ => {}
        }
    }
    out
}

fn int(v: i64) -> Object {
    Object::Integer(v)
}

fn page_operations(lines: &[(Line, i64)]) -> Vec<Operation> {
    let mut ops = Vec::new();
    for (line, baseline) in lines {
        match line {
            Line::Text { font, size, x, text } => {
                let bytes = to_pdf_text(text);
                if bytes.is_empty() {
                    continue;
                }
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new(
                    "Tf",
                    vec![Object::Name(font.resource().to_vec()), int(*size)],
                ));
                ops.push(Operation::new("Td", vec![int(*x), int(*baseline)]));
                ops.push(Operation::new("Tj", vec![Object::string_literal(bytes)]));
                ops.push(Operation::new("ET", vec![]));
            }
            Line::Rule => {
                let y = baseline + 4;
                ops.push(Operation::new("w", vec![int(1)]));
                ops.push(Operation::new("m", vec![int(MARGIN), int(y)]));
                ops.push(Operation::new("l", vec![int(PAGE_WIDTH - MARGIN), int(y)]));
                ops.push(Operation::new("S", vec![]));
            }
        }
    }
    ops
}

fn font_object(doc: &mut Document, base: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

fn local_error(detail: impl std::fmt::Display) -> NotesError {
    NotesError::RenderFailed {
        engine: "local".to_string(),
        detail: detail.to_string(),
    }
}

/// Typeset `markdown` into PDF bytes.
pub fn typeset(markdown: &str) -> Result<Vec<u8>, NotesError> {
    let blocks = collect_blocks(markdown);
    let pages = paginate(layout(&blocks));
    debug!("Typeset {} blocks onto {} pages", blocks.len(), pages.len());

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = font_object(&mut doc, "Helvetica");
    let bold = font_object(&mut doc, "Helvetica-Bold");
    let mono = font_object(&mut doc, "Courier");
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
            "F3" => mono,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page_lines in &pages {
        let content = Content {
            operations: page_operations(page_lines),
        };
        let encoded = content.encode().map_err(local_error)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![int(0), int(0), int(PAGE_WIDTH), int(PAGE_HEIGHT)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(local_error)?;
    Ok(out)
}
