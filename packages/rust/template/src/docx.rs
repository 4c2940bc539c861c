//! DOCX read/write for template documents.
//!
//! A `.docx` file is a zip package; the body lives in `word/document.xml`.
//! Reading walks the XML event stream with an explicit container stack so
//! tables nested inside cells land in the right place at any depth.
//! Filling copies the template package entry-for-entry and rewrites only
//! the document body, so styles, relationships and formatting survive.
//! [`write_docx`] builds a fresh minimal package from a node tree.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};

use quick_xml::Reader as XmlReader;
use quick_xml::Writer as XmlWriter;
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use cardcomply_shared::{CardComplyError, Result};

use crate::{DocCell, DocNode, TemplateDoc, substitute};

/// Zip entry holding the document body.
const DOCUMENT_XML_PATH: &str = "word/document.xml";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Parse a DOCX template into a [`TemplateDoc`] tree.
pub fn read_docx<R: Read + Seek>(reader: R) -> Result<TemplateDoc> {
    let mut archive = ZipArchive::new(reader)
        .map_err(|e| CardComplyError::Template(format!("failed to open docx archive: {e}")))?;

    let mut file = archive
        .by_name(DOCUMENT_XML_PATH)
        .map_err(|e| CardComplyError::Template(format!("docx missing document.xml: {e}")))?;

    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| CardComplyError::Template(format!("failed to read document.xml: {e}")))?;

    parse_document_xml(&xml)
}

/// Parse containers inside `word/document.xml`.
///
/// The stack tracks where finished units belong: paragraphs attach to the
/// body or the innermost open cell; finished cells attach to the open row;
/// rows to the open table; a finished table attaches like a paragraph, which
/// is what makes arbitrary nesting fall out of the walk.
fn parse_document_xml(xml: &str) -> Result<TemplateDoc> {
    let mut reader = XmlReader::from_str(xml);

    let mut stack: Vec<Container> = vec![Container::Body(Vec::new())];
    let mut current_paragraph: Option<String> = None;
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => current_paragraph = Some(String::new()),
                b"w:t" => in_text_run = true,
                b"w:tbl" => stack.push(Container::Table(Vec::new())),
                b"w:tr" => stack.push(Container::Row(Vec::new())),
                b"w:tc" => stack.push(Container::Cell(Vec::new())),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"w:p" {
                    push_node(&mut stack, DocNode::Paragraph(String::new()));
                }
            }
            Ok(Event::Text(t)) => {
                if in_text_run {
                    if let (Some(paragraph), Ok(content)) =
                        (current_paragraph.as_mut(), t.unescape())
                    {
                        paragraph.push_str(&content);
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:p" => {
                    if let Some(text) = current_paragraph.take() {
                        push_node(&mut stack, DocNode::Paragraph(text));
                    }
                }
                b"w:t" => in_text_run = false,
                b"w:tc" => {
                    if let Some(Container::Cell(nodes)) = pop_expect(&mut stack) {
                        if let Some(Container::Row(cells)) = stack.last_mut() {
                            cells.push(DocCell { nodes });
                        }
                    }
                }
                b"w:tr" => {
                    if let Some(Container::Row(cells)) = pop_expect(&mut stack) {
                        if let Some(Container::Table(rows)) = stack.last_mut() {
                            rows.push(cells);
                        }
                    }
                }
                b"w:tbl" => {
                    if let Some(Container::Table(rows)) = pop_expect(&mut stack) {
                        push_node(&mut stack, DocNode::Table(rows));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(CardComplyError::Template(format!(
                    "malformed document.xml at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    match stack.pop() {
        Some(Container::Body(nodes)) if stack.is_empty() => Ok(TemplateDoc { nodes }),
        _ => Err(CardComplyError::Template(
            "unbalanced table structure in document.xml".into(),
        )),
    }
}

/// Open structural container during parsing.
enum Container {
    Body(Vec<DocNode>),
    Table(Vec<Vec<DocCell>>),
    Row(Vec<DocCell>),
    Cell(Vec<DocNode>),
}

/// Attach a finished node to the innermost node-bearing container.
fn push_node(stack: &mut [Container], node: DocNode) {
    match stack.last_mut() {
        Some(Container::Body(nodes)) | Some(Container::Cell(nodes)) => nodes.push(node),
        _ => debug!("dropping node outside a body/cell container"),
    }
}

fn pop_expect(stack: &mut Vec<Container>) -> Option<Container> {
    // The body container must never be popped by an element close.
    if stack.len() > 1 { stack.pop() } else { None }
}

// ---------------------------------------------------------------------------
// Filling
// ---------------------------------------------------------------------------

/// Render a template package with substituted display values.
///
/// Every zip entry except `word/document.xml` is copied verbatim, keeping
/// styles, relationships, media and any other template part intact. The
/// document body is rewritten by [`substitute_document_xml`].
pub(crate) fn fill_package<R, W>(
    template: R,
    out: W,
    display: &BTreeMap<String, String>,
) -> Result<()>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut archive = ZipArchive::new(template)
        .map_err(|e| CardComplyError::Template(format!("failed to open docx archive: {e}")))?;
    let mut writer = ZipWriter::new(out);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut saw_document = false;
    for index in 0..archive.len() {
        let is_document = {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| CardComplyError::Template(format!("zip entry {index}: {e}")))?;
            entry.name() == DOCUMENT_XML_PATH
        };

        if is_document {
            saw_document = true;
            let mut entry = archive
                .by_index(index)
                .map_err(|e| CardComplyError::Template(format!("zip entry {index}: {e}")))?;
            let mut xml = String::new();
            entry
                .read_to_string(&mut xml)
                .map_err(|e| CardComplyError::Template(format!("failed to read document.xml: {e}")))?;

            let rendered = substitute_document_xml(&xml, display)?;
            writer
                .start_file(DOCUMENT_XML_PATH, options)
                .map_err(|e| CardComplyError::Template(format!("zip write document.xml: {e}")))?;
            writer
                .write_all(rendered.as_bytes())
                .map_err(|e| CardComplyError::Template(format!("zip write document.xml: {e}")))?;
        } else {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| CardComplyError::Template(format!("zip entry {index}: {e}")))?;
            writer
                .raw_copy_file(entry)
                .map_err(|e| CardComplyError::Template(format!("zip copy entry: {e}")))?;
        }
    }

    if !saw_document {
        return Err(CardComplyError::Template(
            "docx missing document.xml".into(),
        ));
    }

    writer
        .finish()
        .map_err(|e| CardComplyError::Template(format!("zip finish: {e}")))?;

    Ok(())
}

/// Rewrite `word/document.xml` with substituted paragraph text.
///
/// Paragraphs stream through untouched, event-for-event, unless their
/// concatenated run text changes under substitution. A substituted
/// paragraph keeps its `w:pPr` properties but collapses its runs into a
/// single run, since a token may span run boundaries.
fn substitute_document_xml(xml: &str, display: &BTreeMap<String, String>) -> Result<String> {
    let mut reader = XmlReader::from_str(xml);
    let mut writer = XmlWriter::new(Cursor::new(Vec::new()));
    let mut paragraph: Option<ParagraphEvents> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            CardComplyError::Template(format!(
                "malformed document.xml at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Eof => break,
            Event::Start(start) if start.name().as_ref() == b"w:p" && paragraph.is_none() => {
                paragraph = Some(ParagraphEvents::new(Event::Start(start.into_owned())));
            }
            Event::End(end) if end.name().as_ref() == b"w:p" && paragraph.is_some() => {
                let mut buffered = paragraph.take().expect("open paragraph");
                buffered.push(Event::End(end.into_owned()));
                buffered.flush(&mut writer, display)?;
            }
            event => match paragraph.as_mut() {
                Some(buffered) => buffered.push(event.into_owned()),
                None => emit(&mut writer, event)?,
            },
        }
    }

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes)
        .map_err(|e| CardComplyError::Template(format!("rendered document.xml not UTF-8: {e}")))
}

/// One buffered `w:p` element: its events plus the concatenated run text.
struct ParagraphEvents {
    events: Vec<Event<'static>>,
    text: String,
    in_text: bool,
}

impl ParagraphEvents {
    fn new(open: Event<'static>) -> Self {
        Self {
            events: vec![open],
            text: String::new(),
            in_text: false,
        }
    }

    fn push(&mut self, event: Event<'static>) {
        match &event {
            Event::Start(e) if e.name().as_ref() == b"w:t" => self.in_text = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => self.in_text = false,
            Event::Text(t) if self.in_text => {
                if let Ok(content) = t.unescape() {
                    self.text.push_str(&content);
                }
            }
            _ => {}
        }
        self.events.push(event);
    }

    /// Write the paragraph out: verbatim when substitution changed nothing,
    /// otherwise properties + one collapsed run with the rendered text.
    fn flush<W: Write>(
        self,
        writer: &mut XmlWriter<W>,
        display: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut rendered = self.text.clone();
        substitute(&mut rendered, display);

        if rendered == self.text {
            for event in self.events {
                emit(writer, event)?;
            }
            return Ok(());
        }

        let mut events = self.events.into_iter();
        let open = events.next().expect("paragraph open event");
        emit(writer, open)?;

        // Replay the paragraph-properties subtree, if any, before the run.
        let rest: Vec<Event<'static>> = events.collect();
        match rest.first() {
            Some(Event::Empty(e)) if e.name().as_ref() == b"w:pPr" => {
                emit(writer, rest[0].clone())?;
            }
            Some(Event::Start(e)) if e.name().as_ref() == b"w:pPr" => {
                let mut depth = 0usize;
                for event in &rest {
                    emit(writer, event.clone())?;
                    match event {
                        Event::Start(s) if s.name().as_ref() == b"w:pPr" => depth += 1,
                        Event::End(s) if s.name().as_ref() == b"w:pPr" => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        emit(writer, Event::Start(BytesStart::new("w:r")))?;
        let mut text_open = BytesStart::new("w:t");
        text_open.push_attribute(("xml:space", "preserve"));
        emit(writer, Event::Start(text_open))?;
        emit(writer, Event::Text(BytesText::new(&rendered)))?;
        emit(writer, Event::End(BytesEnd::new("w:t")))?;
        emit(writer, Event::End(BytesEnd::new("w:r")))?;
        emit(writer, Event::End(BytesEnd::new("w:p")))?;

        Ok(())
    }
}

fn emit<W: Write>(writer: &mut XmlWriter<W>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| CardComplyError::Template(format!("document.xml write: {e}")))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write a document tree as a minimal OOXML package (fresh document
/// construction; template rendering goes through [`fill_package`]).
pub fn write_docx<W: Write + Seek>(doc: &TemplateDoc, out: W) -> Result<()> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    );
    write_nodes(&mut xml, &doc.nodes);
    xml.push_str("</w:body></w:document>");

    let mut writer = ZipWriter::new(out);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in [
        ("[Content_Types].xml", CONTENT_TYPES_XML),
        ("_rels/.rels", ROOT_RELS_XML),
        (DOCUMENT_XML_PATH, xml.as_str()),
    ] {
        writer
            .start_file(name, options)
            .map_err(|e| CardComplyError::Template(format!("zip entry {name}: {e}")))?;
        writer
            .write_all(content.as_bytes())
            .map_err(|e| CardComplyError::Template(format!("zip write {name}: {e}")))?;
    }

    writer
        .finish()
        .map_err(|e| CardComplyError::Template(format!("zip finish: {e}")))?;

    Ok(())
}

fn write_nodes(xml: &mut String, nodes: &[DocNode]) {
    for node in nodes {
        match node {
            DocNode::Paragraph(text) => {
                xml.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
                xml.push_str(&escape(text));
                xml.push_str("</w:t></w:r></w:p>");
            }
            DocNode::Table(rows) => {
                xml.push_str("<w:tbl>");
                for row in rows {
                    xml.push_str("<w:tr>");
                    for cell in row {
                        xml.push_str("<w:tc>");
                        if cell.nodes.is_empty() {
                            xml.push_str("<w:p/>");
                        } else {
                            write_nodes(xml, &cell.nodes);
                        }
                        // OOXML requires a cell to end with a paragraph.
                        if matches!(cell.nodes.last(), Some(DocNode::Table(_))) {
                            xml.push_str("<w:p/>");
                        }
                        xml.push_str("</w:tc>");
                    }
                    xml.push_str("</w:tr>");
                }
                xml.push_str("</w:tbl>");
            }
        }
    }
}
