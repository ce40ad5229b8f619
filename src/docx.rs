//! DOCX report templates.
//!
//! A template is an ordinary Word document whose text carries docxtpl-style
//! tags: `{{ field }}`, `{% for img in images %}{{ img }}{% endfor %}`,
//! `{% if field %}...{% else %}...{% endif %}`, and the paragraph-level
//! `{%p ... %}` / row-level `{%tr ... %}` forms that replace their enclosing
//! element. Word likes to split a tag across several runs, so the XML inside
//! tag delimiters is stripped before the tags are translated to handlebars
//! and rendered.

use handlebars::Handlebars;
use image::ImageFormat;
use lazy_static::lazy_static;
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::context::RenderContext;
use crate::error::{ReportError, Result};

/// Display width of every embedded image, in inches
pub const IMAGE_WIDTH_INCHES: f64 = 2.5;

const EMU_PER_INCH: f64 = 914_400.0;
const DOC_PR_BASE: usize = 4_000;

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";

const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

lazy_static! {
    static ref XML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref SPLIT_OPENER: Regex = Regex::new(r"\{((?:<[^>]*>)+)([{%])").unwrap();
    static ref SPLIT_CLOSER: Regex = Regex::new(r"([%}])((?:<[^>]*>)+)\}").unwrap();
    static ref HEADER_FOOTER: Regex = Regex::new(r"^word/(header|footer)\d*\.xml$").unwrap();
    static ref EXPRESSION: Regex = Regex::new(r"\{\{\s*([A-Za-z_@][A-Za-z0-9_.]*)\s*\}\}").unwrap();
}

/// An image that python-docx style rendering would accept, ready to embed.
#[derive(Debug, Clone)]
pub struct InlineImage {
    bytes: Vec<u8>,
    extension: &'static str,
    content_type: &'static str,
    width_emu: u64,
    height_emu: u64,
}

/// The bytes are not a PNG, JPEG, GIF, BMP or TIFF image, or are truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized image format")]
pub struct UnrecognizedImage;

impl InlineImage {
    /// Wrap image bytes for embedding at `width_inches`, keeping the aspect ratio
    ///
    /// # Errors
    /// * `UnrecognizedImage` when the format is unsupported or the header unreadable
    pub fn new(bytes: Vec<u8>, width_inches: f64) -> std::result::Result<Self, UnrecognizedImage> {
        let reader = image::io::Reader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()
            .map_err(|_| UnrecognizedImage)?;

        let (extension, content_type) = match reader.format() {
            Some(ImageFormat::Png) => ("png", "image/png"),
            Some(ImageFormat::Jpeg) => ("jpeg", "image/jpeg"),
            Some(ImageFormat::Gif) => ("gif", "image/gif"),
            Some(ImageFormat::Bmp) => ("bmp", "image/bmp"),
            Some(ImageFormat::Tiff) => ("tiff", "image/tiff"),
            _ => return Err(UnrecognizedImage),
        };

        let (width_px, height_px) = reader.into_dimensions().map_err(|_| UnrecognizedImage)?;
        if width_px == 0 || height_px == 0 {
            return Err(UnrecognizedImage);
        }

        let width_emu = (width_inches * EMU_PER_INCH).round() as u64;
        let height_emu = width_emu * u64::from(height_px) / u64::from(width_px);

        Ok(InlineImage {
            bytes,
            extension,
            content_type,
            width_emu,
            height_emu,
        })
    }

    fn extension(&self) -> &'static str {
        self.extension
    }

    /// Size on the page in EMU (914400 per inch)
    fn size_emu(&self) -> (u64, u64) {
        (self.width_emu, self.height_emu)
    }

    /// Run XML for this image; it closes the surrounding text run and reopens one after the drawing
    fn run_xml(&self, rel_id: &str, doc_pr_id: usize, name: &str) -> String {
        let (cx, cy) = self.size_emu();
        format!(
            concat!(
                "</w:t></w:r><w:r><w:drawing>",
                "<wp:inline xmlns:wp=\"{wp}\" distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\">",
                "<wp:extent cx=\"{cx}\" cy=\"{cy}\"/>",
                "<wp:docPr id=\"{id}\" name=\"Picture {id}\"/>",
                "<wp:cNvGraphicFramePr>",
                "<a:graphicFrameLocks xmlns:a=\"{a}\" noChangeAspect=\"1\"/>",
                "</wp:cNvGraphicFramePr>",
                "<a:graphic xmlns:a=\"{a}\"><a:graphicData uri=\"{pic}\">",
                "<pic:pic xmlns:pic=\"{pic}\">",
                "<pic:nvPicPr><pic:cNvPr id=\"{id}\" name=\"{name}\"/><pic:cNvPicPr/></pic:nvPicPr>",
                "<pic:blipFill><a:blip xmlns:r=\"{r}\" r:embed=\"{rel}\"/>",
                "<a:stretch><a:fillRect/></a:stretch></pic:blipFill>",
                "<pic:spPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>",
                "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></pic:spPr>",
                "</pic:pic></a:graphicData></a:graphic></wp:inline>",
                "</w:drawing></w:r><w:r><w:t xml:space=\"preserve\">"
            ),
            wp = WP_NS,
            a = A_NS,
            pic = PIC_NS,
            r = R_NS,
            cx = cx,
            cy = cy,
            id = doc_pr_id,
            name = name,
            rel = rel_id,
        )
    }
}

/// A loaded DOCX template: every package part, in archive order.
#[derive(Debug, Clone)]
pub struct DocxTemplate {
    parts: Vec<(String, Vec<u8>)>,
}

impl DocxTemplate {
    /// Read a template from the bytes of a `.docx` file
    ///
    /// # Errors
    /// * `ReportError::Zip` if the bytes are not a ZIP package
    /// * `ReportError::Template` if the package has no `word/document.xml`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            parts.push((name, data));
        }

        if !parts.iter().any(|(name, _)| name == DOCUMENT_PART) {
            return Err(ReportError::Template(format!(
                "template has no {}",
                DOCUMENT_PART
            )));
        }

        Ok(DocxTemplate { parts })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Fill the template with one row's context and images
    ///
    /// The body sees `images` as the list of embedded pictures; headers and
    /// footers see the text fields and an empty `images` list.
    ///
    /// # Returns
    /// * The finished `.docx` bytes
    pub fn render(&self, context: &RenderContext, images: &[InlineImage]) -> Result<Vec<u8>> {
        let media: Vec<(String, String)> = images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                (
                    format!("rIdNightCheck{}", i + 1),
                    format!("media/night_check_{}.{}", i + 1, image.extension()),
                )
            })
            .collect();

        let drawings: Vec<String> = images
            .iter()
            .zip(&media)
            .enumerate()
            .map(|(i, (image, (rel_id, target)))| {
                let name = target.trim_start_matches("media/");
                image.run_xml(rel_id, DOC_PR_BASE + i + 1, name)
            })
            .collect();

        let body_data = template_data(context, &drawings);
        let text_data = template_data(context, &[]);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut wrote_rels = false;

        for (name, data) in &self.parts {
            let output: Cow<[u8]> = if name == DOCUMENT_PART {
                Cow::Owned(render_part(name, data, &body_data)?.into_bytes())
            } else if HEADER_FOOTER.is_match(name) {
                Cow::Owned(render_part(name, data, &text_data)?.into_bytes())
            } else if name == DOCUMENT_RELS {
                wrote_rels = true;
                Cow::Owned(add_relationships(data, &media)?)
            } else if name == CONTENT_TYPES && !images.is_empty() {
                Cow::Owned(add_content_types(data, images)?)
            } else {
                Cow::Borrowed(data.as_slice())
            };

            writer.start_file(name.as_str(), options)?;
            writer.write_all(&output)?;
        }

        if !wrote_rels && !media.is_empty() {
            let empty = format!("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"{}\"/>", RELS_NS);
            let rels = add_relationships(empty.as_bytes(), &media)?;
            writer.start_file(DOCUMENT_RELS, options)?;
            writer.write_all(&rels)?;
        }

        for (image, (_, target)) in images.iter().zip(&media) {
            writer.start_file(format!("word/{}", target), options)?;
            writer.write_all(&image.bytes)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

fn part_text<'a>(name: &str, data: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(data)
        .map_err(|_| ReportError::Template(format!("{} is not valid UTF-8", name)))
}

/// Text fields are XML-escaped here because handlebars runs with escaping off
/// (the image entries are raw run XML).
fn template_data(context: &RenderContext, drawings: &[String]) -> Value {
    let mut data = Map::new();
    for (name, value) in context.fields() {
        data.insert(name.to_string(), Value::String(escape(value).into_owned()));
    }
    data.insert(
        "images".to_string(),
        Value::Array(drawings.iter().cloned().map(Value::String).collect()),
    );
    Value::Object(data)
}

fn render_part(name: &str, data: &[u8], values: &Value) -> Result<String> {
    let xml = part_text(name, data)?;
    let source = prepare_template(xml)?;

    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .render_template(&source, values)
        .map_err(|e| ReportError::Template(format!("{}: {}", name, e)))
}

/// Turn a part's XML into a handlebars template
pub(crate) fn prepare_template(xml: &str) -> Result<String> {
    let xml = SPLIT_OPENER.replace_all(xml, "{${2}");
    let xml = SPLIT_CLOSER.replace_all(&xml, "${1}}");
    let mut xml = strip_tags_in_delimiters(&xml);
    for element in ["tr", "tc", "p", "r"] {
        xml = collapse_enclosing(&xml, element);
    }
    translate_statements(&xml)
}

/// Position of the earliest of `needles` in `haystack`
fn find_first(haystack: &str, needles: &[&str]) -> Option<(usize, usize)> {
    needles
        .iter()
        .enumerate()
        .filter_map(|(which, needle)| haystack.find(needle).map(|pos| (pos, which)))
        .min()
}

/// Remove run markup Word inserted inside `{{ }}` and `{% %}`, and undo
/// the entity and smart-quote escaping Word applied to the tag text.
fn strip_tags_in_delimiters(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some((pos, which)) = find_first(rest, &["{{", "{%"]) {
        let closer = if which == 0 { "}}" } else { "%}" };
        let Some(end) = rest[pos + 2..].find(closer).map(|i| pos + 2 + i + 2) else {
            break;
        };
        out.push_str(&rest[..pos]);
        let tag = XML_TAG.replace_all(&rest[pos..end], "");
        out.push_str(&unescape_tag(&tag));
        rest = &rest[end..];
    }

    out.push_str(rest);
    out
}

fn unescape_tag(tag: &str) -> String {
    tag.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace(|c: char| c == '\u{2018}' || c == '\u{2019}', "'")
        .replace(|c: char| c == '\u{201c}' || c == '\u{201d}', "\"")
}

/// Replace the `<w:{element}>` around each `{%{element} ... %}` / `{{{element} ... }}`
/// tag with the plain tag
fn collapse_enclosing(xml: &str, element: &str) -> String {
    let statement = format!("{{%{} ", element);
    let expression = format!("{{{{{} ", element);
    let open_plain = format!("<w:{}>", element);
    let open_attrs = format!("<w:{} ", element);
    let close = format!("</w:{}>", element);

    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some((pos, which)) = find_first(rest, &[statement.as_str(), expression.as_str()]) {
        let (open, closer) = if which == 0 { ("{%", "%}") } else { ("{{", "}}") };
        let body_start = pos + statement.len();
        let Some(body_len) = rest[body_start..].find(closer) else {
            break;
        };
        let body = rest[body_start..body_start + body_len].trim();
        let tag_end = body_start + body_len + closer.len();

        let before = &rest[..pos];
        let start = [before.rfind(&open_plain), before.rfind(&open_attrs)]
            .into_iter()
            .flatten()
            .max();
        let finish = rest[tag_end..]
            .find(&close)
            .map(|i| tag_end + i + close.len());

        let (keep_until, resume_at) = match (start, finish) {
            (Some(start), Some(finish)) => (start, finish),
            _ => (pos, tag_end),
        };
        out.push_str(&rest[..keep_until]);
        out.push_str(&format!("{} {} {}", open, body, closer));
        rest = &rest[resume_at..];
    }

    out.push_str(rest);
    out
}

/// Rewrite `{% ... %}` statements as handlebars blocks
///
/// A handlebars `each` makes the loop item the current context, so inside a
/// loop every name that is not a loop variable is read from `@root`.
fn translate_statements(xml: &str) -> Result<String> {
    let mut out = String::with_capacity(xml.len());
    let mut open_blocks: Vec<(&'static str, Option<&str>)> = Vec::new();
    let mut rest = xml;

    while let Some(pos) = rest.find("{%") {
        let Some(len) = rest[pos + 2..].find("%}") else {
            return Err(ReportError::Template(
                "unterminated {% tag in template".to_string(),
            ));
        };
        // `{%-` and `-%}` only trim whitespace in Jinja; the XML has none to trim.
        let statement = rest[pos + 2..pos + 2 + len]
            .trim()
            .trim_start_matches('-')
            .trim_end_matches('-')
            .trim();
        let loop_vars: Vec<&str> = open_blocks.iter().filter_map(|(_, item)| *item).collect();
        out.push_str(&scope_expressions(&rest[..pos], &loop_vars));

        let words: Vec<&str> = statement.split_whitespace().collect();
        let block = match words.as_slice() {
            ["for", item, "in", list] => {
                let block = format!("{{{{#each {} as |{}|}}}}", scoped(list, &loop_vars), item);
                open_blocks.push(("each", Some(*item)));
                block
            }
            ["if", "not", condition] => {
                open_blocks.push(("unless", None));
                format!("{{{{#unless {}}}}}", scoped(condition, &loop_vars))
            }
            ["if", condition] => {
                open_blocks.push(("if", None));
                format!("{{{{#if {}}}}}", scoped(condition, &loop_vars))
            }
            ["else"] => "{{else}}".to_string(),
            ["endfor"] | ["endif"] => match open_blocks.pop() {
                Some((kind, _)) => format!("{{{{/{}}}}}", kind),
                None => {
                    return Err(ReportError::Template(format!(
                        "{{% {} %}} without an opening tag",
                        statement
                    )));
                }
            },
            _ => {
                return Err(ReportError::Template(format!(
                    "unsupported template tag {{% {} %}}",
                    statement
                )));
            }
        };

        out.push_str(&block);
        rest = &rest[pos + 2 + len + 2..];
    }

    if let Some((kind, _)) = open_blocks.last() {
        return Err(ReportError::Template(format!("unclosed {} block", kind)));
    }

    out.push_str(rest);
    Ok(out)
}

/// `path` as seen from inside the loops binding `loop_vars`
fn scoped<'a>(path: &'a str, loop_vars: &[&str]) -> Cow<'a, str> {
    let head = path.split('.').next().unwrap_or(path);
    if loop_vars.is_empty() || loop_vars.contains(&head) || head.starts_with('@') || head == "this"
    {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("@root.{}", path))
    }
}

fn scope_expressions<'a>(text: &'a str, loop_vars: &[&str]) -> Cow<'a, str> {
    if loop_vars.is_empty() {
        return Cow::Borrowed(text);
    }
    EXPRESSION.replace_all(text, |caps: &Captures| match scoped(&caps[1], loop_vars) {
        Cow::Borrowed(_) => caps[0].to_string(),
        Cow::Owned(path) => format!("{{{{ {} }}}}", path),
    })
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> ReportError {
    ReportError::Template(format!("{}: {}", part, e))
}

/// `local` with the same namespace prefix as `container_name`
fn prefixed_tag(container_name: &[u8], local: &str) -> String {
    match container_name.iter().position(|&b| b == b':') {
        Some(colon) => format!("{}:{}", String::from_utf8_lossy(&container_name[..colon]), local),
        None => local.to_string(),
    }
}

/// Append one `child` element per attribute list as the last children of the
/// part's `root` element. A self-closing root is expanded.
fn append_to_root(
    part: &str,
    xml: &[u8],
    root: &str,
    child: &str,
    children: &[Vec<(&str, &str)>],
) -> Result<Vec<u8>> {
    let mut reader = XmlReader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = XmlWriter::new(Vec::with_capacity(xml.len() + children.len() * 160));
    let mut buf = Vec::new();

    let write_children = |writer: &mut XmlWriter<Vec<u8>>, tag: &str| -> Result<()> {
        for attributes in children {
            let mut element = BytesStart::new(tag);
            for &(key, value) in attributes {
                element.push_attribute((key, value));
            }
            writer
                .write_event(Event::Empty(element))
                .map_err(|e| xml_error(part, e))?;
        }
        Ok(())
    };

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(part, e))?;
        match event {
            Event::Eof => break,
            Event::End(e) if e.local_name().as_ref() == root.as_bytes() => {
                write_children(&mut writer, &prefixed_tag(e.name().as_ref(), child))?;
                writer
                    .write_event(Event::End(e))
                    .map_err(|e| xml_error(part, e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == root.as_bytes() => {
                let root_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer
                    .write_event(Event::Start(e))
                    .map_err(|e| xml_error(part, e))?;
                write_children(&mut writer, &prefixed_tag(root_name.as_bytes(), child))?;
                writer
                    .write_event(Event::End(BytesEnd::new(root_name.as_str())))
                    .map_err(|e| xml_error(part, e))?;
            }
            other => writer
                .write_event(other)
                .map_err(|e| xml_error(part, e))?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn add_relationships(rels: &[u8], media: &[(String, String)]) -> Result<Vec<u8>> {
    let children: Vec<Vec<(&str, &str)>> = media
        .iter()
        .map(|(rel_id, target)| {
            vec![
                ("Id", rel_id.as_str()),
                ("Type", IMAGE_REL_TYPE),
                ("Target", target.as_str()),
            ]
        })
        .collect();
    append_to_root(DOCUMENT_RELS, rels, "Relationships", "Relationship", &children)
}

/// Lower-cased `Extension` of every `<Default>` content type
fn default_extensions(types: &[u8]) -> Result<HashSet<String>> {
    let mut reader = XmlReader::from_reader(types);
    let mut buf = Vec::new();
    let mut extensions = HashSet::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| xml_error(CONTENT_TYPES, e))?
        {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Default" => {
                for attribute in e.attributes().flatten() {
                    if attribute.key.local_name().as_ref() == b"Extension" {
                        extensions
                            .insert(String::from_utf8_lossy(&attribute.value).to_ascii_lowercase());
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(extensions)
}

fn add_content_types(types: &[u8], images: &[InlineImage]) -> Result<Vec<u8>> {
    let mut known = default_extensions(types)?;
    let mut children = Vec::new();
    for image in images {
        if known.insert(image.extension().to_string()) {
            children.push(vec![
                ("Extension", image.extension()),
                ("ContentType", image.content_type),
            ]);
        }
    }
    append_to_root(CONTENT_TYPES, types, "Types", "Default", &children)
}
