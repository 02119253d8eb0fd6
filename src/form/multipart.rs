//! `multipart/form-data` codec.
//!
//! # Responsibilities
//! - Parse a buffered multipart body into text fields and file parts
//! - Rebuild a fresh body: text fields first, then files untouched
//! - Pick a new random boundary that occurs nowhere in the content
//!
//! # Design Decisions
//! - The whole body is held in memory, bounded by the configured limit
//! - File content is kept as `Bytes` and copied verbatim, never decoded
//! - Names and filenames are written as quoted strings: `\` and `"` are
//!   backslash-escaped, CR and LF are percent-escaped
//! - The rebuilt body is held to the same byte limit as the incoming one

use std::collections::BTreeMap;
use std::io::{self, Write};

use axum::http::header::CONTENT_DISPOSITION;
use bytes::Bytes;
use rand::Rng;

use crate::error::{FilterError, ParseError};
use crate::form::fields::FormFields;
use crate::form::mutation::MutationSpec;

/// Content type written for file parts that arrived without one.
pub const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

const BOUNDARY_RANDOM_BYTES: usize = 30;

/// An uploaded file, relocated as-is into the rebuilt body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub content: Bytes,
}

/// A parsed multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    /// Text fields; the only part the mutation pass touches.
    pub fields: FormFields,
    /// File parts grouped by field name, in arrival order within a field.
    pub files: BTreeMap<String, Vec<FilePart>>,
}

impl MultipartForm {
    /// Total number of file parts across all fields.
    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    fn file_parts(&self) -> impl Iterator<Item = &FilePart> {
        self.files.values().flatten()
    }
}

/// A rebuilt multipart body and the boundary it was written with.
#[derive(Debug, Clone)]
pub struct RebuiltBody {
    pub boundary: String,
    pub bytes: Bytes,
}

impl RebuiltBody {
    /// Value for the request's Content-Type header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// Extract the boundary parameter from a multipart Content-Type value.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, ParseError> {
    multer::parse_boundary(content_type).map_err(|e| ParseError::Multipart(e.to_string()))
}

/// Parse a buffered multipart body.
///
/// `limit` caps the whole stream; parts without a name are skipped.
pub async fn parse(body: Bytes, boundary: &str, limit: u64) -> Result<MultipartForm, ParseError> {
    let constraints =
        multer::Constraints::new().size_limit(multer::SizeLimit::new().whole_stream(limit));
    let stream = futures_util::stream::once(async move { Ok::<Bytes, io::Error>(body) });
    let mut multipart = multer::Multipart::with_constraints(stream, boundary.to_string(), constraints);

    let mut form = MultipartForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multer_error)? {
        let disposition = field
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
            .unwrap_or_default()
            .to_string();
        let Some(name) = disposition_param(&disposition, "name") else {
            tracing::debug!("Skipping multipart part without a name");
            continue;
        };

        match disposition_param(&disposition, "filename") {
            Some(file_name) => {
                let content_type = field.content_type().map(|m| m.to_string());
                let content = field.bytes().await.map_err(multer_error)?;
                form.files.entry(name.clone()).or_default().push(FilePart {
                    field_name: name,
                    file_name,
                    content_type,
                    content,
                });
            }
            None => {
                let raw = field.bytes().await.map_err(multer_error)?;
                let value = String::from_utf8(raw.to_vec()).map_err(|_| {
                    ParseError::Multipart(format!("field {:?} is not valid UTF-8", name))
                })?;
                form.fields.append(name, value);
            }
        }
    }
    Ok(form)
}

/// Serialize `form` with a boundary that differs from `previous_boundary`
/// and does not occur anywhere in the form's content.
///
/// Fails if the serialized body would exceed `limit` bytes.
pub fn rebuild(form: &MultipartForm, previous_boundary: &str, limit: u64) -> io::Result<RebuiltBody> {
    let mut rng = rand::thread_rng();
    let boundary = loop {
        let candidate = generate_boundary(&mut rng);
        if is_safe_boundary(&candidate, form, previous_boundary) {
            break candidate;
        }
    };

    let mut writer = MultipartWriter::new(CappedBuffer::new(limit), boundary);
    write_form(&mut writer, form)?;
    let boundary = writer.boundary().to_string();
    let buffer = writer.finish()?;

    Ok(RebuiltBody {
        boundary,
        bytes: Bytes::from(buffer.bytes),
    })
}

/// Parse, mutate the text fields and rebuild.
pub async fn rewrite(
    body: Bytes,
    content_type: &str,
    spec: &MutationSpec,
    limit: u64,
) -> Result<RebuiltBody, FilterError> {
    let boundary = boundary_from_content_type(content_type)?;
    let mut form = parse(body, &boundary, limit).await?;

    spec.apply(&mut form.fields);

    tracing::debug!(
        fields = form.fields.len(),
        files = form.file_count(),
        "Rebuilding multipart body"
    );

    rebuild(&form, &boundary, limit).map_err(|e| FilterError::Reconstruction(e.to_string()))
}

/// Write every text field, then every file part.
pub fn write_form<W: Write>(writer: &mut MultipartWriter<W>, form: &MultipartForm) -> io::Result<()> {
    for (name, value) in form.fields.pairs() {
        writer.write_field(name, value)?;
    }
    for file in form.file_parts() {
        writer.write_file(
            &file.field_name,
            &file.file_name,
            file.content_type.as_deref(),
            &file.content,
        )?;
    }
    Ok(())
}

/// Random hex boundary token.
pub fn generate_boundary<R: Rng>(rng: &mut R) -> String {
    let mut raw = [0u8; BOUNDARY_RANDOM_BYTES];
    rng.fill(&mut raw[..]);
    raw.iter().map(|b| format!("{:02x}", b)).collect()
}

fn is_safe_boundary(candidate: &str, form: &MultipartForm, previous: &str) -> bool {
    if candidate == previous {
        return false;
    }
    let needle = candidate.as_bytes();
    let in_fields = form
        .fields
        .pairs()
        .any(|(k, v)| contains(k.as_bytes(), needle) || contains(v.as_bytes(), needle));
    let in_files = form.file_parts().any(|f| {
        contains(&f.content, needle) || contains(f.file_name.as_bytes(), needle)
    });
    !in_fields && !in_files
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Streaming multipart serializer over any `io::Write`.
pub struct MultipartWriter<W> {
    inner: W,
    boundary: String,
    wrote_part: bool,
}

impl<W: Write> MultipartWriter<W> {
    pub fn new(inner: W, boundary: String) -> Self {
        Self {
            inner,
            boundary,
            wrote_part: false,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Write a plain text field.
    pub fn write_field(&mut self, name: &str, value: &str) -> io::Result<()> {
        let disposition = format!("form-data; name=\"{}\"", escape_header_param(name));
        self.begin_part(&[("Content-Disposition", disposition)])?;
        self.inner.write_all(value.as_bytes())
    }

    /// Write a file part with its content copied in full.
    pub fn write_file(
        &mut self,
        name: &str,
        file_name: &str,
        content_type: Option<&str>,
        content: &[u8],
    ) -> io::Result<()> {
        let disposition = format!(
            "form-data; name=\"{}\"; filename=\"{}\"",
            escape_header_param(name),
            escape_header_param(file_name)
        );
        let content_type = content_type
            .filter(|ct| !ct.contains(['\r', '\n']))
            .unwrap_or(DEFAULT_FILE_CONTENT_TYPE)
            .to_string();
        self.begin_part(&[
            ("Content-Disposition", disposition),
            ("Content-Type", content_type),
        ])?;
        self.inner.write_all(content)
    }

    fn begin_part(&mut self, headers: &[(&str, String)]) -> io::Result<()> {
        if self.wrote_part {
            write!(self.inner, "\r\n--{}\r\n", self.boundary)?;
        } else {
            write!(self.inner, "--{}\r\n", self.boundary)?;
        }
        self.wrote_part = true;
        for (name, value) in headers {
            write!(self.inner, "{}: {}\r\n", name, value)?;
        }
        self.inner.write_all(b"\r\n")
    }

    /// Emit the closing delimiter and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.wrote_part {
            self.inner.write_all(b"\r\n")?;
        }
        write!(self.inner, "--{}--\r\n", self.boundary)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn escape_header_param(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            c => out.push(c),
        }
    }
    out
}

/// Read one parameter of a Content-Disposition value.
///
/// Quoted values treat `\` as an escape only before `"` or `\`, so Windows
/// paths sent unescaped by browsers survive. Unquoted values run to the next
/// `;` or whitespace. Parameter names match case-insensitively.
fn disposition_param(value: &str, param: &str) -> Option<String> {
    let (_, mut rest) = value.split_once(';')?;
    loop {
        rest = rest.trim_start_matches(|c: char| c == ';' || c.is_ascii_whitespace());
        if rest.is_empty() {
            return None;
        }

        let key_end = rest.find(|c: char| c == '=' || c == ';')?;
        if rest[key_end..].starts_with(';') {
            rest = &rest[key_end..];
            continue;
        }
        let key = rest[..key_end].trim();
        let raw = rest[key_end + 1..].trim_start();

        let (parsed, remaining) = match raw.strip_prefix('"') {
            Some(quoted) => unquote(quoted)?,
            None => {
                let end = raw
                    .find(|c: char| c == ';' || c.is_ascii_whitespace())
                    .unwrap_or(raw.len());
                (raw[..end].to_string(), &raw[end..])
            }
        };

        if key.eq_ignore_ascii_case(param) {
            return Some(parsed);
        }
        rest = remaining;
    }
}

/// Decode a quoted string whose opening quote is already consumed. Returns
/// the value and the text after the closing quote.
fn unquote(quoted: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = quoted.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&(_, next @ ('"' | '\\'))) => {
                    out.push(next);
                    chars.next();
                }
                _ => out.push('\\'),
            },
            '"' => return Some((out, &quoted[i + 1..])),
            c => out.push(c),
        }
    }
    None
}

/// In-memory sink that refuses to grow past a byte cap.
struct CappedBuffer {
    bytes: Vec<u8>,
    cap: u64,
}

impl CappedBuffer {
    fn new(cap: u64) -> Self {
        Self {
            bytes: Vec::new(),
            cap,
        }
    }
}

impl Write for CappedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = (self.bytes.len() + buf.len()) as u64;
        if len > self.cap {
            return Err(io::Error::other(format!(
                "rebuilt body exceeds the {} byte limit",
                self.cap
            )));
        }
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn multer_error(err: multer::Error) -> ParseError {
    match err {
        multer::Error::StreamSizeExceeded { limit } => ParseError::TooLarge { limit },
        other => ParseError::Multipart(other.to_string()),
    }
}
