//! `multipart/form-data` encoding for requests that carry file parts.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http::HeaderValue;

use crate::normalized::FilePart;
use crate::stream::AsyncByteStream;

/// Extracts the `boundary` parameter of a multipart content type.
pub(crate) fn boundary_of(content_type: &HeaderValue) -> Option<String> {
    let value = content_type.to_str().ok()?;
    let mut params = value.split(';');
    let essence = params.next()?.trim();
    if !essence.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim().trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
}

pub(crate) fn new_boundary() -> String {
    format!("{:032x}", fastrand::u128(..))
}

pub(crate) fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

/// Streams form fields first, then every file part, then the closing delimiter.
///
/// File contents are not buffered; each part's stream is spliced in as is.
pub(crate) fn encode(
    boundary: &str,
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
) -> AsyncByteStream {
    let mut segments: Vec<AsyncByteStream> = Vec::with_capacity(fields.len() + files.len() * 3 + 1);

    for (name, value) in fields {
        let mut part = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
            quote(&name),
        )
        .into_bytes();
        part.extend_from_slice(value.as_bytes());
        part.extend_from_slice(b"\r\n");
        segments.push(AsyncByteStream::once(part));
    }

    for file in files {
        segments.push(AsyncByteStream::once(file_head(boundary, &file)));
        segments.push(file.content.into_async());
        segments.push(AsyncByteStream::once(Bytes::from_static(b"\r\n")));
    }

    segments.push(AsyncByteStream::once(format!("--{boundary}--\r\n")));

    AsyncByteStream::from_stream(stream::iter(segments).flatten())
}

fn file_head(boundary: &str, file: &FilePart) -> String {
    let mut head = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
        quote(&file.field),
    );
    if let Some(filename) = &file.filename {
        head.push_str(&format!("; filename=\"{}\"", quote(filename)));
    }
    head.push_str("\r\n");

    for (name, value) in &file.headers {
        if name.eq_ignore_ascii_case("content-disposition") || name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        head.push_str(&format!("{name}: {value}\r\n"));
    }

    let media_type = file.content_type.as_deref()
        .or_else(|| {
            file.headers.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                .map(|(_, v)| v.as_str())
        })
        .unwrap_or("application/octet-stream");
    head.push_str(&format!("Content-Type: {media_type}\r\n\r\n"));
    head
}

/// Escapes a form parameter for use inside double quotes.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("%22"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            c => out.push(c),
        }
    }
    out
}
