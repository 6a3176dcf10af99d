//! Mapping between the host's objects and the normalized messages.
//!
//! Both directions are plain functions: they read their input and build
//! their output, nothing else.

use std::sync::Arc;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE};
use http::{HeaderName, HeaderValue, Method};

use crate::error::Error;
use crate::executor::Executor;
use crate::host::{HostRequest, HostResponse};
use crate::normalized::{FORM_URLENCODED, FilePart, NormalizedRequest, NormalizedResponse, RequestBody};
use crate::stream::{ByteStream, SyncByteStream};

/// Turns the host's request into a [`NormalizedRequest`].
///
/// - header names are lower-cased; `content-length` is dropped
/// - decoded form fields win over the raw body; an empty body is absent
/// - every uploaded file becomes a [`FilePart`]
/// - form fields without files force a URL-encoded content type
pub fn to_normalized_request(request: HostRequest) -> Result<NormalizedRequest, Error> {
    let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
        .map_err(|e| Error::InvalidRequest(format!("method {:?}: {e}", request.method)))?;

    let mut headers = Vec::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        // `HeaderName` is lower-case by construction.
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidRequest(format!("header name {name:?}: {e}")))?;
        if name == CONTENT_LENGTH {
            continue;
        }
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidRequest(format!("header {name}: {e}")))?;
        headers.push((name, value));
    }

    let has_form = !request.form.is_empty();
    let body = if has_form {
        RequestBody::Form(request.form)
    } else if request.data.is_empty() {
        RequestBody::Empty
    } else {
        RequestBody::Bytes(request.data)
    };

    let files: Vec<FilePart> = request.files.into_iter()
        .map(|file| FilePart {
            field: file.field,
            filename: file.filename,
            content_type: file.content_type,
            headers: file.headers,
            content: ByteStream::Blocking(file.stream),
        })
        .collect();

    let mut normalized = NormalizedRequest {
        method,
        url: request.url,
        headers,
        query: request.args,
        cookies: request.cookies,
        body,
        files,
    };

    // Without file parts the encoder would otherwise pick its own encoding.
    if has_form && normalized.files.is_empty() {
        normalized.set_header(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));
    }

    Ok(normalized)
}

/// Turns a [`NormalizedResponse`] into the host's response.
///
/// The body is not read here. It is pulled chunk by chunk when the host
/// iterates, each pull blocking on `executor`, which keeps the application
/// running for as long as the body is being read.
///
/// The host's header store keeps one value per name, so a repeated header
/// keeps only its last value. `set-cookie` is the exception: cookies are
/// re-attached individually with all their attributes.
pub fn to_host_response(response: NormalizedResponse, executor: Arc<Executor>) -> HostResponse {
    let body = SyncByteStream::from_async(response.body, executor);
    let mut host = HostResponse::streamed(body, response.status, response.content_type);

    for (name, value) in response.headers {
        if name == SET_COOKIE {
            continue;
        }
        host.set_header(name, value);
    }

    for cookie in response.cookies {
        host.set_cookie(cookie);
    }

    host
}
