//! `multipart/form-data` payload builder.
//!
//! Parts are kept in memory and written out by [`MultipartForm::serialize`].
//! Adding a part never fails eagerly; problems (unreadable files, failing
//! readers) are collected and reported together when the form is serialized.

use crate::error::HttpError;
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone)]
enum Part {
    Field {
        name: String,
        value: String,
    },
    File {
        field: String,
        filename: String,
        data: Bytes,
    },
}

/// In-memory `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
    errors: Vec<String>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    #[must_use]
    pub fn new() -> Self {
        Self {
            boundary: random_boundary(),
            parts: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Add a file part from memory.
    pub fn add_file(
        &mut self,
        field: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> &mut Self {
        self.parts.push(Part::File {
            field: field.into(),
            filename: filename.into(),
            data: data.into(),
        });
        self
    }

    /// Add a file part by draining `reader`.
    pub fn add_file_reader(
        &mut self,
        field: impl Into<String>,
        filename: impl Into<String>,
        mut reader: impl Read,
    ) -> &mut Self {
        let field = field.into();
        let filename = filename.into();
        let mut data = Vec::new();
        match reader.read_to_end(&mut data) {
            Ok(_) => self.add_file(field, filename, data),
            Err(e) => {
                self.errors
                    .push(format!("field:{field} filename:{filename} read failed: {e}"));
                self
            }
        }
    }

    /// Add a file part from disk, named after the file.
    pub fn add_file_from_path(
        &mut self,
        field: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> &mut Self {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        match std::fs::File::open(path) {
            Ok(file) => self.add_file_reader(field, filename, file),
            Err(e) => {
                self.errors.push(format!("open {}: {e}", path.display()));
                self
            }
        }
    }

    /// Add a plain form field.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.parts.push(Part::Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add several form fields (in key order).
    pub fn add_fields<K, V>(&mut self, fields: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let ordered: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for (name, value) in ordered {
            self.add_field(name, value);
        }
        self
    }

    /// Drop all parts and collected errors and pick a fresh boundary.
    pub fn reset(&mut self) {
        self.boundary = random_boundary();
        self.parts.clear();
        self.errors.clear();
    }

    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `Content-Type` header value carrying the boundary.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Encode the form.
    ///
    /// Returns the body bytes together with the matching content type.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Body`] with every collected error joined by `"; "`
    /// if any part could not be added.
    pub fn serialize(&self) -> Result<(Bytes, String), HttpError> {
        if !self.errors.is_empty() {
            return Err(HttpError::Body(self.errors.join("; ").into()));
        }

        let mut buf = BytesMut::new();
        for part in &self.parts {
            buf.put_slice(b"--");
            buf.put_slice(self.boundary.as_bytes());
            buf.put_slice(b"\r\n");
            match part {
                Part::Field { name, value } => {
                    put_line(
                        &mut buf,
                        &format!("Content-Disposition: form-data; name=\"{}\"", escape_quotes(name)),
                    );
                    buf.put_slice(b"\r\n");
                    buf.put_slice(value.as_bytes());
                }
                Part::File {
                    field,
                    filename,
                    data,
                } => {
                    put_line(
                        &mut buf,
                        &format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
                            escape_quotes(field),
                            escape_quotes(filename)
                        ),
                    );
                    put_line(&mut buf, "Content-Type: application/octet-stream");
                    buf.put_slice(b"\r\n");
                    buf.put_slice(data);
                }
            }
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"--\r\n");

        Ok((buf.freeze(), self.content_type()))
    }
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.put_slice(line.as_bytes());
    buf.put_slice(b"\r\n");
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn random_boundary() -> String {
    let mut rng = rand::rng();
    format!("{:016x}{:016x}", rng.random::<u64>(), rng.random::<u64>())
}
