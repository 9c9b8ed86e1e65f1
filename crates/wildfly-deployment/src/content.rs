//! Deployment content sources.

use bytes::Bytes;
use serde_json::{json, Value};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use url::Url;
use wildfly_core::operation::{Attachment, CompositeBuilder, Operation, INPUT_STREAM_INDEX};
use wildfly_core::Error;

use crate::Result;

/// Key of the content list on `add` and `full-replace-deployment`.
pub const CONTENT: &str = "content";

/// Where the bytes of a deployment come from.
///
/// Nothing is read from disk or the network until an operation is built; in-memory content
/// is copied once when the value is created.
#[derive(Clone, PartialEq, Eq)]
pub enum DeploymentContent {
    /// A file uploaded as an attachment, or a directory deployed exploded in place.
    Path(PathBuf),
    /// Content held in memory and uploaded as an attachment.
    Bytes(Bytes),
    /// Content the server fetches itself.
    Url(Url),
}

impl DeploymentContent {
    /// Copy everything from `reader` into memory.
    ///
    /// The reader is consumed and dropped before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the reader fails.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .map_err(|err| Error::Io(format!("Failed to copy deployment content: {err}")))?;
        drop(reader);
        Ok(Self::Bytes(Bytes::from(buffer)))
    }

    /// The name a deployment gets when none is given explicitly.
    #[must_use]
    pub fn resolved_name(&self) -> Option<String> {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            Self::Bytes(_) => None,
            Self::Url(url) => url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string),
        }
    }

    /// Attach this content to `op`, registering any attachment with `builder`.
    ///
    /// Directories are referenced by absolute path and deployed unpacked. Files and
    /// in-memory content get the next attachment index.
    pub fn add_to_operation(&self, builder: &mut CompositeBuilder, op: &mut Operation) {
        let item = match self {
            Self::Path(path) if path.is_dir() => {
                json!({ "path": absolute(path).to_string_lossy(), "archive": false })
            }
            Self::Path(path) => {
                let index = builder.add_attachment(Attachment::File(path.clone()));
                json!({ INPUT_STREAM_INDEX: index })
            }
            Self::Bytes(bytes) => {
                let index = builder.add_attachment(Attachment::Bytes(bytes.clone()));
                json!({ INPUT_STREAM_INDEX: index })
            }
            Self::Url(url) => json!({ "url": url.as_str() }),
        };
        op.set_param(CONTENT, Value::Array(vec![item]));
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl fmt::Debug for DeploymentContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Url(url) => f.debug_tuple("Url").field(&url.as_str()).finish(),
        }
    }
}

impl fmt::Display for DeploymentContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "DeploymentContent({})", path.display()),
            Self::Bytes(bytes) => write!(f, "DeploymentContent({} bytes)", bytes.len()),
            Self::Url(url) => write!(f, "DeploymentContent({url})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use wildfly_core::operation::Address;

    #[test]
    fn resolved_name_from_path() {
        let content = DeploymentContent::Path(PathBuf::from("/tmp/target/app.war"));
        assert_eq!(content.resolved_name().as_deref(), Some("app.war"));
    }

    #[test]
    fn resolved_name_from_url() {
        let url = Url::parse("https://repo.example.com/releases/app-1.0.war").unwrap();
        let content = DeploymentContent::Url(url);
        assert_eq!(content.resolved_name().as_deref(), Some("app-1.0.war"));

        let url = Url::parse("https://repo.example.com/").unwrap();
        assert_eq!(DeploymentContent::Url(url).resolved_name(), None);
    }

    #[test]
    fn bytes_have_no_resolved_name() {
        let content = DeploymentContent::from_reader(Cursor::new(b"abc".to_vec())).unwrap();
        assert_eq!(content.resolved_name(), None);
        assert_eq!(content, DeploymentContent::Bytes(Bytes::from_static(b"abc")));
    }

    #[test]
    fn file_content_uses_next_attachment_index() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut builder = CompositeBuilder::new();
        builder.add_attachment(Attachment::Bytes(Bytes::from_static(b"first")));

        let mut op = Operation::add(Address::deployment("b.war"));
        DeploymentContent::Path(file.path().to_path_buf()).add_to_operation(&mut builder, &mut op);

        assert_eq!(op.param(CONTENT), Some(&json!([{ "input-stream-index": 1 }])));
        assert_eq!(builder.attachment_count(), 2);
    }

    #[test]
    fn directory_content_is_deployed_unpacked() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = CompositeBuilder::new();
        let mut op = Operation::add(Address::deployment("exploded.war"));
        DeploymentContent::Path(dir.path().to_path_buf()).add_to_operation(&mut builder, &mut op);

        let item = &op.param(CONTENT).unwrap()[0];
        assert_eq!(item["archive"], json!(false));
        assert!(item["path"].as_str().unwrap().len() > 1);
        assert_eq!(builder.attachment_count(), 0);
    }

    #[test]
    fn url_content_is_inline() {
        let url = Url::parse("http://example.com/app.war").unwrap();
        let mut builder = CompositeBuilder::new();
        let mut op = Operation::add(Address::deployment("app.war"));
        DeploymentContent::Url(url).add_to_operation(&mut builder, &mut op);
        assert_eq!(
            op.param(CONTENT),
            Some(&json!([{ "url": "http://example.com/app.war" }]))
        );
        assert_eq!(builder.attachment_count(), 0);
    }
}
