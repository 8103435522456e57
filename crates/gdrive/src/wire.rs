//! Drive v2 JSON shapes and header helpers

use dg_core::{Error, ProviderError, RemoteObject, Result};
use serde::{Deserialize, Serialize};

/// `files.list` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub items: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mime_type: String,
    /// int64 values are transmitted as decimal strings
    pub file_size: Option<String>,
    #[serde(default)]
    pub parents: Vec<ParentReference>,
    pub labels: Option<Labels>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentReference {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Labels {
    #[serde(default)]
    pub trashed: bool,
}

impl From<DriveFile> for RemoteObject {
    fn from(file: DriveFile) -> Self {
        RemoteObject {
            size: file.file_size.as_deref().and_then(|s| s.parse().ok()),
            trashed: file.labels.map(|l| l.trashed).unwrap_or(false),
            parents: file.parents.into_iter().map(|p| p.id).collect(),
            id: file.id,
            title: file.title,
            mime_type: file.mime_type,
        }
    }
}

/// Metadata body for `files.insert`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFile<'a> {
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'a str>,
    pub parents: Vec<ParentReference>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

/// Parse a Drive error body; unparseable bodies keep the raw text
pub fn parse_error_body(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ProviderError {
            status: envelope.error.code.unwrap_or(status),
            reason: envelope
                .error
                .errors
                .into_iter()
                .find_map(|detail| detail.reason),
            message: envelope.error.message,
        },
        Err(_) => ProviderError::new(status, None, body.trim()),
    }
}

/// `Content-Range` for a chunk of `len` bytes at `offset`
pub fn content_range(offset: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

/// Offset to resume from, given the `Range` header of a 308 response.
/// No header means nothing has been persisted yet.
pub fn resume_offset(range: Option<&str>) -> Result<u64> {
    let Some(range) = range else {
        return Ok(0);
    };
    let last = range
        .trim()
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.parse::<u64>().ok())
        .ok_or_else(|| Error::Transient(format!("unexpected upload Range header '{range}'")))?;
    Ok(last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_list() {
        let body = r#"{
            "kind": "drive#fileList",
            "nextPageToken": "EAIaGgoS",
            "items": [
                {
                    "id": "0B1",
                    "title": "duplicity-full.manifest",
                    "mimeType": "application/octet-stream",
                    "fileSize": "1234",
                    "parents": [{"kind": "drive#parentReference", "id": "0Bdest"}],
                    "labels": {"trashed": false, "starred": false}
                },
                {
                    "id": "0B2",
                    "title": "sub",
                    "mimeType": "application/vnd.google-apps.folder",
                    "parents": [{"id": "0Bdest"}]
                }
            ]
        }"#;

        let list: FileList = serde_json::from_str(body).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("EAIaGgoS"));

        let objects: Vec<RemoteObject> = list.items.into_iter().map(Into::into).collect();
        assert_eq!(objects[0].size, Some(1234));
        assert_eq!(objects[0].parents, ["0Bdest"]);
        assert!(!objects[0].trashed);
        assert_eq!(objects[1].size, None);
        assert!(objects[1].is_folder());
    }

    #[test]
    fn test_last_page_has_no_token() {
        let list: FileList = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(list.items.is_empty());
        assert!(list.next_page_token.is_none());
    }

    #[test]
    fn test_new_file_body() {
        let body = NewFile {
            title: "a",
            mime_type: Some(dg_core::FOLDER_MIME_TYPE),
            parents: vec![ParentReference {
                id: "root".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "title": "a",
                "mimeType": "application/vnd.google-apps.folder",
                "parents": [{"id": "root"}]
            })
        );
    }

    #[test]
    fn test_parse_abuse_error() {
        let body = r#"{
            "error": {
                "errors": [{
                    "domain": "global",
                    "reason": "abuse",
                    "message": "This file has been identified as malware or spam and cannot be downloaded"
                }],
                "code": 403,
                "message": "This file has been identified as malware or spam and cannot be downloaded"
            }
        }"#;
        let err = parse_error_body(403, body);
        assert_eq!(err.status, 403);
        assert_eq!(err.reason.as_deref(), Some("abuse"));
        assert!(matches!(
            Error::from_provider("download", err),
            Error::AbuseFlagged(_)
        ));
    }

    #[test]
    fn test_parse_unstructured_error() {
        let err = parse_error_body(502, "<html>Bad Gateway</html>\n");
        assert_eq!(err, ProviderError::new(502, None, "<html>Bad Gateway</html>"));
    }

    #[test]
    fn test_content_range() {
        assert_eq!(content_range(0, 262144, 1000000), "bytes 0-262143/1000000");
        assert_eq!(content_range(262144, 10, 262154), "bytes 262144-262153/262154");
        assert_eq!(content_range(0, 0, 0), "bytes */0");
    }

    #[test]
    fn test_resume_offset() {
        assert_eq!(resume_offset(None).unwrap(), 0);
        assert_eq!(resume_offset(Some("bytes=0-524287")).unwrap(), 524288);
        assert!(resume_offset(Some("garbage")).is_err());
    }
}
