//! Request and response bodies for the transfer endpoints.

use std::collections::HashMap;

use lanbeam_core::DeviceInfo;
use serde::{Deserialize, Serialize};

/// Optional file timestamps, ISO-8601 strings as sent by the peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub accessed: Option<String>,
}

/// File metadata from the sender.
///
/// `size` is trusted as the upload length; payload bytes beyond it are
/// rejected by the upload handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub size: u64,
    #[serde(rename = "fileType")]
    pub file_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<FileMetadata>,
}

/// Prepare-upload request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareUploadRequest {
    pub info: DeviceInfo,
    pub files: HashMap<String, FileInfo>,
}

/// Prepare-upload response: session ID plus one token per accepted file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareUploadResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub files: HashMap<String, String>,
}

/// Upload query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub token: String,
}

/// Cancel query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_info_uses_camel_case_field_names() {
        let info = FileInfo {
            id: "f1".into(),
            file_name: "report.pdf".into(),
            size: 1024,
            file_type: "application/pdf".into(),
            sha256: None,
            preview: None,
            metadata: None,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["fileName"], "report.pdf");
        assert_eq!(json["fileType"], "application/pdf");
        assert!(json.get("sha256").is_none());
    }

    #[test]
    fn prepare_upload_request_parses_file_map() {
        let raw = r#"{
            "info": {
                "alias": "Phone",
                "version": "2.0",
                "deviceType": "mobile",
                "fingerprint": "abc123",
                "port": 53317,
                "protocol": "http",
                "download": false
            },
            "files": {
                "f1": {"id": "f1", "fileName": "a.txt", "size": 3, "fileType": "text/plain"}
            }
        }"#;
        let req: PrepareUploadRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.info.alias, "Phone");
        assert_eq!(req.files.len(), 1);
        assert_eq!(req.files["f1"].size, 3);
    }
}
