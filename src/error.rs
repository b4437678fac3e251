use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the REST transport.
///
/// None of these are retried; the caller decides what to do with them.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request timed out after {}", humantime::format_duration(*.after))]
    Timeout { after: Duration },

    #[error("Unable to connect to the server: {source}")]
    ConnectionError {
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned a non-JSON response ({content_type}): {preview}")]
    NonJsonResponse {
        content_type: String,
        preview: String,
    },

    #[error("Server returned malformed JSON: {source}")]
    InvalidJson {
        #[from]
        source: serde_json::Error,
    },

    #[error("{message}")]
    HttpError { status: u16, message: String },

    #[error("Upload failed: {message}")]
    UploadError { status: u16, message: String },

    #[error("Upload timed out after {}", humantime::format_duration(*.after))]
    UploadTimeout { after: Duration },

    #[error("Network error during upload: {source}")]
    NetworkError {
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid endpoint path '{path}'")]
    InvalidPath {
        path: String,
        #[source]
        source: Option<url::ParseError>,
    },

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Errors from validating or re-encoding files before upload.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("{file} is too large. Maximum size is {limit_mib}MB")]
    FileTooLarge { file: String, limit_mib: u64 },

    #[error("Unable to decode image {file}: {source}")]
    Decode {
        file: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Unable to encode image {file}: {source}")]
    Encode {
        file: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Encoding {file} produced no data")]
    EmptyOutput { file: String },

    #[error("Unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl MediaError {
    /// Name of the file this error is about.
    pub fn file(&self) -> &str {
        match self {
            Self::FileTooLarge { file, .. }
            | Self::Decode { file, .. }
            | Self::Encode { file, .. }
            | Self::EmptyOutput { file } => file,
            Self::Io { path, .. } => path,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_too_large_names_file_and_limit() {
        let err = MediaError::FileTooLarge {
            file: "cake.png".to_string(),
            limit_mib: 5,
        };
        assert_eq!(err.to_string(), "cake.png is too large. Maximum size is 5MB");
        assert_eq!(err.file(), "cake.png");
    }

    #[test]
    fn http_error_displays_server_message() {
        let err = ClientError::HttpError {
            status: 400,
            message: "Name and message required".to_string(),
        };
        assert_eq!(err.to_string(), "Name and message required");
    }

    #[test]
    fn invalid_path_names_the_path() {
        let err = ClientError::InvalidPath {
            path: "../admin".to_string(),
            source: None,
        };
        assert_eq!(err.to_string(), "Invalid endpoint path '../admin'");
    }

    #[test]
    fn timeout_formats_duration() {
        let err = ClientError::Timeout {
            after: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "Request timed out after 1m");
    }
}
