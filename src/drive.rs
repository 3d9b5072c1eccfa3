use std::io::Read;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Body, Client};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use serde::Deserialize;
use serde_json::json;

use crate::destination::{ObjectStore, StoredObject, UploadedObject};
use crate::error::ArchiverError;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,size,parents,modifiedTime)";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    /// Drive reports sizes as decimal strings.
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    modified_time: Option<String>,
}

impl From<DriveFile> for StoredObject {
    fn from(file: DriveFile) -> Self {
        StoredObject {
            id: file.id,
            name: file.name,
            size: file.size.and_then(|size| size.parse().ok()),
            parent_id: file.parents.into_iter().next(),
            modified_time: file.modified_time,
        }
    }
}

/// Google Drive v3 over REST with a pre-issued bearer token.
#[derive(Clone)]
pub struct DriveHttpClient {
    client: Client,
    access_token: String,
}

impl DriveHttpClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self, ArchiverError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("parch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ArchiverError::DriveHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ArchiverError::DriveHttp(err.to_string()))?;
        Ok(Self {
            client,
            access_token: access_token.into(),
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, ArchiverError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            let response = make_req().bearer_auth(&self.access_token).send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "drive request retry");
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(ArchiverError::DriveHttp(err.to_string()));
                }
            }
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ArchiverError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Drive request failed".to_string());
        Err(ArchiverError::DriveStatus { status, message })
    }

    fn url(base: &str, params: &[(&str, &str)]) -> Result<Url, ArchiverError> {
        Url::parse_with_params(base, params).map_err(|err| ArchiverError::DriveHttp(err.to_string()))
    }

    fn list(&self, query: &str) -> Result<Vec<StoredObject>, ArchiverError> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("q", query),
                ("fields", LIST_FIELDS),
                ("pageSize", "1000"),
                ("spaces", "drive"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let url = Self::url(FILES_URL, &params)?;
            let response = self.send_with_retries(|| self.client.get(url.clone()))?;
            let page: FileList = Self::handle_status(response)?
                .json()
                .map_err(|err| ArchiverError::DriveHttp(err.to_string()))?;
            objects.extend(page.files.into_iter().map(StoredObject::from));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(objects)
    }
}

impl ObjectStore for DriveHttpClient {
    fn find_by_name(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<StoredObject>, ArchiverError> {
        self.list(&name_query(name, parent_id, false))
    }

    fn find_folders_by_name(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<StoredObject>, ArchiverError> {
        self.list(&name_query(name, parent_id, true))
    }

    fn create_folder(&self, parent_id: Option<&str>, name: &str) -> Result<String, ArchiverError> {
        let mut metadata = json!({ "name": name, "mimeType": FOLDER_MIME_TYPE });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }
        let url = Self::url(FILES_URL, &[("fields", "id")])?;
        let response = self.send_with_retries(|| self.client.post(url.clone()).json(&metadata))?;
        let created: DriveFile = Self::handle_status(response)?
            .json()
            .map_err(|err| ArchiverError::DriveHttp(err.to_string()))?;
        Ok(created.id)
    }

    fn upload(
        &self,
        parent_id: &str,
        content_type: &str,
        name: &str,
        size: u64,
        content: Box<dyn Read + Send>,
    ) -> Result<UploadedObject, ArchiverError> {
        let metadata = json!({ "name": name, "parents": [parent_id] });
        let url = Self::url(
            UPLOAD_URL,
            &[("uploadType", "resumable"), ("fields", "id,size")],
        )?;
        let response = self.send_with_retries(|| {
            self.client
                .post(url.clone())
                .header("X-Upload-Content-Type", content_type)
                .header("X-Upload-Content-Length", size.to_string())
                .json(&metadata)
        })?;
        let response = Self::handle_status(response)?;
        let session = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ArchiverError::DriveHttp("resumable upload session URL missing".to_string())
            })?
            .to_string();

        // The body is a one-shot stream, so this request is not retried.
        let response = self
            .client
            .put(&session)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, content_type)
            .timeout(UPLOAD_TIMEOUT)
            .body(Body::sized(content, size))
            .send()
            .map_err(|err| ArchiverError::DriveHttp(err.to_string()))?;
        let uploaded: DriveFile = Self::handle_status(response)?
            .json()
            .map_err(|err| ArchiverError::DriveHttp(err.to_string()))?;
        let stored = StoredObject::from(uploaded);
        Ok(UploadedObject {
            id: stored.id,
            size: stored.size.unwrap_or_default(),
        })
    }

    fn delete_by_id(&self, id: &str) -> Result<(), ArchiverError> {
        let url = format!("{FILES_URL}/{id}");
        let response = self.send_with_retries(|| self.client.delete(&url))?;
        Self::handle_status(response)?;
        Ok(())
    }
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Drive search query matching untrashed files or folders by exact name.
pub fn name_query(name: &str, parent_id: Option<&str>, folders: bool) -> String {
    let mime = if folders { "=" } else { "!=" };
    let mut query = format!(
        "name = '{}' and mimeType {mime} '{FOLDER_MIME_TYPE}' and trashed = false",
        escape_query_value(name)
    );
    if let Some(parent) = parent_id {
        query.push_str(&format!(" and '{}' in parents", escape_query_value(parent)));
    }
    query
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_for_files_in_parent() {
        assert_eq!(
            name_query("sample.raw", Some("abc"), false),
            "name = 'sample.raw' and mimeType != 'application/vnd.google-apps.folder' \
             and trashed = false and 'abc' in parents"
        );
    }

    #[test]
    fn query_escapes_quotes() {
        let query = name_query("it's", None, true);
        assert!(query.starts_with("name = 'it\\'s' and mimeType = "));
        assert!(!query.contains("in parents"));
    }

    #[test]
    fn sizes_arrive_as_strings() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"f1","name":"a.raw","size":"1024","parents":["p1"]}"#,
        )
        .unwrap();
        let stored = StoredObject::from(file);
        assert_eq!(stored.size, Some(1024));
        assert_eq!(stored.parent_id.as_deref(), Some("p1"));
    }

    #[test]
    fn folders_have_no_size() {
        let file: DriveFile =
            serde_json::from_str(r#"{"id":"d1","name":"RAW"}"#).unwrap();
        assert_eq!(StoredObject::from(file).size, None);
    }
}
