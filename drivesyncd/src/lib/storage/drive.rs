use std::sync::Arc;

use async_stream::try_stream;
use camino::Utf8Path;
use drivesync::{FileId, RemoteEntry, FOLDER_MIMETYPE};
use futures::prelude::*;
use tokio::io;

use super::{CreateFile, DirEntries, Download, FindFolder, MkDir, Storage, WriteFile};
use crate::{oauth2::GetToken, PersistCache};

const GOOGLEAPIS_URL: &str = "https://www.googleapis.com";

/// Google Drive v3 client
#[derive(Clone)]
pub struct GoogleDrive<A> {
    client: reqwest::Client,
    auth: Arc<A>,
    base_url: String,
    upload_base_url: String,
    user_agent: String,
}

impl<A> GoogleDrive<A>
where
    A: GetToken,
{
    /// Connects to Google Drive and logs the account in use.
    pub async fn new(auth: A, client: reqwest::Client) -> anyhow::Result<Self> {
        let drive = Self::with_base_url(auth, client, GOOGLEAPIS_URL);

        let about = drive.about_get().await?;
        log::info!(
            "Access granted to Drive of {}{}",
            about.user.display_name,
            about
                .user
                .email_address
                .as_ref()
                .map(|em| format!(" <{em}>"))
                .unwrap_or_default(),
        );
        let quota = &about.storage_quota;
        if let (Some(usage), Some(limit)) = (quota.usage, quota.limit) {
            use byte_unit::{Byte, UnitType};
            if let (Some(usage), Some(limit)) = (Byte::from_i64(usage), Byte::from_i64(limit)) {
                let usage = usage.get_appropriate_unit(UnitType::Binary);
                let limit = limit.get_appropriate_unit(UnitType::Binary);
                log::info!("Usage {usage:#.2} / {limit:#.3}");
            }
        }

        Ok(drive)
    }

    /// Builds a client for the API served under `base_url`, without any request.
    pub fn with_base_url(auth: A, client: reqwest::Client, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            client,
            auth: Arc::new(auth),
            base_url: format!("{base_url}/drive/v3"),
            upload_base_url: format!("{base_url}/upload/drive/v3"),
            user_agent: format!("drivesyncd/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl<A> DirEntries for GoogleDrive<A>
where
    A: GetToken,
{
    fn dir_entries(
        &self,
        folder_id: &FileId,
    ) -> impl Stream<Item = drivesync::Result<RemoteEntry>> + Send {
        log::trace!("listing entries of folder {folder_id}");
        let q = format!("'{}' in parents and trashed = false", escape(folder_id));
        let mut next_page_token = None;

        try_stream! {
            loop {
                let file_list = self.files_list(q.clone(), next_page_token).await?;
                next_page_token = file_list.next_page_token;
                for f in file_list.files.unwrap_or_default() {
                    yield map_file(f)?;
                }
                if next_page_token.is_none() {
                    break;
                }
            }
        }
    }
}

impl<A> FindFolder for GoogleDrive<A>
where
    A: GetToken,
{
    async fn find_folder(
        &self,
        name: &str,
        parent_id: Option<&FileId>,
    ) -> drivesync::Result<Option<FileId>> {
        let mut q = format!(
            "mimeType = '{FOLDER_MIMETYPE}' and trashed = false and name = '{}'",
            escape(name)
        );
        if let Some(parent_id) = parent_id {
            q.push_str(&format!(" and '{}' in parents", escape(parent_id)));
        }
        let file_list = self.files_list(q, None).await?;
        Ok(file_list
            .files
            .unwrap_or_default()
            .into_iter()
            .find_map(|f| f.id))
    }
}

impl<A> MkDir for GoogleDrive<A>
where
    A: GetToken,
{
    async fn mkdir(&self, parent_id: &FileId, name: &str) -> drivesync::Result<FileId> {
        log::debug!("creating folder {name} in folder {parent_id}");
        let f = api::File {
            name: Some(name.to_string()),
            mime_type: Some(FOLDER_MIMETYPE.to_string()),
            parents: Some(vec![parent_id.clone()]),
            ..Default::default()
        };
        let res = self.files_create(&f).await?;
        res.id
            .ok_or_else(|| drivesync::api_error!("No ID returned for new folder {name}"))
    }
}

impl<A> CreateFile for GoogleDrive<A>
where
    A: GetToken,
{
    async fn create_file(
        &self,
        parent_id: &FileId,
        name: &str,
        data: impl io::AsyncRead + Send + Sync + 'static,
        len: u64,
    ) -> drivesync::Result<FileId> {
        log::debug!("creating file {name} ({len} bytes) in folder {parent_id}");
        let f = api::File {
            name: Some(name.to_string()),
            parents: Some(vec![parent_id.clone()]),
            ..Default::default()
        };
        let res = self.files_create_multipart(&f, data, len).await?;
        res.id
            .ok_or_else(|| drivesync::api_error!("No ID returned for new file {name}"))
    }
}

impl<A> WriteFile for GoogleDrive<A>
where
    A: GetToken,
{
    async fn write_file(
        &self,
        id: &FileId,
        data: impl io::AsyncRead + Send + Sync + 'static,
        len: u64,
    ) -> drivesync::Result<()> {
        log::debug!("updating file {id} ({len} bytes)");
        self.files_update_media(id, data, len).await?;
        Ok(())
    }
}

impl<A> Download for GoogleDrive<A>
where
    A: GetToken,
{
    async fn download(&self, id: &FileId, dest: &Utf8Path) -> drivesync::Result<()> {
        use tokio_util::io::StreamReader;

        log::debug!("downloading file {id} to {dest}");
        let res = match self.files_get_media(id, true).await {
            Err(err) if is_abuse_acknowledgment_error(&err) => {
                log::debug!("{id} can't be acknowledged as abusive, retrying without");
                self.files_get_media(id, false).await?
            }
            res => res?,
        };
        let bytes = res
            .bytes_stream()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));
        super::fs::write_file(dest, StreamReader::new(bytes)).await?;
        Ok(())
    }
}

impl<A> PersistCache for GoogleDrive<A>
where
    A: PersistCache + Send + Sync,
{
    async fn persist_cache(&self) -> anyhow::Result<()> {
        self.auth.persist_cache().await
    }
}

impl<A> Storage for GoogleDrive<A> where A: GetToken {}

fn is_abuse_acknowledgment_error(err: &drivesync::Error) -> bool {
    matches!(err, drivesync::Error::Api(msg) if msg.contains("invalidAbuseAcknowledgment"))
}

/// Escapes a value for a single quoted string of a `q` search.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn map_file(f: api::File) -> drivesync::Result<RemoteEntry> {
    let name = f
        .name
        .ok_or_else(|| drivesync::api_error!("Expected to receive name from Google"))?;
    let id = f
        .id
        .ok_or_else(|| drivesync::api_error!("Expected to receive id from Google for {name}"))?;
    let mtime = f.modified_time.as_deref().and_then(|mt| {
        let parsed = drivesync::parse_mtime(mt);
        if parsed.is_none() {
            log::warn!("Could not parse modification time of {name}: {mt}");
        }
        parsed
    });
    Ok(RemoteEntry {
        id,
        name,
        mime_type: f.mime_type.unwrap_or_default(),
        mtime,
        md5: f.md5_checksum,
        can_download: f
            .capabilities
            .and_then(|caps| caps.can_download)
            .unwrap_or(false),
    })
}

mod api {
    use bytes::Bytes;
    use drivesync::{error, FileId};
    use futures::{
        future,
        stream::{self, StreamExt},
    };
    use http::StatusCode;
    use rand::{distributions::Alphanumeric, Rng};
    use reqwest::{header, Method, Response};
    use serde::{Deserialize, Serialize};
    use tokio::io;
    use tokio_util::io::ReaderStream;

    use super::utils::num_from_str;
    use crate::oauth2::GetToken;

    #[derive(Default, Clone, Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct User {
        pub display_name: String,
        pub email_address: Option<String>,
    }

    #[derive(Default, Clone, Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Quota {
        #[serde(default, deserialize_with = "num_from_str")]
        pub limit: Option<i64>,
        #[serde(default, deserialize_with = "num_from_str")]
        pub usage: Option<i64>,
    }

    const ABOUT_FIELDS: &str = "kind,storageQuota,user";

    #[derive(Default, Clone, Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct About {
        kind: String,
        pub storage_quota: Quota,
        pub user: User,
    }

    const FILE_FIELDS: &str = "id,name,mimeType,modifiedTime,capabilities/canDownload,md5Checksum";

    #[derive(Default, Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Capabilities {
        pub can_download: Option<bool>,
    }

    #[derive(Default, Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct File {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub id: Option<FileId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub mime_type: Option<String>,
        /// Kept verbatim, parsed by the caller
        #[serde(skip_serializing_if = "Option::is_none")]
        pub modified_time: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub md5_checksum: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub capabilities: Option<Capabilities>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub parents: Option<Vec<FileId>>,
    }

    #[derive(Default, Clone, Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct FileList {
        pub files: Option<Vec<File>>,
        pub next_page_token: Option<String>,
    }

    const PAGE_SIZE: &str = "100";

    #[derive(Debug, Copy, Clone)]
    pub enum UploadType {
        Multipart,
        Media,
    }

    impl UploadType {
        pub fn as_str(&self) -> &'static str {
            match self {
                UploadType::Multipart => "multipart",
                UploadType::Media => "media",
            }
        }
    }

    impl<A> super::GoogleDrive<A>
    where
        A: GetToken,
    {
        pub async fn about_get(&self) -> drivesync::Result<About> {
            let path = "/about";
            let query_params = [("fields", ABOUT_FIELDS)];

            let res = self.send_query(Method::GET, path, &query_params).await?;
            let about: About = res.json().await.map_err(error::api)?;
            if about.kind != "drive#about" {
                drivesync::api_bail!("/about returned wrong kind: {}", about.kind);
            }
            Ok(about)
        }

        pub async fn files_list(
            &self,
            q: String,
            page_token: Option<String>,
        ) -> drivesync::Result<FileList> {
            let path = "/files";

            let mut query_params = vec![
                ("q", q),
                ("fields", format!("nextPageToken,files({FILE_FIELDS})")),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            if let Some(page_token) = page_token {
                query_params.push(("pageToken", page_token));
            }

            let res = self.send_query(Method::GET, path, &query_params).await?;
            let file_list: FileList = res.json().await.map_err(error::api)?;
            Ok(file_list)
        }

        /// Requests the content of `file_id`.
        /// The body of a successful response is not consumed.
        pub async fn files_get_media(
            &self,
            file_id: &FileId,
            acknowledge_abuse: bool,
        ) -> drivesync::Result<Response> {
            let path = format!("/files/{file_id}");
            let ack = if acknowledge_abuse { "true" } else { "false" };
            let query_params = [("alt", "media"), ("acknowledgeAbuse", ack)];
            self.send_query(Method::GET, &path, &query_params).await
        }

        pub async fn files_create(&self, file: &File) -> drivesync::Result<File> {
            let path = "/files";
            let url = self.url(&self.base_url, path, [("fields", FILE_FIELDS)])?;
            let req = self
                .request(Method::POST, url)
                .await?
                .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
                .json(file);
            let res = self.send(Method::POST, path, req).await?;
            res.json().await.map_err(error::api)
        }

        /// Creates `file` with content in a single `multipart/related` request.
        pub async fn files_create_multipart<D>(
            &self,
            file: &File,
            data: D,
            data_len: u64,
        ) -> drivesync::Result<File>
        where
            D: io::AsyncRead + Send + Sync + 'static,
        {
            let path = "/files";
            let boundary: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(32)
                .map(char::from)
                .collect();
            let metadata = serde_json::to_string(file).map_err(error::api)?;

            let head = format!(
                "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n"
            );
            let tail = format!("\r\n--{boundary}--\r\n");
            let content_len = head.len() as u64 + data_len + tail.len() as u64;

            let body = stream::once(future::ready(Ok::<_, std::io::Error>(Bytes::from(head))))
                .chain(ReaderStream::new(data))
                .chain(stream::once(future::ready(Ok(Bytes::from(tail)))));

            let query_params = [
                ("uploadType", UploadType::Multipart.as_str()),
                ("fields", FILE_FIELDS),
            ];
            let url = self.url(&self.upload_base_url, path, query_params)?;
            let req = self
                .request(Method::POST, url)
                .await?
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/related; boundary={boundary}"),
                )
                .header(header::CONTENT_LENGTH, content_len)
                .body(reqwest::Body::wrap_stream(body));
            let res = self.send(Method::POST, path, req).await?;
            res.json().await.map_err(error::api)
        }

        /// Replaces the content of `file_id`, keeping its metadata.
        pub async fn files_update_media<D>(
            &self,
            file_id: &FileId,
            data: D,
            data_len: u64,
        ) -> drivesync::Result<File>
        where
            D: io::AsyncRead + Send + Sync + 'static,
        {
            let path = format!("/files/{file_id}");
            let query_params = [
                ("uploadType", UploadType::Media.as_str()),
                ("fields", FILE_FIELDS),
            ];
            let url = self.url(&self.upload_base_url, &path, query_params)?;
            let req = self
                .request(Method::PATCH, url)
                .await?
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header(header::CONTENT_LENGTH, data_len)
                .body(reqwest::Body::wrap_stream(ReaderStream::new(data)));
            let res = self.send(Method::PATCH, &path, req).await?;
            if res.status() == StatusCode::NO_CONTENT {
                return Ok(File::default());
            }
            res.json().await.map_err(error::api)
        }
    }
}

mod utils {
    use std::borrow::Borrow;

    use drivesync::error;
    use oauth2::{AccessToken, Scope};
    use reqwest::{header, Method, RequestBuilder, Response, Url};
    use serde::{Deserialize, Deserializer};

    use crate::oauth2::GetToken;

    const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

    pub fn num_from_str<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| s.parse().map_err(serde::de::Error::custom))
            .transpose()
    }

    /// Turns an unsuccessful response into an `Api` error carrying the response body.
    pub async fn check_response(
        method: &Method,
        path: &str,
        res: Response,
    ) -> drivesync::Result<Response> {
        if !res.status().is_success() {
            drivesync::api_bail!(
                "{method} {path} returned {}\n{}",
                res.status(),
                res.text().await.map_err(error::api)?
            );
        }
        Ok(res)
    }

    impl<A> super::GoogleDrive<A>
    where
        A: GetToken,
    {
        pub async fn fetch_token(&self) -> drivesync::Result<AccessToken> {
            self.auth
                .get_token(vec![Scope::new(DRIVE_SCOPE.to_string())])
                .await
        }

        pub fn url<Q, K, V>(
            &self,
            base_url: &str,
            path: &str,
            query_params: Q,
        ) -> drivesync::Result<Url>
        where
            Q: IntoIterator,
            Q::Item: Borrow<(K, V)>,
            K: AsRef<str>,
            V: AsRef<str>,
        {
            Url::parse_with_params(&format!("{base_url}{path}"), query_params).map_err(error::api)
        }

        /// Starts an authenticated request.
        pub async fn request(&self, method: Method, url: Url) -> drivesync::Result<RequestBuilder> {
            let token = self.fetch_token().await?;
            Ok(self
                .client
                .request(method, url)
                .bearer_auth(token.secret())
                .header(header::USER_AGENT, &self.user_agent))
        }

        pub async fn send(
            &self,
            method: Method,
            path: &str,
            req: RequestBuilder,
        ) -> drivesync::Result<Response> {
            log::trace!("{method} {path}");
            let res = req.send().await.map_err(error::api)?;
            check_response(&method, path, res).await
        }

        /// Sends a request without body to the metadata API.
        pub async fn send_query<Q, K, V>(
            &self,
            method: Method,
            path: &str,
            query_params: Q,
        ) -> drivesync::Result<Response>
        where
            Q: IntoIterator,
            Q::Item: Borrow<(K, V)>,
            K: AsRef<str>,
            V: AsRef<str>,
        {
            let url = self.url(&self.base_url, path, query_params)?;
            let req = self.request(method.clone(), url).await?;
            self.send(method, path, req).await
        }
    }

}
