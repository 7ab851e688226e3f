//! HTTP implementation of [`ResourceResolver`] against the itslearning REST
//! API plus the web pages that front file downloads.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, USER_AGENT};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::endpoints::Endpoints;
use super::error::ResolveError;
use super::html;
use super::types::{Course, DownloadableContent, RemoteFile, ResourceDescriptor, ResourceEntity};
use super::ResourceResolver;
use crate::auth::AccessToken;

/// The platform's mobile app identity; the REST API and SSO flow expect it.
pub(crate) const DEFAULT_USER_AGENT: &str =
    "com.itslearning.itslearningintapp 3.7.1 (HONOR BLN-L21 / Android 9)";

/// Listings are requested as a single oversized page.
const PAGE_SIZE: &str = "9999";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct EntityList<T> {
    #[serde(rename = "EntityArray", default = "Vec::new")]
    entities: Vec<T>,
}

#[derive(Deserialize)]
struct ResourcesResponse {
    #[serde(rename = "Resources")]
    resources: EntityList<ResourceEntity>,
}

#[derive(Deserialize)]
struct SsoUrlResponse {
    #[serde(rename = "Url")]
    url: String,
}

/// Build a client carrying the app's `User-Agent`. Element resolution needs
/// cookies to survive the SSO redirect chain, the REST API does not.
///
/// `read_timeout` bounds every wait for response bytes, so a server that
/// stalls mid-body fails the transfer instead of holding a worker forever.
/// There is no overall deadline; large files may take as long as they need.
pub(crate) fn build_http_client(cookies: bool, read_timeout: Duration) -> reqwest::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    Client::builder()
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(read_timeout)
        .cookie_store(cookies)
        .build()
}

pub struct ItslearningClient {
    client: Client,
    endpoints: Endpoints,
    token: AccessToken,
    timeout: Duration,
}

impl std::fmt::Debug for ItslearningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItslearningClient")
            .field("instance", &self.endpoints.instance.as_str())
            .field("token", &self.token)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ItslearningClient {
    pub fn new(
        endpoints: Endpoints,
        token: AccessToken,
        timeout: Duration,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            client: build_http_client(false, timeout)?,
            endpoints,
            token,
            timeout,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, ResolveError> {
        let response = self
            .client
            .get(url)
            .query(&[("access_token", self.token.secret())])
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = check_status(response)?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn list_entities(&self, url: Url) -> Result<Vec<ResourceDescriptor>, ResolveError> {
        let listing: ResourcesResponse = self
            .get_json(url, &[("pageIndex", "0"), ("pageSize", PAGE_SIZE)])
            .await?;
        Ok(listing
            .resources
            .entities
            .into_iter()
            .filter_map(ResourceEntity::into_descriptor)
            .collect())
    }

    /// Fetch a page through the cookie-carrying session and return its final
    /// URL (after redirects) with the body.
    async fn fetch_page(&self, session: &Client, url: Url) -> Result<(Url, String), ResolveError> {
        let response = session.get(url).timeout(self.timeout).send().await?;
        let response = check_status(response)?;
        let final_url = response.url().clone();
        let body = response.text().await?;
        Ok((final_url, body))
    }
}

#[async_trait::async_trait]
impl ResourceResolver for ItslearningClient {
    async fn list_courses(&self) -> Result<Vec<Course>, ResolveError> {
        let listing: EntityList<Course> = self
            .get_json(
                self.endpoints.courses.clone(),
                &[("pageIndex", "0"), ("pageSize", PAGE_SIZE), ("filter", "1")],
            )
            .await?;
        Ok(listing.entities)
    }

    async fn list_resources(&self, course_id: &str) -> Result<Vec<ResourceDescriptor>, ResolveError> {
        self.list_entities(self.endpoints.course_resources(course_id)?)
            .await
    }

    async fn list_folder(
        &self,
        course_id: &str,
        folder_id: &str,
    ) -> Result<Vec<ResourceDescriptor>, ResolveError> {
        self.list_entities(self.endpoints.folder_resources(course_id, folder_id)?)
            .await
    }

    async fn resolve(&self, element_id: &str) -> Result<DownloadableContent, ResolveError> {
        let element_page = self.endpoints.element_page(element_id)?;
        let sso: SsoUrlResponse = self
            .get_json(
                self.endpoints.sso_url.clone(),
                &[("url", element_page.as_str())],
            )
            .await?;

        // Each element gets its own cookie jar so concurrent SSO sessions
        // never see each other's cookies.
        let session = build_http_client(true, self.timeout)?;

        let (landing_url, landing) = self.fetch_page(&session, Url::parse(&sso.url)?).await?;
        tracing::debug!(element_id, "-> SSO");
        let iframe_src = html::iframe_src(&landing).ok_or_else(|| ResolveError::Scrape {
            what: "element iframe",
            url: redact(&landing_url),
        })?;

        let (viewer_url, viewer) = self
            .fetch_page(&session, landing_url.join(&iframe_src)?)
            .await?;
        tracing::debug!(element_id, "-> Iframe");

        let links = html::files_block_links(&viewer);
        if !links.is_empty() {
            tracing::debug!(element_id, count = links.len(), "-> Files block");
            let page_host = self.endpoints.page_host.clone();
            let files = stream::iter(links)
                .then(move |link| {
                    let session = session.clone();
                    let url = page_host.join(&link.href);
                    async move {
                        let url = url?;
                        let fallback = link_filename(&link.text, &url);
                        let response = session.get(url).send().await?;
                        let mut file = remote_file(response);
                        file.filename = file.filename.or(fallback);
                        Ok::<_, ResolveError>(file)
                    }
                })
                .boxed();
            return Ok(DownloadableContent::Block(files));
        }

        let query: HashMap<String, String> = viewer_url.query_pairs().into_owned().collect();
        let param = |name: &'static str| {
            query
                .get(name)
                .cloned()
                .ok_or_else(|| ResolveError::UnexpectedResponse {
                    url: redact(&viewer_url),
                    reason: format!("missing {} query parameter", name),
                })
        };
        let object_id = param("LearningObjectId")?;
        let instance_id = param("LearningObjectInstanceId")?;

        let response = session
            .get(self.endpoints.download_redirect.clone())
            .query(&[
                ("LearningObjectId", object_id.as_str()),
                ("LearningObjectInstanceId", instance_id.as_str()),
            ])
            .send()
            .await?;
        tracing::debug!(element_id, "-> Download redirect");
        Ok(DownloadableContent::Single(remote_file(response)))
    }
}

fn check_status(response: Response) -> Result<Response, ResolveError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ResolveError::HttpStatus {
            status: status.as_u16(),
            url: redact(response.url()),
        })
    }
}

/// Drop the query string so access tokens never reach logs.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

/// Wrap a file response without consuming its body; the coordinator decides
/// from the status whether the body is written.
fn remote_file(response: Response) -> RemoteFile {
    let status = response.status().as_u16();
    let filename = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .and_then(|value| content_disposition_filename(&value));
    let body = response.bytes_stream().map_err(ResolveError::from).boxed();
    RemoteFile {
        filename,
        status,
        body,
    }
}

/// Name for a block file whose response carries no `Content-Disposition`:
/// the link text, else the last segment of the link's path. Both are kept
/// percent-encoded like header values and decoded with them.
fn link_filename(text: &str, url: &Url) -> Option<String> {
    let text = text.trim();
    if !text.is_empty() {
        return Some(urlencoding::encode(text).into_owned());
    }
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Extract the filename from a `Content-Disposition` header value.
///
/// `filename*` (RFC 5987, `charset'lang'value`) wins over `filename`. The
/// value is returned still percent-encoded; decoding happens when the
/// destination path is built.
pub(crate) fn content_disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    for part in header.split(';') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
                extended = Some(encoded.trim_matches('"').to_string());
            }
            "filename" => {
                plain = Some(value.trim_matches(|c| c == '"' || c == '\'').to_string());
            }
            _ => {}
        }
    }
    extended.or(plain).filter(|name| !name.is_empty())
}
