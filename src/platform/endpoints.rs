//! URL endpoints for one itslearning instance.
//!
//! The REST API lives on the customer's own instance host; the pages that
//! serve files of block elements and the download proxy are shared hosts.

use url::Url;

const PAGE_HOST: &str = "https://page.itslearning.com";
const DOWNLOAD_REDIRECT: &str = "https://resource.itslearning.com/Proxy/DownloadRedirect.ashx";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub instance: Url,
    pub token: Url,
    pub courses: Url,
    pub sso_url: Url,
    pub page_host: Url,
    pub download_redirect: Url,
}

impl Endpoints {
    /// Build the endpoint set for an instance base URL such as
    /// `https://school.itslearning.com`.
    pub fn for_instance(instance: &str) -> anyhow::Result<Self> {
        let trimmed = instance.trim().trim_end_matches('/');
        let base = Url::parse(&format!("{}/", trimmed))
            .map_err(|e| anyhow::anyhow!("Instance URL '{}' is not valid: {}", instance, e))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("Instance URL '{}' must use http or https", instance);
        }

        Ok(Self {
            token: base.join("restapi/oauth2/token")?,
            courses: base.join("restapi/personal/courses/v2")?,
            sso_url: base.join("restapi/personal/sso/url/v1")?,
            page_host: Url::parse(PAGE_HOST)?,
            download_redirect: Url::parse(DOWNLOAD_REDIRECT)?,
            instance: base,
        })
    }

    pub fn course_resources(&self, course_id: &str) -> Result<Url, url::ParseError> {
        self.instance.join(&format!(
            "restapi/personal/courses/{}/resources/v1",
            urlencoding::encode(course_id)
        ))
    }

    pub fn folder_resources(&self, course_id: &str, folder_id: &str) -> Result<Url, url::ParseError> {
        self.instance.join(&format!(
            "restapi/personal/courses/{}/folders/{}/resources/v1",
            urlencoding::encode(course_id),
            urlencoding::encode(folder_id)
        ))
    }

    /// The web page that renders a learning tool element; the SSO endpoint
    /// exchanges it for a session-bearing URL.
    pub fn element_page(&self, element_id: &str) -> Result<Url, url::ParseError> {
        let mut url = self
            .instance
            .join("LearningToolElement/ViewLearningToolElement.aspx")?;
        url.query_pairs_mut()
            .append_pair("LearningToolElementId", element_id);
        Ok(url)
    }
}
