//! WordPress publishing over XML-RPC.
//!
//! # Calls used
//!
//! | Method | Purpose |
//! |--------|---------|
//! | `wp.getPosts` | already-published check (exact title match) |
//! | `wp.uploadFile` | thumbnail upload, image downloaded by URL |
//! | `wp.newPost` | the post itself, published immediately |

use crate::config::PublishSettings;
use crate::post::PostDraft;
use crate::xmlrpc::{self, Value, XmlRpcError};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);
const BLOG_ID: i64 = 0;
const FALLBACK_IMAGE_NAME: &str = "image.jpg";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Rpc(#[from] XmlRpcError),
    #[error("unexpected {method} response: {detail}")]
    UnexpectedResponse { method: &'static str, detail: String },
    #[error("failed to download image {url}: {source}")]
    ImageDownload {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Blog-side operations the batch job needs.
pub trait PostPublisher {
    /// A published post with exactly this title exists.
    async fn already_published(&self, title: &str) -> Result<bool, PublishError>;
    /// Upload the image at `url`; returns the attachment id.
    async fn upload_image(&self, url: &str) -> Result<i64, PublishError>;
    /// Create and publish the post; returns the new post id.
    async fn create_post(&self, draft: &PostDraft) -> Result<String, PublishError>;
}

/// File name for an uploaded image: last path segment, query ignored.
pub fn image_file_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_IMAGE_NAME.to_string())
}

/// `content` struct for `wp.newPost`.
pub fn new_post_content(draft: &PostDraft) -> Value {
    let terms = Value::structure([
        ("category", Value::Array(vec![Value::from(draft.category.as_str())])),
        (
            "post_tag",
            Value::Array(draft.tags.iter().map(|t| Value::from(t.as_str())).collect()),
        ),
    ]);
    let mut members = vec![
        ("post_type", Value::from("post")),
        ("post_status", Value::from("publish")),
        ("post_title", Value::from(draft.title.as_str())),
        ("post_content", Value::from(draft.content.as_str())),
        ("terms_names", terms),
    ];
    if let Some(id) = draft.thumbnail_id {
        members.push(("post_thumbnail", Value::Int(id)));
    }
    Value::structure(members)
}

/// Titles in a `wp.getPosts` result.
fn post_titles(response: &Value) -> Result<Vec<&str>, PublishError> {
    let posts = response
        .as_array()
        .ok_or_else(|| PublishError::UnexpectedResponse {
            method: "wp.getPosts",
            detail: "expected an array".into(),
        })?;
    Ok(posts
        .iter()
        .filter_map(|p| p.get("post_title").and_then(Value::as_str))
        .collect())
}

/// XML-RPC client for one WordPress site.
#[derive(Debug, Clone)]
pub struct WordPressClient {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
}

impl WordPressClient {
    pub fn new(settings: &PublishSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    /// `blog_id, username, password, extra...`
    fn params(&self, extra: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut params = vec![
            Value::Int(BLOG_ID),
            Value::from(self.username.as_str()),
            Value::from(self.password.as_str()),
        ];
        params.extend(extra);
        params
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, PublishError> {
        let wrap = |source: reqwest::Error| PublishError::ImageDownload {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(wrap)?;
        Ok(response.bytes().await.map_err(wrap)?.to_vec())
    }
}

impl PostPublisher for WordPressClient {
    #[instrument(level = "info", skip_all, fields(%title))]
    async fn already_published(&self, title: &str) -> Result<bool, PublishError> {
        let filter = Value::structure([
            ("post_status", Value::from("publish")),
            ("s", Value::from(title)),
        ]);
        let fields = Value::Array(vec![Value::from("post_title")]);
        let response = xmlrpc::call(
            &self.client,
            &self.endpoint,
            "wp.getPosts",
            &self.params([filter, fields]),
        )
        .await?;
        let titles = post_titles(&response)?;
        debug!(matches = titles.len(), "Search returned posts");
        Ok(titles.contains(&title))
    }

    #[instrument(level = "info", skip_all, fields(%url))]
    async fn upload_image(&self, url: &str) -> Result<i64, PublishError> {
        let bits = self.download(url).await?;
        let bytes = bits.len();
        let data = Value::structure([
            ("name", Value::from(image_file_name(url))),
            ("type", Value::from("image/jpeg")),
            ("bits", Value::Base64(bits)),
        ]);
        let response = xmlrpc::call(
            &self.client,
            &self.endpoint,
            "wp.uploadFile",
            &self.params([data]),
        )
        .await?;
        let id = response
            .get("id")
            .or_else(|| response.get("attachment_id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| PublishError::UnexpectedResponse {
                method: "wp.uploadFile",
                detail: "missing attachment id".into(),
            })?;
        info!(id, bytes, "Uploaded thumbnail");
        Ok(id)
    }

    #[instrument(level = "info", skip_all, fields(title = %draft.title))]
    async fn create_post(&self, draft: &PostDraft) -> Result<String, PublishError> {
        let response = xmlrpc::call(
            &self.client,
            &self.endpoint,
            "wp.newPost",
            &self.params([new_post_content(draft)]),
        )
        .await?;
        let id = match &response {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            other => {
                return Err(PublishError::UnexpectedResponse {
                    method: "wp.newPost",
                    detail: format!("{other:?}"),
                });
            }
        };
        info!(post_id = %id, "Post created");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(thumbnail_id: Option<i64>) -> PostDraft {
        PostDraft {
            title: "Sample VR Title".into(),
            content: "<div>body</div>".into(),
            category: "VR".into(),
            tags: vec!["Label L".into(), "VR".into()],
            thumbnail_id,
        }
    }

    #[test]
    fn test_image_file_name() {
        assert_eq!(image_file_name("https://pics.dmm.co.jp/digital/video/abc/abcjp-1.jpg?x=1"), "abcjp-1.jpg");
        assert_eq!(image_file_name("https://pics.dmm.co.jp/"), FALLBACK_IMAGE_NAME);
        assert_eq!(image_file_name("nonsense"), FALLBACK_IMAGE_NAME);
    }

    #[test]
    fn test_new_post_content() {
        let content = new_post_content(&draft(Some(7)));
        assert_eq!(content.get("post_status").and_then(Value::as_str), Some("publish"));
        assert_eq!(content.get("post_thumbnail"), Some(&Value::Int(7)));
        let terms = content.get("terms_names").unwrap();
        assert_eq!(
            terms.get("category"),
            Some(&Value::Array(vec![Value::from("VR")]))
        );
        assert_eq!(terms.get("post_tag").and_then(Value::as_array).map(<[Value]>::len), Some(2));
    }

    #[test]
    fn test_new_post_without_thumbnail() {
        assert!(new_post_content(&draft(None)).get("post_thumbnail").is_none());
    }

    #[test]
    fn test_post_titles() {
        let response = Value::Array(vec![
            Value::structure([("post_title", Value::from("Sample VR Title 2"))]),
            Value::structure([("post_title", Value::from("Sample VR Title"))]),
        ]);
        let titles = post_titles(&response).unwrap();
        assert!(titles.contains(&"Sample VR Title"));
        assert!(post_titles(&Value::Nil).is_err());
    }

    #[test]
    fn test_params_prefix() {
        let client = WordPressClient::new(&PublishSettings {
            endpoint: "https://blog.example/xmlrpc.php".into(),
            username: "editor".into(),
            password: "secret".into(),
            category: "VR".into(),
        })
        .unwrap();
        let params = client.params([Value::Nil]);
        assert_eq!(params[0], Value::Int(0));
        assert_eq!(params[1], Value::from("editor"));
        assert_eq!(params.len(), 4);
    }
}
