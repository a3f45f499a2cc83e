//! Account login and the authenticated HTTP session.

use crate::config::PixivConfig;
use crate::cookies::{SessionCookie, load_cookie_file, session_cookies};
use crate::error::AuthError;
use crate::resolver::create_http_client;
use regex::Regex;
use reqwest::Url;
use reqwest::cookie::Jar;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

/// Hidden form field carrying the one-time login token.
static POST_KEY_INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="post_key"]"#).unwrap());

/// Token embedded in the login page's inline state, used when the form
/// field is absent.
static POST_KEY_INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""post_?[kK]ey"\s*:\s*"([^"]+)""#).unwrap());

/// Login API response.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: String,
    body: Option<JsonValue>,
}

/// An HTTP session holding the account's cookies.
pub struct Session {
    client: reqwest::Client,
    jar: Arc<Jar>,
}

impl Session {
    fn new() -> Result<Self, AuthError> {
        let jar = Arc::new(Jar::default());
        let client = create_http_client(jar.clone())?;
        Ok(Self { client, jar })
    }

    /// Returns the cookies this session sends to `url`.
    pub fn cookies_for(&self, url: &str) -> Vec<SessionCookie> {
        match Url::parse(url) {
            Ok(url) => session_cookies(&self.jar, &url),
            Err(_) => Vec::new(),
        }
    }
}

/// Establishes an authenticated session.
///
/// With a cookie file the session is seeded from it; otherwise the login
/// handshake runs: fetch the token from the login page, then submit it
/// with the credentials.
pub async fn authenticate(
    pixiv: &PixivConfig,
    cookie_file: Option<&Path>,
) -> Result<Session, AuthError> {
    let session = Session::new()?;

    if let Some(path) = cookie_file {
        let count = load_cookie_file(&session.jar, path)?;
        info!(path = %path.display(), count, "Loaded session cookies from file");
        return Ok(session);
    }

    info!("Attempting to login into pixiv");

    let post_key = fetch_post_key(&session.client, &pixiv.login_page_url).await?;
    debug!("Found login token");

    let form = [
        ("captcha", ""),
        ("g_recaptcha_response", ""),
        ("password", pixiv.password.as_str()),
        ("pixiv_id", pixiv.username.as_str()),
        ("post_key", post_key.as_str()),
        ("ref", "wwwtop_accounts_index"),
        ("return_to", "https://www.pixiv.net/"),
        ("source", "pc"),
    ];

    let response = session
        .client
        .post(&pixiv.login_api_url)
        .form(&form)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    check_login_response(status, &body)?;

    info!("Logged into pixiv");
    Ok(session)
}

async fn fetch_post_key(client: &reqwest::Client, login_page_url: &str) -> Result<String, AuthError> {
    let page = client.get(login_page_url).send().await?.text().await?;
    extract_post_key(&page).ok_or(AuthError::TokenNotFound)
}

/// Locates the login token in the login page.
fn extract_post_key(page: &str) -> Option<String> {
    let doc = Html::parse_document(page);
    let from_form = doc
        .select(&POST_KEY_INPUT)
        .next()
        .and_then(|input| input.value().attr("value"))
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    from_form.or_else(|| {
        POST_KEY_INLINE
            .captures(page)
            .map(|caps| caps[1].to_string())
    })
}

/// Judges the login API response.
fn check_login_response(status: reqwest::StatusCode, body: &str) -> Result<(), AuthError> {
    if !status.is_success() {
        return Err(AuthError::Rejected(format!("HTTP {}", status)));
    }

    let Ok(response) = serde_json::from_str::<LoginResponse>(body) else {
        return Ok(());
    };

    if response.error {
        return Err(AuthError::Rejected(response.message));
    }

    if let Some(errors) = response
        .body
        .as_ref()
        .and_then(|b| b.get("validation_errors"))
    {
        return Err(AuthError::Rejected(errors.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_post_key_from_form() {
        let page = r#"<form><input type="hidden" name="post_key" value="abc123"></form>"#;
        assert_eq!(extract_post_key(page), Some("abc123".to_string()));
    }

    #[test]
    fn test_post_key_from_inline_state() {
        let page = r#"<script>var init = {"pixivAccount.postKey":"x","postKey":"def456"};</script>"#;
        assert_eq!(extract_post_key(page), Some("def456".to_string()));
    }

    #[test]
    fn test_post_key_missing() {
        assert_eq!(extract_post_key("<html><body>maintenance</body></html>"), None);
    }

    #[test]
    fn test_login_response_judgement() {
        assert!(check_login_response(StatusCode::OK, r#"{"error":false,"message":"","body":{"success":{}}}"#).is_ok());
        assert!(check_login_response(StatusCode::OK, "not json").is_ok());

        let err = check_login_response(StatusCode::OK, r#"{"error":true,"message":"bad"}"#).unwrap_err();
        assert!(matches!(err, AuthError::Rejected(m) if m == "bad"));

        let err = check_login_response(
            StatusCode::OK,
            r#"{"error":false,"message":"","body":{"validation_errors":{"pixiv_id":"wrong"}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("pixiv_id"));

        assert!(check_login_response(StatusCode::FORBIDDEN, "").is_err());
    }

    fn config_for(server: &MockServer) -> PixivConfig {
        PixivConfig {
            username: "user".to_string(),
            password: "secret".to_string(),
            base_url: server.uri(),
            login_page_url: format!("{}/login", server.uri()),
            login_api_url: format!("{}/api/login", server.uri()),
            ranking_url: format!("{}/ranking.php", server.uri()),
        }
    }

    #[tokio::test]
    async fn test_login_handshake_keeps_session_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<input name="post_key" value="token42">"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_string_contains("post_key=token42"))
            .and(body_string_contains("pixiv_id=user"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "PHPSESSID=sess; Path=/")
                    .set_body_string(r#"{"error":false,"message":"","body":{"success":{}}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server);
        let session = authenticate(&config, None).await.unwrap();

        let cookies = session.cookies_for(&server.uri());
        assert_eq!(
            cookies,
            vec![SessionCookie {
                name: "PHPSESSID".into(),
                value: "sess".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_login_without_token_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let err = authenticate(&config_for(&server), None).await.err().unwrap();
        assert!(matches!(err, AuthError::TokenNotFound));
    }
}
