//! Session cookie handling.
//!
//! Seeds the HTTP session from an exported Netscape cookie file and hands
//! the session's cookies over to the browser.

use crate::error::AuthError;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One cookie line from a Netscape cookie file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileCookie {
    domain: String,
    include_subdomains: bool,
    path: String,
    secure: bool,
    name: String,
    value: String,
    http_only: bool,
}

/// A name/value pair held by the HTTP session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

/// Finds the newest `*.txt` cookie file under `dir` whose name contains
/// every token (case-insensitive).
pub fn find_cookie_file(dir: &Path, name_tokens: &[&str]) -> Option<PathBuf> {
    let mut best: Option<(PathBuf, SystemTime)> = None;
    if dir.is_dir() {
        scan_dir(dir, name_tokens, &mut best);
    }
    best.map(|(path, _)| path)
}

fn scan_dir(dir: &Path, name_tokens: &[&str], best: &mut Option<(PathBuf, SystemTime)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_dir(&path, name_tokens, best);
            continue;
        }

        let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };
        let file_name = file_name.to_ascii_lowercase();

        if !file_name.ends_with(".txt")
            || !name_tokens
                .iter()
                .all(|token| file_name.contains(&token.to_ascii_lowercase()))
        {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        if best.as_ref().is_none_or(|(_, time)| modified > *time) {
            *best = Some((path, modified));
        }
    }
}

/// Loads every cookie in a Netscape cookie file into `jar`.
///
/// Returns the number of cookies added.
pub fn load_cookie_file(jar: &Jar, path: &Path) -> Result<usize, AuthError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AuthError::CookieFile(format!("{}: {}", path.display(), e)))?;
    let cookies = parse_cookie_file(&content)?;

    for cookie in &cookies {
        let host = cookie.domain.trim_start_matches('.');
        let url = Url::parse(&format!("https://{}/", host))
            .map_err(|_| AuthError::CookieFile(format!("invalid domain {}", cookie.domain)))?;

        let mut header = format!("{}={}; Path={}", cookie.name, cookie.value, cookie.path);
        if cookie.include_subdomains {
            header.push_str(&format!("; Domain={}", cookie.domain));
        }
        if cookie.secure {
            header.push_str("; Secure");
        }
        if cookie.http_only {
            header.push_str("; HttpOnly");
        }

        jar.add_cookie_str(&header, &url);
    }

    Ok(cookies.len())
}

fn parse_cookie_file(content: &str) -> Result<Vec<FileCookie>, AuthError> {
    let mut cookies = Vec::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let (http_only, line) = match line.strip_prefix("#HttpOnly_") {
            Some(stripped) => (true, stripped),
            None if line.starts_with('#') => continue,
            None => (false, line),
        };

        let fields: Vec<&str> = line.splitn(7, '\t').collect();
        let [domain, subdomains, path, secure, _expires, name, value] = fields[..] else {
            return Err(AuthError::CookieFile(format!(
                "invalid Netscape cookie line: {}",
                line
            )));
        };

        if domain.trim_start_matches('.').is_empty() {
            return Err(AuthError::CookieFile(format!("invalid domain {}", domain)));
        }

        cookies.push(FileCookie {
            domain: domain.to_string(),
            include_subdomains: subdomains.eq_ignore_ascii_case("true"),
            path: path.to_string(),
            secure: secure.eq_ignore_ascii_case("true"),
            name: name.to_string(),
            value: value.to_string(),
            http_only,
        });
    }

    Ok(cookies)
}

/// Returns the cookies the session would send to `url`.
pub fn session_cookies(jar: &Jar, url: &Url) -> Vec<SessionCookie> {
    let Some(header) = jar.cookies(url) else {
        return Vec::new();
    };
    let Ok(header) = header.to_str() else {
        return Vec::new();
    };

    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (!name.is_empty()).then(|| SessionCookie {
                name: name.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "
# Netscape HTTP Cookie File
.pixiv.net\tTRUE\t/\tTRUE\t2145916800\tPHPSESSID\tabc123
#HttpOnly_.pixiv.net\tFALSE\t/\tFALSE\t0\tp_ab_id\tidvalue
";

    #[test]
    fn test_parse_cookie_file() {
        let cookies = parse_cookie_file(SAMPLE).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "PHPSESSID");
        assert_eq!(cookies[0].value, "abc123");
        assert!(cookies[0].include_subdomains);
        assert!(cookies[0].secure);
        assert!(!cookies[0].http_only);

        assert_eq!(cookies[1].name, "p_ab_id");
        assert!(!cookies[1].include_subdomains);
        assert!(cookies[1].http_only);
    }

    #[test]
    fn test_parse_invalid_line() {
        let err = parse_cookie_file("invalid-line").unwrap_err();
        assert!(err.to_string().contains("invalid Netscape cookie line"));
    }

    #[test]
    fn test_find_cookie_file_picks_latest() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("pixiv-cookies.txt");
        let second = dir.path().join("pixiv-cookies-latest.txt");
        std::fs::write(dir.path().join("other.txt"), "x").unwrap();

        std::fs::write(&first, "x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&second, "x").unwrap();

        assert_eq!(find_cookie_file(dir.path(), &["pixiv"]), Some(second));
        assert_eq!(find_cookie_file(dir.path(), &["fanbox"]), None);
    }

    #[test]
    fn test_find_cookie_file_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_cookie_file(&dir.path().join("absent"), &["pixiv"]), None);
    }

    #[test]
    fn test_loaded_cookies_are_exported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pixiv.txt");
        std::fs::write(&path, SAMPLE).unwrap();

        let jar = Jar::default();
        assert_eq!(load_cookie_file(&jar, &path).unwrap(), 2);

        let url = Url::parse("https://www.pixiv.net/").unwrap();
        let exported = session_cookies(&jar, &url);
        assert!(exported.contains(&SessionCookie {
            name: "PHPSESSID".into(),
            value: "abc123".into(),
        }));
    }
}
