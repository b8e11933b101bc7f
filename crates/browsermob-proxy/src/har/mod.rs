//! HTTP Archive (HAR) documents returned by the engine.
//!
//! The engine hands back HAR 1.2 JSON. [`decode_body`] turns a response body
//! into an optional [`Archive`]: an empty body means "no session".

mod model;

pub use model::{
    Archive, Content, Cookie, Creator, Entry, Log, NameValue, Page, PageTimings, PostData,
    Request, Response, Timings,
};

use std::path::Path;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset};

use crate::error::{Error, Result};

/// Decode an engine response body. Empty (or whitespace-only) bodies are `None`.
pub fn decode_body(body: &[u8]) -> Result<Option<Archive>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Archive::from_slice(body).map(Some)
}

impl Archive {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::protocol(format!("invalid HAR: {e}")))
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::Encode)
    }

    pub fn to_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::Encode)
    }

    /// Write the archive as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_string_pretty()?)?;
        Ok(())
    }

    pub fn pages(&self) -> &[Page] {
        &self.log.pages
    }

    pub fn entries(&self) -> &[Entry] {
        &self.log.entries
    }

    pub fn page(&self, id: &str) -> Option<&Page> {
        self.log.pages.iter().find(|p| p.id == id)
    }

    /// Entries recorded under page `id`, in capture order
    pub fn entries_for_page<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.log
            .entries
            .iter()
            .filter(move |e| e.pageref.as_deref() == Some(id))
    }
}

impl FromStr for Archive {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Archive::from_slice(s.as_bytes())
    }
}

impl Page {
    pub fn started_at(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(&self.started_date_time)
    }
}

impl Entry {
    pub fn started_at(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(&self.started_date_time)
    }
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Request body text, if any was captured
    pub fn body(&self) -> Option<&str> {
        self.post_data.as_ref().and_then(|p| p.text.as_deref())
    }
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

impl Content {
    pub fn is_base64(&self) -> bool {
        self.encoding
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case("base64"))
    }

    /// Captured body bytes, decoding `base64` content. `None` if no text was captured.
    pub fn decoded(&self) -> Result<Option<Vec<u8>>> {
        let Some(text) = self.text.as_deref() else {
            return Ok(None);
        };
        if self.is_base64() {
            BASE64
                .decode(text.trim())
                .map(Some)
                .map_err(|e| Error::protocol(format!("invalid base64 content: {e}")))
        } else {
            Ok(Some(text.as_bytes().to_vec()))
        }
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

fn find_header<'a>(headers: &'a [NameValue], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../fixtures/example.har");

    #[test]
    fn test_decode_fixture() {
        let archive: Archive = FIXTURE.parse().unwrap();
        assert_eq!(archive.log.version, "1.2");
        assert_eq!(archive.log.creator.name, "BrowserMob Proxy");
        assert_eq!(archive.pages().len(), 2);
        assert_eq!(archive.entries().len(), 3);

        let page = archive.page("search").unwrap();
        assert_eq!(page.title, "search");
        assert!(page.started_at().is_some());
        assert_eq!(archive.entries_for_page("search").count(), 2);
        assert_eq!(archive.entries_for_page("results").count(), 1);
    }

    #[test]
    fn test_entry_navigation() {
        let archive: Archive = FIXTURE.parse().unwrap();
        let entry = &archive.entries()[0];
        assert_eq!(entry.request.method, "GET");
        assert_eq!(entry.request.url, "http://www.example.com/");
        assert_eq!(entry.request.header("user-agent"), Some("rust-test"));
        assert_eq!(entry.response.status, 200);
        assert_eq!(entry.response.content.size, 12);
        assert_eq!(
            entry.response.content.decoded().unwrap().as_deref(),
            Some(b"hello world!".as_slice())
        );
        assert_eq!(entry.timings.wait, 40.0);
        assert_eq!(entry.server_ip_address.as_deref(), Some("93.184.216.34"));
    }

    #[test]
    fn test_base64_content() {
        let archive: Archive = FIXTURE.parse().unwrap();
        let content = &archive.entries()[1].response.content;
        assert!(content.is_base64());
        assert_eq!(
            content.decoded().unwrap().unwrap(),
            vec![0x89, b'P', b'N', b'G']
        );
    }

    #[test]
    fn test_post_body() {
        let archive: Archive = FIXTURE.parse().unwrap();
        let request = &archive.entries()[2].request;
        assert_eq!(request.method, "POST");
        assert_eq!(request.body(), Some("q=rust"));
    }

    #[test]
    fn test_reencode_is_lossless() {
        let archive: Archive = FIXTURE.parse().unwrap();
        let bytes = archive.to_vec().unwrap();
        let again = Archive::from_slice(&bytes).unwrap();
        assert_eq!(archive, again);
        // fields the model does not know about survive
        assert_eq!(
            again.log.entries[0].extra.get("_securityState"),
            Some(&serde_json::json!("insecure"))
        );
    }

    #[test]
    fn test_decode_body() {
        assert!(decode_body(b"").unwrap().is_none());
        assert!(decode_body(b"  \n").unwrap().is_none());
        assert!(decode_body(FIXTURE.as_bytes()).unwrap().is_some());
        assert!(matches!(
            decode_body(b"<html>oops</html>"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_save() {
        let archive: Archive = FIXTURE.parse().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.har");
        archive.save(&path).unwrap();

        let reread: Archive = std::fs::read_to_string(&path).unwrap().parse().unwrap();
        assert_eq!(reread, archive);
    }
}
