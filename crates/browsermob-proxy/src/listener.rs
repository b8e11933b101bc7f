//! Browser-event adapter that turns navigation into capture sessions.
//!
//! Each `navigate_to` opens a new session named `navigate-to-{url}`;
//! back/forward/click start new pages within it. Archives of finished sessions
//! are buffered in [`NavigationListener::hars`].

use async_trait::async_trait;
use tracing::debug;

use crate::client::{CaptureOptions, Client};
use crate::error::Result;
use crate::har::Archive;

/// The capture operations the listener drives
#[async_trait]
pub trait CaptureControl: Send + Sync {
    async fn new_har(&self, page_ref: Option<&str>, options: CaptureOptions)
        -> Result<Option<Archive>>;
    async fn new_page(&self, page_ref: &str) -> Result<()>;
    async fn har(&self) -> Result<Option<Archive>>;
}

#[async_trait]
impl CaptureControl for Client {
    async fn new_har(
        &self,
        page_ref: Option<&str>,
        options: CaptureOptions,
    ) -> Result<Option<Archive>> {
        Client::new_har(self, page_ref, options).await
    }

    async fn new_page(&self, page_ref: &str) -> Result<()> {
        Client::new_page(self, page_ref).await
    }

    async fn har(&self) -> Result<Option<Archive>> {
        Client::har(self).await
    }
}

pub struct NavigationListener<C> {
    control: C,
    options: CaptureOptions,
    hars: Vec<Archive>,
    session_open: bool,
}

impl<C: CaptureControl> NavigationListener<C> {
    pub fn new(control: C) -> Self {
        Self::with_options(control, CaptureOptions::default())
    }

    /// Forward `options` to every session this listener opens
    pub fn with_options(control: C, options: CaptureOptions) -> Self {
        Self {
            control,
            options,
            hars: Vec::new(),
            session_open: false,
        }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Archives of completed sessions, oldest first
    pub fn hars(&self) -> &[Archive] {
        &self.hars
    }

    /// Clear the buffer; the current session is unaffected
    pub fn reset(&mut self) {
        self.hars.clear();
    }

    pub async fn before_navigate_to(&mut self, url: &str) -> Result<()> {
        if self.session_open {
            self.save_har().await?;
        }
        let name = format!("navigate-to-{url}");
        debug!("Opening capture session {}", name);
        self.control.new_har(Some(&name), self.options).await?;
        self.session_open = true;
        Ok(())
    }

    /// `current_url` is the page being left, when the driver can report it
    pub async fn before_navigate_back(&mut self, current_url: Option<&str>) -> Result<()> {
        self.control
            .new_page(&page_name("navigate-back", current_url))
            .await
    }

    pub async fn before_navigate_forward(&mut self, current_url: Option<&str>) -> Result<()> {
        self.control
            .new_page(&page_name("navigate-forward", current_url))
            .await
    }

    pub async fn before_click(&mut self, element_id: &str) -> Result<()> {
        self.control
            .new_page(&format!("click-element-{element_id}"))
            .await
    }

    pub async fn before_quit(&mut self) -> Result<()> {
        self.save_har().await?;
        self.session_open = false;
        Ok(())
    }

    async fn save_har(&mut self) -> Result<()> {
        if let Some(har) = self.control.har().await? {
            self.hars.push(har);
        }
        Ok(())
    }
}

fn page_name(action: &str, current_url: Option<&str>) -> String {
    match current_url {
        Some(url) => format!("{action}-from-{url}"),
        None => action.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        NewHar(Option<String>, CaptureOptions),
        NewPage(String),
        Har,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
        session: Mutex<Option<String>>,
    }

    fn archive_named(name: &str) -> Archive {
        let json = format!(
            r#"{{"log":{{"version":"1.2","creator":{{"name":"t","version":"1"}},
               "pages":[{{"id":"{name}","startedDateTime":"2024-01-01T00:00:00Z","title":"{name}","pageTimings":{{}}}}],
               "entries":[]}}}}"#
        );
        json.parse().unwrap()
    }

    #[async_trait]
    impl CaptureControl for Recorder {
        async fn new_har(
            &self,
            page_ref: Option<&str>,
            options: CaptureOptions,
        ) -> Result<Option<Archive>> {
            self.calls
                .lock()
                .push(Call::NewHar(page_ref.map(String::from), options));
            let previous = self.session.lock().replace(page_ref.unwrap_or("Page 1").to_string());
            Ok(previous.map(|p| archive_named(&p)))
        }

        async fn new_page(&self, page_ref: &str) -> Result<()> {
            self.calls.lock().push(Call::NewPage(page_ref.to_string()));
            Ok(())
        }

        async fn har(&self) -> Result<Option<Archive>> {
            self.calls.lock().push(Call::Har);
            Ok(self.session.lock().as_deref().map(archive_named))
        }
    }

    #[tokio::test]
    async fn test_navigation_sessions() {
        let mut listener = NavigationListener::new(Recorder::default());

        listener.before_navigate_to("http://a.test/").await.unwrap();
        assert!(listener.hars().is_empty());

        listener.before_navigate_to("http://b.test/").await.unwrap();
        assert_eq!(listener.hars().len(), 1);
        assert_eq!(listener.hars()[0].pages()[0].id, "navigate-to-http://a.test/");

        listener.before_quit().await.unwrap();
        assert_eq!(listener.hars().len(), 2);
        assert_eq!(listener.hars()[1].pages()[0].id, "navigate-to-http://b.test/");
    }

    #[tokio::test]
    async fn test_page_names() {
        let mut listener = NavigationListener::new(Recorder::default());
        listener.before_navigate_back(None).await.unwrap();
        listener
            .before_navigate_back(Some("http://a.test/x"))
            .await
            .unwrap();
        listener.before_navigate_forward(None).await.unwrap();
        listener.before_click("0.42-1").await.unwrap();

        let calls = listener.control().calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                Call::NewPage("navigate-back".into()),
                Call::NewPage("navigate-back-from-http://a.test/x".into()),
                Call::NewPage("navigate-forward".into()),
                Call::NewPage("click-element-0.42-1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_options_forwarded_and_reset() {
        let options = CaptureOptions::binary_content();
        let mut listener = NavigationListener::with_options(Recorder::default(), options);

        listener.before_navigate_to("http://a.test/").await.unwrap();
        listener.before_quit().await.unwrap();
        assert_eq!(listener.hars().len(), 1);

        listener.reset();
        assert!(listener.hars().is_empty());

        let calls = listener.control().calls.lock().clone();
        assert_eq!(
            calls[0],
            Call::NewHar(Some("navigate-to-http://a.test/".into()), options)
        );
        assert_eq!(calls[1], Call::Har);
    }
}
