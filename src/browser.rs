use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use thirtyfour::prelude::*;

const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const IMPLICIT_WAIT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// The automation capability the engine consumes. Everything the collector
/// needs from a live page goes through these two traits, so tests drive it
/// with a scripted fake instead of a browser.
#[async_trait]
pub trait Browser {
    type Card: Card;

    async fn navigate(&self, url: &str) -> Result<()>;
    /// Run a script in the page and return its scalar result.
    async fn evaluate(&self, script: &str) -> Result<Value>;
    /// Enumerate all currently rendered cards matching `selector`.
    async fn cards(&self, selector: &str) -> Result<Vec<Self::Card>>;
    async fn title(&self) -> Result<String>;
}

/// One product card: its visible text plus addressable sub-elements.
#[async_trait]
pub trait Card {
    async fn text(&self) -> Result<String>;
    /// Text of the first sub-element matching `selector`, or None if absent.
    async fn sub_text(&self, selector: &str) -> Result<Option<String>>;
}

// ── WebDriver implementation ──

pub struct WebBrowser {
    driver: WebDriver,
}

impl WebBrowser {
    /// Open a Chrome session against a running WebDriver endpoint.
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if headless {
            caps.add_arg("--headless=new")?;
        }
        for arg in [
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--disable-extensions",
        ] {
            caps.add_arg(arg)?;
        }
        caps.add_arg(&format!("--user-agent={}", USER_AGENT))?;

        let driver = WebDriver::new(webdriver_url, caps)
            .await
            .with_context(|| format!("failed to open a WebDriver session at {}", webdriver_url))?;
        driver.set_page_load_timeout(PAGE_LOAD_TIMEOUT).await?;
        driver.set_implicit_wait_timeout(IMPLICIT_WAIT).await?;
        Ok(Self { driver })
    }

    pub async fn quit(self) -> Result<()> {
        self.driver.quit().await?;
        Ok(())
    }
}

#[async_trait]
impl Browser for WebBrowser {
    type Card = WebCard;

    async fn navigate(&self, url: &str) -> Result<()> {
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let ret = self.driver.execute(script, Vec::new()).await?;
        Ok(ret.json().clone())
    }

    async fn cards(&self, selector: &str) -> Result<Vec<WebCard>> {
        let elements = self.driver.find_all(By::Css(selector)).await?;
        Ok(elements.into_iter().map(|element| WebCard { element }).collect())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.driver.title().await?)
    }
}

pub struct WebCard {
    element: WebElement,
}

#[async_trait]
impl Card for WebCard {
    async fn text(&self) -> Result<String> {
        Ok(self.element.text().await?)
    }

    async fn sub_text(&self, selector: &str) -> Result<Option<String>> {
        match self.element.find(By::Css(selector)).await {
            Ok(el) => Ok(Some(el.text().await?)),
            Err(_) => Ok(None),
        }
    }
}

// ── Scripted fakes for tests ──

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::Value;

    use super::{Browser, Card};
    use crate::collector::PAGE_EXTENT_SCRIPT;

    #[derive(Clone)]
    pub struct FakeCard {
        pub text: String,
        pub subs: HashMap<String, String>,
        pub unreadable: bool,
    }

    impl FakeCard {
        pub fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                subs: HashMap::new(),
                unreadable: false,
            }
        }

        pub fn with_sub(mut self, selector: &str, text: &str) -> Self {
            self.subs.insert(selector.to_string(), text.to_string());
            self
        }

        pub fn broken() -> Self {
            Self {
                text: String::new(),
                subs: HashMap::new(),
                unreadable: true,
            }
        }
    }

    #[async_trait]
    impl Card for FakeCard {
        async fn text(&self) -> Result<String> {
            if self.unreadable {
                return Err(anyhow!("stale element reference"));
            }
            Ok(self.text.clone())
        }

        async fn sub_text(&self, selector: &str) -> Result<Option<String>> {
            Ok(self.subs.get(selector).cloned())
        }
    }

    /// A browser whose page extent readings and card enumerations are
    /// scripted up front. Extent readings drain from `heights` (the last
    /// value repeats forever); each `cards()` call drains one sweep.
    pub struct FakeBrowser {
        heights: Mutex<Vec<i64>>,
        sweeps: Mutex<Vec<Vec<FakeCard>>>,
        pub navigated: Mutex<Vec<String>>,
        pub card_fetches: Mutex<usize>,
        pub title: String,
    }

    impl FakeBrowser {
        pub fn new(heights: Vec<i64>, sweeps: Vec<Vec<FakeCard>>) -> Self {
            Self {
                heights: Mutex::new(heights),
                sweeps: Mutex::new(sweeps),
                navigated: Mutex::new(Vec::new()),
                card_fetches: Mutex::new(0),
                title: String::new(),
            }
        }

        fn next_height(&self) -> i64 {
            let mut heights = self.heights.lock().unwrap();
            if heights.len() > 1 {
                heights.remove(0)
            } else {
                heights.first().copied().unwrap_or(0)
            }
        }
    }

    #[async_trait]
    impl Browser for FakeBrowser {
        type Card = FakeCard;

        async fn navigate(&self, url: &str) -> Result<()> {
            self.navigated.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn evaluate(&self, script: &str) -> Result<Value> {
            if script == PAGE_EXTENT_SCRIPT {
                Ok(Value::from(self.next_height()))
            } else {
                Ok(Value::Null)
            }
        }

        async fn cards(&self, _selector: &str) -> Result<Vec<FakeCard>> {
            *self.card_fetches.lock().unwrap() += 1;
            let mut sweeps = self.sweeps.lock().unwrap();
            if sweeps.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(sweeps.remove(0))
            }
        }

        async fn title(&self) -> Result<String> {
            Ok(self.title.clone())
        }
    }
}
