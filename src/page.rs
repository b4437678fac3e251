use std::time::Duration;

use tracing::{debug, error};

use crate::client::CelebrationClient;
use crate::error::ClientResult;
use crate::rest_types::{MemoryRow, MessageRow, Stats};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

pub const MESSAGES_PLACEHOLDER: &str =
    "No messages yet. Be the first to leave a message for the celebration!";
pub const MEMORIES_PLACEHOLDER: &str =
    "No memories shared yet. Share a photo or video to get things started!";
pub const FAILURE_NOTICE: &str = "Unable to load right now. Please try again later.";

const MESSAGES_PAGE_SIZE: u32 = 10;
const MEMORIES_PAGE_SIZE: u32 = 20;

/// The content sections reachable from the tab menu, keyed by their data tag.
/// Each one maps to a view of the loaded containers.
pub const SECTION_TAGS: [&str; 4] = ["home", "messages", "memories", "donate"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub tag: String,
    pub visible: bool,
}

/// Tab menu state: which section is on screen and whether the menu is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSet {
    sections: Vec<Section>,
    menu_open: bool,
}

impl TabSet {
    /// The first tag starts out visible.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sections = tags
            .into_iter()
            .enumerate()
            .map(|(i, tag)| Section {
                tag: tag.into(),
                visible: i == 0,
            })
            .collect();

        Self {
            sections,
            menu_open: false,
        }
    }

    pub fn toggle_menu(&mut self) -> bool {
        self.menu_open = !self.menu_open;
        self.menu_open
    }

    pub fn menu_open(&self) -> bool {
        self.menu_open
    }

    /// Shows the section tagged `tag` and hides every other one.
    /// Unknown tags leave the current selection alone.
    pub fn show(&mut self, tag: &str) -> bool {
        if !self.sections.iter().any(|s| s.tag == tag) {
            return false;
        }
        for section in &mut self.sections {
            section.visible = section.tag == tag;
        }
        self.menu_open = false;
        true
    }

    /// Follows an in-page anchor such as `#memories`.
    pub fn navigate(&mut self, href: &str) -> bool {
        match href.strip_prefix('#') {
            Some(tag) if !tag.is_empty() => self.show(tag),
            _ => false,
        }
    }

    pub fn visible(&self) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.visible)
            .map(|s| s.tag.as_str())
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }
}

impl Default for TabSet {
    fn default() -> Self {
        Self::new(SECTION_TAGS)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Container<T> {
    #[default]
    Loading,
    Ready(T),
    Empty(&'static str),
    Failed(&'static str),
}

impl<T> Container<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Container::Loading)
    }

    /// Applies one loader's outcome to this container only. `placeholder`
    /// returns the invitation to show when a successful result has nothing in it.
    fn settle(
        &mut self,
        section: &str,
        result: ClientResult<T>,
        placeholder: impl Fn(&T) -> Option<&'static str>,
        notify: bool,
    ) {
        match result {
            Ok(rows) => {
                *self = match placeholder(&rows) {
                    Some(text) => Container::Empty(text),
                    None => Container::Ready(rows),
                }
            }
            Err(e) => {
                error!(section, error = %e, "failed to load section");
                if notify {
                    *self = Container::Failed(FAILURE_NOTICE);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub settle_delay: Duration,
    /// Swap the loading indicator for a static notice when a loader fails.
    pub replace_failed_with_notice: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            replace_failed_with_notice: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub tabs: TabSet,
    pub messages: Container<Vec<MessageRow>>,
    pub memories: Container<Vec<MemoryRow>>,
    pub stats: Container<Stats>,
}

impl Page {
    /// Waits for the settle delay, then loads messages, memories and stats
    /// concurrently. Each loader only touches its own container.
    pub async fn load(&mut self, client: &CelebrationClient, options: LoadOptions) {
        tokio::time::sleep(options.settle_delay).await;

        let notify = options.replace_failed_with_notice;
        let Page {
            messages,
            memories,
            stats,
            ..
        } = self;

        tokio::join!(
            async {
                let result = client
                    .messages(Some(MESSAGES_PAGE_SIZE), Some(0))
                    .await
                    .map(|r| r.messages);
                let placeholder = |rows: &Vec<MessageRow>| rows.is_empty().then_some(MESSAGES_PLACEHOLDER);
                messages.settle("messages", result, placeholder, notify);
            },
            async {
                let result = client.memories(None, Some(MEMORIES_PAGE_SIZE), Some(0)).await;
                let placeholder = |rows: &Vec<MemoryRow>| rows.is_empty().then_some(MEMORIES_PLACEHOLDER);
                memories.settle("memories", result, placeholder, notify);
            },
            async {
                let result = client.stats().await;
                // zero totals are still worth showing against the goal
                stats.settle("stats", result, |_| None, notify);
            },
        );

        debug!(
            messages_loading = self.messages.is_loading(),
            memories_loading = self.memories.is_loading(),
            stats_loading = self.stats.is_loading(),
            "page load finished"
        );
    }
}
