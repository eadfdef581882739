//! In-memory browser window and tabs over page-probe documents.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::Value;

use tabpilot_core_types::{
    FrameId, FrameInfo, GroupId, HostError, TabGroupInfo, TabHandle, TabId, TabInfo,
};
use tabpilot_page_probe::{Document, Probe, SyntheticEvent, Tempo, Viewport};

/// Maps a navigated URL to the new document set of the tab.
pub type NavRouter = Box<dyn Fn(&str) -> Vec<(u64, Document)> + Send + Sync>;

/// 1x1 transparent PNG, served as the canned screenshot.
const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0xF8,
    0xCF, 0xC0, 0x50, 0x0F, 0x00, 0x04, 0x85, 0x01, 0x80, 0x84, 0xA9, 0x8C, 0x21, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

struct FrameSlot {
    frame_id: u64,
    url: String,
    doc: Arc<Mutex<Document>>,
    probe: Option<Arc<Probe>>,
}

struct TabState {
    id: TabId,
    url: Mutex<String>,
    title: Mutex<String>,
    frames: Mutex<Vec<FrameSlot>>,
    active: AtomicBool,
    group: Mutex<Option<GroupId>>,
    closed: AtomicBool,
    navigations: Mutex<Vec<String>>,
    router: Mutex<Option<NavRouter>>,
    debug_attached: AtomicBool,
    debug_commands: Mutex<Vec<(String, Value)>>,
}

impl TabState {
    fn slots_from(frames: Vec<(u64, Document)>) -> Vec<FrameSlot> {
        frames
            .into_iter()
            .map(|(frame_id, doc)| FrameSlot {
                frame_id,
                url: doc.url.clone(),
                doc: Arc::new(Mutex::new(doc)),
                probe: None,
            })
            .collect()
    }
}

/// One in-memory browser window shared by its tabs.
pub struct MemoryBrowser {
    tabs: Mutex<Vec<Arc<TabState>>>,
    groups: Mutex<Vec<TabGroupInfo>>,
    next_tab: AtomicI64,
    next_group: AtomicI64,
    tempo: Tempo,
}

impl MemoryBrowser {
    pub fn new() -> Arc<Self> {
        Self::with_tempo(Tempo::instant())
    }

    /// A browser whose probes type and drag at the given cadence.
    pub fn with_tempo(tempo: Tempo) -> Arc<Self> {
        Arc::new(Self {
            tabs: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
            next_tab: AtomicI64::new(1),
            next_group: AtomicI64::new(1),
            tempo,
        })
    }

    /// Open a tab holding the given frame documents (frame 0 is the top).
    pub fn open_tab(
        self: &Arc<Self>,
        url: impl Into<String>,
        title: impl Into<String>,
        frames: Vec<(u64, Document)>,
    ) -> Arc<MemoryTab> {
        let id = TabId(self.next_tab.fetch_add(1, Ordering::SeqCst));
        let state = Arc::new(TabState {
            id,
            url: Mutex::new(url.into()),
            title: Mutex::new(title.into()),
            frames: Mutex::new(TabState::slots_from(frames)),
            active: AtomicBool::new(true),
            group: Mutex::new(None),
            closed: AtomicBool::new(false),
            navigations: Mutex::new(Vec::new()),
            router: Mutex::new(None),
            debug_attached: AtomicBool::new(false),
            debug_commands: Mutex::new(Vec::new()),
        });

        let mut tabs = self.tabs.lock();
        for other in tabs.iter() {
            other.active.store(false, Ordering::SeqCst);
        }
        tabs.push(Arc::clone(&state));

        Arc::new(MemoryTab {
            state,
            browser: Arc::clone(self),
        })
    }

    fn find(&self, id: TabId) -> Option<Arc<TabState>> {
        self.tabs.lock().iter().find(|t| t.id == id).cloned()
    }

    fn live_tabs(&self) -> Vec<Arc<TabState>> {
        self.tabs
            .lock()
            .iter()
            .filter(|t| !t.closed.load(Ordering::SeqCst))
            .cloned()
            .collect()
    }
}

/// One in-memory tab.
pub struct MemoryTab {
    state: Arc<TabState>,
    browser: Arc<MemoryBrowser>,
}

impl MemoryTab {
    /// Install a navigation router so `navigate` swaps documents.
    pub fn set_router(&self, router: NavRouter) {
        *self.state.router.lock() = Some(router);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.navigations.lock().clone()
    }

    /// The document of one frame, for test setup and assertions.
    pub fn frame_doc(&self, frame: u64) -> Option<Arc<Mutex<Document>>> {
        self.state
            .frames
            .lock()
            .iter()
            .find(|slot| slot.frame_id == frame)
            .map(|slot| Arc::clone(&slot.doc))
    }

    /// Synthetic events dispatched at one frame so far.
    pub fn frame_events(&self, frame: u64) -> Vec<SyntheticEvent> {
        self.frame_doc(frame)
            .map(|doc| doc.lock().events().to_vec())
            .unwrap_or_default()
    }

    pub fn debug_commands(&self) -> Vec<(String, Value)> {
        self.state.debug_commands.lock().clone()
    }

    pub fn debug_attached(&self) -> bool {
        self.state.debug_attached.load(Ordering::SeqCst)
    }

    /// A blank document for quick test pages.
    pub fn blank(url: &str, title: &str) -> Document {
        Document::new(url, title, Viewport::default())
    }
}

#[async_trait]
impl TabHandle for MemoryTab {
    fn id(&self) -> TabId {
        self.state.id
    }

    async fn url(&self) -> Result<String, HostError> {
        Ok(self.state.url.lock().clone())
    }

    async fn title(&self) -> Result<String, HostError> {
        Ok(self.state.title.lock().clone())
    }

    async fn inject_probe_all_frames(&self) -> Result<(), HostError> {
        let mut frames = self.state.frames.lock();
        for slot in frames.iter_mut() {
            if slot.probe.is_none() {
                slot.probe = Probe::install(&slot.doc, self.browser.tempo);
            }
        }
        Ok(())
    }

    async fn enumerate_frames(&self) -> Result<Vec<FrameInfo>, HostError> {
        let frames = self.state.frames.lock();
        Ok(frames
            .iter()
            .map(|slot| FrameInfo {
                frame_id: FrameId(slot.frame_id),
                parent_frame_id: (slot.frame_id != 0).then_some(FrameId::TOP),
                url: slot.url.clone(),
            })
            .collect())
    }

    async fn send_to_frame(
        &self,
        frame: FrameId,
        message: Value,
    ) -> Result<Option<Value>, HostError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(HostError::new("tab is closed"));
        }
        let probe = {
            let frames = self.state.frames.lock();
            frames
                .iter()
                .find(|slot| slot.frame_id == frame.0)
                .and_then(|slot| slot.probe.clone())
        };
        match probe {
            Some(probe) => Ok(Some(probe.handle_value(message).await)),
            None => Ok(None),
        }
    }

    async fn update_url(&self, url: &str) -> Result<(), HostError> {
        self.state.navigations.lock().push(url.to_string());
        *self.state.url.lock() = url.to_string();

        let new_frames = self.state.router.lock().as_ref().map(|router| router(url));
        if let Some(frames) = new_frames {
            *self.state.frames.lock() = TabState::slots_from(frames);
        }
        Ok(())
    }

    async fn wait_loaded(&self, _timeout: Duration) -> Result<bool, HostError> {
        Ok(true)
    }

    async fn activate(&self) -> Result<(), HostError> {
        self.activate_tab(self.state.id).await
    }

    async fn close(&self) -> Result<(), HostError> {
        self.close_tab(self.state.id).await
    }

    async fn activate_tab(&self, tab: TabId) -> Result<(), HostError> {
        let target = self
            .browser
            .find(tab)
            .ok_or_else(|| HostError::new(format!("no tab {tab}")))?;
        for other in self.browser.tabs.lock().iter() {
            other.active.store(false, Ordering::SeqCst);
        }
        target.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close_tab(&self, tab: TabId) -> Result<(), HostError> {
        let target = self
            .browser
            .find(tab)
            .ok_or_else(|| HostError::new(format!("no tab {tab}")))?;
        target.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn open(&self, url: Option<&str>) -> Result<Arc<dyn TabHandle>, HostError> {
        let url = url.unwrap_or("about:blank");
        let doc = Document::new(url, "", Viewport::default());
        let tab = self.browser.open_tab(url, "", vec![(0, doc)]);
        Ok(tab as Arc<dyn TabHandle>)
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>, HostError> {
        Ok(self
            .browser
            .live_tabs()
            .iter()
            .map(|tab| TabInfo {
                id: tab.id,
                title: tab.title.lock().clone(),
                url: tab.url.lock().clone(),
                active: tab.active.load(Ordering::SeqCst),
                group: *tab.group.lock(),
            })
            .collect())
    }

    async fn list_tab_groups(&self) -> Result<Vec<TabGroupInfo>, HostError> {
        Ok(self.browser.groups.lock().clone())
    }

    async fn group_tabs(
        &self,
        tab_ids: &[TabId],
        color: Option<&str>,
        title: Option<&str>,
    ) -> Result<GroupId, HostError> {
        let id = GroupId(self.browser.next_group.fetch_add(1, Ordering::SeqCst));
        self.browser.groups.lock().push(TabGroupInfo {
            id,
            title: title.unwrap_or("Group").to_string(),
            color: color.unwrap_or("grey").to_string(),
        });
        self.add_to_group(id, tab_ids).await?;
        Ok(id)
    }

    async fn add_to_group(&self, group: GroupId, tab_ids: &[TabId]) -> Result<(), HostError> {
        for id in tab_ids {
            let tab = self
                .browser
                .find(*id)
                .ok_or_else(|| HostError::new(format!("no tab {id}")))?;
            *tab.group.lock() = Some(group);
        }
        Ok(())
    }

    async fn ungroup(&self, group: GroupId) -> Result<(), HostError> {
        for tab in self.browser.tabs.lock().iter() {
            let mut slot = tab.group.lock();
            if *slot == Some(group) {
                *slot = None;
            }
        }
        self.browser.groups.lock().retain(|g| g.id != group);
        Ok(())
    }

    async fn debug_attach(&self) -> Result<(), HostError> {
        self.state.debug_attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn debug_detach(&self) -> Result<(), HostError> {
        self.state.debug_attached.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn debug_send(&self, method: &str, params: Value) -> Result<Value, HostError> {
        if !self.state.debug_attached.load(Ordering::SeqCst) {
            return Err(HostError::new("debugger not attached"));
        }
        self.state
            .debug_commands
            .lock()
            .push((method.to_string(), params));
        Ok(Value::Null)
    }

    async fn capture_screenshot(&self) -> Result<String, HostError> {
        if !self.state.debug_attached.load(Ordering::SeqCst) {
            return Err(HostError::new("debugger not attached"));
        }
        Ok(BASE64.encode(TINY_PNG))
    }
}
