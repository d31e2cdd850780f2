use crate::binder::{Activation, BindContext, Component, ComponentError};
use crate::bus::{Bus, Notification, ScrollReading, Subscription, Topic};
use crate::catalog::Entity;
use crate::markup::{Document, NodeId};
use crate::templates::{ChecklistRow, Templates};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error};

pub const POPOVER_COMPONENT: &str = "popover";

/// Attribute mirroring the popover's logical state onto its bound element.
pub const STATE_ATTR: &str = "data-state";

/// How close (in host units) the viewport bottom must be to the document
/// bottom before a downward scroll auto-opens the checklist.
pub const PROXIMITY_THRESHOLD: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopoverView {
    #[default]
    Closed,
    Detail,
    Checklist,
}

impl PopoverView {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopoverView::Closed => "closed",
            PopoverView::Detail => "detail",
            PopoverView::Checklist => "checklist",
        }
    }
}

/// Read-progress summary: how many discovered entities have been examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub checked: usize,
    pub total: usize,
}

struct ChecklistEntry {
    entity: Entity,
    slug: String,
    checked: bool,
}

#[derive(Default)]
struct PopoverState {
    view: PopoverView,
    entries: Vec<ChecklistEntry>,
    rendered: Option<String>,
    previous_extent: f64,
    subscriptions: Vec<Subscription>,
    host: Option<(Arc<RwLock<Document>>, NodeId)>,
}

/// The side panel tracking which entities the reader has examined.
///
/// Owns the only durable cross-cutting state in the system: the checklist, in
/// insertion order of `entity-discovered` receipt, for the page lifetime.
pub struct Popover {
    templates: Templates,
    state: RwLock<PopoverState>,
}

impl Popover {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            templates: Templates,
            state: RwLock::new(PopoverState::default()),
        })
    }

    /// Subscribes to the notification topics the popover reacts to. Safe to
    /// call more than once; only the first call registers listeners.
    pub fn attach(self: &Arc<Self>, bus: &Bus) {
        let mut state = self.state.write();
        if !state.subscriptions.is_empty() {
            return;
        }
        state.subscriptions = vec![
            bus.subscribe(Topic::EntityDiscovered, {
                let popover = Arc::clone(self);
                move |notification| {
                    if let Notification::EntityDiscovered { entity } = notification {
                        popover.on_entity_discovered(entity);
                    }
                }
            }),
            bus.subscribe(Topic::Teach, {
                let popover = Arc::clone(self);
                move |notification| {
                    if let Notification::Teach { entity } = notification {
                        popover.on_teach(entity);
                    }
                }
            }),
            bus.subscribe(Topic::ChecklistRequested, {
                let popover = Arc::clone(self);
                move |_| popover.open_checklist()
            }),
            bus.subscribe(Topic::Scroll, {
                let popover = Arc::clone(self);
                move |notification| {
                    if let Notification::Scroll { reading } = notification {
                        popover.on_scroll(reading);
                    }
                }
            }),
        ];
    }

    /// A newly discovered entity joins the checklist unchecked. Visibility
    /// and rendered content are deliberately left alone.
    fn on_entity_discovered(&self, entity: &Entity) {
        let slug = entity.slug();
        let mut state = self.state.write();
        if state.entries.iter().any(|entry| entry.slug == slug) {
            return;
        }
        debug!(entity = %entity.name, "checklist entry added");
        state.entries.push(ChecklistEntry {
            entity: entity.clone(),
            slug,
            checked: false,
        });
    }

    /// A taught entity is marked read (when the checklist knows it) and shown
    /// in the detail view.
    fn on_teach(&self, entity: &Entity) {
        let markup = match self.templates.entity_detail(entity) {
            Ok(markup) => markup,
            Err(err) => {
                error!(error = %err, "detail view failed to render");
                return;
            }
        };
        let slug = entity.slug();
        {
            let mut state = self.state.write();
            if let Some(entry) = state.entries.iter_mut().find(|entry| entry.slug == slug) {
                entry.checked = true;
            }
            state.view = PopoverView::Detail;
            state.rendered = Some(markup);
        }
        self.sync_element(PopoverView::Detail);
    }

    /// Renders the aggregate checklist and opens the panel.
    pub fn open_checklist(&self) {
        let (progress, rows) = self.checklist_rows();
        let markup = match self
            .templates
            .checklist(progress.checked, progress.total, &rows)
        {
            Ok(markup) => markup,
            Err(err) => {
                error!(error = %err, "checklist view failed to render");
                return;
            }
        };
        {
            let mut state = self.state.write();
            state.view = PopoverView::Checklist;
            state.rendered = Some(markup);
        }
        self.sync_element(PopoverView::Checklist);
    }

    pub fn close(&self) {
        self.state.write().view = PopoverView::Closed;
        self.sync_element(PopoverView::Closed);
    }

    fn on_scroll(&self, reading: &ScrollReading) {
        let extent = reading.extent();
        let auto_open = {
            let mut state = self.state.write();
            let previous = state.previous_extent;
            state.previous_extent = extent;
            should_auto_open(previous, extent, reading.document_height, PROXIMITY_THRESHOLD)
        };
        if auto_open {
            debug!(extent, "scroll heuristic opening the checklist");
            self.open_checklist();
        }
    }

    fn sync_element(&self, view: PopoverView) {
        let host = self.state.read().host.clone();
        if let Some((document, node)) = host {
            document.write().set_attr(node, STATE_ATTR, view.as_str());
        }
    }

    fn checklist_rows(&self) -> (Progress, Vec<ChecklistRow>) {
        let state = self.state.read();
        let rows: Vec<ChecklistRow> = state
            .entries
            .iter()
            .map(|entry| ChecklistRow {
                name: entry.entity.name.clone(),
                slug: entry.slug.clone(),
                checked: entry.checked,
            })
            .collect();
        let progress = Progress {
            checked: rows.iter().filter(|row| row.checked).count(),
            total: rows.len(),
        };
        (progress, rows)
    }

    pub fn view(&self) -> PopoverView {
        self.state.read().view
    }

    pub fn is_open(&self) -> bool {
        self.view() != PopoverView::Closed
    }

    pub fn progress(&self) -> Progress {
        self.checklist_rows().0
    }

    /// Markup last rendered into the panel, if any.
    pub fn rendered(&self) -> Option<String> {
        self.state.read().rendered.clone()
    }
}

#[async_trait]
impl Component for Popover {
    fn initialize(&self, ctx: &BindContext<'_>) -> Result<(), ComponentError> {
        self.state.write().host = Some((Arc::clone(ctx.document), ctx.node));
        ctx.document
            .write()
            .set_attr(ctx.node, STATE_ATTR, PopoverView::Closed.as_str());
        Ok(())
    }

    /// The dismiss control lives inside the panel, so activating the bound
    /// element closes it.
    fn on_activate(&self) -> Activation {
        self.close();
        Activation::Prevented
    }
}

/// The scroll heuristic as a pure function: open when the viewport bottom is
/// within `threshold` of the document bottom and the reading moved down since
/// the previous one. Upward movement never triggers; leaving the threshold
/// and re-entering it re-triggers.
pub fn should_auto_open(
    previous_extent: f64,
    extent: f64,
    document_height: f64,
    threshold: f64,
) -> bool {
    document_height - extent <= threshold && extent > previous_extent
}
