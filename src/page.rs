use crate::article::{self, ARTICLE_COMPONENT};
use crate::binder::{Activation, Component, Registry};
use crate::bus::{Bus, Notification, ScrollReading};
use crate::entity_link::{self, ENTITY_LINK_COMPONENT};
use crate::markup::{Document, NodeId};
use crate::popover::{POPOVER_COMPONENT, Popover};
use crate::templates::{RenderError, Templates, render_fragment};
use parking_lot::RwLock;
use std::sync::Arc;

/// Hosts embed the system through this facade: it owns the document, the
/// notification bus, the registry with the standard component set, and the
/// page-lifetime popover, and it routes user input (activations, scroll
/// readings, checklist requests) into the components.
pub struct Page {
    document: Arc<RwLock<Document>>,
    bus: Arc<Bus>,
    registry: Registry,
    popover: Arc<Popover>,
    templates: Templates,
}

impl Page {
    pub fn new(document: Document) -> Self {
        let document = Arc::new(RwLock::new(document));
        let bus = Arc::new(Bus::new());
        let popover = Popover::new();
        let mut registry = Registry::new();
        registry.register(ARTICLE_COMPONENT, article::factory);
        registry.register(ENTITY_LINK_COMPONENT, entity_link::factory);
        {
            let popover = Arc::clone(&popover);
            registry.register(POPOVER_COMPONENT, move |ctx| {
                popover.attach(ctx.bus);
                Arc::clone(&popover) as Arc<dyn Component>
            });
        }
        Self {
            document,
            bus,
            registry,
            popover,
            templates: Templates,
        }
    }

    /// Page load: binds every top-level component. The article component
    /// loads its entities and injects links before this resolves. Returns the
    /// number of new bindings.
    pub async fn initialize(&self) -> usize {
        let root = self.document.read().root();
        self.registry.bind(&self.document, &self.bus, root).await
    }

    /// Routes a user activation (e.g. a click) on `node` to its component.
    pub fn activate(&self, node: NodeId) -> Activation {
        self.registry.activate(node)
    }

    /// Explicit request to open the aggregate checklist.
    pub fn request_checklist(&self) {
        self.bus.publish(Notification::ChecklistRequested);
    }

    /// Feeds one scroll-position sample to the components.
    pub fn notify_scroll(&self, reading: ScrollReading) {
        self.bus.publish(Notification::Scroll { reading });
    }

    pub fn popover(&self) -> &Arc<Popover> {
        &self.popover
    }

    pub fn document(&self) -> &Arc<RwLock<Document>> {
        &self.document
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// The current document projected back to markup, annotations included.
    pub fn annotated_markup(&self) -> Result<String, RenderError> {
        let doc = self.document.read();
        render_fragment(&doc, doc.root(), &self.templates)
    }
}
