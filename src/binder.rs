use crate::bus::Bus;
use crate::markup::{Document, NodeId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Attribute naming the component a markup element should be wired to.
pub const COMPONENT_ATTR: &str = "data-component";

/// Whether an activated component consumed the activation (suppressing the
/// control's default navigation behavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Default,
    Prevented,
}

#[derive(Debug)]
pub enum ComponentError {
    MissingPayload,
    Payload(serde_json::Error),
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentError::MissingPayload => write!(f, "entity payload attribute is missing"),
            ComponentError::Payload(err) => write!(f, "entity payload did not parse: {err}"),
        }
    }
}

impl std::error::Error for ComponentError {}

impl From<serde_json::Error> for ComponentError {
    fn from(value: serde_json::Error) -> Self {
        ComponentError::Payload(value)
    }
}

/// Everything a factory or component sees at bind time.
pub struct BindContext<'a> {
    pub document: &'a Arc<RwLock<Document>>,
    pub bus: &'a Arc<Bus>,
    pub registry: &'a Registry,
    pub node: NodeId,
}

/// One behavior instance bound to one markup element. Internal state lives in
/// the implementation (interior mutability), never on the element.
///
/// `initialize` runs synchronously during the bind pass; `hydrate` is the
/// component's asynchronous continuation and only starts once every element
/// of the pass has initialized, so notifications published from `hydrate`
/// reach listeners wired in the same pass.
#[async_trait]
pub trait Component: Send + Sync {
    fn initialize(&self, ctx: &BindContext<'_>) -> Result<(), ComponentError>;

    async fn hydrate(&self, _ctx: &BindContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    fn on_activate(&self) -> Activation {
        Activation::Default
    }
}

type Factory = Arc<dyn Fn(&BindContext<'_>) -> Arc<dyn Component> + Send + Sync>;

/// Discovers `data-component` elements and wires each to its factory exactly
/// once. Bindings are tracked here, so re-scanning a subtree never
/// double-initializes an element.
pub struct Registry {
    factories: HashMap<String, Factory>,
    bindings: RwLock<HashMap<NodeId, Arc<dyn Component>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            bindings: RwLock::new(HashMap::new()),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BindContext<'_>) -> Arc<dyn Component> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Binds every descendant of `root` (root excluded) carrying a known
    /// component name, in document order. Unknown names are skipped; a
    /// component that fails is logged and isolated; its siblings still bind.
    /// Returns the number of new bindings.
    pub async fn bind(
        &self,
        document: &Arc<RwLock<Document>>,
        bus: &Arc<Bus>,
        root: NodeId,
    ) -> usize {
        let candidates: Vec<(NodeId, String)> = {
            let doc = document.read();
            doc.descendants(root)
                .into_iter()
                .filter_map(|node| {
                    doc.attr(node, COMPONENT_ATTR)
                        .map(|name| (node, name.to_string()))
                })
                .collect()
        };

        let mut newly_bound: Vec<(NodeId, String, Arc<dyn Component>)> = Vec::new();
        for (node, name) in candidates {
            let Some(factory) = self.factories.get(&name) else {
                debug!(node, component = %name, "no factory registered; skipping");
                continue;
            };
            let already_bound = self.bindings.read().contains_key(&node);
            if already_bound {
                continue;
            }
            let ctx = BindContext {
                document,
                bus,
                registry: self,
                node,
            };
            let component = factory(&ctx);
            match component.initialize(&ctx) {
                Ok(()) => {
                    self.bindings.write().insert(node, Arc::clone(&component));
                    newly_bound.push((node, name, component));
                }
                Err(err) => {
                    error!(node, component = %name, %err, "component failed to initialize");
                }
            }
        }

        let bound = newly_bound.len();
        for (node, name, component) in newly_bound {
            let ctx = BindContext {
                document,
                bus,
                registry: self,
                node,
            };
            if let Err(err) = component.hydrate(&ctx).await {
                error!(node, component = %name, %err, "component failed to hydrate");
            }
        }
        bound
    }

    /// Routes an activation (e.g. a click) to the component bound to `node`.
    /// Unbound elements keep their default behavior.
    pub fn activate(&self, node: NodeId) -> Activation {
        let component = self.bindings.read().get(&node).cloned();
        match component {
            Some(component) => component.on_activate(),
            None => Activation::Default,
        }
    }

    pub fn is_bound(&self, node: NodeId) -> bool {
        self.bindings.read().contains_key(&node)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
