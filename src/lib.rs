pub mod article;
pub mod binder;
pub mod bus;
pub mod catalog;
pub mod entity_link;
pub mod markup;
pub mod page;
pub mod popover;
pub mod slug;
pub mod templates;

pub use article::inject_entity_link;
pub use binder::{Activation, BindContext, Component, ComponentError, Registry};
pub use bus::{Bus, Notification, ScrollReading, Subscription, Topic};
pub use catalog::{CatalogClient, CatalogError, Entity, TermSet};
pub use markup::{Document, NodeId};
pub use page::Page;
pub use popover::{Popover, PopoverView, Progress, should_auto_open};
pub use slug::slugify;
pub use templates::{ChecklistRow, RenderError, Templates, render_fragment};
