use crate::binder::{Activation, BindContext, Component, ComponentError};
use crate::bus::{Bus, Notification};
use crate::catalog::Entity;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Component name carried by injected link elements.
pub const ENTITY_LINK_COMPONENT: &str = "entity-link";

/// Attribute holding the entity record serialized at injection time, so the
/// component can be initialized from markup alone.
pub const ENTITY_ATTR: &str = "data-entity";

/// One injected reference. Owns nothing beyond its parsed entity payload; on
/// activation it broadcasts a `teach` notification and suppresses the
/// control's default navigation.
pub struct EntityLink {
    bus: Arc<Bus>,
    entity: RwLock<Option<Entity>>,
}

pub fn factory(ctx: &BindContext<'_>) -> Arc<dyn Component> {
    Arc::new(EntityLink {
        bus: Arc::clone(ctx.bus),
        entity: RwLock::new(None),
    })
}

#[async_trait]
impl Component for EntityLink {
    fn initialize(&self, ctx: &BindContext<'_>) -> Result<(), ComponentError> {
        let raw = {
            let doc = ctx.document.read();
            doc.attr(ctx.node, ENTITY_ATTR).map(str::to_owned)
        }
        .ok_or(ComponentError::MissingPayload)?;
        let entity = Entity::from_payload(&raw)?;
        *self.entity.write() = Some(entity);
        Ok(())
    }

    fn on_activate(&self) -> Activation {
        let Some(entity) = self.entity.read().clone() else {
            return Activation::Default;
        };
        debug!(entity = %entity.name, "entity link activated");
        self.bus.publish(Notification::Teach { entity });
        Activation::Prevented
    }
}
