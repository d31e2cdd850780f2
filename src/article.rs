use crate::binder::{BindContext, COMPONENT_ATTR, Component, ComponentError};
use crate::bus::{Bus, Notification};
use crate::catalog::{CatalogClient, Entity, TermSet};
use crate::entity_link::{ENTITY_ATTR, ENTITY_LINK_COMPONENT};
use crate::markup::{Document, NodeId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ARTICLE_COMPONENT: &str = "article";

/// Meta marker naming one free-text term relevant to the article.
pub const TERM_MARKER: &str = "article-term";

struct ArticleSetup {
    terms: TermSet,
    client: Option<CatalogClient>,
    paragraphs: Vec<NodeId>,
}

/// Orchestrates term discovery, catalog filtering, and link injection for one
/// article subtree. Terms and the paragraph list are snapshotted at
/// initialization (paragraphs added afterwards are never annotated), and the
/// catalog fetch runs as the component's own asynchronous continuation.
pub struct Article {
    document: Arc<RwLock<Document>>,
    bus: Arc<Bus>,
    node: NodeId,
    setup: RwLock<Option<ArticleSetup>>,
}

pub fn factory(ctx: &BindContext<'_>) -> Arc<dyn Component> {
    Arc::new(Article {
        document: Arc::clone(ctx.document),
        bus: Arc::clone(ctx.bus),
        node: ctx.node,
        setup: RwLock::new(None),
    })
}

#[async_trait]
impl Component for Article {
    fn initialize(&self, _ctx: &BindContext<'_>) -> Result<(), ComponentError> {
        let doc = self.document.read();
        let setup = ArticleSetup {
            terms: TermSet::from_raw(doc.meta_content(self.node, TERM_MARKER)),
            client: CatalogClient::from_document(&doc),
            paragraphs: doc.elements_by_tag(self.node, "p"),
        };
        *self.setup.write() = Some(setup);
        Ok(())
    }

    async fn hydrate(&self, ctx: &BindContext<'_>) -> Result<(), ComponentError> {
        let Some(setup) = self.setup.write().take() else {
            return Ok(());
        };

        // Missing markers are a configuration gap, not a runtime fault: the
        // article simply stays unannotated.
        let Some(client) = setup.client else {
            debug!("catalog url marker missing; article left unannotated");
            return Ok(());
        };
        if setup.terms.is_empty() {
            debug!("no article-term markers; article left unannotated");
            return Ok(());
        }

        let entities = match client.load_entities(&setup.terms).await {
            Ok(entities) => entities,
            Err(err) => {
                warn!(error = %err, "entity catalog load failed; article left unannotated");
                return Ok(());
            }
        };
        info!(
            entities = entities.len(),
            paragraphs = setup.paragraphs.len(),
            "annotating article"
        );

        // Announce every relevant entity up front so the popover can seed its
        // checklist before any link exists, let alone gets activated.
        for entity in &entities {
            self.bus.publish(Notification::EntityDiscovered {
                entity: entity.clone(),
            });
        }

        for &paragraph in &setup.paragraphs {
            {
                let mut doc = self.document.write();
                for entity in &entities {
                    if let Err(err) = inject_entity_link(&mut doc, paragraph, entity) {
                        warn!(entity = %entity.name, error = %err, "skipping unserializable entity");
                    }
                }
            }
            // Activate the links this paragraph just gained.
            ctx.registry.bind(ctx.document, ctx.bus, paragraph).await;
        }
        Ok(())
    }
}

/// Replaces the first case-sensitive literal occurrence of `entity.name`
/// within the paragraph's pristine text runs with a link element carrying the
/// serialized entity record. Text already inside an injected link is never
/// matched, so names recurring in link labels or payloads cannot be annotated
/// twice. Returns whether a link was injected.
pub fn inject_entity_link(
    document: &mut Document,
    paragraph: NodeId,
    entity: &Entity,
) -> Result<bool, serde_json::Error> {
    if entity.name.is_empty() {
        return Ok(false);
    }
    let runs: Vec<NodeId> = document
        .text_runs(paragraph)
        .into_iter()
        .filter(|&run| is_pristine(document, run, paragraph))
        .collect();
    for run in runs {
        let Some(at) = document.text(run).and_then(|text| text.find(&entity.name)) else {
            continue;
        };
        let payload = entity.to_payload()?;
        let link = document.create_element("a");
        document.set_attr(link, "href", format!("#{}", entity.slug()));
        document.set_attr(link, COMPONENT_ATTR, ENTITY_LINK_COMPONENT);
        document.set_attr(link, ENTITY_ATTR, payload);
        document.append_text(link, &entity.name);
        document.split_text_run(run, at, entity.name.len(), link);
        return Ok(true);
    }
    Ok(false)
}

fn is_pristine(document: &Document, run: NodeId, paragraph: NodeId) -> bool {
    for ancestor in document.ancestors(run) {
        if ancestor == paragraph {
            break;
        }
        if document.attr(ancestor, COMPONENT_ATTR) == Some(ENTITY_LINK_COMPONENT) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Registry;
    use crate::catalog::ENTITIES_URL_MARKER;

    fn paragraph_with(text: &str) -> (Document, NodeId) {
        let mut doc = Document::new("body");
        let paragraph = doc.append_element(doc.root(), "p");
        doc.append_text(paragraph, text);
        (doc, paragraph)
    }

    fn links_in(doc: &Document, paragraph: NodeId) -> Vec<NodeId> {
        doc.elements_by_tag(paragraph, "a")
    }

    #[test]
    fn replaces_only_the_first_occurrence() {
        let (mut doc, paragraph) = paragraph_with("Acme builds things. Acme ships them.");
        let injected =
            inject_entity_link(&mut doc, paragraph, &Entity::new("Acme")).expect("inject");
        assert!(injected);

        let links = links_in(&doc, paragraph);
        assert_eq!(links.len(), 1);
        assert_eq!(doc.text_content(links[0]), "Acme");
        assert_eq!(doc.attr(links[0], "href"), Some("#acme"));
        assert_eq!(
            doc.text_content(paragraph),
            "Acme builds things. Acme ships them."
        );
    }

    #[test]
    fn payload_round_trips_through_the_injected_element() {
        let (mut doc, paragraph) = paragraph_with("Acme builds things");
        let mut entity = Entity::new("Acme");
        entity
            .extra
            .insert("founded".into(), serde_json::json!(1947));
        inject_entity_link(&mut doc, paragraph, &entity).expect("inject");

        let link = links_in(&doc, paragraph)[0];
        let raw = doc.attr(link, ENTITY_ATTR).expect("payload attr");
        assert_eq!(Entity::from_payload(raw).expect("parse"), entity);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let (mut doc, paragraph) = paragraph_with("acme builds things");
        let injected =
            inject_entity_link(&mut doc, paragraph, &Entity::new("Acme")).expect("inject");
        assert!(!injected);
        assert!(links_in(&doc, paragraph).is_empty());
    }

    #[test]
    fn earlier_catalog_entries_claim_overlapping_text_first() {
        let (mut doc, paragraph) = paragraph_with("Acme Corp is big.");
        // Catalog order: "Corp" first, then "Acme Corp".
        assert!(inject_entity_link(&mut doc, paragraph, &Entity::new("Corp")).expect("inject"));
        assert!(
            !inject_entity_link(&mut doc, paragraph, &Entity::new("Acme Corp")).expect("inject")
        );

        let links = links_in(&doc, paragraph);
        assert_eq!(links.len(), 1);
        assert_eq!(doc.text_content(links[0]), "Corp");
        assert_eq!(doc.text_content(paragraph), "Acme Corp is big.");
    }

    #[test]
    fn injected_labels_and_payloads_are_never_rematched() {
        let (mut doc, paragraph) = paragraph_with("Acme makes things");
        let mut acme = Entity::new("Acme");
        acme.extra
            .insert("motto".into(), serde_json::json!("quality things first"));
        assert!(inject_entity_link(&mut doc, paragraph, &acme).expect("inject"));

        // "Acme" now only exists as a link label; "quality" only inside the
        // serialized payload. Neither is annotatable text.
        assert!(!inject_entity_link(&mut doc, paragraph, &Entity::new("Acme")).expect("inject"));
        assert!(!inject_entity_link(&mut doc, paragraph, &Entity::new("quality")).expect("inject"));
        assert_eq!(links_in(&doc, paragraph).len(), 1);
    }

    #[test]
    fn matches_text_inside_nested_formatting() {
        let mut doc = Document::new("body");
        let paragraph = doc.append_element(doc.root(), "p");
        doc.append_text(paragraph, "We love ");
        let em = doc.append_element(paragraph, "em");
        doc.append_text(em, "Acme");
        doc.append_text(paragraph, " around here.");

        assert!(inject_entity_link(&mut doc, paragraph, &Entity::new("Acme")).expect("inject"));
        let links = links_in(&doc, paragraph);
        assert_eq!(links.len(), 1);
        assert_eq!(doc.parent(links[0]), Some(em));
    }

    async fn bind_article(doc: Document) -> (Arc<RwLock<Document>>, Arc<Bus>, usize) {
        let document = Arc::new(RwLock::new(doc));
        let bus = Arc::new(Bus::new());
        let mut registry = Registry::new();
        registry.register(ARTICLE_COMPONENT, factory);
        registry.register(ENTITY_LINK_COMPONENT, crate::entity_link::factory);
        let root = document.read().root();
        let bound = registry.bind(&document, &bus, root).await;
        (document, bus, bound)
    }

    #[tokio::test]
    async fn missing_catalog_marker_degrades_to_no_links() {
        let mut doc = Document::new("body");
        let article = doc.append_element(doc.root(), "article");
        doc.set_attr(article, COMPONENT_ATTR, ARTICLE_COMPONENT);
        let meta = doc.append_element(article, "meta");
        doc.set_attr(meta, "name", TERM_MARKER);
        doc.set_attr(meta, "content", "acme");
        let paragraph = doc.append_element(article, "p");
        doc.append_text(paragraph, "Acme builds things");

        let (document, _bus, bound) = bind_article(doc).await;
        assert_eq!(bound, 1);
        let doc = document.read();
        assert!(doc.elements_by_tag(doc.root(), "a").is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_no_links() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let mut doc = Document::new("body");
        let url_meta = doc.append_element(doc.root(), "meta");
        doc.set_attr(url_meta, "name", ENTITIES_URL_MARKER);
        doc.set_attr(url_meta, "content", format!("http://{addr}/entities.json"));
        let article = doc.append_element(doc.root(), "article");
        doc.set_attr(article, COMPONENT_ATTR, ARTICLE_COMPONENT);
        let meta = doc.append_element(article, "meta");
        doc.set_attr(meta, "name", TERM_MARKER);
        doc.set_attr(meta, "content", "acme");
        let paragraph = doc.append_element(article, "p");
        doc.append_text(paragraph, "Acme builds things");

        let (document, _bus, bound) = bind_article(doc).await;
        // The article still binds; annotation is best-effort.
        assert_eq!(bound, 1);
        let doc = document.read();
        assert!(doc.elements_by_tag(doc.root(), "a").is_empty());
    }
}
