use crate::binder::COMPONENT_ATTR;
use crate::catalog::Entity;
use crate::entity_link::{ENTITY_ATTR, ENTITY_LINK_COMPONENT};
use crate::markup::{Document, NodeId, escape_attr, escape_text};
use askama::Template;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateName {
    EntityLink,
    EntityDetail,
    Checklist,
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateName::EntityLink => write!(f, "entity-link"),
            TemplateName::EntityDetail => write!(f, "entity-detail"),
            TemplateName::Checklist => write!(f, "checklist"),
        }
    }
}

#[derive(Debug)]
pub enum RenderError {
    Template(TemplateName, askama::Error),
    Payload(serde_json::Error),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Template(name, err) => write!(f, "template {name} failed to render: {err}"),
            RenderError::Payload(err) => write!(f, "entity payload failed to serialize: {err}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<serde_json::Error> for RenderError {
    fn from(value: serde_json::Error) -> Self {
        RenderError::Payload(value)
    }
}

/// One checklist line: an entity plus its read status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistRow {
    pub name: String,
    pub slug: String,
    pub checked: bool,
}

#[derive(Debug, Clone)]
struct DetailField {
    label: String,
    value: String,
}

#[derive(Template)]
#[template(
    source = r##"<a href="#{{ slug }}" data-component="entity-link" data-entity="{{ payload }}">{{ name }}</a>"##,
    ext = "html"
)]
struct EntityLinkTemplate<'a> {
    name: &'a str,
    slug: &'a str,
    payload: &'a str,
}

#[derive(Template)]
#[template(
    source = r#"<article class="entity-detail" id="{{ slug }}">
  <h2>{{ name }}</h2>
  {% if fields.len() > 0 %}
  <dl>
    {% for field in fields %}
    <dt>{{ field.label }}</dt>
    <dd>{{ field.value }}</dd>
    {% endfor %}
  </dl>
  {% endif %}
</article>"#,
    ext = "html"
)]
struct EntityDetailTemplate<'a> {
    name: &'a str,
    slug: &'a str,
    fields: &'a [DetailField],
}

#[derive(Template)]
#[template(
    source = r#"<aside class="entity-checklist">
  <header><strong>{{ checked }}</strong> of {{ total }} explored</header>
  <ol>
    {% for row in rows %}
    <li data-slug="{{ row.slug }}" class="{% if row.checked %}checked{% else %}unchecked{% endif %}">{{ row.name }}</li>
    {% endfor %}
  </ol>
</aside>"#,
    ext = "html"
)]
struct ChecklistTemplate<'a> {
    checked: usize,
    total: usize,
    rows: &'a [ChecklistRow],
}

/// Typed facade over the three template renderers. The rendering engine is an
/// external collaborator; components only ever see `name + data -> markup`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Templates;

impl Templates {
    /// Markup for one injected reference: the activatable control carrying the
    /// entity's serialized record as its own payload.
    pub fn entity_link(&self, entity: &Entity) -> Result<String, RenderError> {
        let payload = entity.to_payload()?;
        let slug = entity.slug();
        EntityLinkTemplate {
            name: &entity.name,
            slug: &slug,
            payload: &payload,
        }
        .render()
        .map_err(|err| RenderError::Template(TemplateName::EntityLink, err))
    }

    /// Markup for the single-entity detail view.
    pub fn entity_detail(&self, entity: &Entity) -> Result<String, RenderError> {
        let fields: Vec<DetailField> = entity
            .extra
            .iter()
            .map(|(label, value)| DetailField {
                label: label.clone(),
                value: match value {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                },
            })
            .collect();
        let slug = entity.slug();
        EntityDetailTemplate {
            name: &entity.name,
            slug: &slug,
            fields: &fields,
        }
        .render()
        .map_err(|err| RenderError::Template(TemplateName::EntityDetail, err))
    }

    /// Markup for the aggregate checklist view.
    pub fn checklist(
        &self,
        checked: usize,
        total: usize,
        rows: &[ChecklistRow],
    ) -> Result<String, RenderError> {
        ChecklistTemplate {
            checked,
            total,
            rows,
        }
        .render()
        .map_err(|err| RenderError::Template(TemplateName::Checklist, err))
    }
}

/// Projects a subtree back to markup. Text runs are escaped, injected entity
/// links render through the entity-link template, and other elements render
/// generically.
pub fn render_fragment(
    document: &Document,
    node: NodeId,
    templates: &Templates,
) -> Result<String, RenderError> {
    let mut out = String::new();
    write_node(document, node, templates, &mut out)?;
    Ok(out)
}

fn write_node(
    document: &Document,
    node: NodeId,
    templates: &Templates,
    out: &mut String,
) -> Result<(), RenderError> {
    if let Some(text) = document.text(node) {
        out.push_str(&escape_text(text));
        return Ok(());
    }

    if document.attr(node, COMPONENT_ATTR) == Some(ENTITY_LINK_COMPONENT) {
        if let Some(entity) = document
            .attr(node, ENTITY_ATTR)
            .and_then(|raw| Entity::from_payload(raw).ok())
        {
            out.push_str(&templates.entity_link(&entity)?);
            return Ok(());
        }
        // Malformed payload: fall through to the generic form.
    }

    let Some(tag) = document.tag(node) else {
        return Ok(());
    };
    out.push('<');
    out.push_str(tag);
    if let Some(attrs) = document.attr_map(node) {
        for (name, value) in attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
    }
    let children = document.children(node).to_vec();
    if children.is_empty() {
        out.push_str("/>");
        return Ok(());
    }
    out.push('>');
    for child in children {
        write_node(document, child, templates, out)?;
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Entity {
        let mut entity = Entity::new("Acme");
        entity
            .extra
            .insert("founded".into(), serde_json::json!(1947));
        entity
            .extra
            .insert("motto".into(), serde_json::json!("quality < speed"));
        entity
    }

    #[test]
    fn entity_link_escapes_payload_into_the_attribute() {
        let templates = Templates;
        let markup = templates.entity_link(&acme()).expect("render");
        assert!(markup.starts_with(r##"<a href="#acme""##));
        assert!(markup.contains(r#"data-component="entity-link""#));
        assert!(markup.contains("&quot;name&quot;"));
        assert!(markup.ends_with(">Acme</a>"));
        assert!(!markup.contains("\"name\""));
    }

    #[test]
    fn entity_link_payload_round_trips() {
        let templates = Templates;
        let entity = acme();
        let markup = templates.entity_link(&entity).expect("render");
        let raw = markup
            .split("data-entity=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .expect("payload attribute");
        let unescaped = raw
            .replace("&quot;", "\"")
            .replace("&#x27;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&");
        let parsed = Entity::from_payload(&unescaped).expect("parse");
        assert_eq!(parsed, entity);
    }

    #[test]
    fn entity_detail_lists_opaque_fields() {
        let templates = Templates;
        let markup = templates.entity_detail(&acme()).expect("render");
        assert!(markup.contains("<h2>Acme</h2>"));
        assert!(markup.contains("<dt>founded</dt>"));
        assert!(markup.contains("<dd>1947</dd>"));
        assert!(markup.contains("quality &lt; speed"));
    }

    #[test]
    fn checklist_reports_counts_and_order() {
        let templates = Templates;
        let rows = vec![
            ChecklistRow {
                name: "Acme".into(),
                slug: "acme".into(),
                checked: true,
            },
            ChecklistRow {
                name: "Globex".into(),
                slug: "globex".into(),
                checked: false,
            },
        ];
        let markup = templates.checklist(1, 2, &rows).expect("render");
        assert!(markup.contains("<strong>1</strong> of 2 explored"));
        let acme_at = markup.find("data-slug=\"acme\"").expect("acme row");
        let globex_at = markup.find("data-slug=\"globex\"").expect("globex row");
        assert!(acme_at < globex_at);
        assert!(markup.contains(r#"class="checked">Acme"#));
        assert!(markup.contains(r#"class="unchecked">Globex"#));
    }

    #[test]
    fn fragment_projection_uses_the_link_template() {
        let templates = Templates;
        let mut doc = Document::new("body");
        let paragraph = doc.append_element(doc.root(), "p");
        doc.append_text(paragraph, "Acme & friends");
        let link = doc.append_element(paragraph, "a");
        doc.set_attr(link, "href", "#acme");
        doc.set_attr(link, COMPONENT_ATTR, ENTITY_LINK_COMPONENT);
        doc.set_attr(
            link,
            ENTITY_ATTR,
            Entity::new("Acme").to_payload().expect("payload"),
        );
        doc.append_text(link, "Acme");

        let markup = render_fragment(&doc, paragraph, &templates).expect("render");
        assert!(markup.starts_with("<p>Acme &amp; friends"));
        assert!(markup.contains(r##"<a href="#acme" data-component="entity-link""##));
        assert!(markup.ends_with("</p>"));
    }
}
