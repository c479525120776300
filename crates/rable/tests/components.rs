use std::rc::Rc;

use rable::{Path, Rable, RableOptions, TemplateLoader, Value};
use rable_scene::{Document, NodeId};
use serde_json::json;

const DOWNLOAD_LINK: &str = r##"
<component>
    <a class="link" :bind:href="url" @click="">{{ label }} {{ version }}</a>
</component>
<data>{ "label": "Download", "url": "#none", "version": "0" }</data>
<style>
    .link { color: red; }
    span, .icon { margin: 0; }
</style>
"##;

fn page(body: &str, data: serde_json::Value) -> Rable {
    let _ = env_logger::builder().is_test(true).try_init();
    let data = data.as_object().cloned().unwrap_or_default();
    let app = Rable::new(
        Document::parse(&format!(r#"<div id="app">{body}</div>"#)),
        RableOptions::default().with_data(data),
    );
    assert!(app.import_component("Download-Link", DOWNLOAD_LINK));
    assert!(app.mount("#app"));
    app
}

fn links(app: &Rable) -> Vec<NodeId> {
    app.document()
        .query_selector_all("a[component-type=download-link]")
        .unwrap()
}

fn identifier(app: &Rable, node: NodeId) -> String {
    app.document()
        .attribute(node, "component-identifier")
        .unwrap_or_default()
}

#[test]
fn hosts_are_replaced_by_tagged_roots() {
    let app = page(
        r#"<download-link $url="/a.zip"></download-link><download-link></download-link>"#,
        json!({}),
    );
    let document = app.document();
    assert!(document.query_selector("download-link").unwrap().is_none());
    let links = links(&app);
    assert_eq!(links.len(), 2);
    assert_ne!(identifier(&app, links[0]), identifier(&app, links[1]));
    assert!(identifier(&app, links[0]).starts_with("component-"));

    assert_eq!(document.attribute(links[0], "href").as_deref(), Some("/a.zip"));
    assert_eq!(document.attribute(links[1], "href").as_deref(), Some("#none"));
    assert_eq!(document.inner_text(links[1]), "Download 0");
    assert_eq!(app.components(), vec!["download-link".to_string()]);
    assert!(!app.import_component("download-link", DOWNLOAD_LINK));
}

#[test]
fn instances_keep_separate_state() {
    let app = page(
        r#"<download-link></download-link><download-link></download-link>"#,
        json!({ "label": "root" }),
    );
    let links = links(&app);
    let first = app.component_state(&identifier(&app, links[0])).unwrap();
    let second = app.component_state(&identifier(&app, links[1])).unwrap();
    assert!(!Rc::ptr_eq(&first, &second));

    first.write(&Path::parse("label"), "Mirror".into());
    assert_eq!(app.document().inner_text(links[0]), "Mirror 0");
    assert_eq!(app.document().inner_text(links[1]), "Download 0");
    assert_eq!(app.state().read(&Path::parse("label")), Value::from("root"));
    assert_eq!(app.instances().len(), 2);
}

#[test]
fn binders_redirect_to_the_parent_in_both_directions() {
    let app = page(
        r#"<download-link :bind:bar="version"></download-link><p id="bar">{{ bar }}</p>"#,
        json!({ "bar": 1 }),
    );
    let link = links(&app)[0];
    let state = app.component_state(&identifier(&app, link)).unwrap();
    assert_eq!(state.read(&Path::parse("version")), Value::from(1));

    state.write(&Path::parse("version"), 5.into());
    assert_eq!(app.state().read(&Path::parse("bar")), Value::from(5));
    let bar = app.document().query_selector("#bar").unwrap().unwrap();
    assert_eq!(app.document().inner_text(bar), "5");

    app.state().write(&Path::parse("bar"), 9.into());
    assert_eq!(state.read(&Path::parse("version")), Value::from(9));
    assert_eq!(app.document().inner_text(link), "Download 9");
}

#[test]
fn shorthand_binder_uses_the_origin_name() {
    let app = page(r#"<download-link &version></download-link>"#, json!({ "version": "3.1" }));
    let link = links(&app)[0];
    assert_eq!(app.document().inner_text(link), "Download 3.1");
}

#[test]
fn component_events_run_in_the_parent_scope() {
    let app = page(
        r#"<download-link @click="clicks = clicks + 1; last = componentData.label + ':' + event.type"></download-link>"#,
        json!({ "clicks": 0 }),
    );
    let link = links(&app)[0];
    app.document().click(link);
    app.document().click(link);
    assert_eq!(app.state().read(&Path::parse("clicks")), Value::from(2));
    assert_eq!(app.state().read(&Path::parse("last")), Value::from("Download:click"));
}

#[test]
fn host_conditions_join_the_parent_chain() {
    let app = page(
        r#"<download-link id="first" :if="mode == 'a'"></download-link><p id="other" :else>other</p>"#,
        json!({ "mode": "a" }),
    );
    let document = app.document();
    let link = links(&app)[0];
    let other = document.query_selector("#other").unwrap().unwrap();
    assert!(!document.is_hidden(link));
    assert!(document.is_hidden(other));

    app.state().write(&Path::parse("mode"), "b".into());
    assert!(document.is_hidden(link));
    assert!(!document.is_hidden(other));
}

#[test]
fn one_scoped_stylesheet_per_type() {
    let app = page(
        r#"<download-link></download-link><download-link></download-link>"#,
        json!({}),
    );
    let document = app.document();
    let styles = document
        .query_selector_all("style[component-type=download-link]")
        .unwrap();
    assert_eq!(styles.len(), 1);
    assert_eq!(document.parent(styles[0]), Some(document.head()));
    let css = document.inner_text(styles[0]);
    assert!(css.contains(".link[component-type=download-link] {"));
    assert!(css.contains("[component-type=download-link] span, [component-type=download-link] .icon {"));
    assert_eq!(app.styled_components(), vec!["download-link".to_string()]);
}

#[test]
fn components_render_inside_loops() {
    let app = page(
        r#"<download-link :for="release in releases" :bind:release="version"></download-link>"#,
        json!({ "releases": ["1.0", "2.0"] }),
    );
    let texts: Vec<String> = links(&app)
        .into_iter()
        .filter(|link| !app.document().is_hidden(*link))
        .map(|link| app.document().inner_text(link))
        .collect();
    assert_eq!(texts, vec!["Download 1.0", "Download 2.0"]);
}

#[test]
fn loop_rerenders_release_replaced_instances() {
    let app = page(
        r#"<download-link :for="release in releases" :bind:release="version"></download-link>"#,
        json!({ "releases": ["1.0", "2.0"], "ticks": 0 }),
    );
    assert_eq!(app.instances().len(), 2);

    for tick in 0..50_usize {
        app.state().write(&Path::parse("ticks"), Value::from(tick));
    }
    let live: Vec<String> = links(&app)
        .into_iter()
        .map(|link| identifier(&app, link))
        .collect();
    let registered: Vec<String> = app
        .instances()
        .into_iter()
        .map(|(identifier, _)| identifier)
        .collect();
    assert_eq!(registered, live);
    assert_eq!(registered.len(), 2);
}

#[test]
fn empty_host_seeds_keep_the_template_data() {
    let app = page(r#"<download-link $label="" $version="2"></download-link>"#, json!({}));
    assert_eq!(app.document().inner_text(links(&app)[0]), "Download 2");
}

#[test]
fn component_events_wait_for_synced_controls() {
    let app = Rable::new(
        Document::parse(r#"<div id="app"><echo-field @input="seen = componentData.text"></echo-field></div>"#),
        RableOptions::default().with_data(json!({ "seen": "" }).as_object().cloned().unwrap()),
    );
    assert!(app.import_component(
        "echo-field",
        r#"<component><input @input="" :value="text"></component><data>{ "text": "start" }</data>"#,
    ));
    assert!(app.mount("#app"));

    let field = app
        .document()
        .query_selector("input[component-type=echo-field]")
        .unwrap()
        .unwrap();
    app.document().input(field, "typed");
    assert_eq!(app.state().read(&Path::parse("seen")), Value::from("typed"));
}

#[test]
fn broken_templates_degrade_gracefully() {
    let app = Rable::new(
        Document::parse(r#"<div id="app"><bad-data></bad-data><no-root>kept</no-root></div>"#),
        RableOptions::default(),
    );
    app.import_component(
        "bad-data",
        r#"<component><b>{{ label }}</b></component><data>{ not json</data>"#,
    );
    app.import_component("no-root", "<data>{}</data>");
    assert!(app.mount("#app"));

    let document = app.document();
    let bold = document
        .query_selector("b[component-type=bad-data]")
        .unwrap()
        .unwrap();
    assert_eq!(document.inner_text(bold), "");
    assert!(document.query_selector("no-root").unwrap().is_some());
}

struct Templates;

impl TemplateLoader for Templates {
    fn load(&self, path: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        match path {
            "download-link.html" => Ok(DOWNLOAD_LINK.to_string()),
            _ => Err(format!("no template at {path}").into()),
        }
    }
}

#[test]
fn templates_load_through_a_loader() {
    let app = Rable::new(Document::new(), RableOptions::default());
    assert!(app.load_component("download-link", "download-link.html", &Templates).unwrap());
    let error = app
        .load_component("missing", "missing.html", &Templates)
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "Failed to load component 'missing' from 'missing.html': no template at missing.html"
    );
}
