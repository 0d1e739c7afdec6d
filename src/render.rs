//! Turns a structure snapshot into the HTML page pushed to the panel.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use handlebars::Handlebars;
use parley_plugin::message::{PanelPreferences, StructureSnapshot, ThemeInfo};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::palette::ColorMap;

const FLOWCHART_TEMPLATE: &str = include_str!("../assets/templates/flowchart.hbs");
const PLACEHOLDER_TEMPLATE: &str = include_str!("../assets/templates/placeholder.hbs");
const FLOWCHART_CSS: &str = include_str!("../assets/static/flowchart.css");
const FLOWCHART_JS: &str = include_str!("../assets/static/flowchart.js");

const FLOWCHART: &str = "flowchart";
const PLACEHOLDER: &str = "placeholder";

pub const D3_FILE: &str = "d3.v7.min.js";
pub const DAGRE_FILE: &str = "dagre.min.js";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not read asset {}: {source}", .path.display())]
    Asset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid template: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),
    #[error("render failed: {0}")]
    Render(#[from] handlebars::RenderError),
    #[error("could not encode page data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Page template, styling and scripts. Built-in copies are compiled in; an
/// assets directory can override them and supplies the vendored layout
/// libraries, which are not shipped with the binary.
#[derive(Debug, Clone)]
pub struct Assets {
    pub template: String,
    pub placeholder: String,
    pub css: String,
    pub js: String,
    pub d3: Option<String>,
    pub dagre: Option<String>,
}

impl Default for Assets {
    fn default() -> Self {
        Self {
            template: FLOWCHART_TEMPLATE.to_string(),
            placeholder: PLACEHOLDER_TEMPLATE.to_string(),
            css: FLOWCHART_CSS.to_string(),
            js: FLOWCHART_JS.to_string(),
            d3: None,
            dagre: None,
        }
    }
}

impl Assets {
    /// Layout under `dir`:
    /// ```text
    /// templates/flowchart.hbs   templates/placeholder.hbs
    /// static/flowchart.css      static/flowchart.js
    /// vendor/d3.v7.min.js       vendor/dagre.min.js
    /// ```
    /// Every file is optional; missing ones keep the built-in version.
    pub fn load(dir: Option<&Path>) -> Result<Self, RenderError> {
        let mut assets = Self::default();
        let Some(dir) = dir else {
            warn!("no assets directory configured, layout scripts unavailable");
            return Ok(assets);
        };

        if let Some(t) = read_optional(&dir.join("templates").join("flowchart.hbs"))? {
            assets.template = t;
        }
        if let Some(t) = read_optional(&dir.join("templates").join("placeholder.hbs"))? {
            assets.placeholder = t;
        }
        if let Some(css) = read_optional(&dir.join("static").join("flowchart.css"))? {
            assets.css = css;
        }
        if let Some(js) = read_optional(&dir.join("static").join("flowchart.js"))? {
            assets.js = js;
        }
        assets.d3 = read_optional(&dir.join("vendor").join(D3_FILE))?;
        assets.dagre = read_optional(&dir.join("vendor").join(DAGRE_FILE))?;

        if assets.has_layout_scripts() {
            debug!(dir = %dir.display(), "loaded bundled assets");
        } else {
            warn!(dir = %dir.display(), "d3/dagre not found under vendor/, the panel will only show an error banner");
        }
        Ok(assets)
    }

    pub fn has_layout_scripts(&self) -> bool {
        self.d3.is_some() && self.dagre.is_some()
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, RenderError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(RenderError::Asset { path: path.to_path_buf(), source }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl From<&ThemeInfo> for Theme {
    fn from(info: &ThemeInfo) -> Self {
        if info.is_dark { Theme::Dark } else { Theme::Light }
    }
}

/// Everything one flowchart page depends on.
#[derive(Debug)]
pub struct RenderInput<'a> {
    pub panel_id: &'a str,
    pub dialog_name: &'a str,
    pub snapshot: &'a StructureSnapshot,
    pub colors: &'a ColorMap,
    pub theme: Theme,
    pub selected: Option<&'a str>,
    pub prefs: PanelPreferences,
}

#[derive(Serialize)]
struct PageData<'a> {
    css: &'a str,
    d3: &'a str,
    dagre: &'a str,
    js: &'a str,
    theme: &'static str,
    dialog_name: &'a str,
    node_count: usize,
    panel_id: String,
    dialog_data: String,
    speaker_colors: String,
    selected_node_id: String,
    auto_refresh_icon: &'static str,
    auto_refresh_enabled: bool,
    sync_selection_enabled: bool,
    sync_checked: &'static str,
}

#[derive(Serialize)]
struct PlaceholderData<'a> {
    title: &'a str,
    message: &'a str,
}

pub struct Renderer {
    hbs: Handlebars<'static>,
    assets: Assets,
}

impl Renderer {
    pub fn new(assets: Assets) -> Result<Self, RenderError> {
        let mut hbs = Handlebars::new();
        hbs.set_strict_mode(true);
        hbs.register_template_string(FLOWCHART, &assets.template).map_err(Box::new)?;
        hbs.register_template_string(PLACEHOLDER, &assets.placeholder).map_err(Box::new)?;
        Ok(Self { hbs, assets })
    }

    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    pub fn render(&self, input: &RenderInput<'_>) -> Result<String, RenderError> {
        let dialog_name = if input.dialog_name.is_empty() { "Untitled" } else { input.dialog_name };
        let data = PageData {
            css: &self.assets.css,
            d3: self.assets.d3.as_deref().unwrap_or_default(),
            dagre: self.assets.dagre.as_deref().unwrap_or_default(),
            js: &self.assets.js,
            theme: input.theme.as_str(),
            dialog_name,
            node_count: input.snapshot.nodes.len(),
            panel_id: script_json(&input.panel_id)?,
            dialog_data: script_json(input.snapshot)?,
            speaker_colors: script_json(input.colors)?,
            selected_node_id: script_json(&input.selected)?,
            auto_refresh_icon: if input.prefs.auto_refresh_enabled { "\u{23F8}" } else { "\u{25B6}" },
            auto_refresh_enabled: input.prefs.auto_refresh_enabled,
            sync_selection_enabled: input.prefs.sync_selection_enabled,
            sync_checked: if input.prefs.sync_selection_enabled { "checked" } else { "" },
        };
        Ok(self.hbs.render(FLOWCHART, &data)?)
    }

    /// The page shown while no dialog is open.
    pub fn placeholder(&self) -> Result<String, RenderError> {
        let data = PlaceholderData { title: "Flowchart View", message: "Open a dialog file to view the flowchart" };
        Ok(self.hbs.render(PLACEHOLDER, &data)?)
    }
}

/// JSON that is safe to inline inside a `<script>` element.
fn script_json<T: Serialize + ?Sized>(value: &T) -> Result<String, RenderError> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::demo_snapshot;
    use crate::palette;
    use parley_plugin::message::{Node, NodeKind};

    fn page(snapshot: &StructureSnapshot, theme: Theme, selected: Option<&str>, prefs: PanelPreferences) -> String {
        let renderer = Renderer::new(Assets::default()).unwrap();
        let colors = palette::fallback(&snapshot.nodes);
        renderer
            .render(&RenderInput {
                panel_id: "flowchart-view",
                dialog_name: "guard.dlg",
                snapshot,
                colors: &colors,
                theme,
                selected,
                prefs,
            })
            .unwrap()
    }

    #[test]
    fn page_embeds_graph_and_settings() {
        let html = page(&demo_snapshot(), Theme::Light, Some("npc_2"), PanelPreferences::default());
        assert!(html.contains(r#"data-theme="light""#));
        assert!(html.contains("11 nodes"));
        assert!(html.contains(r#"selectedNodeId: "npc_2""#));
        assert!(html.contains(r##""Guard":"#BA68C8""##));
        assert!(html.contains("autoRefresh: true"));
        assert!(html.contains(r#"id="chk-sync" checked"#));
        assert!(html.contains("guard.dlg"));
    }

    #[test]
    fn paused_page_shows_play_icon_and_unchecked_sync() {
        let prefs = PanelPreferences { auto_refresh_enabled: false, sync_selection_enabled: false };
        let html = page(&demo_snapshot(), Theme::Dark, None, prefs);
        assert!(html.contains("\u{25B6}"));
        assert!(html.contains("selectedNodeId: null"));
        assert!(html.contains("syncSelection: false"));
        assert!(!html.contains(r#"id="chk-sync" checked"#));
    }

    #[test]
    fn script_breakout_in_node_text_is_neutralised() {
        let snapshot = StructureSnapshot {
            nodes: vec![Node::new("n", NodeKind::Npc, "</script><script>alert(1)</script>")],
            links: vec![],
        };
        let html = page(&snapshot, Theme::Dark, None, PanelPreferences::default());
        assert!(!html.contains("</script><script>alert"));
        assert!(html.contains(r"<\/script><script>alert(1)<\/script>"));
    }

    #[test]
    fn dialog_name_is_html_escaped() {
        let renderer = Renderer::new(Assets::default()).unwrap();
        let snapshot = StructureSnapshot::default();
        let colors = ColorMap::new();
        let html = renderer
            .render(&RenderInput {
                panel_id: "p",
                dialog_name: "<b>bold</b>",
                snapshot: &snapshot,
                colors: &colors,
                theme: Theme::Dark,
                selected: None,
                prefs: PanelPreferences::default(),
            })
            .unwrap();
        assert!(!html.contains("<b>bold</b>"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
    }

    #[test]
    fn placeholder_asks_for_a_dialog() {
        let html = Renderer::new(Assets::default()).unwrap().placeholder().unwrap();
        assert!(html.contains("Open a dialog file to view the flowchart"));
    }

    #[test]
    fn assets_dir_supplies_vendor_scripts_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vendor")).unwrap();
        fs::create_dir_all(dir.path().join("static")).unwrap();
        fs::write(dir.path().join("vendor").join(D3_FILE), "var d3 = {};").unwrap();
        fs::write(dir.path().join("vendor").join(DAGRE_FILE), "var dagre = {};").unwrap();
        fs::write(dir.path().join("static").join("flowchart.css"), "body{}").unwrap();

        let assets = Assets::load(Some(dir.path())).unwrap();
        assert!(assets.has_layout_scripts());
        assert_eq!(assets.css, "body{}");
        assert_eq!(assets.js, FLOWCHART_JS);

        let html = page_with(assets);
        assert!(html.contains("var d3 = {};"));
        assert!(html.contains("var dagre = {};"));
    }

    #[test]
    fn missing_assets_dir_keeps_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let assets = Assets::load(Some(dir.path())).unwrap();
        assert!(!assets.has_layout_scripts());
        assert_eq!(assets.template, FLOWCHART_TEMPLATE);
    }

    #[test]
    fn broken_template_is_reported() {
        let assets = Assets { template: "{{#if}}".into(), ..Assets::default() };
        assert!(matches!(Renderer::new(assets), Err(RenderError::Template(_))));
    }

    fn page_with(assets: Assets) -> String {
        let renderer = Renderer::new(assets).unwrap();
        let snapshot = demo_snapshot();
        let colors = ColorMap::new();
        renderer
            .render(&RenderInput {
                panel_id: "p",
                dialog_name: "",
                snapshot: &snapshot,
                colors: &colors,
                theme: Theme::default(),
                selected: None,
                prefs: PanelPreferences::default(),
            })
            .unwrap()
    }
}
