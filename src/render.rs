//! Map document output.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::artifact::write_atomic;
use crate::overlay::{LayerKind, OverlayStyle, PlannedCamera};
use crate::popup::{escape_html, Popup};

/// Default map center (New York City) and zoom.
pub const NEW_YORK: (f64, f64) = (40.730610, -73.935242);
pub const DEFAULT_ZOOM: u8 = 12;

const LEAFLET_VERSION: &str = "1.9.4";

/// A planned camera together with its popup.
#[derive(Clone, Debug)]
pub struct MapEntry {
    pub camera: PlannedCamera,
    pub popup: Popup,
}

pub trait MapRenderer {
    /// Render the whole map. `entries` are already in paint order.
    fn render(&self, entries: &[MapEntry]) -> Result<String>;

    fn render_to_file(&self, entries: &[MapEntry], path: &Path) -> Result<()> {
        let document = self.render(entries)?;
        write_atomic(path, document.as_bytes())
            .with_context(|| format!("failed to write map {}", path.display()))?;
        log::info!("map with {} cameras written to {}", entries.len(), path.display());
        Ok(())
    }
}

/// Single HTML page driving Leaflet: a Positron base layer, an OpenStreetMap
/// alternate, and one overlay group per `LayerKind`.
#[derive(Clone, Debug)]
pub struct LeafletRenderer {
    center: (f64, f64),
    zoom: u8,
}

impl Default for LeafletRenderer {
    fn default() -> Self {
        Self {
            center: NEW_YORK,
            zoom: DEFAULT_ZOOM,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CircleOptions<'a> {
    radius: f64,
    color: &'a str,
    weight: u32,
    opacity: f64,
    fill: bool,
    fill_color: &'a str,
    fill_opacity: f64,
}

impl<'a> From<&'a OverlayStyle> for CircleOptions<'a> {
    fn from(style: &'a OverlayStyle) -> Self {
        Self {
            radius: style.radius,
            color: style.color,
            weight: style.weight,
            opacity: style.opacity,
            fill: true,
            fill_color: style.fill_color,
            fill_opacity: style.fill_opacity,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CircleJs<'a> {
    id: &'a str,
    location: [f64; 2],
    options: CircleOptions<'a>,
    /// Index into the page's shared `popups` array.
    popup: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PopupJs {
    content: String,
    max_width: u32,
}

impl LeafletRenderer {
    pub fn new(center: (f64, f64), zoom: u8) -> Self {
        Self { center, zoom }
    }

    fn layer_json(&self, entries: &[MapEntry], kind: LayerKind) -> Result<String> {
        let circles: Vec<CircleJs> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| CircleJs {
                id: &entry.camera.record.id,
                location: [entry.camera.record.latitude, entry.camera.record.longitude],
                options: CircleOptions::from(entry.camera.style(kind)),
                popup: index,
            })
            .collect();
        script_json(&circles).context("serialize map layer")
    }

    /// Popups are emitted once and shared by both layers, so an embedded
    /// thumbnail appears a single time in the page.
    fn popups_json(&self, entries: &[MapEntry]) -> Result<String> {
        let popups: Vec<PopupJs> = entries
            .iter()
            .map(|entry| PopupJs {
                content: popup_frame(&entry.popup),
                max_width: entry.popup.width,
            })
            .collect();
        script_json(&popups).context("serialize popups")
    }
}

impl MapRenderer for LeafletRenderer {
    fn render(&self, entries: &[MapEntry]) -> Result<String> {
        let popups = self.popups_json(entries)?;
        let halos = self.layer_json(entries, LayerKind::Halo)?;
        let markers = self.layer_json(entries, LayerKind::Marker)?;
        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Traffic density</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@{version}/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@{version}/dist/leaflet.js"></script>
<style>html, body, #map {{ width: 100%; height: 100%; margin: 0; padding: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var map = L.map("map", {{ center: [{lat}, {lon}], zoom: {zoom} }});
var positron = L.tileLayer("https://{{s}}.basemaps.cartocdn.com/light_all/{{z}}/{{x}}/{{y}}{{r}}.png", {{
  attribution: "&copy; OpenStreetMap contributors &copy; CARTO",
  subdomains: "abcd",
  maxZoom: 20
}}).addTo(map);
var osm = L.tileLayer("https://tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png", {{
  attribution: "&copy; OpenStreetMap contributors",
  maxZoom: 19
}});
var popups = {popups};
function addCircles(group, circles) {{
  circles.forEach(function (c) {{
    var p = popups[c.popup];
    L.circle(c.location, c.options)
      .bindPopup(L.popup({{ maxWidth: p.maxWidth }}).setContent(p.content))
      .addTo(group);
  }});
  return group;
}}
var heatmap = addCircles(L.featureGroup(), {halos}).addTo(map);
var icons = addCircles(L.featureGroup(), {markers}).addTo(map);
L.control.layers(
  {{ "Cartodb Positron": positron, "OpenStreetMap": osm }},
  {{ "{halo_group}": heatmap, "{marker_group}": icons }}
).addTo(map);
</script>
</body>
</html>
"#,
            version = LEAFLET_VERSION,
            lat = self.center.0,
            lon = self.center.1,
            zoom = self.zoom,
            popups = popups,
            halos = halos,
            markers = markers,
            halo_group = LayerKind::Halo.group_name(),
            marker_group = LayerKind::Marker.group_name(),
        ))
    }
}

fn script_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_string(value)?;
    // Keep "</script>" inside string literals from closing the script block.
    Ok(json.replace("</", "<\\/"))
}

/// The popup body sits in a fixed-size iframe so its styles stay isolated
/// from the map page.
fn popup_frame(popup: &Popup) -> String {
    format!(
        r#"<iframe srcdoc="{}" width="{}" height="{}" style="border:none;"></iframe>"#,
        escape_html(&popup.to_html()),
        popup.width,
        popup.height
    )
}
