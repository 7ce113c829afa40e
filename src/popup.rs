//! Popup payload shown when a camera's overlay is clicked.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::artifact::{image_file_name, ArtifactStore};
use crate::record::CameraRecord;

pub const POPUP_WIDTH: u32 = 400;
pub const POPUP_HEIGHT: u32 = 330;

/// Where the popup image comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    /// Inline the stored thumbnail as a `data:` URI. The map works offline
    /// but grows by every thumbnail.
    Embedded,
    /// Link `{base_url}/img{id}.jpg` on a remote host.
    Remote { base_url: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Popup {
    pub image_reference: String,
    pub title: String,
    pub subtitle: String,
    pub width: u32,
    pub height: u32,
}

impl Popup {
    /// Centered image with the camera name and count underneath.
    pub fn to_html(&self) -> String {
        format!(
            concat!(
                "<div style=\"text-align: center;\">",
                "<img src=\"{}\" style=\"max-width: 100%;\">",
                "<h1 style=\"font-size: 17px;\">{}</h1>",
                "<p style=\"font-size: 15px;\">{}</p>",
                "</div>"
            ),
            escape_html(&self.image_reference),
            escape_html(&self.title),
            escape_html(&self.subtitle)
        )
    }
}

#[derive(Clone, Debug)]
pub struct PopupComposer {
    source: ImageSource,
}

impl PopupComposer {
    pub fn new(source: ImageSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    /// The record must carry a count; uncounted records never reach the map.
    pub fn compose(&self, record: &CameraRecord, artifacts: &dyn ArtifactStore) -> Result<Popup> {
        let count = record
            .car_count
            .ok_or_else(|| anyhow!("camera {} has no car count", record.id))?;
        let image_reference = match &self.source {
            ImageSource::Embedded => {
                let bytes = artifacts.read(&record.id)?;
                format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
            }
            ImageSource::Remote { base_url } => format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                image_file_name(&record.id)
            ),
        };
        Ok(Popup {
            image_reference,
            title: record.name.clone(),
            subtitle: format!("Cars Found: {}", count),
            width: POPUP_WIDTH,
            height: POPUP_HEIGHT,
        })
    }
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::InMemoryArtifactStore;

    fn counted(id: &str, name: &str, count: u32) -> CameraRecord {
        CameraRecord::new(id, name, 40.7, -73.9, "https://cam").with_car_count(count)
    }

    #[test]
    fn remote_popup_links_the_thumbnail() -> Result<()> {
        let composer = PopupComposer::new(ImageSource::Remote {
            base_url: "https://images.example.com/images/".to_string(),
        });
        let popup = composer.compose(&counted("42", "Broadway @ 42 St", 30), &InMemoryArtifactStore::new())?;
        assert_eq!(popup.image_reference, "https://images.example.com/images/img42.jpg");
        assert_eq!(popup.title, "Broadway @ 42 St");
        assert_eq!(popup.subtitle, "Cars Found: 30");
        assert_eq!((popup.width, popup.height), (400, 330));
        Ok(())
    }

    #[test]
    fn embedded_popup_inlines_stored_bytes() -> Result<()> {
        let artifacts = InMemoryArtifactStore::new();
        artifacts.write("7", b"abc")?;
        let popup = PopupComposer::new(ImageSource::Embedded).compose(&counted("7", "x", 0), &artifacts)?;
        assert_eq!(popup.image_reference, "data:image/jpeg;base64,YWJj");
        assert_eq!(popup.subtitle, "Cars Found: 0");
        Ok(())
    }

    #[test]
    fn embedded_popup_needs_the_thumbnail() {
        let composer = PopupComposer::new(ImageSource::Embedded);
        assert!(composer
            .compose(&counted("7", "x", 1), &InMemoryArtifactStore::new())
            .is_err());
    }

    #[test]
    fn uncounted_record_has_no_popup() {
        let composer = PopupComposer::new(ImageSource::Embedded);
        let record = CameraRecord::new("1", "x", 0.0, 0.0, "u");
        assert!(composer.compose(&record, &InMemoryArtifactStore::new()).is_err());
    }

    #[test]
    fn html_escapes_camera_names() {
        let popup = Popup {
            image_reference: "img.jpg".to_string(),
            title: "<b>FDR & 23 St</b>".to_string(),
            subtitle: "Cars Found: 3".to_string(),
            width: POPUP_WIDTH,
            height: POPUP_HEIGHT,
        };
        let html = popup.to_html();
        assert!(html.contains("&lt;b&gt;FDR &amp; 23 St&lt;/b&gt;"));
        assert!(html.contains("<p style=\"font-size: 15px;\">Cars Found: 3</p>"));
    }
}
