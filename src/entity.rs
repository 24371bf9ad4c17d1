//! Entity model: the flattened metadata record for one image and the
//! cacheable [`Image`] view built on top of it.

use crate::error::{Error, Result};
use crate::types::MediaId;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use url::Url;

/// Stores one looked-up value into its [`MetadataEntry`] field
pub type FieldSetter = fn(&mut MetadataEntry, &Value);

/// Where a flattened field is read from in a raw entry document, and how it
/// is stored
#[derive(Clone, Copy, Debug)]
pub struct FieldSource {
    /// Output field name in [`MetadataEntry`]
    pub name: &'static str,
    /// Nested object holding the value, or `None` for a top-level field
    pub container: Option<&'static str>,
    /// Key of the value inside its container
    pub key: &'static str,
    /// Setter for the output field
    pub apply: FieldSetter,
}

const fn top(name: &'static str, apply: FieldSetter) -> FieldSource {
    FieldSource {
        name,
        container: None,
        key: name,
        apply,
    }
}

const fn nested(
    name: &'static str,
    container: &'static str,
    key: &'static str,
    apply: FieldSetter,
) -> FieldSource {
    FieldSource {
        name,
        container: Some(container),
        key,
        apply,
    }
}

/// Every recognized field of a raw entry, where to find it and where it goes
pub const FIELD_TABLE: &[FieldSource] = &[
    top("upload_date", |e, v| e.upload_date = v.as_i64()),
    top("is_featured", |e, v| e.is_featured = v.as_bool()),
    top("height", |e, v| e.height = as_u32(v)),
    top("width", |e, v| e.width = as_u32(v)),
    top("description", |e, v| e.description = as_string(v)),
    top("tags", |e, v| e.tags = Some(v.clone())),
    top("permalink", |e, v| e.permalink = as_string(v)),
    top("responsive_url", |e, v| e.responsive_url = as_string(v)),
    top("_id", |e, v| e.id = as_string(v).map(MediaId::from)),
    top("is_video", |e, v| e.is_video = v.as_bool()),
    top("grid_name", |e, v| e.grid_name = as_string(v)),
    top("perma_subdomain", |e, v| e.perma_subdomain = as_string(v)),
    top("site_id", |e, v| e.site_id = as_u64(v)),
    nested("iso", "image_meta", "iso", |e, v| e.iso = as_u64(v)),
    nested("model", "image_meta", "model", |e, v| e.model = as_string(v)),
    nested("make", "image_meta", "make", |e, v| e.make = as_string(v)),
    nested("preset", "preset", "short_name", |e, v| e.preset = as_string(v)),
    nested("preset_bg_color", "preset", "color", |e, v| {
        e.preset_bg_color = as_string(v)
    }),
];

/// Look up one field of a raw document; absent containers, keys and JSON
/// nulls all read as `None`.
pub fn lookup<'a>(raw: &'a Value, source: &FieldSource) -> Option<&'a Value> {
    let scope = match source.container {
        Some(container) => raw.get(container)?,
        None => raw,
    };
    scope.get(source.key).filter(|v| !v.is_null())
}

/// Flattened attributes of one image
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Identifier, unique within an account
    #[serde(rename = "_id")]
    pub id: Option<MediaId>,
    /// Upload timestamp as reported by the service
    pub upload_date: Option<i64>,
    /// Whether the image is featured
    pub is_featured: Option<bool>,
    /// Original height in pixels
    pub height: Option<u32>,
    /// Original width in pixels
    pub width: Option<u32>,
    /// Caption
    pub description: Option<String>,
    /// Tags, kept in the service's own shape
    pub tags: Option<Value>,
    /// Public page of the image
    pub permalink: Option<String>,
    /// Scheme-less base URL of the resizable image
    pub responsive_url: Option<String>,
    /// Whether the entry is a video
    pub is_video: Option<bool>,
    /// Display name of the owning grid
    pub grid_name: Option<String>,
    /// Subdomain of the owning grid
    pub perma_subdomain: Option<String>,
    /// Numeric site id of the owner
    pub site_id: Option<u64>,
    /// ISO sensitivity
    pub iso: Option<u64>,
    /// Camera model
    pub model: Option<String>,
    /// Camera make
    pub make: Option<String>,
    /// Short name of the applied preset
    pub preset: Option<String>,
    /// Background color of the applied preset
    pub preset_bg_color: Option<String>,
    /// "make model", synthesized from the two camera fields
    pub camera: Option<String>,
}

impl MetadataEntry {
    /// Flatten a raw entry document using [`FIELD_TABLE`].
    ///
    /// Missing or mistyped fields become `None`; this never fails.
    pub fn from_raw(raw: &Value) -> Self {
        let mut entry = MetadataEntry::default();
        for source in FIELD_TABLE {
            if let Some(value) = lookup(raw, source) {
                (source.apply)(&mut entry, value);
            }
        }
        entry.camera = camera_label(entry.make.as_deref(), entry.model.as_deref());
        entry
    }

    /// Value of one flattened attribute by name, `None` when absent.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let Ok(Value::Object(map)) = serde_json::to_value(self) else {
            return None;
        };
        map.get(name).filter(|v| !v.is_null()).cloned()
    }
}

fn camera_label(make: Option<&str>, model: Option<&str>) -> Option<String> {
    match (make, model) {
        (Some(make), Some(model)) => Some(format!("{make} {model}")),
        (Some(one), None) | (None, Some(one)) => Some(one.to_string()),
        (None, None) => None,
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    as_u64(value).and_then(|v| u32::try_from(v).ok())
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Deterministic cache location of one image at one width
pub fn cache_path(image_root: &Path, subdomain: &str, id: &MediaId, width: u32) -> PathBuf {
    image_root.join(subdomain).join(format!("{id}-{width}.jpg"))
}

/// Download URL of one image at one width
pub fn download_url(scheme: &str, responsive_url: &str, width: u32) -> Result<Url> {
    let base = if responsive_url.contains("://") {
        responsive_url.to_string()
    } else {
        format!("{scheme}://{responsive_url}")
    };
    let mut url = Url::parse(&base)?;
    url.query_pairs_mut()
        .append_pair("w", &width.to_string());
    Ok(url)
}

/// A cacheable image: one metadata entry at a requested width
///
/// Shared between pool workers as `Arc<Image>`; the decoded pixel buffer is
/// memoized behind a [`OnceCell`], so concurrent callers decode at most once.
#[derive(Debug)]
pub struct Image {
    entry: MetadataEntry,
    id: MediaId,
    subdomain: String,
    width: u32,
    link: Url,
    local_path: PathBuf,
    pixels: OnceCell<Arc<RgbImage>>,
}

impl Image {
    /// Build an image view.
    ///
    /// `width` defaults to the entry's own width. `fallback_subdomain` is used
    /// when the entry does not name its grid. The identifier and subdomain
    /// become path components, so values that could leave the cache
    /// directory are rejected. No directory is created here; see
    /// [`Image::cache_dir`].
    pub fn new(
        entry: MetadataEntry,
        image_root: &Path,
        fallback_subdomain: &str,
        image_scheme: &str,
        width: Option<u32>,
    ) -> Result<Self> {
        let id = entry.id.clone().ok_or_else(|| missing("_id"))?;
        let width = width.or(entry.width).ok_or_else(|| missing("width"))?;
        let responsive_url = entry
            .responsive_url
            .as_deref()
            .ok_or_else(|| missing("responsive_url"))?;
        let subdomain = entry
            .perma_subdomain
            .clone()
            .unwrap_or_else(|| fallback_subdomain.to_string());

        check_component("_id", id.as_str())?;
        check_component("perma_subdomain", &subdomain)?;

        let link = download_url(image_scheme, responsive_url, width)?;
        let local_path = cache_path(image_root, &subdomain, &id, width);

        Ok(Self {
            entry,
            id,
            subdomain,
            width,
            link,
            local_path,
            pixels: OnceCell::new(),
        })
    }

    /// Identifier of the image
    pub fn id(&self) -> &MediaId {
        &self.id
    }

    /// Flattened metadata
    pub fn entry(&self) -> &MetadataEntry {
        &self.entry
    }

    /// Subdomain the cache path is scoped to
    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    /// Width requested from the image endpoint
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Download URL
    pub fn link(&self) -> &Url {
        &self.link
    }

    /// Local cache file
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Directory holding the cache file
    pub fn cache_dir(&self) -> &Path {
        self.local_path.parent().unwrap_or(Path::new(""))
    }

    /// Whether the cache file exists
    pub async fn is_cached(&self) -> bool {
        tokio::fs::try_exists(&self.local_path)
            .await
            .unwrap_or(false)
    }

    /// Decoded RGB pixels, downloading the image first when it is not cached.
    pub async fn pixels(
        &self,
        client: &reqwest::Client,
        chunk_size: usize,
    ) -> Result<Arc<RgbImage>> {
        self.pixels
            .get_or_try_init(|| async {
                if !self.is_cached().await {
                    crate::images::cache_image(client, self, chunk_size).await?;
                }
                let path = self.local_path.clone();
                let decoded = tokio::task::spawn_blocking(move || {
                    image::open(&path)
                        .map(|img| img.to_rgb8())
                        .map_err(|e| Error::Decode {
                            path,
                            reason: e.to_string(),
                        })
                })
                .await
                .map_err(|e| Error::WorkerPanicked(e.to_string()))??;
                Ok::<_, Error>(Arc::new(decoded))
            })
            .await
            .cloned()
    }
}

fn check_component(field: &str, value: &str) -> Result<()> {
    let unsafe_name = value.is_empty()
        || value.starts_with('.')
        || value.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(Error::UnsafePathComponent {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn missing(field: &str) -> Error {
    Error::MissingField {
        field: field.to_string(),
        url: "metadata entry".to_string(),
    }
}
