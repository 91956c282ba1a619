use crate::error::{LoadResult, MalformedAnimation};
use crate::render_tree::ImageData;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use lottie_data::model as data;
use std::collections::HashMap;
use std::sync::Arc;

/// Encoded image bytes supplied by the host, keyed by asset id.
pub type ImageSources = HashMap<String, Vec<u8>>;

/// Decodes every image asset in `ids`.
///
/// Embedded `data:` URIs are decoded in place; anything else must be present
/// in `external`. The core never touches the filesystem.
pub(crate) fn decode_images<'a>(
    assets: &HashMap<&'a str, &'a data::Asset>,
    ids: impl IntoIterator<Item = &'a str>,
    external: &ImageSources,
) -> LoadResult<HashMap<String, Arc<ImageData>>> {
    let mut images = HashMap::new();
    for id in ids {
        if images.contains_key(id) {
            continue;
        }
        let Some(asset) = assets.get(id) else {
            continue;
        };
        let bytes = encoded_bytes(asset, external)?;
        let image = decode(id, &bytes)?;
        tracing::debug!(asset = id, width = image.width, height = image.height, "decoded image asset");
        images.insert(id.to_string(), Arc::new(image));
    }
    Ok(images)
}

fn encoded_bytes(asset: &data::Asset, external: &ImageSources) -> LoadResult<Vec<u8>> {
    if let Some(bytes) = external.get(&asset.id) {
        return Ok(bytes.clone());
    }

    let fail = |reason: &str| MalformedAnimation::ImageDecode {
        asset: asset.id.clone(),
        reason: reason.to_string(),
    };

    match asset.p.as_deref() {
        Some(p) if p.starts_with("data:") => {
            let (_, payload) = p.split_once(',').ok_or_else(|| fail("data URI has no payload"))?;
            if !p[..p.len() - payload.len()].contains(";base64") {
                return Err(fail("only base64 data URIs are supported"));
            }
            BASE64_STANDARD
                .decode(payload.trim())
                .map_err(|e| fail(&e.to_string()))
        }
        _ => Err(fail("no embedded data and no bytes supplied")),
    }
}

fn decode(id: &str, bytes: &[u8]) -> LoadResult<ImageData> {
    let rgba = image::load_from_memory(bytes)
        .map_err(|e| MalformedAnimation::ImageDecode {
            asset: id.to_string(),
            reason: e.to_string(),
        })?
        .to_rgba8();

    let (width, height) = rgba.dimensions();
    let mut pixels = rgba.into_raw();
    premultiply(&mut pixels);
    Ok(ImageData {
        width,
        height,
        pixels,
    })
}

fn premultiply(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
}
