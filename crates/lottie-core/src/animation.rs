use crate::assets::{self, ImageSources};
use crate::error::{LoadResult, MalformedAnimation};
use crate::render_tree::{ImageData, MatteMode};
use crate::validate::{check_layer_keyframes, layer_label};
use lottie_data::model::{self as data, LottieJson};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) type CompId = usize;
pub(crate) const ROOT: CompId = 0;

/// A layer list with its index lookup. The root composition and every
/// precomposition asset get one each.
#[derive(Debug)]
pub(crate) struct Composition {
    pub name: String,
    /// Index into `assets`, `None` for the root.
    pub asset: Option<usize>,
    /// Layer `ind` to position in the layer list.
    pub by_index: HashMap<u32, usize>,
    /// Matted layer position to its source position and mode.
    pub mattes: HashMap<usize, (usize, MatteMode)>,
    /// Positions that only ever draw as a matte.
    pub matte_sources: HashSet<usize>,
}

impl Composition {
    fn new(name: String, asset: Option<usize>, layers: &[data::Layer]) -> LoadResult<Self> {
        let by_index = index_layers(&name, layers)?;
        let mut composition = Composition {
            name,
            asset,
            by_index,
            mattes: HashMap::new(),
            matte_sources: HashSet::new(),
        };
        composition.resolve_mattes(layers)?;
        Ok(composition)
    }

    /// Pairs every `tt` layer with its source: the layer named by `tp`, or
    /// the layer right above it. Sources are marked so they are not drawn
    /// on their own, as is every `td` layer.
    fn resolve_mattes(&mut self, layers: &[data::Layer]) -> LoadResult<()> {
        for (pos, layer) in layers.iter().enumerate() {
            if layer.td.unwrap_or(0) != 0 {
                self.matte_sources.insert(pos);
            }
            let Some(tt) = layer.tt else {
                continue;
            };
            let Some(mode) = MatteMode::from_lottie(tt) else {
                if tt != 0 {
                    warn!(layer = %layer_label(layer), tt, "unknown track matte mode ignored");
                }
                continue;
            };
            let source = match layer.tp {
                Some(tp) => Some(self.by_index.get(&tp).copied().ok_or_else(|| {
                    MalformedAnimation::UnresolvedMatte {
                        composition: self.name.clone(),
                        layer: layer_label(layer),
                        matte: tp,
                    }
                })?),
                None => pos.checked_sub(1),
            };
            match source {
                Some(source) if source != pos => {
                    self.mattes.insert(pos, (source, mode));
                    self.matte_sources.insert(source);
                }
                _ => warn!(layer = %layer_label(layer), "track matte has no source layer"),
            }
        }
        Ok(())
    }
}

/// A validated, immutable animation.
///
/// Every reference in the model (parents, precompositions, images) is known
/// to resolve and no parent chain or precomposition nesting loops, so
/// evaluation needs no defensive checks.
#[derive(Debug)]
pub struct Animation {
    model: LottieJson,
    frame_count: u32,
    compositions: Vec<Composition>,
    precomps: HashMap<String, CompId>,
    images: HashMap<String, Arc<ImageData>>,
}

impl Animation {
    pub fn from_json(bytes: &[u8]) -> LoadResult<Self> {
        Self::from_json_with_images(bytes, &ImageSources::new())
    }

    pub fn from_json_with_images(bytes: &[u8], images: &ImageSources) -> LoadResult<Self> {
        let model: LottieJson = serde_json::from_slice(bytes)?;
        Self::from_model(model, images)
    }

    pub fn from_model(model: LottieJson, images: &ImageSources) -> LoadResult<Self> {
        if model.w == 0 || model.h == 0 {
            return Err(MalformedAnimation::EmptySize {
                width: model.w,
                height: model.h,
            });
        }
        if !model.fr.is_finite() || model.fr <= 0.0 {
            return Err(MalformedAnimation::FrameRate(model.fr));
        }
        if !model.ip.is_finite() || !model.op.is_finite() || model.op < model.ip {
            return Err(MalformedAnimation::FrameRange {
                in_point: model.ip,
                out_point: model.op,
            });
        }
        let frame_count = (model.op - model.ip).round() as u32;

        let assets_by_id: HashMap<&str, &data::Asset> =
            model.assets.iter().map(|a| (a.id.as_str(), a)).collect();

        let mut compositions = vec![Composition::new(
            "root composition".to_string(),
            None,
            &model.layers,
        )?];
        let mut precomps = HashMap::new();
        for (i, asset) in model.assets.iter().enumerate() {
            if let Some(layers) = &asset.layers {
                let name = format!("precomposition '{}'", asset.id);
                precomps.insert(asset.id.clone(), compositions.len());
                compositions.push(Composition::new(name, Some(i), layers)?);
            }
        }

        let mut nested: Vec<Vec<CompId>> = vec![Vec::new(); compositions.len()];
        let mut image_ids = Vec::new();
        for (comp_id, comp) in compositions.iter().enumerate() {
            let layers = layers_of(&model, comp);
            check_parents(comp, layers)?;

            for layer in layers {
                check_layer_keyframes(layer)?;
                match layer.ty {
                    0 => {
                        let child = layer
                            .ref_id
                            .as_deref()
                            .and_then(|id| precomps.get(id))
                            .ok_or_else(|| unresolved_asset(layer))?;
                        nested[comp_id].push(*child);
                    }
                    2 => {
                        let id = layer.ref_id.as_deref().unwrap_or_default();
                        match assets_by_id.get(id) {
                            Some(asset) if asset.layers.is_none() => image_ids.push(id),
                            _ => return Err(unresolved_asset(layer)),
                        }
                    }
                    5 => warn!(layer = %layer_label(layer), "text layers are not rendered"),
                    _ => {}
                }
            }
        }
        check_precomp_cycles(&compositions, &nested, &model)?;

        let images = assets::decode_images(&assets_by_id, image_ids, images)?;

        debug!(
            width = model.w,
            height = model.h,
            frame_rate = model.fr,
            frame_count,
            layers = model.layers.len(),
            mattes = compositions.iter().map(|c| c.mattes.len()).sum::<usize>(),
            precomps = precomps.len(),
            images = images.len(),
            "animation loaded"
        );

        Ok(Animation {
            model,
            frame_count,
            compositions,
            precomps,
            images,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.model.nm.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.model.w
    }

    pub fn height(&self) -> u32 {
        self.model.h
    }

    pub fn frame_rate(&self) -> f32 {
        self.model.fr
    }

    /// First composition frame.
    pub fn in_point(&self) -> f32 {
        self.model.ip
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub(crate) fn layers(&self, comp: CompId) -> &[data::Layer] {
        layers_of(&self.model, &self.compositions[comp])
    }

    pub(crate) fn composition(&self, comp: CompId) -> &Composition {
        &self.compositions[comp]
    }

    pub(crate) fn precomp(&self, id: &str) -> Option<CompId> {
        self.precomps.get(id).copied()
    }

    pub(crate) fn asset(&self, id: &str) -> Option<&data::Asset> {
        self.model.assets.iter().find(|a| a.id == id)
    }

    pub(crate) fn image(&self, id: &str) -> Option<&Arc<ImageData>> {
        self.images.get(id)
    }
}

fn layers_of<'a>(model: &'a LottieJson, comp: &Composition) -> &'a [data::Layer] {
    match comp.asset {
        None => &model.layers,
        Some(i) => model.assets[i].layers.as_deref().unwrap_or_default(),
    }
}

fn unresolved_asset(layer: &data::Layer) -> MalformedAnimation {
    MalformedAnimation::UnresolvedAsset {
        layer: layer_label(layer),
        asset: layer.ref_id.clone().unwrap_or_default(),
    }
}

fn index_layers(name: &str, layers: &[data::Layer]) -> LoadResult<HashMap<u32, usize>> {
    let mut by_index = HashMap::with_capacity(layers.len());
    for (pos, layer) in layers.iter().enumerate() {
        if let Some(ind) = layer.ind {
            if by_index.insert(ind, pos).is_some() {
                return Err(MalformedAnimation::DuplicateLayer {
                    composition: name.to_string(),
                    index: ind,
                });
            }
        }
    }
    Ok(by_index)
}

/// Every parent must exist in the same composition and no chain may loop.
fn check_parents(comp: &Composition, layers: &[data::Layer]) -> LoadResult<()> {
    const UNVISITED: u8 = 0;
    const ON_CHAIN: u8 = 1;
    const DONE: u8 = 2;

    for layer in layers {
        if let Some(parent) = layer.parent {
            if !comp.by_index.contains_key(&parent) {
                return Err(MalformedAnimation::UnresolvedParent {
                    composition: comp.name.clone(),
                    layer: layer_label(layer),
                    parent,
                });
            }
        }
    }

    let mut state = vec![UNVISITED; layers.len()];
    let mut chain = Vec::new();
    for start in 0..layers.len() {
        let mut current = Some(start);
        while let Some(pos) = current {
            match state[pos] {
                DONE => break,
                ON_CHAIN => {
                    return Err(MalformedAnimation::ParentCycle {
                        composition: comp.name.clone(),
                        index: layers[pos].ind.unwrap_or_default(),
                    })
                }
                _ => {}
            }
            state[pos] = ON_CHAIN;
            chain.push(pos);
            current = layers[pos]
                .parent
                .and_then(|p| comp.by_index.get(&p).copied());
        }
        for pos in chain.drain(..) {
            state[pos] = DONE;
        }
    }
    Ok(())
}

fn check_precomp_cycles(
    compositions: &[Composition],
    nested: &[Vec<CompId>],
    model: &LottieJson,
) -> LoadResult<()> {
    const UNVISITED: u8 = 0;
    const ACTIVE: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNVISITED; compositions.len()];
    for start in 0..compositions.len() {
        if state[start] != UNVISITED {
            continue;
        }
        state[start] = ACTIVE;
        let mut stack = vec![(start, 0usize)];
        while let Some(top) = stack.last_mut() {
            let comp = top.0;
            if let Some(&child) = nested[comp].get(top.1) {
                top.1 += 1;
                match state[child] {
                    UNVISITED => {
                        state[child] = ACTIVE;
                        stack.push((child, 0));
                    }
                    ACTIVE => {
                        let id = compositions[child]
                            .asset
                            .map(|i| model.assets[i].id.clone())
                            .unwrap_or_default();
                        return Err(MalformedAnimation::PrecompCycle(id));
                    }
                    _ => {}
                }
            } else {
                state[comp] = DONE;
                stack.pop();
            }
        }
    }
    Ok(())
}
