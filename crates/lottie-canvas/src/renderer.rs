use crate::canvas::Canvas;
use kurbo::Affine;
use lottie_core::{Mask, RenderNode, RenderTree};
use tracing::{debug, instrument};

/// Counters collected while walking a tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub nodes_visited: usize,
    /// Deepest node reached, the root being at depth 1.
    pub max_depth: usize,
}

enum Step<'a> {
    Visit(&'a RenderNode, usize),
    ExitGroup {
        saved: Affine,
        clipped: bool,
        layered: bool,
    },
    ExitMask {
        saved: Affine,
        masks: &'a [Mask],
    },
    MatteSource {
        saved: Affine,
    },
    ExitMatte {
        saved: Affine,
    },
}

/// Drives any [`Canvas`] from a [`RenderTree`].
///
/// The walk uses an explicit work stack, so arbitrarily deep trees cannot
/// overflow the call stack. The tree is only read.
pub struct CanvasRenderer;

impl CanvasRenderer {
    /// Draws `tree` scaled to `target` and flushes the canvas.
    #[instrument(level = "debug", skip_all, fields(frame = tree.frame, target = ?target))]
    pub fn render(tree: &RenderTree, canvas: &mut dyn Canvas, target: (u32, u32)) -> RenderStats {
        let sx = scale(target.0, tree.width);
        let sy = scale(target.1, tree.height);
        canvas.set_transform(Affine::scale_non_uniform(sx, sy));

        let mut stats = RenderStats::default();
        let mut work = vec![Step::Visit(&tree.root, 1)];

        while let Some(step) = work.pop() {
            match step {
                Step::Visit(node, depth) => {
                    stats.nodes_visited += 1;
                    stats.max_depth = stats.max_depth.max(depth);
                    visit(node, depth, canvas, &mut work);
                }
                Step::ExitGroup {
                    saved,
                    clipped,
                    layered,
                } => {
                    if layered {
                        canvas.pop_opacity_layer();
                    }
                    if clipped {
                        canvas.pop_clip();
                    }
                    canvas.set_transform(saved);
                }
                Step::ExitMask { saved, masks } => {
                    canvas.set_transform(saved);
                    canvas.pop_mask_layer(masks);
                }
                Step::MatteSource { saved } => {
                    canvas.set_transform(saved);
                    canvas.push_matte_source();
                }
                Step::ExitMatte { saved } => {
                    canvas.set_transform(saved);
                    canvas.pop_matte_layer();
                }
            }
        }

        canvas.flush();
        debug!(
            nodes = stats.nodes_visited,
            depth = stats.max_depth,
            "frame rendered"
        );
        stats
    }
}

fn visit<'a>(node: &'a RenderNode, depth: usize, canvas: &mut dyn Canvas, work: &mut Vec<Step<'a>>) {
    match node {
        RenderNode::Group(group) => {
            let saved = canvas.transform();
            canvas.concat_transform(group.transform);

            let clipped = match &group.clip {
                Some(clip) => {
                    canvas.push_clip(clip);
                    true
                }
                None => false,
            };
            let layered = group.needs_layer();
            if layered {
                canvas.push_opacity_layer(group.opacity, group.blend_mode);
            }

            work.push(Step::ExitGroup {
                saved,
                clipped,
                layered,
            });
            // Reversed so the first child is popped, and painted, first.
            work.extend(group.children.iter().rev().map(|c| Step::Visit(c, depth + 1)));
        }
        RenderNode::Mask(mask) => {
            let saved = canvas.transform();
            canvas.push_mask_layer();
            work.push(Step::ExitMask {
                saved,
                masks: &mask.masks,
            });
            work.push(Step::Visit(&mask.content, depth + 1));
        }
        RenderNode::Matte(matte) => {
            let saved = canvas.transform();
            canvas.push_matte_layer(matte.mode);
            work.push(Step::ExitMatte { saved });
            work.push(Step::Visit(&matte.source, depth + 1));
            work.push(Step::MatteSource { saved });
            work.push(Step::Visit(&matte.content, depth + 1));
        }
        RenderNode::Shape(shape) => {
            if let Some(fill) = &shape.fill {
                canvas.fill_path(&shape.path, fill);
            }
            if let Some(stroke) = &shape.stroke {
                canvas.stroke_path(&shape.path, stroke);
            }
        }
        RenderNode::Image(image) => {
            canvas.draw_image(&image.image, image.transform, image.opacity);
        }
    }
}

fn scale(target: u32, natural: f32) -> f64 {
    if natural.is_finite() && natural > 0.0 {
        target as f64 / natural as f64
    } else {
        1.0
    }
}
