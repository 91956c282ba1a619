use glam::Vec4;
use kurbo::{Rect, Shape as _};
use lottie_canvas::{CanvasRenderer, TinySkiaCanvas};
use lottie_core::{
    BlendMode, Fill, Group, LottiePlayer, Mask, MaskMode, MaskNode, RenderNode, RenderTree, Shape,
};
use lottie_vello::{VelloCanvas, VelloFrame};
use serde_json::json;

fn render(tree: &RenderTree, width: u32, height: u32) -> VelloFrame {
    let mut canvas = VelloCanvas::new(width, height).unwrap();
    CanvasRenderer::render(tree, &mut canvas, (width, height));
    canvas.finish()
}

fn rect(r: Rect, color: Vec4) -> RenderNode {
    RenderNode::Shape(Shape {
        path: r.to_path(0.1),
        fill: Some(Fill::solid(color)),
        stroke: None,
    })
}

fn tree(children: Vec<RenderNode>) -> RenderTree {
    RenderTree {
        width: 100.0,
        height: 100.0,
        frame: 0.0,
        root: RenderNode::Group(Group::new(children)),
    }
}

#[test]
fn test_fill_is_premultiplied_rgba() {
    let frame = render(
        &tree(vec![rect(Rect::new(0.0, 0.0, 100.0, 100.0), Vec4::new(1.0, 0.0, 0.0, 0.5))]),
        10,
        10,
    );
    let view = frame.view().expect("pixmap view");
    let [r, g, b, a] = view.rgba_at(5, 5);
    assert!((126..=129).contains(&a), "alpha {a}");
    assert!(r.abs_diff(a) <= 1);
    assert_eq!((g, b), (0, 0));

    let copy = frame.to_buffer().unwrap();
    assert_eq!(copy.view().rgba_at(5, 5), view.rgba_at(5, 5));
}

#[test]
fn test_later_sibling_paints_over_earlier() {
    let frame = render(
        &tree(vec![
            rect(Rect::new(0.0, 0.0, 60.0, 60.0), Vec4::new(0.0, 0.0, 1.0, 1.0)),
            rect(Rect::new(40.0, 40.0, 100.0, 100.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
        ]),
        100,
        100,
    );
    let view = frame.view().unwrap();
    assert_eq!(view.rgba_at(50, 50), [255, 0, 0, 255]);
    assert_eq!(view.rgba_at(10, 10), [0, 0, 255, 255]);
}

#[test]
fn test_intersect_mask_leaves_right_half_transparent() {
    let masked = RenderNode::Mask(MaskNode {
        content: Box::new(rect(Rect::new(0.0, 0.0, 100.0, 100.0), Vec4::new(0.0, 1.0, 0.0, 1.0))),
        masks: vec![Mask {
            mode: MaskMode::Intersect,
            geometry: Rect::new(0.0, 0.0, 50.0, 100.0).to_path(0.1),
            opacity: 1.0,
            expansion: 0.0,
            inverted: false,
        }],
    });
    let frame = render(&tree(vec![masked]), 100, 100);
    let view = frame.view().unwrap();
    assert_eq!(view.alpha_at(25, 50), 255);
    assert_eq!(view.alpha_at(75, 50), 0);
}

#[test]
fn test_group_clip_and_blend() {
    let mut group = Group::new(vec![rect(
        Rect::new(0.0, 0.0, 100.0, 100.0),
        Vec4::new(1.0, 1.0, 1.0, 1.0),
    )]);
    group.clip = Some(Rect::new(0.0, 0.0, 50.0, 100.0).to_path(0.1));
    group.blend_mode = BlendMode::Multiply;
    let frame = render(&tree(vec![RenderNode::Group(group)]), 100, 100);
    let view = frame.view().unwrap();
    assert_eq!(view.alpha_at(25, 50), 255);
    assert_eq!(view.alpha_at(75, 50), 0);
}

#[test]
fn test_silhouette_matches_tiny_skia() {
    let doc = json!({
        "v": "5.7.0", "ip": 0, "op": 20, "fr": 25, "w": 100, "h": 100,
        "layers": [{
            "ty": 4, "ind": 1, "ip": 0, "op": 20, "st": 0,
            "ks": { "p": { "a": 0, "k": [50, 50] }, "r": { "a": 0, "k": 15 } },
            "shapes": [
                { "ty": "sr", "sy": 1, "pt": { "a": 0, "k": 5 }, "p": { "a": 0, "k": [0, 0] },
                  "r": { "a": 0, "k": 0 }, "or": { "a": 0, "k": 40 }, "ir": { "a": 0, "k": 18 },
                  "os": { "a": 0, "k": 0 }, "is": { "a": 0, "k": 0 } },
                { "ty": "fl", "c": { "a": 0, "k": [1, 0.6, 0] }, "o": { "a": 0, "k": 100 } }
            ]
        }]
    });
    let player = LottiePlayer::load(doc.to_string().as_bytes()).unwrap();
    let tree = player.render_tree();

    let vello = render(&tree, 100, 100);
    let mut tiny = TinySkiaCanvas::with_size(100, 100).unwrap();
    CanvasRenderer::render(&tree, &mut tiny, (100, 100));

    let mismatch = vello
        .view()
        .unwrap()
        .silhouette_mismatch(&tiny.view(), 127)
        .unwrap();
    assert!(mismatch < 40, "{} pixels differ", mismatch);
}
