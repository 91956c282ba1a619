use glam::Vec4;
use kurbo::{Rect, Shape as _};
use lottie_canvas::{CanvasRenderer, ChannelOrder, TinySkiaCanvas};
use lottie_core::{
    Fill, Group, LottiePlayer, Mask, MaskMode, MaskNode, RenderNode, RenderTree, Shape,
};
use lottie_skia::{native_order, SkiaCanvas, SkiaFrame};
use serde_json::json;

fn render(tree: &RenderTree, width: u32, height: u32) -> SkiaFrame {
    let mut canvas = SkiaCanvas::new(width, height).expect("Failed to create surface");
    CanvasRenderer::render(tree, &mut canvas, (width, height));
    canvas.finish().expect("Failed to read back surface")
}

#[test]
fn test_render_mock_tree() {
    let tree = RenderTree::mock_sample();
    let frame = render(&tree, 500, 500);

    assert_eq!(frame.image().width(), 500);
    assert_eq!(frame.order(), native_order());
    let view = frame.view();
    // Fill inside the square, stroke on its edge, nothing outside.
    assert_eq!(view.rgba_at(200, 200), [255, 0, 0, 255]);
    assert_eq!(view.rgba_at(100, 200), [0, 0, 0, 255]);
    assert_eq!(view.alpha_at(400, 400), 0);
}

#[test]
fn test_output_is_display_ordered() {
    let tree = RenderTree::mock_sample();
    let frame = render(&tree, 50, 50);
    if frame.order() == ChannelOrder::DISPLAY {
        let buffer = frame.into_buffer();
        let i = (20 * 50 + 20) * 4;
        // Red fill in BGRA bytes.
        assert_eq!(&buffer.data()[i..i + 4], &[0, 0, 255, 255]);
    }
}

#[test]
fn test_intersect_mask_leaves_right_half_transparent() {
    let content = RenderNode::Shape(Shape {
        path: Rect::new(0.0, 0.0, 100.0, 100.0).to_path(0.1),
        fill: Some(Fill::solid(Vec4::new(0.0, 1.0, 0.0, 1.0))),
        stroke: None,
    });
    let tree = RenderTree {
        width: 100.0,
        height: 100.0,
        frame: 0.0,
        root: RenderNode::Group(Group::new(vec![RenderNode::Mask(MaskNode {
            content: Box::new(content),
            masks: vec![Mask {
                mode: MaskMode::Intersect,
                geometry: Rect::new(0.0, 0.0, 50.0, 100.0).to_path(0.1),
                opacity: 1.0,
                expansion: 0.0,
                inverted: false,
            }],
        })])),
    };
    let frame = render(&tree, 100, 100);
    let view = frame.view();
    assert_eq!(view.alpha_at(25, 50), 255);
    assert_eq!(view.alpha_at(75, 50), 0);
}

#[test]
fn test_silhouette_matches_tiny_skia() {
    let doc = json!({
        "v": "5.7.0", "ip": 0, "op": 30, "fr": 30, "w": 120, "h": 80,
        "layers": [{
            "ty": 4, "ind": 1, "ip": 0, "op": 30, "st": 0,
            "ks": {
                "p": { "a": 1, "k": [
                    { "t": 0, "s": [30, 40], "i": { "x": [1], "y": [1] }, "o": { "x": [0], "y": [0] } },
                    { "t": 29, "s": [90, 40] }
                ]},
                "r": { "a": 0, "k": 20 }
            },
            "shapes": [
                { "ty": "el", "s": { "a": 0, "k": [40, 30] }, "p": { "a": 0, "k": [0, 0] } },
                { "ty": "fl", "c": { "a": 0, "k": [0.2, 0.4, 0.9] }, "o": { "a": 0, "k": 100 } },
                { "ty": "st", "c": { "a": 0, "k": [0, 0, 0] }, "o": { "a": 0, "k": 100 },
                  "w": { "a": 0, "k": 4 }, "lc": 2, "lj": 2 }
            ]
        }]
    });
    let mut player = LottiePlayer::load(doc.to_string().as_bytes()).unwrap();

    for frame in [0, 14, 29] {
        player.set_frame(frame);
        let tree = player.render_tree();

        let skia = render(&tree, 240, 160);
        let mut tiny = TinySkiaCanvas::with_size(240, 160).unwrap();
        CanvasRenderer::render(&tree, &mut tiny, (240, 160));

        let mismatch = skia
            .view()
            .silhouette_mismatch(&tiny.view(), 127)
            .expect("same size");
        // Only anti-aliased edge pixels may land on different sides of the threshold.
        assert!(mismatch < 60, "frame {}: {} pixels differ", frame, mismatch);
    }
}
