use glam::Vec4;
use kurbo::{Affine, Rect, Shape as _};
use lottie_canvas::{Canvas, CanvasRenderer, ChannelOrder, NullCanvas, PixelBuffer, TinySkiaCanvas};
use lottie_core::{
    BlendMode, Fill, Group, LottiePlayer, Mask, MaskMode, MaskNode, RenderNode, RenderTree, Shape,
};
use serde_json::{json, Value};

fn static_value(v: Value) -> Value {
    json!({ "a": 0, "k": v })
}

fn rect_layer(ind: u32, pos: [f32; 2], size: [f32; 2], color: [f32; 3], extra: Value) -> Value {
    let mut layer = json!({
        "ty": 4, "ind": ind, "ip": 0, "op": 30, "st": 0, "ks": {},
        "shapes": [
            { "ty": "rc", "s": static_value(json!(size)), "p": static_value(json!(pos)) },
            { "ty": "fl", "c": static_value(json!(color)), "o": static_value(json!(100)) }
        ]
    });
    if let (Some(target), Some(extra)) = (layer.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            target.insert(k.clone(), v.clone());
        }
    }
    layer
}

fn player(layers: Value) -> LottiePlayer {
    let doc = json!({
        "v": "5.7.0", "ip": 0, "op": 30, "fr": 30, "w": 100, "h": 100,
        "layers": layers
    });
    LottiePlayer::load(doc.to_string().as_bytes()).unwrap()
}

fn solid_rect(rect: Rect, color: Vec4) -> RenderNode {
    RenderNode::Shape(Shape {
        path: rect.to_path(0.1),
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

fn render_tiny(tree: &RenderTree, width: u32, height: u32) -> PixelBuffer {
    let mut canvas = TinySkiaCanvas::with_size(width, height).unwrap();
    CanvasRenderer::render(tree, &mut canvas, (width, height));
    canvas.finish()
}

#[test]
fn test_null_backend_visits_every_node() {
    let mask = json!({
        "mode": "a",
        "pt": static_value(json!({
            "c": true,
            "v": [[0, 0], [50, 0], [50, 50], [0, 50]],
            "i": [[0, 0], [0, 0], [0, 0], [0, 0]],
            "o": [[0, 0], [0, 0], [0, 0], [0, 0]]
        }))
    });
    let mut player = player(json!([
        rect_layer(1, [50.0, 50.0], [40.0, 40.0], [1.0, 0.0, 0.0], json!({ "masksProperties": [mask] })),
        rect_layer(2, [20.0, 20.0], [10.0, 10.0], [0.0, 1.0, 0.0], json!({ "parent": 1, "ks": { "o": static_value(json!(50)) } })),
        rect_layer(3, [80.0, 80.0], [10.0, 10.0], [0.0, 0.0, 1.0], json!({}))
    ]));
    player.set_frame(3);
    let tree = player.render_tree();

    let mut canvas = NullCanvas::new(100, 100);
    let stats = CanvasRenderer::render(&tree, &mut canvas, (100, 100));

    assert_eq!(stats.nodes_visited, tree.node_count());
    assert_eq!(stats.max_depth, tree.depth());
    let calls = canvas.stats();
    assert_eq!(calls.fills, 3);
    assert_eq!(calls.mask_layers, 1);
    assert_eq!(calls.opacity_layers, 1);
    assert_eq!(calls.flushes, 1);
}

#[test]
fn test_deep_tree_does_not_recurse() {
    let mut node = solid_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Vec4::ONE);
    for _ in 0..2_000 {
        node = RenderNode::Group(Group::new(vec![node]));
    }
    let tree = RenderTree {
        width: 10.0,
        height: 10.0,
        frame: 0.0,
        root: node,
    };
    let mut canvas = NullCanvas::new(10, 10);
    let stats = CanvasRenderer::render(&tree, &mut canvas, (10, 10));
    assert_eq!(stats.nodes_visited, 2_001);
    assert_eq!(stats.max_depth, 2_001);
}

#[test]
fn test_later_sibling_paints_over_earlier() {
    let player = player(json!([
        rect_layer(1, [50.0, 50.0], [60.0, 60.0], [0.0, 0.0, 1.0], json!({})),
        rect_layer(2, [50.0, 50.0], [60.0, 60.0], [1.0, 0.0, 0.0], json!({}))
    ]));
    let tree = player.render_tree();
    let pixels = render_tiny(&tree, 100, 100);
    // Layer 1 is declared first, so it is on top.
    assert_eq!(pixels.view().rgba_at(50, 50), [0, 0, 255, 255]);
}

#[test]
fn test_intersect_mask_leaves_right_half_transparent() {
    let masked = RenderNode::Mask(MaskNode {
        content: Box::new(solid_rect(Rect::new(0.0, 0.0, 100.0, 100.0), Vec4::new(0.0, 1.0, 0.0, 1.0))),
        masks: vec![Mask {
            mode: MaskMode::Intersect,
            geometry: Rect::new(0.0, 0.0, 50.0, 100.0).to_path(0.1),
            opacity: 1.0,
            expansion: 0.0,
            inverted: false,
        }],
    });
    let pixels = render_tiny(&tree(vec![masked]), 100, 100);
    let view = pixels.view();
    for y in [0, 50, 99] {
        assert_eq!(view.alpha_at(10, y), 255);
        assert_eq!(view.alpha_at(49, y), 255);
        assert_eq!(view.alpha_at(51, y), 0);
        assert_eq!(view.alpha_at(90, y), 0);
    }
}

#[test]
fn test_tree_is_scaled_to_target() {
    let tree = tree(vec![solid_rect(
        Rect::new(0.0, 0.0, 50.0, 50.0),
        Vec4::new(1.0, 0.0, 0.0, 1.0),
    )]);
    let pixels = render_tiny(&tree, 20, 20);
    let view = pixels.view();
    assert_eq!(view.alpha_at(9, 9), 255);
    assert_eq!(view.alpha_at(11, 11), 0);
}

#[test]
fn test_group_clip_and_opacity() {
    let mut group = Group::new(vec![solid_rect(
        Rect::new(0.0, 0.0, 100.0, 100.0),
        Vec4::new(1.0, 1.0, 1.0, 1.0),
    )]);
    group.transform = Affine::translate((50.0, 0.0));
    group.clip = Some(Rect::new(0.0, 0.0, 25.0, 100.0).to_path(0.1));
    group.opacity = 0.5;
    group.blend_mode = BlendMode::Normal;

    let mut canvas = TinySkiaCanvas::with_size(100, 100).unwrap();
    let stats = CanvasRenderer::render(&tree(vec![RenderNode::Group(group)]), &mut canvas, (100, 100));
    assert_eq!(stats.max_depth, 3);
    // The canvas transform is back to the root scale after the walk.
    assert_eq!(canvas.transform(), Affine::IDENTITY);

    let view = canvas.view();
    assert_eq!(view.alpha_at(40, 10), 0);
    let inside = view.alpha_at(60, 10);
    assert!((126..=129).contains(&inside), "alpha {inside}");
    assert_eq!(view.alpha_at(80, 10), 0);
}

#[test]
fn test_caller_buffer_round_trips_with_display_permute() {
    let tree = tree(vec![solid_rect(
        Rect::new(0.0, 0.0, 100.0, 100.0),
        Vec4::new(1.0, 0.0, 0.0, 1.0),
    )]);
    let buffer = PixelBuffer::new(10, 10).unwrap();
    let mut canvas = TinySkiaCanvas::new(buffer).unwrap();
    CanvasRenderer::render(&tree, &mut canvas, (10, 10));
    let out = canvas.finish();
    assert_eq!(out.order(), ChannelOrder::Rgba);
    assert_eq!(&out.data()[..4], &[255, 0, 0, 255]);

    let display = out.into_display_order();
    assert_eq!(display.order(), ChannelOrder::Bgra);
    assert_eq!(&display.data()[..4], &[0, 0, 255, 255]);
}

#[test]
fn test_display_permute_keeps_silhouette() {
    let mut player = player(json!([
        rect_layer(1, [30.0, 30.0], [40.0, 20.0], [1.0, 0.0, 0.0], json!({ "ks": { "r": static_value(json!(30)) } })),
        rect_layer(2, [70.0, 60.0], [30.0, 50.0], [0.0, 0.0, 1.0], json!({}))
    ]));
    player.set_frame(10);
    let tree = player.render_tree();

    let a = render_tiny(&tree, 64, 64);
    let b = render_tiny(&tree, 64, 64).into_display_order();
    assert_eq!(a.view().silhouette_mismatch(&b.view(), 127), Some(0));
}

#[test]
fn test_track_matte_shows_content_only_inside_source() {
    let player = player(json!([
        rect_layer(1, [25.0, 50.0], [50.0, 100.0], [0.0, 1.0, 0.0], json!({ "td": 1 })),
        rect_layer(2, [50.0, 50.0], [100.0, 100.0], [1.0, 0.0, 0.0], json!({ "tt": 1 }))
    ]));
    let tree = player.render_tree();

    let mut canvas = NullCanvas::new(100, 100);
    CanvasRenderer::render(&tree, &mut canvas, (100, 100));
    let calls = canvas.stats();
    assert_eq!(calls.matte_layers, 1);
    assert_eq!(calls.fills, 2);

    let pixels = render_tiny(&tree, 100, 100);
    let view = pixels.view();
    for y in [0, 50, 99] {
        assert_eq!(view.rgba_at(10, y), [255, 0, 0, 255]);
        assert_eq!(view.rgba_at(48, y), [255, 0, 0, 255]);
        assert_eq!(view.rgba_at(52, y), [0, 0, 0, 0]);
        assert_eq!(view.rgba_at(90, y), [0, 0, 0, 0]);
    }
}

#[test]
fn test_inverted_luma_matte_hides_content_under_white() {
    let player = player(json!([
        rect_layer(1, [25.0, 50.0], [50.0, 100.0], [1.0, 1.0, 1.0], json!({ "td": 1 })),
        rect_layer(2, [50.0, 50.0], [100.0, 100.0], [0.0, 0.0, 1.0], json!({ "tt": 4 }))
    ]));
    let pixels = render_tiny(&player.render_tree(), 100, 100);
    let view = pixels.view();
    assert_eq!(view.alpha_at(10, 50), 0);
    assert_eq!(view.rgba_at(90, 50), [0, 0, 255, 255]);
}
